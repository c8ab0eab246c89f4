//! Fixed-width primitive encode/decode.
//!
//! All integers and floats are little-endian. Strings and byte arrays are
//! length-prefixed with an `i32` byte count. Nothing here allocates except
//! the string and byte-array readers, which must return owned data.
//!
//! The stream functions work on `dyn Write` / `dyn Read` so the same code
//! frames snapshots into a `Vec<u8>` and reads replay files through a
//! `BufReader<File>`.

use std::io::{Read, Write};

use crate::error::CodecError;

/// Scale factor of the low-precision float encoding.
pub const LOW_PRECISION_SCALE: f32 = 256.0;

/// Pack a float into 16 bits by scaling by [`LOW_PRECISION_SCALE`] and
/// truncating toward zero.
///
/// Lossy: the step is 1/256 and the usable range is roughly ±128.
/// Values outside the range saturate at `i16::MIN`/`i16::MAX` without
/// error.
pub fn pack_low_precision(v: f32) -> i16 {
    (v * LOW_PRECISION_SCALE) as i16
}

/// Inverse of [`pack_low_precision`].
pub fn unpack_low_precision(v: i16) -> f32 {
    v as f32 / LOW_PRECISION_SCALE
}

// ── Primitive writers ───────────────────────────────────────────

/// Write a single byte.
pub fn write_u8(w: &mut dyn Write, v: u8) -> Result<(), CodecError> {
    w.write_all(&[v])?;
    Ok(())
}

/// Write a bool as one byte (`0` or `1`).
pub fn write_bool(w: &mut dyn Write, v: bool) -> Result<(), CodecError> {
    write_u8(w, v as u8)
}

/// Write a little-endian i16.
pub fn write_i16_le(w: &mut dyn Write, v: i16) -> Result<(), CodecError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian i32.
pub fn write_i32_le(w: &mut dyn Write, v: i32) -> Result<(), CodecError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian f32.
pub fn write_f32_le(w: &mut dyn Write, v: f32) -> Result<(), CodecError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a float in the 16-bit low-precision encoding.
pub fn write_low_precision(w: &mut dyn Write, v: f32) -> Result<(), CodecError> {
    write_i16_le(w, pack_low_precision(v))
}

/// Write a length-prefixed UTF-8 string (i32 length + bytes).
pub fn write_str(w: &mut dyn Write, s: &str) -> Result<(), CodecError> {
    write_bytes(w, s.as_bytes())
}

/// Write a length-prefixed byte array (i32 length + bytes).
pub fn write_bytes(w: &mut dyn Write, b: &[u8]) -> Result<(), CodecError> {
    write_i32_le(w, len_to_i32(b.len())?)?;
    w.write_all(b)?;
    Ok(())
}

/// Convert a length to the `i32` used by every length prefix.
pub fn len_to_i32(len: usize) -> Result<i32, CodecError> {
    i32::try_from(len).map_err(|_| CodecError::PayloadTooLarge {
        len,
        max: i32::MAX as usize,
    })
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a single byte.
pub fn read_u8(r: &mut dyn Read) -> Result<u8, CodecError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a bool written by [`write_bool`]. Any non-zero byte is `true`.
pub fn read_bool(r: &mut dyn Read) -> Result<bool, CodecError> {
    Ok(read_u8(r)? != 0)
}

/// Read a little-endian i16.
pub fn read_i16_le(r: &mut dyn Read) -> Result<i16, CodecError> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(i16::from_le_bytes(buf))
}

/// Read a little-endian i32.
pub fn read_i32_le(r: &mut dyn Read) -> Result<i32, CodecError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Read a little-endian f32.
pub fn read_f32_le(r: &mut dyn Read) -> Result<f32, CodecError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

/// Read a float in the 16-bit low-precision encoding.
pub fn read_low_precision(r: &mut dyn Read) -> Result<f32, CodecError> {
    Ok(unpack_low_precision(read_i16_le(r)?))
}

/// Read a non-negative `i32` count or length.
pub fn read_len(r: &mut dyn Read, what: &str) -> Result<usize, CodecError> {
    let len = read_i32_le(r)?;
    usize::try_from(len).map_err(|_| CodecError::Malformed {
        detail: format!("negative {what}: {len}"),
    })
}

/// Read a length-prefixed UTF-8 string.
pub fn read_str(r: &mut dyn Read) -> Result<String, CodecError> {
    let buf = read_bytes(r)?;
    String::from_utf8(buf).map_err(|_| CodecError::InvalidUtf8)
}

/// Read a length-prefixed byte array.
pub fn read_bytes(r: &mut dyn Read) -> Result<Vec<u8>, CodecError> {
    let len = read_len(r, "byte array length")?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}
