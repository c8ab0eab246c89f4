//! Growable byte buffer with a forward-only read cursor.
//!
//! [`StateBuffer`] is the unit of per-object payload: the object writes
//! its state sequentially while recording and reads it back in the same
//! order during playback. Writes always append; reads consume from the
//! cursor and fail with [`CodecError::ReadPastEnd`] rather than panic.

use glam::{Quat, Vec3};

use crate::codec::{len_to_i32, pack_low_precision, unpack_low_precision};
use crate::error::CodecError;

/// Byte payload plus read cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateBuffer {
    bytes: Vec<u8>,
    cursor: usize,
}

impl StateBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Wrap existing bytes. The cursor starts at the beginning.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, cursor: 0 }
    }

    /// All bytes written so far, regardless of the cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the buffer, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Total number of bytes written.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes left between the cursor and the end.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    /// Whether the cursor has reached the end.
    pub fn at_end(&self) -> bool {
        self.cursor >= self.bytes.len()
    }

    /// Move the cursor back to the first byte.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Drop all bytes and reset the cursor.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.cursor = 0;
    }

    // ── Writes ──────────────────────────────────────────────────

    /// Append raw bytes with no length prefix.
    pub fn write_raw(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }

    /// Append one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    /// Append a bool as one byte.
    pub fn write_bool(&mut self, v: bool) {
        self.bytes.push(v as u8);
    }

    /// Append a little-endian i16.
    pub fn write_i16(&mut self, v: i16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian i32.
    pub fn write_i32(&mut self, v: i32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian f32.
    pub fn write_f32(&mut self, v: f32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a float in the lossy 16-bit encoding.
    pub fn write_low_precision(&mut self, v: f32) {
        self.write_i16(pack_low_precision(v));
    }

    /// Append three f32 components.
    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    /// Append three components in the lossy 16-bit encoding.
    pub fn write_vec3_low_precision(&mut self, v: Vec3) {
        self.write_low_precision(v.x);
        self.write_low_precision(v.y);
        self.write_low_precision(v.z);
    }

    /// Append four f32 components (x, y, z, w).
    pub fn write_quat(&mut self, q: Quat) {
        self.write_f32(q.x);
        self.write_f32(q.y);
        self.write_f32(q.z);
        self.write_f32(q.w);
    }

    /// Append an i32-length-prefixed UTF-8 string.
    pub fn write_str(&mut self, s: &str) -> Result<(), CodecError> {
        self.write_i32(len_to_i32(s.len())?);
        self.write_raw(s.as_bytes());
        Ok(())
    }

    /// Append another buffer as an i32-length-prefixed blob.
    pub fn write_buffer(&mut self, nested: &StateBuffer) -> Result<(), CodecError> {
        self.write_i32(len_to_i32(nested.len())?);
        self.write_raw(nested.as_bytes());
        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────────

    fn take(&mut self, n: usize) -> Result<&[u8], CodecError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(CodecError::ReadPastEnd {
                requested: n,
                remaining,
            });
        }
        let start = self.cursor;
        self.cursor += n;
        Ok(&self.bytes[start..start + n])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read raw bytes with no length prefix.
    pub fn read_raw(&mut self, n: usize) -> Result<&[u8], CodecError> {
        self.take(n)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Read a bool. Any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a little-endian i16.
    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian i32.
    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Read a little-endian f32.
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    /// Read a float in the lossy 16-bit encoding.
    pub fn read_low_precision(&mut self) -> Result<f32, CodecError> {
        Ok(unpack_low_precision(self.read_i16()?))
    }

    /// Read three f32 components.
    pub fn read_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Read three components in the lossy 16-bit encoding.
    pub fn read_vec3_low_precision(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(
            self.read_low_precision()?,
            self.read_low_precision()?,
            self.read_low_precision()?,
        ))
    }

    /// Read four f32 components (x, y, z, w).
    pub fn read_quat(&mut self) -> Result<Quat, CodecError> {
        Ok(Quat::from_xyzw(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    fn read_len(&mut self, what: &str) -> Result<usize, CodecError> {
        let len = self.read_i32()?;
        usize::try_from(len).map_err(|_| CodecError::Malformed {
            detail: format!("negative {what}: {len}"),
        })
    }

    /// Read an i32-length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<String, CodecError> {
        let len = self.read_len("string length")?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read a nested buffer written by [`write_buffer`](Self::write_buffer).
    pub fn read_buffer(&mut self) -> Result<StateBuffer, CodecError> {
        let len = self.read_len("nested buffer length")?;
        Ok(StateBuffer::from_bytes(self.take(len)?.to_vec()))
    }
}

impl From<Vec<u8>> for StateBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}
