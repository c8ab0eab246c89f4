//! Optional gzip envelope around serialized recordings.

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::CodecError;

/// First two bytes of every gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether exported bytes are wrapped in gzip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Raw bytes.
    #[default]
    None,
    /// Gzip at the default level.
    Gzip,
}

impl Compression {
    /// Apply this compression to `bytes`.
    pub fn apply(self, bytes: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        match self {
            Compression::None => Ok(bytes),
            Compression::Gzip => compress(&bytes),
        }
    }
}

/// Gzip `bytes`.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Inflate a gzip stream produced by [`compress`].
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// Whether `bytes` start with the gzip magic.
pub fn is_compressed(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Inflate `bytes` if they are gzip, otherwise borrow them unchanged.
pub fn decompress_if_needed(bytes: &[u8]) -> Result<Cow<'_, [u8]>, CodecError> {
    if is_compressed(bytes) {
        Ok(Cow::Owned(decompress(bytes)?))
    } else {
        Ok(Cow::Borrowed(bytes))
    }
}
