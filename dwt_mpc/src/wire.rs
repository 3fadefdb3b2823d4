//! Byte-exact encoding of everything that crosses a socket or lands in a
//! bundle store. Ring elements are written as their raw 8-byte
//! little-endian representation; composite records are plain concatenations
//! without framing.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::fields::ModInt;

/// Upper bound on the length of an opaque length-prefixed blob.
pub const MAX_BLOB_LEN: u64 = 1 << 30;

/// Record with a fixed wire layout.
#[async_trait]
pub trait WireRecord: Sized + Send {
    /// Append the encoding of this record to `buf`.
    fn encode(&self, buf: &mut Vec<u8>);

    /// Read one record from `reader`.
    async fn decode<R: AsyncRead + Unpin + Send>(reader: &mut R) -> io::Result<Self>;

    /// Encoding as a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

#[async_trait]
impl<const L: u32> WireRecord for ModInt<L> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&crate::Ring::value(*self).to_le_bytes());
    }

    async fn decode<R: AsyncRead + Unpin + Send>(reader: &mut R) -> io::Result<Self> {
        let raw = reader.read_u64_le().await?;
        if raw & !Self::MASK != 0 {
            return Err(invalid_data("Ring element out of range"));
        }
        Ok(Self::new(raw))
    }
}

/// Write an opaque blob prefixed by its length as a little-endian `u64`.
pub fn encode_blob(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// Read an opaque length-prefixed blob.
pub async fn decode_blob<R: AsyncRead + Unpin + Send>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = reader.read_u64_le().await?;
    if len > MAX_BLOB_LEN {
        return Err(invalid_data("Blob length exceeds limit"));
    }
    // Grow with the data actually received rather than the claimed length.
    let mut bytes = Vec::new();
    (&mut *reader).take(len).read_to_end(&mut bytes).await?;
    if bytes.len() as u64 != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "Blob ended before its declared length",
        ));
    }
    Ok(bytes)
}

pub(crate) fn invalid_data(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
