use std::path::Path;
use std::sync::Arc;

use crate::{Error, Ring};

/// Read-only table with one ring element per segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupTable<R> {
    values: Arc<[R]>,
}

impl<R: Ring> LookupTable<R> {
    pub fn new(values: Vec<R>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// Table holding `value` in every one of `segments` entries.
    pub fn constant(segments: usize, value: R) -> Self {
        Self::new(vec![value; segments])
    }

    /// Parse raw little-endian `u64` entries, reduced into the ring.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() % 8 != 0 {
            return Err(Error::Parameters(format!(
                "lookup table length {} is not a multiple of 8",
                bytes.len()
            )));
        }
        Ok(Self::new(
            bytes
                .chunks_exact(8)
                .map(|chunk| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(chunk);
                    R::from_u64(u64::from_le_bytes(raw))
                })
                .collect(),
        ))
    }

    /// Load a table file with exactly `segments` entries.
    pub async fn load(path: impl AsRef<Path>, segments: usize) -> Result<Self, Error> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let table = Self::from_le_bytes(&bytes)?;
        table.check_len(segments)?;
        Ok(table)
    }

    pub fn check_len(&self, segments: usize) -> Result<(), Error> {
        if self.len() != segments {
            return Err(Error::Parameters(format!(
                "lookup table has {} entries, expected {}",
                self.len(),
                segments
            )));
        }
        Ok(())
    }

    pub fn get(&self, segment: usize) -> Option<R> {
        self.values.get(segment).copied()
    }

    pub fn values(&self) -> &[R] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
