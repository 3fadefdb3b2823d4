//! Interfaces of the function-secret-sharing engines used by the dealer and
//! the online evaluator.

use std::io;

use async_trait::async_trait;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::EngineError;
use crate::wire::{invalid_data, WireRecord};
use crate::{Party, Ring};

/// Segment-parity FSS engine.
///
/// A key pair hides an offset `r`. Evaluating both keys on `m = x + r`
/// yields boolean vectors of length 2^J whose XOR is the one-hot vector of
/// the segment containing `x`.
pub trait FssEngine<R: Ring>: Send + Sync + 'static {
    type Key: WireRecord + Send + Sync + 'static;

    /// Generate a key pair. With `wildcard` set, the hidden offset is that
    /// value; otherwise the engine picks it.
    fn generate<G: Rng + ?Sized>(
        &self,
        wildcard: Option<R>,
        rng: &mut G,
    ) -> Result<(Self::Key, Self::Key), EngineError>;

    /// This key's additive share of the hidden offset.
    fn offset_share(&self, key: &Self::Key) -> R;

    /// Segment parities of `masked_input`.
    fn evaluate(&self, key: &Self::Key, masked_input: R) -> Result<Vec<bool>, EngineError>;
}

/// Distributed comparison function engine.
pub trait DcfEngine<R: Ring>: Send + Sync + 'static {
    /// Key pair for `payload * [input < threshold]` over `bits`-bit inputs.
    fn generate<G: Rng + ?Sized>(
        &self,
        bits: u32,
        threshold: u64,
        payload: R,
        rng: &mut G,
    ) -> Result<(DcfKey, DcfKey), EngineError>;

    /// Additive share of `payload * [input < threshold]`.
    fn evaluate(&self, party: Party, key: &DcfKey, input: u64) -> Result<R, EngineError>;
}

/// Largest group size accepted when decoding a DCF key.
const MAX_GROUP_SIZE: i32 = 1 << 16;

/// Key of a distributed comparison function.
///
/// Layout: `bin`, `bout`, `group_size` as `i32` LE, then `bin + 1` 16-byte
/// seed blocks, `group_size` group elements and `bin * group_size` group
/// elements, each group element a `u64` LE.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DcfKey {
    pub bin: i32,
    pub bout: i32,
    pub group_size: i32,
    pub seeds: Vec<[u8; 16]>,
    pub final_correction: Vec<u64>,
    pub level_corrections: Vec<u64>,
}

impl DcfKey {
    /// Check that vector lengths agree with the header.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0..=64).contains(&self.bin) || !(0..=MAX_GROUP_SIZE).contains(&self.group_size) {
            return Err(EngineError::Dcf(format!(
                "invalid key header: bin {}, group size {}",
                self.bin, self.group_size
            )));
        }
        let bin = self.bin as usize;
        let group_size = self.group_size as usize;
        if self.seeds.len() != bin + 1
            || self.final_correction.len() != group_size
            || self.level_corrections.len() != bin * group_size
        {
            return Err(EngineError::Dcf("key body does not match header".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl WireRecord for DcfKey {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.bin.to_le_bytes());
        buf.extend_from_slice(&self.bout.to_le_bytes());
        buf.extend_from_slice(&self.group_size.to_le_bytes());
        for seed in &self.seeds {
            buf.extend_from_slice(seed);
        }
        for value in self.final_correction.iter().chain(&self.level_corrections) {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    async fn decode<T: AsyncRead + Unpin + Send>(reader: &mut T) -> io::Result<Self> {
        let bin = reader.read_i32_le().await?;
        let bout = reader.read_i32_le().await?;
        let group_size = reader.read_i32_le().await?;
        if !(0..=64).contains(&bin) {
            return Err(invalid_data("DCF key input width out of range"));
        }
        if !(0..=MAX_GROUP_SIZE).contains(&group_size) {
            return Err(invalid_data("DCF key group size out of range"));
        }

        let mut seeds = Vec::with_capacity(bin as usize + 1);
        for _ in 0..=bin {
            let mut seed = [0u8; 16];
            reader.read_exact(&mut seed).await?;
            seeds.push(seed);
        }
        let mut final_correction = Vec::with_capacity(group_size as usize);
        for _ in 0..group_size {
            final_correction.push(reader.read_u64_le().await?);
        }
        let level_len = bin as usize * group_size as usize;
        let mut level_corrections = Vec::with_capacity(level_len);
        for _ in 0..level_len {
            level_corrections.push(reader.read_u64_le().await?);
        }

        Ok(Self {
            bin,
            bout,
            group_size,
            seeds,
            final_correction,
            level_corrections,
        })
    }
}
