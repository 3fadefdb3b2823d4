//! Insecure FSS and DCF engines that can be used for tests.
//!
//! Keys carry the hidden offset, threshold and payload in the clear, so the
//! engines give the correct functional result without any privacy. They let
//! the role binaries and end-to-end tests run without an external engine.

use std::io;

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::EngineError;
use crate::fields::share;
use crate::fss::{DcfEngine, DcfKey, FssEngine};
use crate::params::{Parameters, MAX_SEGMENT_BITS};
use crate::wire::{decode_blob, encode_blob, invalid_data, WireRecord};
use crate::{Party, Ring};

/// Insecure segment-parity engine.
#[derive(Copy, Clone, Debug)]
pub struct FakeFssEngine {
    segment_bits: u32,
}

impl FakeFssEngine {
    pub fn new(params: &Parameters) -> Self {
        Self {
            segment_bits: params.segment_bits(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
struct FakeFssKeyData<R> {
    party: u8,
    offset: R,
    offset_share: R,
    seed: u64,
    segment_bits: u32,
}

/// Key of [`FakeFssEngine`], stored on the wire as a bincode blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FakeFssKey<R> {
    data: FakeFssKeyData<R>,
    blob: Vec<u8>,
}

impl<R: Ring> FakeFssKey<R> {
    fn new(data: FakeFssKeyData<R>) -> Result<Self, EngineError> {
        let blob = bincode::serialize(&data).map_err(|e| EngineError::Fss(e.to_string()))?;
        Ok(Self { data, blob })
    }
}

#[async_trait]
impl<R: Ring> WireRecord for FakeFssKey<R> {
    fn encode(&self, buf: &mut Vec<u8>) {
        encode_blob(&self.blob, buf);
    }

    async fn decode<T: AsyncRead + Unpin + Send>(reader: &mut T) -> io::Result<Self> {
        let blob = decode_blob(reader).await?;
        let data: FakeFssKeyData<R> =
            bincode::deserialize(&blob).map_err(|_| invalid_data("Malformed FSS key"))?;
        if data.party > 1 || data.segment_bits == 0 || data.segment_bits > MAX_SEGMENT_BITS {
            return Err(invalid_data("Malformed FSS key"));
        }
        Ok(Self { data, blob })
    }
}

impl<R: Ring> FssEngine<R> for FakeFssEngine {
    type Key = FakeFssKey<R>;

    fn generate<G: Rng + ?Sized>(
        &self,
        wildcard: Option<R>,
        rng: &mut G,
    ) -> Result<(Self::Key, Self::Key), EngineError> {
        let offset = wildcard.unwrap_or_else(|| R::sample_uniform(rng));
        let (share0, share1) = share(offset, rng);
        let seed = rng.gen();
        let key = |party, offset_share| {
            FakeFssKey::new(FakeFssKeyData {
                party,
                offset,
                offset_share,
                seed,
                segment_bits: self.segment_bits,
            })
        };
        Ok((key(0, share0)?, key(1, share1)?))
    }

    fn offset_share(&self, key: &Self::Key) -> R {
        key.data.offset_share
    }

    fn evaluate(&self, key: &Self::Key, masked_input: R) -> Result<Vec<bool>, EngineError> {
        let data = &key.data;
        if data.segment_bits != self.segment_bits {
            return Err(EngineError::Fss(format!(
                "key built for {} segment bits, engine uses {}",
                data.segment_bits, self.segment_bits
            )));
        }
        let shift = R::BITS - data.segment_bits;
        let segment = ((masked_input - data.offset).value() >> shift) as usize;

        let mut rng = SmallRng::seed_from_u64(data.seed);
        let mut parities: Vec<bool> = (0..1usize << data.segment_bits)
            .map(|_| rng.gen())
            .collect();
        if data.party == 1 {
            parities[segment] = !parities[segment];
        }
        Ok(parities)
    }
}

/// Insecure comparison engine.
#[derive(Copy, Clone, Debug, Default)]
pub struct FakeDcfEngine;

impl<R: Ring> DcfEngine<R> for FakeDcfEngine {
    fn generate<G: Rng + ?Sized>(
        &self,
        bits: u32,
        threshold: u64,
        payload: R,
        rng: &mut G,
    ) -> Result<(DcfKey, DcfKey), EngineError> {
        if bits > 64 {
            return Err(EngineError::Dcf(format!("input width {bits} exceeds 64")));
        }
        if bits < 64 && threshold >> bits != 0 {
            return Err(EngineError::Dcf(format!(
                "threshold {threshold} does not fit in {bits} bits"
            )));
        }

        let mut header = [0u8; 16];
        header[..8].copy_from_slice(&threshold.to_le_bytes());
        header[8..].copy_from_slice(&payload.value().to_le_bytes());
        let mut seeds = vec![header];
        for _ in 0..bits {
            let mut seed = [0u8; 16];
            rng.fill(&mut seed);
            seeds.push(seed);
        }
        let level_corrections: Vec<u64> = (0..bits).map(|_| rng.gen()).collect();
        let mask = R::sample_uniform(rng);

        let key = |mask: R| DcfKey {
            bin: bits as i32,
            bout: R::BITS as i32,
            group_size: 1,
            seeds: seeds.clone(),
            final_correction: vec![mask.value()],
            level_corrections: level_corrections.clone(),
        };
        Ok((key(mask), key(-mask)))
    }

    fn evaluate(&self, party: Party, key: &DcfKey, input: u64) -> Result<R, EngineError> {
        key.validate()?;
        if key.group_size != 1 || key.bout != R::BITS as i32 {
            return Err(EngineError::Dcf(format!(
                "unsupported output group: {} x {} bits",
                key.group_size, key.bout
            )));
        }
        let bits = key.bin as u32;
        if bits < 64 && input >> bits != 0 {
            return Err(EngineError::Dcf(format!(
                "input {input} does not fit in {bits} bits"
            )));
        }

        let header = &key.seeds[0];
        let threshold = u64::from_le_bytes(header[..8].try_into().unwrap_or_default());
        let payload = u64::from_le_bytes(header[8..].try_into().unwrap_or_default());

        let mut result = R::from_u64(key.final_correction[0]);
        if party == Party::P1 && input < threshold {
            result += R::from_u64(payload);
        }
        Ok(result)
    }
}
