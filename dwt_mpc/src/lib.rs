use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};

pub mod beaver;
pub mod bundle;
pub mod config;
pub mod context;
pub mod dealer;
pub mod error;
pub mod fake;
pub mod fields;
pub mod fss;
pub mod lut;
pub mod multiply;
pub mod online;
pub mod params;
pub mod plaintext;
pub mod preprocess;
pub mod store;
pub mod transport;
pub mod wire;
pub mod worker;

pub use context::Context;
pub use dealer::{run_dealer, DealerReport};
pub use error::{Aborted, Error};
pub use fields::{ModInt, Z32, Z64};
pub use online::{run_online, run_online_from_dealer, OnlineEvaluator, OnlineReport};
pub use params::{Parameters, RingWidth, Transform};
pub use preprocess::{run_preprocess_client, PreprocessReport};

/// Element of the ring Z/2^L used for all shares in the protocol.
/// Arithmetic wraps silently; there are no overflow errors.
pub trait Ring:
    Copy
    + Clone
    + Default
    + fmt::Debug
    + PartialEq
    + Eq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + Sum
    + Serialize
    + DeserializeOwned
    + wire::WireRecord
{
    /// Bit width L of the ring.
    const BITS: u32;

    fn zero() -> Self;

    fn one() -> Self;

    /// Reduce an integer into the ring.
    fn from_u64(value: u64) -> Self;

    /// Canonical representative in `0..2^L`.
    fn value(self) -> u64;

    /// Uniformly random ring element.
    fn sample_uniform<G: Rng + ?Sized>(rng: &mut G) -> Self;
}

/// One of the two computing peers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Party {
    P0,
    P1,
}

impl Party {
    /// Numeric id used on the wire and in file name patterns.
    pub fn id(self) -> usize {
        match self {
            Party::P0 => 0,
            Party::P1 => 1,
        }
    }

    pub fn from_id(id: usize) -> Option<Self> {
        match id {
            0 => Some(Party::P0),
            1 => Some(Party::P1),
            _ => None,
        }
    }

    /// The counter-peer.
    pub fn other(self) -> Self {
        match self {
            Party::P0 => Party::P1,
            Party::P1 => Party::P0,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer{}", self.id())
    }
}

impl FromStr for Party {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(Party::P0),
            "1" => Ok(Party::P1),
            _ => Err("Unsupported party. Available options: 0, 1"),
        }
    }
}
