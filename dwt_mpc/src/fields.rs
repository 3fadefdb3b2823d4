use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Ring;

/// Integer modulo 2^L, stored reduced in the low L bits of a `u64`.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ModInt<const L: u32>(u64);

/// Ring of 64-bit shares.
pub type Z64 = ModInt<64>;

/// Ring of 32-bit shares.
pub type Z32 = ModInt<32>;

impl<const L: u32> ModInt<L> {
    const VALID_WIDTH: () = assert!(L > 0 && L <= 64, "ring width must be in 1..=64");

    /// Mask selecting the low L bits.
    pub const MASK: u64 = if L >= 64 { u64::MAX } else { (1u64 << L) - 1 };

    /// Reduce `value` modulo 2^L.
    pub const fn new(value: u64) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_WIDTH;
        ModInt(value & Self::MASK)
    }
}

/// Split `value` into two additive shares. The first share is uniform and
/// the second is `value - first`.
pub fn share<R: Ring, G: Rng + ?Sized>(value: R, rng: &mut G) -> (R, R) {
    let first = R::sample_uniform(rng);
    (first, value - first)
}

/// Keep the low `bits` bits of `value`.
pub fn low_bits(value: u64, bits: u32) -> u64 {
    if bits >= 64 {
        value
    } else {
        value & ((1u64 << bits) - 1)
    }
}

impl<const L: u32> Ring for ModInt<L> {
    const BITS: u32 = L;

    fn zero() -> Self {
        Self::new(0)
    }

    fn one() -> Self {
        Self::new(1)
    }

    fn from_u64(value: u64) -> Self {
        Self::new(value)
    }

    fn value(self) -> u64 {
        self.0
    }

    fn sample_uniform<G: Rng + ?Sized>(rng: &mut G) -> Self {
        Self::new(rng.gen())
    }
}

impl<const L: u32> fmt::Debug for ModInt<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<const L: u32> fmt::Display for ModInt<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<const L: u32> From<u64> for ModInt<L> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<const L: u32> From<bool> for ModInt<L> {
    fn from(value: bool) -> Self {
        Self::new(value as u64)
    }
}

impl<const L: u32> Add for ModInt<L> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.0.wrapping_add(rhs.0))
    }
}

impl<const L: u32> Sub for ModInt<L> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.0.wrapping_sub(rhs.0))
    }
}

impl<const L: u32> Mul for ModInt<L> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.0.wrapping_mul(rhs.0))
    }
}

impl<const L: u32> Neg for ModInt<L> {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(self.0.wrapping_neg())
    }
}

impl<const L: u32> AddAssign for ModInt<L> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<const L: u32> SubAssign for ModInt<L> {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<const L: u32> MulAssign for ModInt<L> {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl<const L: u32> Sum for ModInt<L> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::new(0), |acc, x| acc + x)
    }
}

impl<const L: u32> Serialize for ModInt<L> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, const L: u32> Deserialize<'de> for ModInt<L> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u64::deserialize(deserializer)?;
        if raw & !Self::MASK != 0 {
            return Err(serde::de::Error::custom("Invalid ring element"));
        }
        Ok(Self::new(raw))
    }
}
