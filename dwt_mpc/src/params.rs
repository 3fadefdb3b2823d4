use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Ring};

/// Largest supported number of segment bits (parity vectors have 2^J entries).
pub const MAX_SEGMENT_BITS: u32 = 26;

/// Wavelet transform evaluated by the protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    /// Piecewise-constant lookup, one two-operand multiplication.
    Haar,
    /// Piecewise-linear lookup, one four-operand affine multiplication.
    #[serde(rename = "bior")]
    Biorthogonal,
}

impl Transform {
    /// Number of ring elements in the dealer-issued part of the triple.
    pub fn triple_len(self) -> usize {
        match self {
            Transform::Haar => 3,
            Transform::Biorthogonal => 8,
        }
    }
}

impl FromStr for Transform {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "haar" | "Haar" => Ok(Transform::Haar),
            "bior" => Ok(Transform::Biorthogonal),
            _ => Err("Unsupported transform. Available options: haar, bior"),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Haar => write!(f, "Haar"),
            Transform::Biorthogonal => write!(f, "bior"),
        }
    }
}

/// Ring width selectable at runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RingWidth {
    Z32,
    Z64,
}

impl RingWidth {
    pub fn bits(self) -> u32 {
        match self {
            RingWidth::Z32 => 32,
            RingWidth::Z64 => 64,
        }
    }

    pub fn from_bits(bits: u32) -> Result<Self, Error> {
        match bits {
            32 => Ok(RingWidth::Z32),
            64 => Ok(RingWidth::Z64),
            _ => Err(Error::Parameters(format!("unsupported ring width {bits}"))),
        }
    }
}

impl FromStr for RingWidth {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "32" => Ok(RingWidth::Z32),
            "64" => Ok(RingWidth::Z64),
            _ => Err("Unsupported ring width. Available options: 32, 64"),
        }
    }
}

/// Bit-width parameters of one run.
///
/// The signal occupies the top `signal_bits` (n) bits of an L-bit ring
/// element. Its top `segment_bits` (J) bits select one of 2^J lookup-table
/// segments; the remaining `digit_bits` (j = n - J) bits give the position
/// inside the segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Parameters {
    ring_bits: u32,
    signal_bits: u32,
    segment_bits: u32,
}

impl Parameters {
    /// Validated parameters for the ring `R`.
    pub fn new<R: Ring>(signal_bits: u32, segment_bits: u32) -> Result<Self, Error> {
        Self::with_ring_bits(R::BITS, signal_bits, segment_bits)
    }

    pub fn with_ring_bits(
        ring_bits: u32,
        signal_bits: u32,
        segment_bits: u32,
    ) -> Result<Self, Error> {
        if ring_bits == 0 || ring_bits > 64 {
            return Err(Error::Parameters(format!(
                "ring width {ring_bits} not in 1..=64"
            )));
        }
        if signal_bits > ring_bits {
            return Err(Error::Parameters(format!(
                "signal bits exceed ring bits: {signal_bits} > {ring_bits}"
            )));
        }
        if segment_bits == 0 || segment_bits > signal_bits {
            return Err(Error::Parameters(format!(
                "invalid segment bits: {segment_bits}"
            )));
        }
        if segment_bits > MAX_SEGMENT_BITS {
            return Err(Error::Parameters(format!(
                "segment bits exceed {MAX_SEGMENT_BITS}: {segment_bits}"
            )));
        }
        Ok(Self {
            ring_bits,
            signal_bits,
            segment_bits,
        })
    }

    /// L.
    pub fn ring_bits(&self) -> u32 {
        self.ring_bits
    }

    /// n.
    pub fn signal_bits(&self) -> u32 {
        self.signal_bits
    }

    /// J.
    pub fn segment_bits(&self) -> u32 {
        self.segment_bits
    }

    /// j = n - J.
    pub fn digit_bits(&self) -> u32 {
        self.signal_bits - self.segment_bits
    }

    /// Number of lookup-table segments, 2^J.
    pub fn segments(&self) -> usize {
        1usize << self.segment_bits
    }

    /// Shift that drops the sub-signal bits, L - n. Also the width of the
    /// low DCF comparison.
    pub fn digit_shift(&self) -> u32 {
        self.ring_bits - self.signal_bits
    }

    /// Shift that leaves only the segment index, L - J. Also the width of
    /// the high DCF comparison.
    pub fn segment_shift(&self) -> u32 {
        self.ring_bits - self.segment_bits
    }

    /// Segment containing the (unmasked) value `x`.
    pub fn segment_of(&self, x: u64) -> usize {
        (x >> self.segment_shift()) as usize
    }

    /// In-segment position of `x`, `(x >> (L - n)) mod 2^j`.
    pub fn digit_of(&self, x: u64) -> u64 {
        crate::fields::low_bits(x >> self.digit_shift(), self.digit_bits())
    }

    /// Check that this parameter set was built for ring `R`.
    pub fn check_ring<R: Ring>(&self) -> Result<(), Error> {
        if self.ring_bits != R::BITS {
            return Err(Error::Parameters(format!(
                "parameters built for {}-bit ring, used with {}-bit ring",
                self.ring_bits,
                R::BITS
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Z64;

    #[test]
    fn test_derived_widths() {
        let params = Parameters::new::<Z64>(32, 22).unwrap();
        assert_eq!(params.digit_bits(), 10);
        assert_eq!(params.digit_shift(), 32);
        assert_eq!(params.segment_shift(), 42);
        assert_eq!(params.segments(), 1 << 22);
    }

    #[test]
    fn test_segment_and_digit() {
        let params = Parameters::new::<Z64>(16, 4).unwrap();
        let x = (0b1011u64 << 60) | (0b101u64 << 48) | 0xdead;
        assert_eq!(params.segment_of(x), 0b1011);
        assert_eq!(params.digit_of(x), 0b101);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(Parameters::new::<Z64>(65, 4).is_err());
        assert!(Parameters::new::<Z64>(16, 0).is_err());
        assert!(Parameters::new::<Z64>(16, 17).is_err());
        assert!(Parameters::new::<Z64>(40, 30).is_err());
        assert!(Parameters::with_ring_bits(0, 0, 0).is_err());
    }

    #[test]
    fn test_ring_width() {
        assert_eq!("32".parse::<RingWidth>().unwrap().bits(), 32);
        assert_eq!(RingWidth::from_bits(64).unwrap(), RingWidth::Z64);
        assert!(RingWidth::from_bits(16).is_err());
    }

    #[test]
    fn test_transform_parse() {
        assert_eq!("haar".parse::<Transform>().unwrap(), Transform::Haar);
        assert_eq!("bior".parse::<Transform>().unwrap(), Transform::Biorthogonal);
        assert!("db4".parse::<Transform>().is_err());
    }
}
