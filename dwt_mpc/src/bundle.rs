//! One slot of correlated randomness as issued by the dealer to one peer.
//!
//! Record layout, without framing or sequence numbers:
//!
//! ```text
//! FSS key ‖ [biorthogonal: r ‖ rr ‖ DCF low ‖ DCF high] ‖ triple fields
//! ```

use std::io;

use tokio::io::AsyncRead;

use crate::beaver::{AffineDealt, ProductDealt};
use crate::fss::DcfKey;
use crate::wire::WireRecord;
use crate::{Error, Parameters, Ring, Transform};

/// Mask material for recovering shares of the in-segment digit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigitMaterial<R> {
    /// Share of the input mask `r`.
    pub r: R,
    /// Share of `(r >> (L - n)) mod 2^j`.
    pub rr: R,
    /// Key for the carry out of the low `L - n` bits.
    pub dcf_low: DcfKey,
    /// Key for the borrow out of the low `L - J` bits.
    pub dcf_high: DcfKey,
}

/// Transform-specific part of a bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DealtMaterial<R> {
    Haar(ProductDealt<R>),
    Biorthogonal(DigitMaterial<R>, AffineDealt<R>),
}

/// One peer's share of a slot. Consumed exactly once, in generation order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bundle<R, K> {
    pub fss_key: K,
    pub material: DealtMaterial<R>,
}

impl<R: Ring, K: WireRecord> Bundle<R, K> {
    pub fn haar(fss_key: K, triple: ProductDealt<R>) -> Self {
        Self {
            fss_key,
            material: DealtMaterial::Haar(triple),
        }
    }

    pub fn biorthogonal(fss_key: K, digit: DigitMaterial<R>, triple: AffineDealt<R>) -> Self {
        Self {
            fss_key,
            material: DealtMaterial::Biorthogonal(digit, triple),
        }
    }

    pub fn transform(&self) -> Transform {
        match self.material {
            DealtMaterial::Haar(_) => Transform::Haar,
            DealtMaterial::Biorthogonal(..) => Transform::Biorthogonal,
        }
    }

    /// Check that the DCF keys are well formed and sized for `params`.
    pub fn check(&self, params: &Parameters) -> Result<(), Error> {
        let DealtMaterial::Biorthogonal(digit, _) = &self.material else {
            return Ok(());
        };
        for (key, width) in [
            (&digit.dcf_low, params.digit_shift()),
            (&digit.dcf_high, params.segment_shift()),
        ] {
            key.validate()?;
            if key.bin as u32 != width {
                return Err(Error::Parameters(format!(
                    "DCF key compares {} bits, parameters need {width}",
                    key.bin
                )));
            }
        }
        Ok(())
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        self.fss_key.encode(buf);
        match &self.material {
            DealtMaterial::Haar(triple) => triple.encode(buf),
            DealtMaterial::Biorthogonal(digit, triple) => {
                digit.r.encode(buf);
                digit.rr.encode(buf);
                digit.dcf_low.encode(buf);
                digit.dcf_high.encode(buf);
                triple.encode(buf);
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }

    /// Read one record of the given transform.
    pub async fn read_from<T>(reader: &mut T, transform: Transform) -> io::Result<Self>
    where
        T: AsyncRead + Unpin + Send,
    {
        let fss_key = K::decode(reader).await?;
        Ok(match transform {
            Transform::Haar => Self::haar(fss_key, ProductDealt::decode(reader).await?),
            Transform::Biorthogonal => {
                let digit = DigitMaterial {
                    r: R::decode(reader).await?,
                    rr: R::decode(reader).await?,
                    dcf_low: DcfKey::decode(reader).await?,
                    dcf_high: DcfKey::decode(reader).await?,
                };
                Self::biorthogonal(fss_key, digit, AffineDealt::decode(reader).await?)
            }
        })
    }
}
