use std::io;

use async_trait::async_trait;
use rand::Rng;
use tokio::io::AsyncRead;

use super::{require_state, BeaverTriple, TripleState};
use crate::error::ProtocolStateError;
use crate::fields::share;
use crate::wire::WireRecord;
use crate::{Party, Ring};

/// Dealer-issued share of a two-operand triple: the peer's own blinds and
/// its share of the cross-term correction `U0*A1 + U1*A0`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductDealt<R> {
    pub sign_blind: R,
    pub inner_product_blind: R,
    pub correction: R,
}

/// Blinded operands sent to the counter-peer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductBlinded<R> {
    pub sign: R,
    pub inner_product: R,
}

/// Two-operand triple computing shares of `sign * inner_product` (Haar).
///
/// Each peer `b` keeps its blinds `U_b, A_b` private and sends
/// `(u_b + U_b, a_b + A_b)`. From the counter-peer's tuple it computes
///
/// ```text
/// y_b = u_b * (a_b + a_peer + A_peer) - (u_peer + U_peer) * A_b + c_b
/// ```
///
/// and the blind cross terms cancel against `c_0 + c_1 = U0*A1 + U1*A0`.
#[derive(Clone, Debug)]
pub struct ProductTriple<R> {
    sign: R,
    inner_product: R,
    dealt: ProductDealt<R>,
    y: R,
    state: TripleState,
}

impl<R: Ring> ProductTriple<R> {
    /// Add to the operand shares. Only allowed before blinding.
    pub fn accumulate(&mut self, sign: R, inner_product: R) -> Result<(), ProtocolStateError> {
        require_state(self.state, TripleState::NotStarted, "accumulate into")?;
        self.sign += sign;
        self.inner_product += inner_product;
        Ok(())
    }

    pub fn sign(&self) -> R {
        self.sign
    }

    pub fn inner_product(&self) -> R {
        self.inner_product
    }
}

impl<R: Ring> BeaverTriple<R> for ProductTriple<R> {
    type Dealt = ProductDealt<R>;
    type Blinded = ProductBlinded<R>;

    fn deal<G: Rng + ?Sized>(rng: &mut G) -> (Self::Dealt, Self::Dealt) {
        let (u0, u1) = share(R::sample_uniform(rng), rng);
        let (a0, a1) = share(R::sample_uniform(rng), rng);
        let (c0, c1) = share(u0 * a1 + u1 * a0, rng);
        (
            ProductDealt {
                sign_blind: u0,
                inner_product_blind: a0,
                correction: c0,
            },
            ProductDealt {
                sign_blind: u1,
                inner_product_blind: a1,
                correction: c1,
            },
        )
    }

    fn from_dealt(dealt: Self::Dealt, _party: Party) -> Self {
        Self {
            sign: R::zero(),
            inner_product: R::zero(),
            dealt,
            y: R::zero(),
            state: TripleState::NotStarted,
        }
    }

    fn state(&self) -> TripleState {
        self.state
    }

    fn blind(&mut self) -> Result<Self::Blinded, ProtocolStateError> {
        require_state(self.state, TripleState::NotStarted, "blind")?;
        let blinded = ProductBlinded {
            sign: self.sign + self.dealt.sign_blind,
            inner_product: self.inner_product + self.dealt.inner_product_blind,
        };
        self.state = TripleState::Blinding;
        Ok(blinded)
    }

    fn finalize(&mut self, peer: Self::Blinded) -> Result<R, ProtocolStateError> {
        require_state(self.state, TripleState::Blinding, "finalize")?;
        self.y = self.sign * (self.inner_product + peer.inner_product)
            - peer.sign * self.dealt.inner_product_blind
            + self.dealt.correction;
        self.state = TripleState::Ready;
        Ok(self.y)
    }

    fn output(&self) -> Result<R, ProtocolStateError> {
        if self.state != TripleState::Ready {
            return Err(ProtocolStateError::NotReady);
        }
        Ok(self.y)
    }
}

#[async_trait]
impl<R: Ring> WireRecord for ProductDealt<R> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.sign_blind.encode(buf);
        self.inner_product_blind.encode(buf);
        self.correction.encode(buf);
    }

    async fn decode<T: AsyncRead + Unpin + Send>(reader: &mut T) -> io::Result<Self> {
        Ok(Self {
            sign_blind: R::decode(reader).await?,
            inner_product_blind: R::decode(reader).await?,
            correction: R::decode(reader).await?,
        })
    }
}

#[async_trait]
impl<R: Ring> WireRecord for ProductBlinded<R> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.sign.encode(buf);
        self.inner_product.encode(buf);
    }

    async fn decode<T: AsyncRead + Unpin + Send>(reader: &mut T) -> io::Result<Self> {
        Ok(Self {
            sign: R::decode(reader).await?,
            inner_product: R::decode(reader).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::{Z32, Z64};

    /// Run both peers' halves of the protocol locally.
    fn multiply_locally<R: Ring>(u: R, a: R, rng: &mut SmallRng) -> (R, R) {
        let (d0, d1) = ProductTriple::<R>::deal(rng);
        let mut t0 = ProductTriple::from_dealt(d0, Party::P0);
        let mut t1 = ProductTriple::from_dealt(d1, Party::P1);
        let (u0, u1) = share(u, rng);
        let (a0, a1) = share(a, rng);
        t0.accumulate(u0, a0).unwrap();
        t1.accumulate(u1, a1).unwrap();

        let b0 = t0.blind().unwrap();
        let b1 = t1.blind().unwrap();
        let y0 = t0.finalize(b1).unwrap();
        let y1 = t1.finalize(b0).unwrap();
        assert_eq!(t0.output().unwrap(), y0);
        assert_eq!(t1.output().unwrap(), y1);
        (y0, y1)
    }

    #[test]
    fn test_product_correctness() {
        let mut rng = SmallRng::from_seed([1; 32]);
        for _ in 0..200 {
            let u = Z64::sample_uniform(&mut rng);
            let a = Z64::sample_uniform(&mut rng);
            let (y0, y1) = multiply_locally(u, a, &mut rng);
            assert_eq!(y0 + y1, u * a);

            let u = Z32::sample_uniform(&mut rng);
            let a = Z32::sample_uniform(&mut rng);
            let (y0, y1) = multiply_locally(u, a, &mut rng);
            assert_eq!(y0 + y1, u * a);
        }
    }

    #[test]
    fn test_sign_squares_away() {
        let mut rng = SmallRng::from_seed([2; 32]);
        let minus_one = -Z64::one();
        let (y0, y1) = multiply_locally(minus_one, minus_one * Z64::new(42), &mut rng);
        assert_eq!(y0 + y1, Z64::new(42));
    }

    #[test]
    fn test_dealt_correction_matches_blinds() {
        let mut rng = SmallRng::from_seed([4; 32]);
        let (d0, d1) = ProductTriple::<Z64>::deal(&mut rng);
        assert_eq!(
            d0.correction + d1.correction,
            d0.sign_blind * d1.inner_product_blind + d1.sign_blind * d0.inner_product_blind
        );
    }

    #[test]
    fn test_state_enforcement() {
        let mut rng = SmallRng::from_seed([5; 32]);
        let (d0, _) = ProductTriple::<Z64>::deal(&mut rng);
        let mut triple = ProductTriple::from_dealt(d0, Party::P0);

        assert_eq!(triple.output(), Err(ProtocolStateError::NotReady));
        assert!(matches!(
            triple.finalize(ProductBlinded::default()),
            Err(ProtocolStateError::InvalidTransition {
                state: TripleState::NotStarted,
                ..
            })
        ));

        triple.blind().unwrap();
        assert_eq!(triple.state(), TripleState::Blinding);
        assert!(triple.blind().is_err());
        assert!(triple.accumulate(Z64::one(), Z64::one()).is_err());
        assert_eq!(triple.output(), Err(ProtocolStateError::NotReady));

        triple.finalize(ProductBlinded::default()).unwrap();
        assert_eq!(triple.state(), TripleState::Ready);
        assert!(triple.finalize(ProductBlinded::default()).is_err());
        assert!(triple.blind().is_err());
        assert!(triple.output().is_ok());
    }

    #[tokio::test]
    async fn test_dealt_wire_layout() {
        let dealt = ProductDealt {
            sign_blind: Z64::new(1),
            inner_product_blind: Z64::new(2),
            correction: Z64::new(3),
        };
        let bytes = dealt.to_bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[8..16], &2u64.to_le_bytes());
        let decoded = ProductDealt::<Z64>::decode(&mut std::io::Cursor::new(bytes))
            .await
            .unwrap();
        assert_eq!(decoded, dealt);
    }
}
