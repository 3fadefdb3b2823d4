use std::io;

use async_trait::async_trait;
use rand::Rng;
use tokio::io::AsyncRead;

use super::{require_state, BeaverTriple, TripleState};
use crate::error::ProtocolStateError;
use crate::fields::share;
use crate::wire::WireRecord;
use crate::{Party, Ring};

/// Dealer-issued share of a four-operand triple.
///
/// With `U, A, B, X` the full blinds of `sign`, `inner_product0`,
/// `inner_product1` and `coefficient`, the corrections are shares of
/// `A*X - B`, `U*X`, `U*A` and `U*(A*X - B)`. Wire order follows field order.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AffineDealt<R> {
    pub sign_blind: R,
    pub inner_product0_blind: R,
    pub inner_product1_blind: R,
    pub coefficient_blind: R,
    pub correction_ax_minus_b: R,
    pub correction_ux: R,
    pub correction_ua: R,
    pub correction_uax_minus_b: R,
}

/// Blinded operands sent to the counter-peer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AffineBlinded<R> {
    pub sign: R,
    pub inner_product0: R,
    pub inner_product1: R,
    pub coefficient: R,
}

/// Four-operand triple computing shares of
/// `sign * (inner_product0 * coefficient + inner_product1)` (biorthogonal).
///
/// Writing `u, a, b, x` for the operands, both peers open
/// `uu = u + U`, `aa = a + A`, `bb = b + B`, `xx = x + X` and each computes
///
/// ```text
/// y = uu * ([P0](aa*xx + bb) - aa*X - xx*A + (AX-B))
///     - (aa*xx + bb)*U + aa*(UX) + xx*(UA) - (U(AX-B))
/// ```
///
/// over its shares of the blinds and corrections. Only `P0` folds in the
/// public term `aa*xx + bb`.
#[derive(Clone, Debug)]
pub struct AffineTriple<R> {
    sign: R,
    inner_product0: R,
    inner_product1: R,
    coefficient: R,
    dealt: AffineDealt<R>,
    blinded: Option<AffineBlinded<R>>,
    party: Party,
    y: R,
    state: TripleState,
}

impl<R: Ring> AffineTriple<R> {
    /// Add to the segment accumulators. Only allowed before blinding.
    pub fn accumulate(
        &mut self,
        sign: R,
        inner_product0: R,
        inner_product1: R,
    ) -> Result<(), ProtocolStateError> {
        require_state(self.state, TripleState::NotStarted, "accumulate into")?;
        self.sign += sign;
        self.inner_product0 += inner_product0;
        self.inner_product1 += inner_product1;
        Ok(())
    }

    /// Set the coefficient share. Only allowed before blinding.
    pub fn set_coefficient(&mut self, coefficient: R) -> Result<(), ProtocolStateError> {
        require_state(self.state, TripleState::NotStarted, "set coefficient of")?;
        self.coefficient = coefficient;
        Ok(())
    }
}

impl<R: Ring> BeaverTriple<R> for AffineTriple<R> {
    type Dealt = AffineDealt<R>;
    type Blinded = AffineBlinded<R>;

    fn deal<G: Rng + ?Sized>(rng: &mut G) -> (Self::Dealt, Self::Dealt) {
        let u = R::sample_uniform(rng);
        let a = R::sample_uniform(rng);
        let b = R::sample_uniform(rng);
        let x = R::sample_uniform(rng);
        let ax_minus_b = a * x - b;

        let (u0, u1) = share(u, rng);
        let (a0, a1) = share(a, rng);
        let (b0, b1) = share(b, rng);
        let (x0, x1) = share(x, rng);
        let (axb0, axb1) = share(ax_minus_b, rng);
        let (ux0, ux1) = share(u * x, rng);
        let (ua0, ua1) = share(u * a, rng);
        let (uaxb0, uaxb1) = share(u * ax_minus_b, rng);

        (
            AffineDealt {
                sign_blind: u0,
                inner_product0_blind: a0,
                inner_product1_blind: b0,
                coefficient_blind: x0,
                correction_ax_minus_b: axb0,
                correction_ux: ux0,
                correction_ua: ua0,
                correction_uax_minus_b: uaxb0,
            },
            AffineDealt {
                sign_blind: u1,
                inner_product0_blind: a1,
                inner_product1_blind: b1,
                coefficient_blind: x1,
                correction_ax_minus_b: axb1,
                correction_ux: ux1,
                correction_ua: ua1,
                correction_uax_minus_b: uaxb1,
            },
        )
    }

    fn from_dealt(dealt: Self::Dealt, party: Party) -> Self {
        Self {
            sign: R::zero(),
            inner_product0: R::zero(),
            inner_product1: R::zero(),
            coefficient: R::zero(),
            dealt,
            blinded: None,
            party,
            y: R::zero(),
            state: TripleState::NotStarted,
        }
    }

    fn state(&self) -> TripleState {
        self.state
    }

    fn blind(&mut self) -> Result<Self::Blinded, ProtocolStateError> {
        require_state(self.state, TripleState::NotStarted, "blind")?;
        let blinded = AffineBlinded {
            sign: self.sign + self.dealt.sign_blind,
            inner_product0: self.inner_product0 + self.dealt.inner_product0_blind,
            inner_product1: self.inner_product1 + self.dealt.inner_product1_blind,
            coefficient: self.coefficient + self.dealt.coefficient_blind,
        };
        self.blinded = Some(blinded);
        self.state = TripleState::Blinding;
        Ok(blinded)
    }

    fn finalize(&mut self, peer: Self::Blinded) -> Result<R, ProtocolStateError> {
        require_state(self.state, TripleState::Blinding, "finalize")?;
        let own = self.blinded.ok_or(ProtocolStateError::InvalidTransition {
            operation: "finalize",
            state: self.state,
        })?;
        let d = &self.dealt;

        let uu = own.sign + peer.sign;
        let aa = own.inner_product0 + peer.inner_product0;
        let bb = own.inner_product1 + peer.inner_product1;
        let xx = own.coefficient + peer.coefficient;
        let public = aa * xx + bb;

        let folded = if self.party == Party::P0 {
            public
        } else {
            R::zero()
        };
        self.y = uu
            * (folded - aa * d.coefficient_blind - xx * d.inner_product0_blind
                + d.correction_ax_minus_b)
            - public * d.sign_blind
            + aa * d.correction_ux
            + xx * d.correction_ua
            - d.correction_uax_minus_b;
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
impl<R: Ring> WireRecord for AffineDealt<R> {
    fn encode(&self, buf: &mut Vec<u8>) {
        for value in [
            self.sign_blind,
            self.inner_product0_blind,
            self.inner_product1_blind,
            self.coefficient_blind,
            self.correction_ax_minus_b,
            self.correction_ux,
            self.correction_ua,
            self.correction_uax_minus_b,
        ] {
            value.encode(buf);
        }
    }

    async fn decode<T: AsyncRead + Unpin + Send>(reader: &mut T) -> io::Result<Self> {
        Ok(Self {
            sign_blind: R::decode(reader).await?,
            inner_product0_blind: R::decode(reader).await?,
            inner_product1_blind: R::decode(reader).await?,
            coefficient_blind: R::decode(reader).await?,
            correction_ax_minus_b: R::decode(reader).await?,
            correction_ux: R::decode(reader).await?,
            correction_ua: R::decode(reader).await?,
            correction_uax_minus_b: R::decode(reader).await?,
        })
    }
}

#[async_trait]
impl<R: Ring> WireRecord for AffineBlinded<R> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.sign.encode(buf);
        self.inner_product0.encode(buf);
        self.inner_product1.encode(buf);
        self.coefficient.encode(buf);
    }

    async fn decode<T: AsyncRead + Unpin + Send>(reader: &mut T) -> io::Result<Self> {
        Ok(Self {
            sign: R::decode(reader).await?,
            inner_product0: R::decode(reader).await?,
            inner_product1: R::decode(reader).await?,
            coefficient: R::decode(reader).await?,
        })
    }
}
