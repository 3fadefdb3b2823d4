//! Correlated randomness for one secure multiplication, and the per-peer
//! state machine that consumes it.
//!
//! Both triple kinds move through the same three states:
//!
//! ```text
//! NotStarted --blind--> Blinding --finalize--> Ready
//! ```
//!
//! Operands may only be written in `NotStarted`, the peer's blinded tuple is
//! only accepted by `finalize`, and the output is only readable in `Ready`.

use rand::Rng;

use crate::error::ProtocolStateError;
use crate::wire::WireRecord;
use crate::{Party, Ring};

mod affine;
mod product;

pub use affine::{AffineBlinded, AffineDealt, AffineTriple};
pub use product::{ProductBlinded, ProductDealt, ProductTriple};

/// Progress of a triple through the multiplication protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TripleState {
    NotStarted,
    Blinding,
    Ready,
}

/// Peer-side Beaver triple usable by [`crate::multiply::secure_multiply`].
pub trait BeaverTriple<R: Ring>: Send + 'static {
    /// Dealer-issued share of the correlated randomness.
    type Dealt: WireRecord + Clone + Send + 'static;

    /// Tuple each peer sends to the other during the exchange.
    type Blinded: WireRecord + Copy + Send + Sync + 'static;

    /// Generate a matching pair of dealer-issued shares, one per peer.
    fn deal<G: Rng + ?Sized>(rng: &mut G) -> (Self::Dealt, Self::Dealt);

    /// Fresh triple in `NotStarted` with all operands zero.
    fn from_dealt(dealt: Self::Dealt, party: Party) -> Self;

    fn state(&self) -> TripleState;

    /// Add blinds to the operand shares. NotStarted -> Blinding.
    fn blind(&mut self) -> Result<Self::Blinded, ProtocolStateError>;

    /// Combine own shares with the peer's blinded tuple. Blinding -> Ready.
    fn finalize(&mut self, peer: Self::Blinded) -> Result<R, ProtocolStateError>;

    /// Output share, available once `Ready`.
    fn output(&self) -> Result<R, ProtocolStateError>;
}

/// Fail unless `state` is `expected`.
fn require_state(
    state: TripleState,
    expected: TripleState,
    operation: &'static str,
) -> Result<(), ProtocolStateError> {
    if state != expected {
        return Err(ProtocolStateError::InvalidTransition { operation, state });
    }
    Ok(())
}
