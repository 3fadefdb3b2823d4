use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::beaver::BeaverTriple;
use crate::transport::PeerLink;
use crate::worker::WorkerPool;
use crate::{Error, Ring};

/// One-round-trip secure multiplication.
///
/// The triple must hold this peer's operand shares. It is moved to the
/// worker pool for blinding, the blinded tuples are exchanged with the
/// counter-peer, and it is moved to the pool again for finalization. The
/// returned triple is `Ready`.
pub async fn secure_multiply<R, T, S>(
    triple: T,
    link: &mut PeerLink<S>,
    pool: &WorkerPool,
) -> Result<T, Error>
where
    R: Ring,
    T: BeaverTriple<R>,
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let (mut triple, blinded) = pool
        .run(move || {
            let mut triple = triple;
            let blinded = triple.blind();
            (triple, blinded)
        })
        .await?;
    let blinded = blinded?;

    let sent_before = link.bytes_written();
    let peer_blinded = link.exchange(&blinded).await?;
    debug!(
        bytes = link.bytes_written() - sent_before,
        "exchanged blinded operands"
    );

    let (triple, result) = pool
        .run(move || {
            let result = triple.finalize(peer_blinded);
            (triple, result)
        })
        .await?;
    result?;
    Ok(triple)
}

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::beaver::{AffineTriple, ProductTriple, TripleState};
    use crate::error::ProtocolStateError;
    use crate::fields::share;
    use crate::transport::mock_peer_links;
    use crate::{Party, Z64};

    #[tokio::test]
    async fn test_product_over_links() {
        let pool = WorkerPool::new(2).unwrap();
        let mut rng = SmallRng::from_seed([21; 32]);
        let (mut link0, mut link1) = mock_peer_links(1024);

        let (d0, d1) = ProductTriple::<Z64>::deal(&mut rng);
        let mut t0 = ProductTriple::from_dealt(d0, Party::P0);
        let mut t1 = ProductTriple::from_dealt(d1, Party::P1);
        let (u0, u1) = share(Z64::new(6), &mut rng);
        let (a0, a1) = share(Z64::new(7), &mut rng);
        t0.accumulate(u0, a0).unwrap();
        t1.accumulate(u1, a1).unwrap();

        let (t0, t1) = futures::try_join!(
            secure_multiply(t0, &mut link0, &pool),
            secure_multiply(t1, &mut link1, &pool)
        )
        .unwrap();
        assert_eq!(t0.state(), TripleState::Ready);
        assert_eq!(t0.output().unwrap() + t1.output().unwrap(), Z64::new(42));
        assert_eq!(link0.bytes_written(), 16);
        assert_eq!(link1.bytes_read(), 16);
    }

    #[tokio::test]
    async fn test_affine_over_links() {
        let pool = WorkerPool::new(2).unwrap();
        let mut rng = SmallRng::from_seed([22; 32]);
        let (mut link0, mut link1) = mock_peer_links(1024);

        let (d0, d1) = AffineTriple::<Z64>::deal(&mut rng);
        let mut t0 = AffineTriple::from_dealt(d0, Party::P0);
        let mut t1 = AffineTriple::from_dealt(d1, Party::P1);
        t0.accumulate(Z64::new(2), Z64::new(3), Z64::new(7)).unwrap();
        t0.set_coefficient(Z64::new(1)).unwrap();
        t1.set_coefficient(Z64::new(4)).unwrap();

        let (t0, t1) = futures::try_join!(
            secure_multiply(t0, &mut link0, &pool),
            secure_multiply(t1, &mut link1, &pool)
        )
        .unwrap();
        assert_eq!(t0.output().unwrap() + t1.output().unwrap(), Z64::new(44));
        assert_eq!(link1.bytes_written(), 32);
    }

    #[tokio::test]
    async fn test_already_blinded_triple_rejected() {
        let pool = WorkerPool::new(1).unwrap();
        let mut rng = SmallRng::from_seed([23; 32]);
        let (mut link0, _link1) = mock_peer_links(1024);
        let (d0, _) = ProductTriple::<Z64>::deal(&mut rng);
        let mut triple = ProductTriple::from_dealt(d0, Party::P0);
        triple.blind().unwrap();

        let err = secure_multiply(triple, &mut link0, &pool).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ProtocolState(ProtocolStateError::InvalidTransition { .. })
        ));
        assert_eq!(link0.bytes_written(), 0);
    }
}
