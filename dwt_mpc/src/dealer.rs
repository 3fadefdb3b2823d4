use futures::TryFutureExt;
use rand::Rng;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::beaver::{AffineTriple, BeaverTriple, ProductTriple};
use crate::bundle::{Bundle, DigitMaterial};
use crate::context::Context;
use crate::error::EngineError;
use crate::fields::{low_bits, share};
use crate::fss::{DcfEngine, FssEngine};
use crate::transport::{Link, Metered, TransportError};
use crate::{Aborted, Error, Parameters, Ring, Transform};

/// Bytes written to each peer's stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DealerReport {
    pub bytes0: u64,
    pub bytes1: u64,
}

/// Generate one slot of correlated randomness, one bundle per peer.
pub fn deal_bundle_pair<R, F, D, G>(
    params: &Parameters,
    transform: Transform,
    fss: &F,
    dcf: &D,
    rng: &mut G,
) -> Result<(Bundle<R, F::Key>, Bundle<R, F::Key>), EngineError>
where
    R: Ring,
    F: FssEngine<R>,
    D: DcfEngine<R>,
    G: Rng + ?Sized,
{
    match transform {
        Transform::Haar => {
            let (key0, key1) = fss.generate(None, rng)?;
            let (triple0, triple1) = ProductTriple::<R>::deal(rng);
            Ok((Bundle::haar(key0, triple0), Bundle::haar(key1, triple1)))
        }
        Transform::Biorthogonal => {
            let r = R::sample_uniform(rng);
            let rr = R::from_u64(params.digit_of(r.value()));
            let (r0, r1) = share(r, rng);
            let (rr0, rr1) = share(rr, rng);

            let low_width = params.digit_shift();
            let (low0, low1) =
                dcf.generate(low_width, low_bits(r.value(), low_width), R::one(), rng)?;
            let high_width = params.segment_shift();
            let (high0, high1) = dcf.generate(
                high_width,
                low_bits(r.value(), high_width),
                R::from_u64(1 << params.digit_bits()),
                rng,
            )?;

            let (key0, key1) = fss.generate(Some(r), rng)?;
            let (triple0, triple1) = AffineTriple::<R>::deal(rng);

            let digit0 = DigitMaterial {
                r: r0,
                rr: rr0,
                dcf_low: low0,
                dcf_high: high0,
            };
            let digit1 = DigitMaterial {
                r: r1,
                rr: rr1,
                dcf_low: low1,
                dcf_high: high1,
            };
            Ok((
                Bundle::biorthogonal(key0, digit0, triple0),
                Bundle::biorthogonal(key1, digit1, triple1),
            ))
        }
    }
}

/// Generate `count` slots and stream each peer's share of every slot to
/// its writer.
pub async fn run_dealer<R, F, D, W0, W1>(
    ctx: &Context<R, F, D>,
    transform: Transform,
    (out0, out1): (W0, W1),
    count: usize,
) -> Result<DealerReport, Aborted<DealerReport>>
where
    R: Ring,
    F: FssEngine<R>,
    D: DcfEngine<R>,
    W0: AsyncWrite + Unpin + Send,
    W1: AsyncWrite + Unpin + Send,
{
    let mut out0 = Metered::new(out0);
    let mut out1 = Metered::new(out1);
    info!(%transform, count, "dealing bundles");

    let result = deal_all(ctx, transform, &mut out0, &mut out1, count).await;
    let report = DealerReport {
        bytes0: out0.bytes(),
        bytes1: out1.bytes(),
    };
    match result {
        Ok(()) => {
            info!(bytes0 = report.bytes0, bytes1 = report.bytes1, "dealer finished");
            Ok(report)
        }
        Err(error) => Err(Aborted::new(error, report)),
    }
}

async fn deal_all<R, F, D, W0, W1>(
    ctx: &Context<R, F, D>,
    transform: Transform,
    out0: &mut W0,
    out1: &mut W1,
    count: usize,
) -> Result<(), Error>
where
    R: Ring,
    F: FssEngine<R>,
    D: DcfEngine<R>,
    W0: AsyncWrite + Unpin + Send,
    W1: AsyncWrite + Unpin + Send,
{
    for slot in 0..count {
        let params = *ctx.params();
        let fss = ctx.fss().clone();
        let dcf = ctx.dcf().clone();
        let (bytes0, bytes1) = ctx
            .pool()
            .run(move || {
                let mut rng = rand::thread_rng();
                deal_bundle_pair::<R, _, _, _>(&params, transform, &*fss, &*dcf, &mut rng)
                    .map(|(bundle0, bundle1)| (bundle0.to_bytes(), bundle1.to_bytes()))
            })
            .await??;

        futures::try_join!(
            out0.write_all(&bytes0)
                .map_err(TransportError::send(Link::Client(0))),
            out1.write_all(&bytes1)
                .map_err(TransportError::send(Link::Client(1))),
        )?;
        debug!(slot, bytes0 = bytes0.len(), bytes1 = bytes1.len(), "bundle dealt");
    }

    futures::try_join!(
        out0.flush().map_err(TransportError::send(Link::Client(0))),
        out1.flush().map_err(TransportError::send(Link::Client(1))),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::bundle::DealtMaterial;
    use crate::fake::{FakeDcfEngine, FakeFssEngine};
    use crate::worker::WorkerPool;
    use crate::{Party, Z64};

    fn context(params: Parameters) -> Context<Z64, FakeFssEngine, FakeDcfEngine> {
        Context::new(
            params,
            FakeFssEngine::new(&params),
            FakeDcfEngine,
            WorkerPool::new(2).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_digit_material_consistent() {
        let params = Parameters::new::<Z64>(16, 4).unwrap();
        let fss = FakeFssEngine::new(&params);
        let mut rng = SmallRng::from_seed([31; 32]);

        for _ in 0..20 {
            let (b0, b1) = deal_bundle_pair::<Z64, _, _, _>(
                &params,
                Transform::Biorthogonal,
                &fss,
                &FakeDcfEngine,
                &mut rng,
            )
            .unwrap();
            let (DealtMaterial::Biorthogonal(d0, _), DealtMaterial::Biorthogonal(d1, _)) =
                (&b0.material, &b1.material)
            else {
                panic!("expected biorthogonal material");
            };
            let r = d0.r + d1.r;
            assert_eq!((d0.rr + d1.rr).value(), params.digit_of(r.value()));
            let offset = FssEngine::<Z64>::offset_share(&fss, &b0.fss_key)
                + FssEngine::<Z64>::offset_share(&fss, &b1.fss_key);
            assert_eq!(offset, r);

            // Carry key fires exactly below the low bits of r.
            let threshold = low_bits(r.value(), params.digit_shift());
            for input in [0, threshold.saturating_sub(1), threshold] {
                let y0: Z64 = FakeDcfEngine.evaluate(Party::P0, &d0.dcf_low, input).unwrap();
                let y1: Z64 = FakeDcfEngine.evaluate(Party::P1, &d1.dcf_low, input).unwrap();
                assert_eq!(y0 + y1, Z64::from(input < threshold));
            }
            assert_eq!(d0.dcf_high.bin as u32, params.segment_shift());
        }
    }

    #[tokio::test]
    async fn test_dealer_stream_sizes() {
        let params = Parameters::new::<Z64>(16, 4).unwrap();
        let ctx = context(params);
        let mut buf0 = Vec::new();
        let mut buf1 = Vec::new();

        let report = run_dealer(&ctx, Transform::Haar, (&mut buf0, &mut buf1), 3)
            .await
            .unwrap();
        assert_eq!(report.bytes0, buf0.len() as u64);
        assert_eq!(report.bytes1, buf1.len() as u64);
        assert_eq!(buf0.len() % 3, 0);

        let report = run_dealer(&ctx, Transform::Haar, (&mut buf0, &mut buf1), 0)
            .await
            .unwrap();
        assert_eq!(report, DealerReport::default());
    }

    #[tokio::test]
    async fn test_dealer_reports_partial_bytes() {
        let params = Parameters::new::<Z64>(16, 4).unwrap();
        let ctx = context(params);
        let (open, _peer0) = tokio::io::duplex(1 << 16);
        let (closed, peer1) = tokio::io::duplex(1 << 16);
        drop(peer1);

        let aborted = run_dealer(&ctx, Transform::Haar, (open, closed), 2)
            .await
            .unwrap_err();
        assert!(matches!(aborted.error, Error::Transport(ref e) if e.link() == Link::Client(1)));
        assert_eq!(aborted.partial.bytes1, 0);
    }
}
