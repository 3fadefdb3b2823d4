//! Online phase: one secure lookup per stored bundle.
//!
//! Each evaluation runs the same steps, strictly in order:
//!
//! 1. load the next bundle from the store;
//! 2. reveal the masked input `m = x + r` by exchanging masked shares;
//! 3. on the worker pool, evaluate the FSS key on `m` and add the table
//!    entries of the flagged segments to the triple operands (biorthogonal:
//!    also evaluate both DCF keys and derive the digit share);
//! 4. run the secure multiplication.
//!
//! Peer `P1` negates its accumulated sums. The parity vectors of both peers
//! differ only at the input's segment, so the sign operands add up to ±1 and
//! the inner-product operands to ±entry with the same sign.

use std::io;

use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, info, warn};

use crate::beaver::{AffineTriple, BeaverTriple, ProductTriple};
use crate::bundle::{Bundle, DealtMaterial, DigitMaterial};
use crate::context::Context;
use crate::error::{EngineError, ProtocolStateError};
use crate::fields::low_bits;
use crate::fss::{DcfEngine, FssEngine};
use crate::lut::LookupTable;
use crate::multiply::secure_multiply;
use crate::store::read_bundle;
use crate::transport::{Link, Metered, PeerLink, TransportError};
use crate::worker::WorkerPool;
use crate::{Aborted, Error, Parameters, Party, Ring, Transform};

/// Output shares of a run and the bytes it moved.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OnlineReport<R> {
    pub outputs: Vec<R>,
    pub bytes_from_store: u64,
    pub bytes_from_peer: u64,
    pub bytes_to_peer: u64,
}

/// Triple together with the material it is accumulated from.
#[derive(Debug)]
enum Operands<R> {
    Haar(ProductTriple<R>),
    Biorthogonal(AffineTriple<R>, DigitMaterial<R>),
}

/// State of a single evaluation. Owns the bundle's material and the triple
/// in flight.
#[derive(Debug)]
pub struct EvaluationSession<R, K> {
    index: usize,
    party: Party,
    fss_key: K,
    operands: Option<Operands<R>>,
    masked_input: Option<R>,
    bytes_from_store: u64,
    bytes_from_peer: u64,
    bytes_to_peer: u64,
}

impl<R: Ring, K> EvaluationSession<R, K> {
    fn new(index: usize, party: Party, bundle: Bundle<R, K>) -> Self {
        let operands = match bundle.material {
            DealtMaterial::Haar(dealt) => Operands::Haar(ProductTriple::from_dealt(dealt, party)),
            DealtMaterial::Biorthogonal(digit, dealt) => {
                Operands::Biorthogonal(AffineTriple::from_dealt(dealt, party), digit)
            }
        };
        Self {
            index,
            party,
            fss_key: bundle.fss_key,
            operands: Some(operands),
            masked_input: None,
            bytes_from_store: 0,
            bytes_from_peer: 0,
            bytes_to_peer: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bytes_from_store(&self) -> u64 {
        self.bytes_from_store
    }

    pub fn bytes_from_peer(&self) -> u64 {
        self.bytes_from_peer
    }

    pub fn bytes_to_peer(&self) -> u64 {
        self.bytes_to_peer
    }

    /// This peer's share of the input mask.
    fn mask_share<F>(&self, fss: &F) -> Result<R, Error>
    where
        F: FssEngine<R, Key = K>,
    {
        match &self.operands {
            Some(Operands::Haar(_)) => Ok(fss.offset_share(&self.fss_key)),
            Some(Operands::Biorthogonal(_, digit)) => Ok(digit.r),
            None => Err(ProtocolStateError::NotReady.into()),
        }
    }

    /// Evaluate the engines on the revealed input and fill in the operands.
    fn accumulate<F, D>(
        &mut self,
        params: &Parameters,
        fss: &F,
        dcf: &D,
        intercepts: &LookupTable<R>,
        slopes: &LookupTable<R>,
    ) -> Result<(), Error>
    where
        F: FssEngine<R, Key = K>,
        D: DcfEngine<R>,
    {
        let masked = self.masked_input.ok_or(ProtocolStateError::NotReady)?;
        let parities = fss.evaluate(&self.fss_key, masked)?;
        if parities.len() != params.segments() {
            return Err(EngineError::Fss(format!(
                "expected {} parities, got {}",
                params.segments(),
                parities.len()
            ))
            .into());
        }

        match self.operands.as_mut() {
            Some(Operands::Haar(triple)) => {
                accumulate_haar(triple, self.party, &parities, intercepts)?;
            }
            Some(Operands::Biorthogonal(triple, digit)) => {
                accumulate_biorthogonal(triple, self.party, &parities, slopes, intercepts)?;
                let carry = dcf.evaluate(
                    self.party,
                    &digit.dcf_low,
                    low_bits(masked.value(), params.digit_shift()),
                )?;
                let borrow = dcf.evaluate(
                    self.party,
                    &digit.dcf_high,
                    low_bits(masked.value(), params.segment_shift()),
                )?;
                triple.set_coefficient(digit_share(
                    params, self.party, masked, digit.rr, carry, borrow,
                ))?;
            }
            None => return Err(ProtocolStateError::NotReady.into()),
        }
        Ok(())
    }

    /// Run the secure multiplication and return this peer's output share.
    async fn multiply<S>(&mut self, link: &mut PeerLink<S>, pool: &WorkerPool) -> Result<R, Error>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let operands = self.operands.take().ok_or(ProtocolStateError::NotReady)?;
        let (operands, output) = match operands {
            Operands::Haar(triple) => {
                let triple = secure_multiply(triple, link, pool).await?;
                let output = triple.output()?;
                (Operands::Haar(triple), output)
            }
            Operands::Biorthogonal(triple, digit) => {
                let triple = secure_multiply(triple, link, pool).await?;
                let output = triple.output()?;
                (Operands::Biorthogonal(triple, digit), output)
            }
        };
        self.operands = Some(operands);
        Ok(output)
    }
}

/// `value` for `P0`, `-value` for `P1`.
fn oriented<R: Ring>(party: Party, value: R) -> R {
    match party {
        Party::P0 => value,
        Party::P1 => -value,
    }
}

fn flagged_count<R: Ring>(parities: &[bool]) -> R {
    R::from_u64(parities.iter().filter(|&&p| p).count() as u64)
}

fn flagged_sum<R: Ring>(parities: &[bool], table: &LookupTable<R>) -> R {
    parities
        .iter()
        .zip(table.values())
        .filter(|(&p, _)| p)
        .map(|(_, &value)| value)
        .sum()
}

/// Add one flag per set parity to the sign and the matching intercepts to
/// the inner product.
pub(crate) fn accumulate_haar<R: Ring>(
    triple: &mut ProductTriple<R>,
    party: Party,
    parities: &[bool],
    intercepts: &LookupTable<R>,
) -> Result<(), ProtocolStateError> {
    triple.accumulate(
        oriented(party, flagged_count(parities)),
        oriented(party, flagged_sum(parities, intercepts)),
    )
}

/// Like [`accumulate_haar`], with slopes feeding the first inner product
/// and intercepts the second.
pub(crate) fn accumulate_biorthogonal<R: Ring>(
    triple: &mut AffineTriple<R>,
    party: Party,
    parities: &[bool],
    slopes: &LookupTable<R>,
    intercepts: &LookupTable<R>,
) -> Result<(), ProtocolStateError> {
    triple.accumulate(
        oriented(party, flagged_count(parities)),
        oriented(party, flagged_sum(parities, slopes)),
        oriented(party, flagged_sum(parities, intercepts)),
    )
}

/// Share of the input's in-segment digit `(x >> (L - n)) mod 2^j`.
///
/// With `x = m - r`, the digit of `m` exceeds the digit of `x` by the digit
/// of `r` plus the carry out of the low `L - n` bits, minus `2^j` when the
/// low `L - J` bits wrapped.
pub(crate) fn digit_share<R: Ring>(
    params: &Parameters,
    party: Party,
    masked: R,
    rr: R,
    carry: R,
    borrow: R,
) -> R {
    let public = match party {
        Party::P0 => R::from_u64(params.digit_of(masked.value())),
        Party::P1 => R::zero(),
    };
    public - rr - carry + borrow
}

/// Peer-side driver of the online phase.
///
/// Bundles come from a store written during preprocessing or, in full mode,
/// straight from the dealer's stream.
pub struct OnlineEvaluator<R, F, D, S, P> {
    ctx: Context<R, F, D>,
    transform: Transform,
    party: Party,
    bundles: Metered<S>,
    source: Link,
    peer: PeerLink<P>,
    completed: usize,
}

impl<R, F, D, S, P> OnlineEvaluator<R, F, D, S, P>
where
    R: Ring,
    F: FssEngine<R>,
    D: DcfEngine<R>,
    S: AsyncBufRead + Unpin + Send,
    P: AsyncRead + AsyncWrite + Send + Unpin,
{
    pub fn new(
        ctx: Context<R, F, D>,
        transform: Transform,
        party: Party,
        store: S,
        peer: P,
    ) -> Self {
        Self {
            ctx,
            transform,
            party,
            bundles: Metered::new(store),
            source: Link::Store,
            peer: PeerLink::new(peer),
            completed: 0,
        }
    }

    /// Evaluator that consumes bundles as the dealer streams them.
    pub fn from_dealer(
        ctx: Context<R, F, D>,
        transform: Transform,
        party: Party,
        dealer: S,
        peer: P,
    ) -> Self {
        Self {
            source: Link::Dealer,
            ..Self::new(ctx, transform, party, dealer, peer)
        }
    }

    /// Evaluations finished so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Bytes of bundle material consumed, from the store or the dealer.
    pub fn bytes_from_store(&self) -> u64 {
        self.bundles.bytes()
    }

    pub fn bytes_from_peer(&self) -> u64 {
        self.peer.bytes_read()
    }

    pub fn bytes_to_peer(&self) -> u64 {
        self.peer.bytes_written()
    }

    /// Consume the next bundle to evaluate the lookup on the shared input.
    /// Returns this peer's additive share of the result.
    pub async fn evaluate_next(&mut self, input_share: R) -> Result<R, Error> {
        let mut session = self.load().await?;

        let sent = self.peer.bytes_written();
        let received = self.peer.bytes_read();
        let own_masked = input_share + session.mask_share(&**self.ctx.fss())?;
        let peer_masked = self.peer.exchange(&own_masked).await?;
        session.masked_input = Some(own_masked + peer_masked);

        let params = *self.ctx.params();
        let fss = self.ctx.fss().clone();
        let dcf = self.ctx.dcf().clone();
        let intercepts = self.ctx.intercepts()?.clone();
        let slopes = self.ctx.slopes()?.clone();
        let (mut session, result) = self
            .ctx
            .pool()
            .run(move || {
                let mut session = session;
                let result = session.accumulate(&params, &*fss, &*dcf, &intercepts, &slopes);
                (session, result)
            })
            .await?;
        result?;

        let output = session.multiply(&mut self.peer, self.ctx.pool()).await?;
        session.bytes_to_peer = self.peer.bytes_written() - sent;
        session.bytes_from_peer = self.peer.bytes_read() - received;
        debug!(
            index = session.index(),
            bytes_from_store = session.bytes_from_store(),
            bytes_to_peer = session.bytes_to_peer(),
            bytes_from_peer = session.bytes_from_peer(),
            "evaluation finished"
        );

        self.completed += 1;
        Ok(output)
    }

    async fn load(&mut self) -> Result<EvaluationSession<R, F::Key>, Error> {
        let before = self.bundles.bytes();
        let bundle = read_bundle::<_, R, F::Key>(&mut self.bundles, self.transform, self.source)
            .await?;
        let bundle = match (bundle, self.source) {
            (Some(bundle), _) => bundle,
            (None, Link::Store) => {
                return Err(Error::StoreExhausted {
                    completed: self.completed,
                })
            }
            (None, link) => {
                let source = io::Error::new(io::ErrorKind::UnexpectedEof, "bundle stream closed");
                return Err(TransportError::Recv { link, source }.into());
            }
        };
        let mut session = EvaluationSession::new(self.completed, self.party, bundle);
        session.bytes_from_store = self.bundles.bytes() - before;
        Ok(session)
    }

    /// Report with the given outputs and the current counters.
    pub fn report(&self, outputs: Vec<R>) -> OnlineReport<R> {
        OnlineReport {
            outputs,
            bytes_from_store: self.bytes_from_store(),
            bytes_from_peer: self.bytes_from_peer(),
            bytes_to_peer: self.bytes_to_peer(),
        }
    }
}

/// Run `count` evaluations of the same input share on bundles read from
/// `store`.
pub async fn run_online<R, F, D, S, P>(
    ctx: Context<R, F, D>,
    transform: Transform,
    party: Party,
    store: S,
    peer: P,
    input_share: R,
    count: usize,
) -> Result<OnlineReport<R>, Aborted<OnlineReport<R>>>
where
    R: Ring,
    F: FssEngine<R>,
    D: DcfEngine<R>,
    S: AsyncBufRead + Unpin + Send,
    P: AsyncRead + AsyncWrite + Send + Unpin,
{
    info!(%party, %transform, count, "online phase started");
    let evaluator = OnlineEvaluator::new(ctx, transform, party, store, peer);
    drive(evaluator, input_share, count).await
}

/// Like [`run_online`], with bundles read live from the dealer's stream
/// instead of a store.
pub async fn run_online_from_dealer<R, F, D, T, P>(
    ctx: Context<R, F, D>,
    transform: Transform,
    party: Party,
    dealer: T,
    peer: P,
    input_share: R,
    count: usize,
) -> Result<OnlineReport<R>, Aborted<OnlineReport<R>>>
where
    R: Ring,
    F: FssEngine<R>,
    D: DcfEngine<R>,
    T: AsyncRead + Unpin + Send,
    P: AsyncRead + AsyncWrite + Send + Unpin,
{
    info!(%party, %transform, count, "online phase started, reading bundles from dealer");
    let evaluator =
        OnlineEvaluator::from_dealer(ctx, transform, party, BufReader::new(dealer), peer);
    drive(evaluator, input_share, count).await
}

async fn drive<R, F, D, S, P>(
    mut evaluator: OnlineEvaluator<R, F, D, S, P>,
    input_share: R,
    count: usize,
) -> Result<OnlineReport<R>, Aborted<OnlineReport<R>>>
where
    R: Ring,
    F: FssEngine<R>,
    D: DcfEngine<R>,
    S: AsyncBufRead + Unpin + Send,
    P: AsyncRead + AsyncWrite + Send + Unpin,
{
    let party = evaluator.party;
    let mut outputs = Vec::with_capacity(count);
    for _ in 0..count {
        match evaluator.evaluate_next(input_share).await {
            Ok(output) => outputs.push(output),
            Err(error) => {
                warn!(%party, completed = evaluator.completed(), %error, "online phase aborted");
                return Err(Aborted::new(error, evaluator.report(outputs)));
            }
        }
    }

    let report = evaluator.report(outputs);
    info!(
        %party,
        bytes_from_store = report.bytes_from_store,
        bytes_from_peer = report.bytes_from_peer,
        bytes_to_peer = report.bytes_to_peer,
        "online phase finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::dealer::run_dealer;
    use crate::fake::{FakeDcfEngine, FakeFssEngine};
    use crate::fields::share;
    use crate::plaintext;
    use crate::preprocess::run_preprocess_client;
    use crate::transport::mock_peer_links;
    use crate::{Z32, Z64};

    type FakeContext<R> = Context<R, FakeFssEngine, FakeDcfEngine>;

    fn context<R: Ring>(params: Parameters, rng: &mut SmallRng) -> FakeContext<R> {
        let segments = params.segments();
        let intercepts = LookupTable::new((0..segments).map(|_| R::sample_uniform(rng)).collect());
        let slopes = LookupTable::new((0..segments).map(|_| R::sample_uniform(rng)).collect());
        Context::new(
            params,
            FakeFssEngine::new(&params),
            FakeDcfEngine,
            WorkerPool::new(2).unwrap(),
        )
        .unwrap()
        .with_tables(intercepts, Some(slopes))
        .unwrap()
    }

    /// Deal `count` bundles and pass each peer's stream through preprocessing.
    async fn deal_stores<R: Ring>(
        ctx: &FakeContext<R>,
        transform: Transform,
        count: usize,
    ) -> (Vec<u8>, Vec<u8>) {
        let (mut dealt0, mut dealt1) = (Vec::new(), Vec::new());
        run_dealer(ctx, transform, (&mut dealt0, &mut dealt1), count)
            .await
            .unwrap();

        let (mut store0, mut store1) = (Vec::new(), Vec::new());
        for (dealt, store) in [(dealt0, &mut store0), (dealt1, &mut store1)] {
            run_preprocess_client(ctx, transform, Cursor::new(dealt), store, count)
                .await
                .unwrap();
        }
        (store0, store1)
    }

    async fn run_both<R: Ring>(
        ctx: &FakeContext<R>,
        transform: Transform,
        stores: (Vec<u8>, Vec<u8>),
        x: R,
        count: usize,
        rng: &mut SmallRng,
    ) -> (
        Result<OnlineReport<R>, Aborted<OnlineReport<R>>>,
        Result<OnlineReport<R>, Aborted<OnlineReport<R>>>,
    ) {
        let (x0, x1) = share(x, rng);
        let (link0, link1) = tokio::io::duplex(1 << 16);
        futures::join!(
            run_online(
                ctx.clone(),
                transform,
                Party::P0,
                Cursor::new(stores.0),
                link0,
                x0,
                count
            ),
            run_online(
                ctx.clone(),
                transform,
                Party::P1,
                Cursor::new(stores.1),
                link1,
                x1,
                count
            ),
        )
    }

    #[tokio::test]
    async fn test_haar_end_to_end() {
        let mut rng = SmallRng::from_seed([41; 32]);
        let params = Parameters::new::<Z64>(16, 4).unwrap();
        let ctx = context::<Z64>(params, &mut rng);

        for _ in 0..5 {
            let x = Z64::sample_uniform(&mut rng);
            let stores = deal_stores(&ctx, Transform::Haar, 2).await;
            let (r0, r1) = run_both(&ctx, Transform::Haar, stores, x, 2, &mut rng).await;
            let (r0, r1) = (r0.unwrap(), r1.unwrap());

            let expected = plaintext::evaluate(
                Transform::Haar,
                &params,
                ctx.slopes().unwrap(),
                ctx.intercepts().unwrap(),
                x,
            );
            for i in 0..2 {
                assert_eq!(r0.outputs[i] + r1.outputs[i], expected);
            }
            // Masked input plus blinded pair, per evaluation.
            assert_eq!(r0.bytes_to_peer, 2 * (8 + 16));
            assert_eq!(r1.bytes_from_peer, 2 * (8 + 16));
        }
    }

    #[tokio::test]
    async fn test_biorthogonal_end_to_end() {
        let mut rng = SmallRng::from_seed([42; 32]);
        let params = Parameters::new::<Z32>(20, 5).unwrap();
        let ctx = context::<Z32>(params, &mut rng);

        for _ in 0..10 {
            let x = Z32::sample_uniform(&mut rng);
            let stores = deal_stores(&ctx, Transform::Biorthogonal, 1).await;
            let store_len = stores.0.len() as u64;
            let (r0, r1) =
                run_both(&ctx, Transform::Biorthogonal, stores, x, 1, &mut rng).await;
            let (r0, r1) = (r0.unwrap(), r1.unwrap());

            let expected = plaintext::evaluate(
                Transform::Biorthogonal,
                &params,
                ctx.slopes().unwrap(),
                ctx.intercepts().unwrap(),
                x,
            );
            assert_eq!(r0.outputs[0] + r1.outputs[0], expected);
            assert_eq!(r0.bytes_from_store, store_len);
            assert_eq!(r1.bytes_to_peer, 8 + 32);
        }
    }

    #[tokio::test]
    async fn test_store_exhausted() {
        let mut rng = SmallRng::from_seed([43; 32]);
        let params = Parameters::new::<Z64>(12, 3).unwrap();
        let ctx = context::<Z64>(params, &mut rng);
        let stores = deal_stores(&ctx, Transform::Haar, 3).await;
        let x = Z64::sample_uniform(&mut rng);

        let (r0, r1) = run_both(&ctx, Transform::Haar, stores, x, 4, &mut rng).await;
        for result in [r0, r1] {
            let aborted = result.unwrap_err();
            assert!(matches!(aborted.error, Error::StoreExhausted { completed: 3 }));
            assert_eq!(aborted.partial.outputs.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_peer_dropped_after_first_evaluation() {
        let mut rng = SmallRng::from_seed([46; 32]);
        let params = Parameters::new::<Z64>(12, 3).unwrap();
        let ctx = context::<Z64>(params, &mut rng);
        let (store0, store1) = deal_stores(&ctx, Transform::Haar, 2).await;
        let (x0, x1) = share(Z64::sample_uniform(&mut rng), &mut rng);
        let (link0, link1) = tokio::io::duplex(1 << 16);

        // The counter-peer completes one evaluation, then goes away.
        let counter_peer = async {
            let mut evaluator = OnlineEvaluator::new(
                ctx.clone(),
                Transform::Haar,
                Party::P1,
                Cursor::new(store1),
                link1,
            );
            evaluator.evaluate_next(x1).await.unwrap();
        };
        let (result, ()) = futures::join!(
            run_online(
                ctx.clone(),
                Transform::Haar,
                Party::P0,
                Cursor::new(store0),
                link0,
                x0,
                2
            ),
            counter_peer,
        );

        let aborted = result.unwrap_err();
        assert!(matches!(aborted.error, Error::Transport(ref e) if e.link() == Link::Peer));
        assert_eq!(aborted.partial.outputs.len(), 1);
        assert!(aborted.partial.bytes_from_store > 0);
        assert!(aborted.partial.bytes_from_peer > 0);
        assert!(aborted.partial.bytes_to_peer >= aborted.partial.bytes_from_peer);
    }

    #[tokio::test]
    async fn test_engine_error_aborts_run() {
        let mut rng = SmallRng::from_seed([47; 32]);
        let params = Parameters::new::<Z64>(12, 3).unwrap();
        let ctx = context::<Z64>(params, &mut rng);
        let stores = deal_stores(&ctx, Transform::Haar, 1).await;

        // Keys were built for 3 segment bits, the engine expects 4.
        let wider = Parameters::new::<Z64>(12, 4).unwrap();
        let mismatched = Context::new(
            params,
            FakeFssEngine::new(&wider),
            FakeDcfEngine,
            WorkerPool::new(1).unwrap(),
        )
        .unwrap()
        .with_tables(ctx.intercepts().unwrap().clone(), None)
        .unwrap();

        let x = Z64::sample_uniform(&mut rng);
        let (r0, r1) = run_both(&mismatched, Transform::Haar, stores, x, 1, &mut rng).await;
        for result in [r0, r1] {
            let aborted = result.unwrap_err();
            assert!(matches!(aborted.error, Error::Engine(EngineError::Fss(_))));
            assert!(aborted.partial.outputs.is_empty());
            assert_eq!(aborted.partial.bytes_to_peer, 8);
        }
    }

    #[tokio::test]
    async fn test_bundles_read_live_from_dealer() {
        let mut rng = SmallRng::from_seed([48; 32]);
        let params = Parameters::new::<Z32>(20, 5).unwrap();
        let ctx = context::<Z32>(params, &mut rng);
        let x = Z32::sample_uniform(&mut rng);
        let (x0, x1) = share(x, &mut rng);

        // Small buffers keep the dealer at most about one bundle ahead.
        let (dealer0, bundles0) = tokio::io::duplex(1 << 10);
        let (dealer1, bundles1) = tokio::io::duplex(1 << 10);
        let (link0, link1) = tokio::io::duplex(1 << 16);
        let transform = Transform::Biorthogonal;
        let (dealt, r0, r1) = futures::join!(
            run_dealer(&ctx, transform, (dealer0, dealer1), 3),
            run_online_from_dealer(ctx.clone(), transform, Party::P0, bundles0, link0, x0, 3),
            run_online_from_dealer(ctx.clone(), transform, Party::P1, bundles1, link1, x1, 3),
        );
        let (dealt, r0, r1) = (dealt.unwrap(), r0.unwrap(), r1.unwrap());

        let expected = plaintext::evaluate(
            transform,
            &params,
            ctx.slopes().unwrap(),
            ctx.intercepts().unwrap(),
            x,
        );
        for i in 0..3 {
            assert_eq!(r0.outputs[i] + r1.outputs[i], expected);
        }
        assert_eq!(r0.bytes_from_store, dealt.bytes0);
        assert_eq!(r1.bytes_from_store, dealt.bytes1);
    }

    #[tokio::test]
    async fn test_dealer_stream_ends_early() {
        let mut rng = SmallRng::from_seed([49; 32]);
        let params = Parameters::new::<Z64>(12, 3).unwrap();
        let ctx = context::<Z64>(params, &mut rng);
        let (x0, x1) = share(Z64::sample_uniform(&mut rng), &mut rng);

        let (dealer0, bundles0) = tokio::io::duplex(1 << 16);
        let (dealer1, bundles1) = tokio::io::duplex(1 << 16);
        let (link0, link1) = tokio::io::duplex(1 << 16);
        let transform = Transform::Haar;
        let (dealt, r0, r1) = futures::join!(
            run_dealer(&ctx, transform, (dealer0, dealer1), 1),
            run_online_from_dealer(ctx.clone(), transform, Party::P0, bundles0, link0, x0, 2),
            run_online_from_dealer(ctx.clone(), transform, Party::P1, bundles1, link1, x1, 2),
        );
        dealt.unwrap();
        for result in [r0, r1] {
            let aborted = result.unwrap_err();
            assert!(matches!(aborted.error, Error::Transport(ref e) if e.link() == Link::Dealer));
            assert_eq!(aborted.partial.outputs.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_scripted_parities_multiply_accumulators() {
        let params = Parameters::new::<Z64>(8, 2).unwrap();
        let ones = LookupTable::constant(params.segments(), Z64::one());
        let pool = WorkerPool::new(1).unwrap();
        let mut rng = SmallRng::from_seed([44; 32]);

        // (P0 parities, P1 parities, expected product of accumulators)
        let cases = [
            ([false, true, false, false], [false; 4], 1),
            ([true, true, true, false], [false; 4], 9),
            ([true, true, false, true], [true, false, false, true], 1),
            ([true, true, false, false], [false, false, true, true], 0),
        ];
        for (parities0, parities1, expected) in cases {
            let (d0, d1) = ProductTriple::<Z64>::deal(&mut rng);
            let mut t0 = ProductTriple::from_dealt(d0, Party::P0);
            let mut t1 = ProductTriple::from_dealt(d1, Party::P1);
            accumulate_haar(&mut t0, Party::P0, &parities0, &ones).unwrap();
            accumulate_haar(&mut t1, Party::P1, &parities1, &ones).unwrap();
            // With an all-ones table both accumulators reconstruct to the
            // difference of the flag counts.
            let sign = t0.sign() + t1.sign();
            assert_eq!(t0.inner_product() + t1.inner_product(), sign);
            assert_eq!(sign * sign, Z64::new(expected));

            let (mut link0, mut link1) = mock_peer_links(1024);
            let (t0, t1) = futures::try_join!(
                secure_multiply(t0, &mut link0, &pool),
                secure_multiply(t1, &mut link1, &pool)
            )
            .unwrap();
            assert_eq!(
                t0.output().unwrap() + t1.output().unwrap(),
                Z64::new(expected)
            );
        }
    }

    #[test]
    fn test_digit_share_recovers_digit() {
        let mut rng = SmallRng::from_seed([45; 32]);
        let params = Parameters::new::<Z64>(24, 6).unwrap();
        for _ in 0..1000 {
            let x = Z64::sample_uniform(&mut rng);
            let r = Z64::sample_uniform(&mut rng);
            let m = x + r;
            let carry = low_bits(m.value(), params.digit_shift())
                < low_bits(r.value(), params.digit_shift());
            let borrow = low_bits(m.value(), params.segment_shift())
                < low_bits(r.value(), params.segment_shift());
            let borrow = Z64::from(borrow) * Z64::new(1 << params.digit_bits());
            let rr = Z64::new(params.digit_of(r.value()));

            let (rr0, rr1) = share(rr, &mut rng);
            let (c0, c1) = share(Z64::from(carry), &mut rng);
            let (b0, b1) = share(borrow, &mut rng);
            let y = digit_share(&params, Party::P0, m, rr0, c0, b0)
                + digit_share(&params, Party::P1, m, rr1, c1, b1);
            assert_eq!(y.value(), params.digit_of(x.value()));
        }
    }
}
