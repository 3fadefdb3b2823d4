use std::{io::Cursor, process::ExitCode, time::Instant};

use argh::FromArgs;
use dwt_mpc::{
    fake::{FakeDcfEngine, FakeFssEngine},
    fields::share,
    lut::LookupTable,
    plaintext, run_dealer, run_online, run_preprocess_client,
    worker::WorkerPool,
    Context, Error, Parameters, Party, Ring, RingWidth, Transform, Z32, Z64,
};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const BUFFER_SIZE: usize = 1 << 16;

#[derive(FromArgs)]
/// Runs the dealer, both preprocessing clients and both online peers in a
/// single process and checks the reconstructed outputs against cleartext
/// evaluation.
struct Options {
    /// transform (haar or bior)
    #[argh(option, default = "Transform::Haar")]
    transform: Transform,

    /// ring width (32 or 64)
    #[argh(option, default = "RingWidth::Z64")]
    ring: RingWidth,

    /// number of signal bits
    #[argh(option, default = "24")]
    signal_bits: u32,

    /// number of segment bits
    #[argh(option, default = "10")]
    segment_bits: u32,

    /// number of evaluations
    #[argh(option, default = "16")]
    count: usize,

    /// number of worker threads
    #[argh(option, default = "2")]
    threads: usize,

    /// seed for tables and input (random by default)
    #[argh(option)]
    seed: Option<u64>,
}

/// Returns the number of outputs that did not reconstruct to the expected value.
async fn run<R: Ring>(options: &Options) -> Result<usize, Error> {
    let params = Parameters::new::<R>(options.signal_bits, options.segment_bits)?;
    let transform = options.transform;
    let count = options.count;
    let mut rng = options
        .seed
        .map(StdRng::seed_from_u64)
        .unwrap_or_else(StdRng::from_entropy);

    let segments = params.segments();
    let intercepts = LookupTable::new((0..segments).map(|_| R::sample_uniform(&mut rng)).collect());
    let slopes = LookupTable::new((0..segments).map(|_| R::sample_uniform(&mut rng)).collect());
    let pool = WorkerPool::new(options.threads)?;
    let ctx = Context::<R, _, _>::new(params, FakeFssEngine::new(&params), FakeDcfEngine, pool)?
        .with_tables(intercepts, Some(slopes))?;

    let start = Instant::now();
    let (dealer0, client0) = tokio::io::duplex(BUFFER_SIZE);
    let (dealer1, client1) = tokio::io::duplex(BUFFER_SIZE);
    let (mut store0, mut store1) = (Vec::new(), Vec::new());
    let (dealt, stored0, stored1) = futures::join!(
        run_dealer(&ctx, transform, (dealer0, dealer1), count),
        run_preprocess_client(&ctx, transform, client0, &mut store0, count),
        run_preprocess_client(&ctx, transform, client1, &mut store1, count),
    );
    let dealt = dealt.map_err(|aborted| aborted.error)?;
    stored0.map_err(|aborted| aborted.error)?;
    stored1.map_err(|aborted| aborted.error)?;
    info!(
        elapsed = ?start.elapsed(),
        bytes0 = dealt.bytes0,
        bytes1 = dealt.bytes1,
        "preprocessing done"
    );

    let x = R::sample_uniform(&mut rng);
    let (x0, x1) = share(x, &mut rng);
    let start = Instant::now();
    let (link0, link1) = tokio::io::duplex(BUFFER_SIZE);
    let (report0, report1) = futures::join!(
        run_online(
            ctx.clone(),
            transform,
            Party::P0,
            Cursor::new(store0),
            link0,
            x0,
            count
        ),
        run_online(
            ctx.clone(),
            transform,
            Party::P1,
            Cursor::new(store1),
            link1,
            x1,
            count
        ),
    );
    let report0 = report0.map_err(|aborted| aborted.error)?;
    let report1 = report1.map_err(|aborted| aborted.error)?;
    let elapsed = start.elapsed();

    let expected = plaintext::evaluate(transform, &params, ctx.slopes()?, ctx.intercepts()?, x);
    let mismatches = report0
        .outputs
        .iter()
        .zip(&report1.outputs)
        .filter(|&(&y0, &y1)| y0 + y1 != expected)
        .count();

    println!("Input: {}", x.value());
    println!("Expected: {}", expected.value());
    println!(
        "Evaluations: {}, mismatches: {mismatches}, online time: {elapsed:?}",
        report0.outputs.len()
    );
    println!(
        "Peer traffic per evaluation: {} bytes",
        report0.bytes_to_peer / count.max(1) as u64
    );
    Ok(mismatches)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options: Options = argh::from_env();
    let result = match options.ring {
        RingWidth::Z32 => run::<Z32>(&options).await,
        RingWidth::Z64 => run::<Z64>(&options).await,
    };
    match result {
        Ok(0) => ExitCode::SUCCESS,
        Ok(mismatches) => {
            error!(mismatches, "outputs do not match cleartext evaluation");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(%err, "test run failed");
            ExitCode::FAILURE
        }
    }
}
