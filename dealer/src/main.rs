use std::{
    net::SocketAddr,
    path::PathBuf,
    process::ExitCode,
    time::{Duration, Instant},
};

use argh::FromArgs;
use dwt_mpc::{
    config::Config,
    fake::{FakeDcfEngine, FakeFssEngine},
    run_dealer,
    store::create_store,
    transport::networking::listen_for_peers,
    worker::WorkerPool,
    Context, DealerReport, Error, Ring, RingWidth, Transform, Z32, Z64,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Trusted dealer for two-party wavelet-coefficient evaluation.
struct Options {
    /// path to JSON run configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// transform to prepare bundles for (haar or bior)
    #[argh(option)]
    transform: Option<Transform>,

    /// ring width (32 or 64)
    #[argh(option)]
    ring: Option<RingWidth>,

    /// number of signal bits
    #[argh(option)]
    signal_bits: Option<u32>,

    /// number of segment bits
    #[argh(option)]
    segment_bits: Option<u32>,

    /// number of bundles to generate
    #[argh(option)]
    count: Option<usize>,

    /// number of worker threads
    #[argh(option)]
    threads: Option<usize>,

    /// output path pattern ('#' is replaced with party ID); without it,
    /// bundles are streamed over TCP to peers running either `preprocess`
    /// or `full`
    #[argh(option)]
    output: Option<String>,

    /// address to accept peers on
    #[argh(option)]
    listen: Option<SocketAddr>,

    /// overwrite existing output files
    #[argh(switch)]
    overwrite: bool,

    /// disable Nagle's algorithm on peer connections
    #[argh(switch)]
    nodelay: bool,
}

impl Options {
    /// Configuration file (or defaults) with command-line overrides applied.
    fn config(&self) -> Result<Config, Error> {
        let mut config = Config::load_or_default(self.config.as_deref())?;
        if let Some(transform) = self.transform {
            config.transform = transform;
        }
        if let Some(ring) = self.ring {
            config.ring_bits = ring.bits();
        }
        config.signal_bits = self.signal_bits.unwrap_or(config.signal_bits);
        config.segment_bits = self.segment_bits.unwrap_or(config.segment_bits);
        config.count = self.count.unwrap_or(config.count);
        config.threads = self.threads.or(config.threads);
        if let Some(listen) = self.listen {
            config.network.dealer = listen;
        }
        config.network.nodelay |= self.nodelay;
        Ok(config)
    }
}

/// Returns the report together with the time spent dealing.
async fn run<R: Ring>(
    config: &Config,
    options: &Options,
) -> Result<(DealerReport, Duration), Error> {
    let params = config.parameters()?;
    let pool = WorkerPool::new(config.threads())?;
    let ctx =
        Context::<R, _, _>::new(params, FakeFssEngine::new(&params), FakeDcfEngine, pool)?;
    warn!("using the insecure reference FSS and DCF engines");

    let start;
    let result = match &options.output {
        Some(pattern) => {
            if !pattern.contains('#') {
                return Err(Error::Parameters(
                    "output pattern must contain '#'".to_string(),
                ));
            }
            let out0 = create_store(pattern.replace('#', "0"), options.overwrite).await?;
            let out1 = create_store(pattern.replace('#', "1"), options.overwrite).await?;
            start = Instant::now();
            run_dealer(&ctx, config.transform, (out0, out1), config.count).await
        }
        None => {
            let addr = config.network.dealer;
            info!(%addr, "waiting for peers");
            let [peer0, peer1] = listen_for_peers(addr).await?;
            peer0.set_nodelay(config.network.nodelay)?;
            peer1.set_nodelay(config.network.nodelay)?;
            start = Instant::now();
            run_dealer(&ctx, config.transform, (peer0, peer1), config.count).await
        }
    };

    let report = result.map_err(|aborted| {
        warn!(
            bytes0 = aborted.partial.bytes0,
            bytes1 = aborted.partial.bytes1,
            "dealer aborted"
        );
        aborted.error
    })?;
    Ok((report, start.elapsed()))
}

async fn run_main(options: Options) -> Result<(), Error> {
    let config = options.config()?;
    info!(
        transform = %config.transform,
        ring_bits = config.ring_bits,
        signal_bits = config.signal_bits,
        segment_bits = config.segment_bits,
        count = config.count,
        "starting dealer"
    );

    let (report, elapsed) = match RingWidth::from_bits(config.ring_bits)? {
        RingWidth::Z32 => run::<Z32>(&config, &options).await?,
        RingWidth::Z64 => run::<Z64>(&config, &options).await?,
    };
    println!(
        "Dealt {} bundles ({} bytes to peer 0, {} bytes to peer 1) in {elapsed:?}.",
        config.count, report.bytes0, report.bytes1
    );
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options: Options = argh::from_env();
    match run_main(options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "dealer failed");
            ExitCode::FAILURE
        }
    }
}
