use std::{net::SocketAddr, path::PathBuf, process::ExitCode, time::Instant};

use argh::FromArgs;
use dwt_mpc::{
    config::Config,
    fake::{FakeDcfEngine, FakeFssEngine},
    lut::LookupTable,
    run_online, run_online_from_dealer, run_preprocess_client,
    store::{create_store, open_store},
    transport::networking::{accept_counter_peer, connect_as},
    worker::WorkerPool,
    Aborted, Context, Error, OnlineReport, Party, Ring, RingWidth, Transform, Z32, Z64,
};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Computing peer for two-party wavelet-coefficient evaluation.
struct Options {
    /// path to JSON run configuration
    #[argh(option)]
    config: Option<PathBuf>,

    /// current party ID (0 or 1)
    #[argh(option)]
    party: Party,

    /// transform (haar or bior)
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

    /// number of bundles or evaluations
    #[argh(option)]
    count: Option<usize>,

    /// number of worker threads
    #[argh(option)]
    threads: Option<usize>,

    /// disable Nagle's algorithm on connections
    #[argh(switch)]
    nodelay: bool,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Preprocess(PreprocessCommand),
    Online(OnlineCommand),
    Full(FullCommand),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "preprocess")]
/// Receive bundles from the dealer and store them.
struct PreprocessCommand {
    /// dealer address
    #[argh(option)]
    dealer: Option<SocketAddr>,

    /// bundle store path
    #[argh(option)]
    store: PathBuf,

    /// overwrite an existing store
    #[argh(switch)]
    overwrite: bool,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "online")]
/// Evaluate stored bundles together with the counter-peer.
struct OnlineCommand {
    /// bundle store path
    #[argh(option)]
    store: PathBuf,

    /// this peer's additive share of the input
    #[argh(option)]
    input: u64,

    /// wait for the counter-peer on this address
    #[argh(option)]
    listen: Option<SocketAddr>,

    /// connect to the counter-peer at this address
    #[argh(option)]
    connect: Option<SocketAddr>,

    /// intercept table (raw little-endian u64 entries)
    #[argh(option)]
    intercepts: Option<PathBuf>,

    /// slope table for the biorthogonal transform
    #[argh(option)]
    slopes: Option<PathBuf>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "full")]
/// Evaluate bundles streamed live from the dealer together with the
/// counter-peer, without a store.
struct FullCommand {
    /// dealer address
    #[argh(option)]
    dealer: Option<SocketAddr>,

    /// this peer's additive share of the input
    #[argh(option)]
    input: u64,

    /// wait for the counter-peer on this address
    #[argh(option)]
    listen: Option<SocketAddr>,

    /// connect to the counter-peer at this address
    #[argh(option)]
    connect: Option<SocketAddr>,

    /// intercept table (raw little-endian u64 entries)
    #[argh(option)]
    intercepts: Option<PathBuf>,

    /// slope table for the biorthogonal transform
    #[argh(option)]
    slopes: Option<PathBuf>,
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
        config.network.nodelay |= self.nodelay;
        let tables = match &self.command {
            Command::Online(online) => Some((&online.intercepts, &online.slopes)),
            Command::Full(full) => Some((&full.intercepts, &full.slopes)),
            Command::Preprocess(_) => None,
        };
        if let Some((intercepts, slopes)) = tables {
            config.intercepts = intercepts.clone().or(config.intercepts);
            config.slopes = slopes.clone().or(config.slopes);
        }
        Ok(config)
    }
}

async fn preprocess<R: Ring>(
    ctx: &Context<R, FakeFssEngine, FakeDcfEngine>,
    config: &Config,
    party: Party,
    command: &PreprocessCommand,
) -> Result<(), Error> {
    let store = create_store(&command.store, command.overwrite).await?;
    let addr = command.dealer.unwrap_or(config.network.dealer);
    info!(%addr, "connecting to dealer");
    let dealer = connect_as(addr, party).await?;
    dealer.set_nodelay(config.network.nodelay)?;

    let start = Instant::now();
    let report = run_preprocess_client(ctx, config.transform, dealer, store, config.count)
        .await
        .map_err(|aborted| {
            warn!(
                bytes_read = aborted.partial.bytes_read,
                bytes_written = aborted.partial.bytes_written,
                "preprocessing aborted"
            );
            aborted.error
        })?;
    println!(
        "Stored {} bundles ({} bytes received, {} bytes written) in {:?}.",
        config.count,
        report.bytes_read,
        report.bytes_written,
        start.elapsed()
    );
    Ok(())
}

/// Loads the lookup tables named by the configuration into the context.
async fn load_tables<R: Ring>(
    ctx: Context<R, FakeFssEngine, FakeDcfEngine>,
    config: &Config,
) -> Result<Context<R, FakeFssEngine, FakeDcfEngine>, Error> {
    let segments = ctx.params().segments();
    let intercepts_path = config
        .intercepts
        .as_ref()
        .ok_or_else(|| Error::Parameters("intercept table path required".to_string()))?;
    let intercepts = LookupTable::load(intercepts_path, segments).await?;
    let slopes = match &config.slopes {
        Some(path) => Some(LookupTable::load(path, segments).await?),
        None => None,
    };
    ctx.with_tables(intercepts, slopes)
}

/// By default P0 listens on the configured peer address and P1 connects to it.
async fn connect_counter_peer(
    config: &Config,
    party: Party,
    listen: Option<SocketAddr>,
    connect: Option<SocketAddr>,
) -> Result<TcpStream, Error> {
    let stream = match (listen, connect) {
        (Some(_), Some(_)) => {
            return Err(Error::Parameters(
                "--listen and --connect are mutually exclusive".to_string(),
            ))
        }
        (None, Some(addr)) => connect_as(addr, party).await?,
        (Some(addr), None) => accept_counter_peer(&TcpListener::bind(addr).await?, party).await?,
        (None, None) if party == Party::P0 => {
            let listener = TcpListener::bind(config.network.peer).await?;
            accept_counter_peer(&listener, party).await?
        }
        (None, None) => connect_as(config.network.peer, party).await?,
    };
    stream.set_nodelay(config.network.nodelay)?;
    info!(%party, "connected to counter-peer");
    Ok(stream)
}

fn print_report<R: Ring>(report: &OnlineReport<R>, source: &str, start: Instant) {
    for output in &report.outputs {
        println!("{}", output.value());
    }
    println!(
        "Evaluated {} inputs ({} bytes from {source}, {} bytes from peer, {} bytes to peer) in {:?}.",
        report.outputs.len(),
        report.bytes_from_store,
        report.bytes_from_peer,
        report.bytes_to_peer,
        start.elapsed()
    );
}

fn log_aborted<R: Ring>(aborted: Aborted<OnlineReport<R>>) -> Error {
    warn!(
        completed = aborted.partial.outputs.len(),
        bytes_from_store = aborted.partial.bytes_from_store,
        bytes_from_peer = aborted.partial.bytes_from_peer,
        bytes_to_peer = aborted.partial.bytes_to_peer,
        "online phase aborted"
    );
    aborted.error
}

async fn online<R: Ring>(
    ctx: Context<R, FakeFssEngine, FakeDcfEngine>,
    config: &Config,
    party: Party,
    command: &OnlineCommand,
) -> Result<(), Error> {
    let ctx = load_tables(ctx, config).await?;
    let store = open_store(&command.store).await?;
    let stream = connect_counter_peer(config, party, command.listen, command.connect).await?;

    let start = Instant::now();
    let input = R::from_u64(command.input);
    let report = run_online(ctx, config.transform, party, store, stream, input, config.count)
        .await
        .map_err(log_aborted)?;
    print_report(&report, "store", start);
    Ok(())
}

async fn full<R: Ring>(
    ctx: Context<R, FakeFssEngine, FakeDcfEngine>,
    config: &Config,
    party: Party,
    command: &FullCommand,
) -> Result<(), Error> {
    let ctx = load_tables(ctx, config).await?;
    let addr = command.dealer.unwrap_or(config.network.dealer);
    info!(%addr, "connecting to dealer");
    let dealer = connect_as(addr, party).await?;
    dealer.set_nodelay(config.network.nodelay)?;
    let stream = connect_counter_peer(config, party, command.listen, command.connect).await?;

    let start = Instant::now();
    let input = R::from_u64(command.input);
    let report =
        run_online_from_dealer(ctx, config.transform, party, dealer, stream, input, config.count)
            .await
            .map_err(log_aborted)?;
    print_report(&report, "dealer", start);
    Ok(())
}

async fn run<R: Ring>(config: &Config, options: &Options) -> Result<(), Error> {
    let params = config.parameters()?;
    let pool = WorkerPool::new(config.threads())?;
    let ctx =
        Context::<R, _, _>::new(params, FakeFssEngine::new(&params), FakeDcfEngine, pool)?;
    warn!("using the insecure reference FSS and DCF engines");

    match &options.command {
        Command::Preprocess(command) => preprocess(&ctx, config, options.party, command).await,
        Command::Online(command) => online(ctx, config, options.party, command).await,
        Command::Full(command) => full(ctx, config, options.party, command).await,
    }
}

async fn run_main(options: Options) -> Result<(), Error> {
    let config = options.config()?;
    info!(
        party = %options.party,
        transform = %config.transform,
        ring_bits = config.ring_bits,
        count = config.count,
        "starting peer"
    );
    match RingWidth::from_bits(config.ring_bits)? {
        RingWidth::Z32 => run::<Z32>(&config, &options).await,
        RingWidth::Z64 => run::<Z64>(&config, &options).await,
    }
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
            error!(%err, "peer failed");
            ExitCode::FAILURE
        }
    }
}
