use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::bundle::Bundle;
use crate::context::Context;
use crate::fss::{DcfEngine, FssEngine};
use crate::transport::{Link, Metered, TransportError};
use crate::wire::WireRecord;
use crate::{Aborted, Error, Parameters, Ring, Transform};

/// Bytes read from the dealer and written to the store.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PreprocessReport {
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Receive `count` bundles from the dealer and append them, in order and
/// byte for byte, to `store`.
pub async fn run_preprocess_client<R, F, D, S, W>(
    ctx: &Context<R, F, D>,
    transform: Transform,
    dealer: S,
    store: W,
    count: usize,
) -> Result<PreprocessReport, Aborted<PreprocessReport>>
where
    R: Ring,
    F: FssEngine<R>,
    D: DcfEngine<R>,
    S: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut input = Metered::new(BufReader::new(dealer));
    let mut output = Metered::new(store);
    info!(%transform, count, "receiving bundles");

    let params = ctx.params();
    debug!(segments = params.segments(), "preprocessing parameters");
    let result =
        ingest::<R, F::Key, _, _>(params, transform, &mut input, &mut output, count).await;
    let report = PreprocessReport {
        bytes_read: input.bytes(),
        bytes_written: output.bytes(),
    };
    match result {
        Ok(()) => {
            info!(
                bytes_read = report.bytes_read,
                bytes_written = report.bytes_written,
                "preprocessing finished"
            );
            Ok(report)
        }
        Err(error) => Err(Aborted::new(error, report)),
    }
}

/// Every bundle is checked against `params` before it reaches the store.
async fn ingest<R, K, S, W>(
    params: &Parameters,
    transform: Transform,
    input: &mut S,
    output: &mut W,
    count: usize,
) -> Result<(), Error>
where
    R: Ring,
    K: WireRecord,
    S: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    for slot in 0..count {
        let bundle: Bundle<R, K> = Bundle::read_from(input, transform)
            .await
            .map_err(TransportError::recv(Link::Dealer))?;
        bundle.check(params)?;
        let bytes = bundle.to_bytes();
        output
            .write_all(&bytes)
            .await
            .map_err(TransportError::send(Link::Store))?;
        debug!(slot, bytes = bytes.len(), "bundle stored");
    }
    output
        .flush()
        .await
        .map_err(TransportError::send(Link::Store))?;
    Ok(())
}
