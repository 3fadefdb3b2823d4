//! Append-only file of bundles written during preprocessing and consumed,
//! in order, by the online phase.

use std::io;
use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, BufWriter};

use crate::bundle::Bundle;
use crate::transport::{Link, TransportError};
use crate::wire::WireRecord;
use crate::{Ring, Transform};

/// Create a store for writing. Fails with `AlreadyExists` if the file exists
/// and `overwrite` is not set.
pub async fn create_store(path: impl AsRef<Path>, overwrite: bool) -> io::Result<BufWriter<File>> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    Ok(BufWriter::new(options.open(path).await?))
}

/// Open a store for reading.
pub async fn open_store(path: impl AsRef<Path>) -> io::Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path).await?))
}

/// Read the next bundle from a store, or from the dealer's stream when
/// bundles are consumed live. Returns `None` on a clean end of stream at a
/// record boundary; end of stream inside a record is an error on `link`.
pub async fn read_bundle<T, R, K>(
    reader: &mut T,
    transform: Transform,
    link: Link,
) -> Result<Option<Bundle<R, K>>, TransportError>
where
    T: AsyncBufRead + Unpin + Send,
    R: Ring,
    K: WireRecord,
{
    let at_end = reader
        .fill_buf()
        .await
        .map_err(TransportError::recv(link))?
        .is_empty();
    if at_end {
        return Ok(None);
    }
    Bundle::read_from(reader, transform)
        .await
        .map(Some)
        .map_err(TransportError::recv(link))
}
