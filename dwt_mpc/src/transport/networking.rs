use std::{io, net::SocketAddr, time::Duration};

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, warn};

use crate::Party;

/// Delay in milliseconds after which connection to a listener is retried.
const CONNECTION_RETRY_DELAY: u64 = 1000;

/// Handshake magic exchanged on every new connection.
const MAGIC: u32 = 0xDEADBEEF;

/// Accept both peers on the dealer's listener. Returns the streams indexed
/// by the party id each peer announced.
pub async fn accept_peers(listener: &TcpListener) -> io::Result<[TcpStream; 2]> {
    let mut pending = FuturesUnordered::new();
    let mut connected: [Option<TcpStream>; 2] = [None, None];

    loop {
        tokio::select! {
            tmp = listener.accept() => {
                let (socket, addr) = tmp?;
                debug!(%addr, "incoming connection");
                pending.push(accept_handshake(socket));
            },
            tmp = pending.next(), if !pending.is_empty() => {
                match tmp {
                    Some(Ok((socket, party))) if connected[party.id()].is_none() => {
                        connected[party.id()] = Some(socket);
                        if let [Some(_), Some(_)] = &connected {
                            break;
                        }
                    }
                    Some(Ok((_, party))) => warn!(%party, "duplicate connection ignored"),
                    Some(Err(err)) => warn!(%err, "handshake failed"),
                    None => {}
                }
            },
        }
    }

    match connected {
        [Some(first), Some(second)] => Ok([first, second]),
        _ => Err(io::Error::new(io::ErrorKind::Other, "Peers missing")),
    }
}

/// Bind `addr` and accept both peers.
pub async fn listen_for_peers(addr: SocketAddr) -> io::Result<[TcpStream; 2]> {
    let listener = TcpListener::bind(addr).await?;
    accept_peers(&listener).await
}

/// Wait on `listener` for the counter-peer of `party`.
pub async fn accept_counter_peer(listener: &TcpListener, party: Party) -> io::Result<TcpStream> {
    loop {
        let (socket, addr) = listener.accept().await?;
        match accept_handshake(socket).await {
            Ok((socket, remote)) if remote == party.other() => return Ok(socket),
            Ok((_, remote)) => warn!(%addr, %remote, "unexpected party rejected"),
            Err(err) => warn!(%addr, %err, "handshake failed"),
        }
    }
}

/// Connect to a listener (dealer or counter-peer), retrying until it is up,
/// and announce `party`.
pub async fn connect_as(addr: SocketAddr, party: Party) -> io::Result<TcpStream> {
    let mut socket = loop {
        match TcpStream::connect(addr).await {
            Ok(socket) => break socket,
            _ => tokio::time::sleep(Duration::from_millis(CONNECTION_RETRY_DELAY)).await,
        }
    };

    socket.write_u32(MAGIC).await?;
    socket.write_u32(party.id() as u32).await?;
    socket.flush().await?;

    if socket.read_u32().await? != MAGIC {
        return Err(io::Error::new(io::ErrorKind::Other, "Invalid magic"));
    }
    debug!(%addr, %party, "connected");

    Ok(socket)
}

/// Process incoming connection from a peer.
async fn accept_handshake(mut socket: TcpStream) -> io::Result<(TcpStream, Party)> {
    if socket.read_u32().await? != MAGIC {
        return Err(io::Error::new(io::ErrorKind::Other, "Invalid magic"));
    }

    let party = Party::from_id(socket.read_u32().await? as usize)
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Invalid party ID"))?;

    socket.write_u32(MAGIC).await?;
    socket.flush().await?;

    Ok((socket, party))
}
