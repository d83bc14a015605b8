use std::io;
use std::sync::Arc;
use std::time::Duration;

use dispatcher::{Envelope, GatewayId};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::codec::{read_frame, write_frame, TunnelFrame};
use crate::connection::{ConnectionManager, Tunnel};

/// Tunnel over any framed byte stream.
pub struct FramedTunnel<W> {
    writer: W,
}

impl<W> FramedTunnel<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W> Tunnel for FramedTunnel<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, envelope: &Envelope) -> io::Result<()> {
        write_frame(&mut self.writer, &TunnelFrame::Request(envelope.clone())).await
    }
}

/// Reads the hello frame that opens every tunnel.
pub async fn read_hello<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<GatewayId> {
    match read_frame(reader).await? {
        TunnelFrame::Hello { gateway_id } => GatewayId::new(gateway_id)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected hello frame, got {:?}", other),
        )),
    }
}

/// Serves one gateway connection until its socket closes. A peer that has
/// not sent its hello within `hello_timeout` is dropped unregistered.
pub async fn handle_gateway(
    stream: TcpStream,
    manager: Arc<ConnectionManager>,
    hello_timeout: Duration,
) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let (mut reader, writer) = stream.into_split();

    let gateway = tokio::time::timeout(hello_timeout, read_hello(&mut reader))
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no hello within {:?}", hello_timeout),
            )
        })??;
    let epoch = manager
        .connect(gateway.clone(), FramedTunnel::new(writer))
        .await;
    log::info!("tunnel: gateway {} attached from {}", gateway, peer);

    let closed = loop {
        match read_frame::<_, TunnelFrame>(&mut reader).await {
            Ok(TunnelFrame::Keepalive) => continue,
            Ok(frame) => log::debug!("tunnel: gateway {} sent unexpected frame {:?}", gateway, frame),
            Err(err) => break err,
        }
    };

    if closed.kind() != io::ErrorKind::UnexpectedEof {
        log::warn!("tunnel: gateway {} read failed: {}", gateway, closed);
    }
    manager.disconnect_if_current(gateway.as_str(), epoch).await;
    Ok(())
}

pub async fn serve_tunnels(
    listener: TcpListener,
    manager: Arc<ConnectionManager>,
    hello_timeout: Duration,
) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_gateway(stream, manager, hello_timeout).await {
                log::warn!("tunnel: connection from {} dropped: {}", peer, err);
            }
        });
    }
}
