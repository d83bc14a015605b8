use std::io;
use std::sync::Arc;

use dispatcher::{Envelope, Registry};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// One ingress line. Missing fields and out-of-range ids decode to values
/// the registry rejects, so they surface as `INVALID_ENVELOPE`.
#[derive(Debug, Deserialize)]
pub struct IngressRequest {
    #[serde(default)]
    pub request_id: i64,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub payload: Option<JsonValue>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct IngressReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<IngressError>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct IngressError {
    pub code: String,
    pub message: String,
}

impl IngressReply {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(IngressError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

impl IngressRequest {
    /// A `null` or missing payload stays absent so the registry rejects it.
    pub fn into_envelope(self) -> Result<Envelope, serde_json::Error> {
        let payload = match self.payload {
            Some(value) => Some(serde_json::to_vec(&value)?),
            None => None,
        };
        Ok(Envelope {
            // Non-positive ids map to 0, which fails validation.
            request_id: u64::try_from(self.request_id).unwrap_or(0),
            destination: self.destination,
            payload,
        })
    }
}

pub async fn handle_line(registry: &Registry, line: &str) -> IngressReply {
    let request: IngressRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => return IngressReply::error("BAD_REQUEST", err.to_string()),
    };
    let envelope = match request.into_envelope() {
        Ok(envelope) => envelope,
        Err(err) => return IngressReply::error("BAD_REQUEST", err.to_string()),
    };

    match registry.submit(envelope).await {
        Ok(()) => IngressReply::ok(),
        Err(err) => IngressReply::error(err.code(), err.to_string()),
    }
}

pub async fn handle_client(stream: TcpStream, registry: Arc<Registry>) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_line(&registry, &line).await;
        let mut encoded = serde_json::to_vec(&reply).map_err(io::Error::other)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
    }

    writer.shutdown().await
}

pub async fn serve_ingress(listener: TcpListener, registry: Arc<Registry>) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let registry = registry.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, registry).await {
                log::warn!("ingress: client {} dropped: {}", peer, err);
            }
        });
    }
}
