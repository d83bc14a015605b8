use core::borrow::Borrow;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EmptyGatewayId, InvalidEnvelope};

/// Identifier of one edge gateway. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GatewayId(String);

impl GatewayId {
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyGatewayId> {
        let id = id.into();
        if id.is_empty() {
            return Err(EmptyGatewayId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for GatewayId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for GatewayId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GatewayId {
    type Error = EmptyGatewayId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for GatewayId {
    type Error = EmptyGatewayId;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GatewayId> for String {
    fn from(id: GatewayId) -> Self {
        id.0
    }
}

//***************************************************************************//

/// A request bound for one gateway. The payload is carried as opaque bytes.
///
/// Fields are left public and unchecked so that envelopes arriving from
/// ingress can be represented as received; [`Envelope::validate`] is the gate
/// every envelope passes before it can enter a mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: u64,
    pub destination: String,
    #[serde(default, with = "serde_bytes")]
    pub payload: Option<Vec<u8>>,
}

impl Envelope {
    pub fn new(request_id: u64, destination: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id,
            destination: destination.into(),
            payload: Some(payload.into()),
        }
    }

    pub fn validate(&self) -> Result<(), InvalidEnvelope> {
        if self.request_id == 0 {
            return Err(InvalidEnvelope::ZeroRequestId);
        }
        if self.destination.is_empty() {
            return Err(InvalidEnvelope::EmptyDestination);
        }
        if self.payload.is_none() {
            return Err(InvalidEnvelope::MissingPayload);
        }
        Ok(())
    }

    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}
