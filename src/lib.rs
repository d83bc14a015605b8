pub mod config;
pub mod envelope;
pub mod error;
pub mod mailbox;
pub mod registry;

pub use crate::config::RegistryConfig;
pub use crate::envelope::{Envelope, GatewayId};
pub use crate::error::{DispatchError, ErrorKind, InvalidEnvelope};
pub use crate::mailbox::Mailbox;
pub use crate::registry::{OpenedMailbox, Registry};
