pub mod codec;
pub mod config;
pub mod connection;
pub mod ingress;
pub mod tunnel;
