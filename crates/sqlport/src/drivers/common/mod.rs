//! Helpers shared by the source drivers.

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
