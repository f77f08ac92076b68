//! Utilities shared across the source drivers.

pub mod tls;

pub use tls::SslMode;
