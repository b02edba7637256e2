//! Library crate for ipinfo-scan: IP metadata lookup plus a bounded-concurrency
//! TCP connect scanner with service classification and banner capture.
pub mod address;
pub mod config;
pub mod console;
pub mod error;
pub mod ipinfo;
pub mod ports;
pub mod resolver;
pub mod scanlog;
pub mod scanner;
pub mod services;
pub mod session;
pub mod types;

pub use error::{Result, ScanError};
