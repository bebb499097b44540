//! # Strom
//! MCP client and server SDK for Rust
//!
//! ## Dependencies
//! ```toml
//! [dependencies]
//! strom = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use strom::App;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut app = App::new();
//!
//!     app.map_tool("hello", |args: strom::types::Json<serde_json::Value>| async move {
//!         format!("Hello, {}!", args.0)
//!     });
//!
//!     app.run().await;
//! }
//! ```

pub use app::{App, Context, options};
pub use client::Client;
pub use tasks::TaskSession;

pub mod app;
pub mod client;
pub mod error;
pub mod session;
pub mod tasks;
pub mod transport;
pub mod types;

pub(crate) mod commands;
pub(crate) mod shared;

pub(crate) const SDK_NAME: &str = "strom";

/// Protocol revisions this SDK can negotiate, oldest first.
pub(crate) const PROTOCOL_VERSIONS: [&str; 3] = [
    "2024-11-05",
    "2025-03-26",
    "2025-06-18",
];

/// The most recent protocol revision the SDK speaks.
#[inline]
pub(crate) fn latest_protocol_version() -> &'static str {
    PROTOCOL_VERSIONS[PROTOCOL_VERSIONS.len() - 1]
}
