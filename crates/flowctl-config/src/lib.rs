#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls
)]
#![warn(missing_docs, unreachable_pub)]

//! Configuration resolution for the flowctl CLI.
//!
//! Layout: `defaults.rs` (key names and default endpoints), `model.rs`
//! (resolved settings and overrides), `loader.rs` (`.env` + environment
//! lookup), `error.rs` (`ConfigError`).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_dotenv};
pub use model::{ConfigOverrides, ServiceEndpoints, Settings};
