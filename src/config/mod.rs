//! Declarative configuration (ambient stack): load once from TOML, cache
//! behind an `ArcSwap`, and let the admin API push incremental updates back
//! to both the cache and the file.

pub mod schema;
pub mod store;

pub use schema::{parse_bitrate, AppConfig, ApiConfig, LogConfig, RtspConfig, StreamSource};
pub use store::{ConfigChange, ConfigStore};
