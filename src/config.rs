//! CLI / environment configuration (spec §6).

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "tracker", about = "Real-time competition tracker server")]
pub struct Config {
    /// Shared secret the source must present in its first text frame.
    /// Unauthenticated binary frames are rejected when set.
    #[arg(long, env = "TRACKER_SECRET")]
    pub secret: Option<String>,

    /// Root directory for extracted assets (flags/pictures/styles) and
    /// learning-mode samples.
    #[arg(long, env = "TRACKER_ASSET_ROOT", default_value = "assets")]
    pub asset_root: PathBuf,

    #[arg(long, env = "TRACKER_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    /// When enabled, every inbound textual frame is captured under
    /// `samples/` for later replay/diagnostics.
    #[arg(long, env = "TRACKER_LEARNING_MODE", default_value_t = false)]
    pub learning_mode: bool,

    /// Upstream controller URL for the reverse proxy. Out of core scope
    /// (spec §1); accepted here only so the flag has somewhere to land.
    #[arg(long, env = "TRACKER_SOURCE_PROXY_URL")]
    pub source_proxy_url: Option<String>,

    /// Minimum accepted protocol version on the source channel.
    #[arg(long, env = "TRACKER_MIN_VERSION", default_value = "2.0.0")]
    pub min_version: String,

    /// Timeout between an accepted empty-database sentinel and the
    /// expected follow-up `database_zip` binary frame (spec §4.4, §9).
    #[arg(long, env = "TRACKER_DATABASE_ZIP_TIMEOUT_SECS", default_value_t = 5)]
    pub database_zip_timeout_secs: u64,
}
