//! CLI surface (spec.md §6), grounded on the teacher's `server/src/config.rs`
//! `CliArgs` — scoped down because `cortex_common::config_env::EnvConfig`
//! already owns the environment-variable layer independently; this struct
//! only covers what a human actually types at a shell prompt.

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cortex-server", about = "Self-hosted OpenAI-compatible inference gateway")]
pub struct CliArgs {
    /// Port the HTTP listener binds.
    #[arg(long, short, default_value_t = 8080, env = "CORTEX_PORT")]
    pub port: u16,

    /// Path to the embedded registry store (sled). Created if missing.
    #[arg(long, default_value = "./data/cortex-db", env = "CORTEX_DB_PATH")]
    pub db_path: PathBuf,

    /// Log level passed to `tracing_subscriber`'s default filter when
    /// `RUST_LOG` isn't set.
    #[arg(long, default_value = "cortex_server=info,cortex_gateway=info,tower_http=info", env = "CORTEX_LOG_FILTER")]
    pub log_filter: String,

    /// Number of usage-writer background workers (spec.md §4.7).
    #[arg(long, default_value_t = 2, env = "CORTEX_USAGE_WORKERS")]
    pub usage_workers: usize,

    /// In-process usage queue capacity before oldest entries are dropped.
    #[arg(long, default_value_t = 4096, env = "CORTEX_USAGE_QUEUE_CAPACITY")]
    pub usage_queue_capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_8080() {
        let args = CliArgs::parse_from(["cortex-server"]);
        assert_eq!(args.port, 8080);
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let args = CliArgs::parse_from(["cortex-server", "--port", "9090", "--usage-workers", "4"]);
        assert_eq!(args.port, 9090);
        assert_eq!(args.usage_workers, 4);
    }
}
