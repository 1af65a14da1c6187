use tracing::info;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

use super::config::NodeConfig;

#[cfg(debug_assertions)]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::DEBUG;

#[cfg(not(debug_assertions))]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::INFO;

/// Installs the global subscriber. The configured level applies to our own crates, everything
/// else follows `RUST_LOG` and defaults to warnings.
pub fn init_logger(config: &NodeConfig) -> anyhow::Result<()> {
	let mut filter = EnvFilter::builder()
		.with_default_directive(LevelFilter::WARN.into())
		.from_env_lossy();

	for directive in [
		format!("hv_core={}", config.log_level),
		format!("hv_process={}", config.log_level),
		format!("hv_dht={}", config.log_level),
		format!("hv_p2p={}", config.log_level),
	] {
		filter = filter.add_directive(directive.parse()?);
	}

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_filter(CONSOLE_LOG_FILTER))
		.try_init()?;

	info!(data_dir = ?config.data_dir, "Logger initialized");

	Ok(())
}
