use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the process-wide subscriber: JSON-formatted, filtered by
/// `extProcLogLevel` (falling back to `RUST_LOG`, then `info`). Call once,
/// from the app binary's `main`.
pub fn init(ext_proc_log_level: Option<&str>) {
	let default_directive = ext_proc_log_level.unwrap_or("info");
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().json())
		.init();
}
