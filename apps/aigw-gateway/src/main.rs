//! Process entry point: parses configuration, wires every collaborator
//! crate together, and runs the two gRPC servers (external processing and
//! the Envoy Gateway extension) until a shutdown signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;

use aigw_config::FilterConfig;
use aigw_core::Snapshot;
use aigw_credential::CredentialCache;
use aigw_extproc::{ExternalProcessorServer, Gateway};
use aigw_loadbalancer::DynamicLoadBalancer;
use aigw_protos::grpc::health::v1::health_server::HealthServer;
use aigw_telemetry::init_otlp_tracer;
use aigw_xds::{EnvoyGatewayExtensionServer, HealthService, XdsExtension};
use anyhow::Context;
use clap::Parser;

/// AI protocol gateway: Envoy external processor + Envoy Gateway extension
/// server that translates OpenAI-style requests across provider schemas.
#[derive(Debug, Parser)]
#[command(name = "aigw-gateway", version)]
struct Args {
	/// Path to the YAML `FilterConfig` this process serves.
	#[arg(long)]
	config: std::path::PathBuf,

	/// Bind address for the `ExternalProcessor` gRPC service.
	#[arg(long, default_value = "0.0.0.0:9002")]
	ext_proc_addr: SocketAddr,

	/// Bind address for the `EnvoyGatewayExtension`/health gRPC services.
	#[arg(long, default_value = "0.0.0.0:1063")]
	extension_server_port: SocketAddr,

	/// DNS server used for `DynamicLoadBalancer` resolution, overriding the
	/// system resolver's first nameserver.
	#[arg(long)]
	dns_server: Option<SocketAddr>,

	/// Hard cap, in bytes, on buffered request/response bodies before a
	/// stream is terminated with HTTP 413.
	#[arg(long)]
	body_buffer_limit: Option<usize>,

	/// `tracing-subscriber` `EnvFilter` default directive, overridden by
	/// `RUST_LOG` when set.
	#[arg(long, default_value = "info")]
	ext_proc_log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	init_logging(&args.ext_proc_log_level);

	let mut config = load_config(&args.config).await?;
	if let Some(limit) = args.body_buffer_limit {
		config.body_buffer_limit = limit;
	}
	let service_name = config.service_name.to_string();
	let config = Arc::new(Snapshot::new(config));

	let tracer = Arc::new(init_otlp_tracer(&service_name).context("failed to initialize OTLP tracer")?);

	let mut registry = prometheus_client::registry::Registry::default();
	let metrics = Arc::new(aigw_telemetry::init_metrics(&mut registry, &tokio::runtime::Handle::current()));

	let (credentials, refresh_requests) = CredentialCache::new();
	tokio::spawn(aigw_credential::run_refresh_loop(credentials.clone(), refresh_requests, |_reference| {
		// Populating and wiring per-credential token sources (Azure/GCP
		// service-account lookup) is the secret-management collaborator's
		// job; this process only drains the queue so it never backs up.
		None
	}));

	let backends: Vec<_> = config.load().backends.values().cloned().collect();
	let loadbalancer = Arc::new(match args.dns_server {
		Some(server) => DynamicLoadBalancer::from_dns_server(server, backends).await,
		None => DynamicLoadBalancer::from_system_resolver(backends)
			.await
			.context("failed to initialize DNS resolver")?,
	});
	spawn_dns_refresh(loadbalancer.clone());

	let gateway = Gateway::new(config.clone(), credentials, loadbalancer, tracer.clone(), metrics);
	let xds_extension = XdsExtension::new(config);

	let ext_proc_addr = args.ext_proc_addr;
	let extension_addr = args.extension_server_port;
	tracing::info!(%ext_proc_addr, %extension_addr, "starting aigw-gateway");

	let ext_proc_server = tonic::transport::Server::builder()
		.add_service(ExternalProcessorServer::new(gateway))
		.add_service(HealthServer::new(HealthService))
		.serve_with_shutdown(ext_proc_addr, shutdown_signal());

	let extension_server = tonic::transport::Server::builder()
		.add_service(EnvoyGatewayExtensionServer::new(xds_extension))
		.add_service(HealthServer::new(HealthService))
		.serve_with_shutdown(extension_addr, shutdown_signal());

	let (ext_proc_result, extension_result) = tokio::join!(ext_proc_server, extension_server);
	ext_proc_result.context("external processor server failed")?;
	extension_result.context("extension server failed")?;

	tracer.shutdown();
	Ok(())
}

fn init_logging(default_directive: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
	tracing_subscriber::fmt().json().with_env_filter(filter).init();
}

async fn load_config(path: &std::path::Path) -> anyhow::Result<FilterConfig> {
	let raw = fs_err::tokio::read_to_string(path).await.context("failed to read config file")?;
	FilterConfig::from_yaml(&raw).context("config file failed validation")
}

/// Re-resolves every dynamic backend's hostnames every 30 seconds. Runs for
/// the process lifetime; the request path only ever reads the most recent
/// snapshot `refresh` installs.
fn spawn_dns_refresh(loadbalancer: Arc<DynamicLoadBalancer>) {
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
		interval.tick().await;
		loop {
			interval.tick().await;
			loadbalancer.refresh().await;
		}
	});
}

async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
	};
	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler")
			.recv()
			.await;
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
	tracing::info!("shutdown signal received, draining outstanding streams");
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_configuration_options_table() {
		let args = Args::parse_from(["aigw-gateway", "--config", "config.yaml"]);
		assert_eq!(args.extension_server_port, "0.0.0.0:1063".parse().unwrap());
		assert_eq!(args.ext_proc_log_level, "info");
		assert!(args.dns_server.is_none());
		assert!(args.body_buffer_limit.is_none());
	}

	#[test]
	fn explicit_flags_override_defaults() {
		let args = Args::parse_from([
			"aigw-gateway",
			"--config",
			"config.yaml",
			"--dns-server",
			"10.0.0.53:53",
			"--body-buffer-limit",
			"1048576",
		]);
		assert_eq!(args.dns_server, Some("10.0.0.53:53".parse().unwrap()));
		assert_eq!(args.body_buffer_limit, Some(1_048_576));
	}
}
