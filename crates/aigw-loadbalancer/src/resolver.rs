use std::net::IpAddr;

use hickory_resolver::TokioResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;

/// The DNS lookup seam. Production wraps a real `TokioResolver`; tests
/// substitute a fixed table rather than hitting the network.
pub(crate) enum Dns {
	Real(TokioResolver),
	#[cfg(test)]
	Fixed(std::collections::HashMap<String, Vec<IpAddr>>),
}

impl Dns {
	pub(crate) fn system() -> anyhow::Result<Self> {
		let (config, opts) = hickory_resolver::system_conf::read_system_conf()?;
		Ok(Self::with_config(config, opts))
	}

	pub(crate) fn with_server(server: std::net::SocketAddr) -> Self {
		let group = hickory_resolver::config::NameServerConfigGroup::from_ips_clear(
			&[server.ip()],
			server.port(),
			true,
		);
		let config = ResolverConfig::from_parts(None, vec![], group);
		Self::with_config(config, ResolverOpts::default())
	}

	fn with_config(config: ResolverConfig, opts: ResolverOpts) -> Self {
		let mut builder =
			hickory_resolver::Resolver::builder_with_config(config, TokioConnectionProvider::default());
		*builder.options_mut() = opts;
		Self::Real(builder.build())
	}

	pub(crate) async fn lookup(&self, hostname: &str) -> anyhow::Result<Vec<IpAddr>> {
		match self {
			Dns::Real(resolver) => {
				let lookup = resolver.lookup_ip(hostname).await?;
				Ok(lookup.iter().collect())
			},
			#[cfg(test)]
			Dns::Fixed(table) => Ok(table.get(hostname).cloned().unwrap_or_default()),
		}
	}
}
