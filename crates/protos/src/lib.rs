//! Generated bindings for the `.proto` contracts this gateway speaks:
//! Envoy's external-processing service, a minimal subset of Envoy's xDS
//! cluster/listener configuration model, the Envoy Gateway extension-server
//! service, and the standard gRPC health-check service.

pub mod envoy {
	pub mod config {
		pub mod core {
			pub mod v3 {
				include!(concat!(env!("OUT_DIR"), "/envoy.config.core.v3.rs"));
			}
		}
		pub mod endpoint {
			pub mod v3 {
				include!(concat!(env!("OUT_DIR"), "/envoy.config.endpoint.v3.rs"));
			}
		}
		pub mod cluster {
			pub mod v3 {
				include!(concat!(env!("OUT_DIR"), "/envoy.config.cluster.v3.rs"));
			}
		}
		pub mod listener {
			pub mod v3 {
				include!(concat!(env!("OUT_DIR"), "/envoy.config.listener.v3.rs"));
			}
		}
	}
	pub mod service {
		pub mod ext_proc {
			pub mod v3 {
				include!(concat!(
					env!("OUT_DIR"),
					"/envoy.service.ext_proc.v3.rs"
				));
			}
		}
	}
}

pub mod envoygateway {
	pub mod extension {
		pub mod v1alpha1 {
			include!(concat!(
				env!("OUT_DIR"),
				"/envoygateway.extension.v1alpha1.rs"
			));
		}
	}
}

pub mod grpc {
	pub mod health {
		pub mod v1 {
			include!(concat!(env!("OUT_DIR"), "/grpc.health.v1.rs"));
		}
	}
}
