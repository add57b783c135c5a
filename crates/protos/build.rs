use std::path::PathBuf;

/// Compiles the vendored `.proto` sources with `protox` (a pure-Rust
/// protobuf compiler, avoiding a system `protoc` dependency) and feeds the
/// resulting descriptor set to `tonic-prost-build`'s service generator.
fn main() -> anyhow::Result<()> {
	let proto_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("proto");
	let protos = [
		"envoy/config/core/v3/base.proto",
		"envoy/config/endpoint/v3/endpoint.proto",
		"envoy/config/cluster/v3/cluster.proto",
		"envoy/config/listener/v3/listener.proto",
		"envoy/service/ext_proc/v3/external_processor.proto",
		"envoygateway/extension/v1alpha1/extension.proto",
		"grpc/health/v1/health.proto",
	]
	.map(|p| proto_root.join(p));

	let file_descriptor_set = protox::compile(&protos, [&proto_root])?;

	let mut config = prost_build::Config::new();
	config.bytes(["."]);
	config.extern_path(".google.protobuf.Struct", "::prost_wkt_types::Struct");
	config.extern_path(".google.protobuf.Duration", "::prost_wkt_types::Duration");
	config.service_generator(tonic_prost_build::configure().service_generator());

	config.compile_fds(file_descriptor_set)?;

	Ok(())
}
