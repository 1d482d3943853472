//! Build script for compiling the Envoy access log service protobuf definitions.

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tell cargo to rerun this build script if proto files change
    println!("cargo:rerun-if-changed=proto/");

    let proto_files = &[
        "proto/envoy/api/v2/core/base.proto",
        "proto/envoy/data/accesslog/v2/accesslog.proto",
        "proto/envoy/service/accesslog/v2/als.proto",
    ];

    let proto_include_dirs = &["proto"];

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    // Descriptor set backs the gRPC reflection service
    let descriptor_path = out_dir.join("accesslog_descriptor.bin");

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .emit_rerun_if_changed(false)
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(proto_files, proto_include_dirs)?;

    Ok(())
}
