//! Compiles the agent protobuf definitions with tonic-build.

use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=../../proto/agent.proto");

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("agent_descriptor.bin"))
        .compile_protos(&["../../proto/agent.proto"], &["../../proto"])?;

    Ok(())
}
