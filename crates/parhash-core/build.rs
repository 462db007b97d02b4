/// Builds the gRPC client and server code for `parhash.proto` and
/// `hashsvc.proto` using `tonic-prost-build`.
///
/// Both files are compiled in one pass so that a single file descriptor set
/// (`parhash_descriptor.bin`) covers the inbound and the outbound service. The
/// reflection service registers that descriptor set.
///
/// # Byte Field Optimization
///
/// Every `bytes` field is mapped to [`bytes::Bytes`] instead of `Vec<u8>`.
/// Buffers travel from the inbound request to the backend request and hashes
/// travel from the backend response to the inbound response; with `Bytes`
/// those hand-offs are reference-counted clones rather than copies.
///
/// # Panics
///
/// This function will `panic!` if code generation fails.
///
/// # Output
///
/// ```rust,ignore
/// pub mod parhash {
///     tonic::include_proto!("parhash");
/// }
/// pub mod hashsvc {
///     tonic::include_proto!("hashsvc");
/// }
/// ```
use std::env;
use std::path::PathBuf;
fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let descriptor_path = out_dir.join("parhash_descriptor.bin");

    let mut config = tonic_prost_build::Config::new();

    config
        .bytes(["."])
        .file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure()
        .compile_with_config(
            config,
            &["proto/parhash.proto", "proto/hashsvc.proto"],
            &["proto"],
        )
        .unwrap();
}
