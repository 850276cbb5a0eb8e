//! PressDB code generation - generates Rust types from a content manifest
//! at compile time.
//!
//! The main entry point is [`generate_from_manifest`], which reads a
//! content.yaml manifest and writes a complete Rust source file with typed
//! record structs plus a collections-index function. Generated code expects
//! `serde`, `serde_json` and `chrono` in the consuming crate.

mod generator;
mod index_gen;
mod struct_gen;
pub mod type_utils;

use std::path::Path;

/// Generate Rust types from a content.yaml manifest file.
///
/// Reads the manifest at `manifest_path`, generates typed Rust code, and
/// writes the output to `output_path`. This is intended to be called from a
/// `build.rs` build script.
///
/// # Example
///
/// ```no_run
/// // In build.rs:
/// pressdb_codegen::generate_from_manifest("content.yaml", "src/generated.rs").unwrap();
/// ```
pub fn generate_from_manifest(
    manifest_path: &str,
    output_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = pressdb::schema::parse_manifest(Path::new(manifest_path))?;
    let collections = pressdb::schema::resolve_collections(&manifest)?;
    let tokens = generator::generate_all(&collections);
    let formatted = generator::format_token_stream(&tokens);
    std::fs::write(output_path, formatted)?;
    Ok(())
}

/// Generate Rust types from a manifest YAML string.
///
/// Like [`generate_from_manifest`] but takes the manifest content directly
/// instead of reading from a file. Useful for testing.
pub fn generate_from_manifest_str(
    manifest_yaml: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let manifest = pressdb::schema::parse_manifest_str(manifest_yaml, Path::new("."))?;
    let collections = pressdb::schema::resolve_collections(&manifest)?;
    let tokens = generator::generate_all(&collections);
    let formatted = generator::format_token_stream(&tokens);
    Ok(formatted)
}
