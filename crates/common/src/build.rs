//! Build metadata, exposed the way the rest of the workspace expects to read it.

/// Crate version as declared in `Cargo.toml`, shared by the CLI `--version`
/// output and the `INFO` opcode's config echo.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
