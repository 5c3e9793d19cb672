/// TOML configuration with command line overrides.
pub mod load_config;
/// Ctrl-C and SIGTERM handling.
pub mod shutdown;
