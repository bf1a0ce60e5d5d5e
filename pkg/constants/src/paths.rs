//! Filesystem path constants.

/// Default config file path for `br-keeper`.
pub const DEFAULT_KEEPER_CONFIG: &str = "/etc/br-keeper/config.yaml";
