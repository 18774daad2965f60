//! Build metadata embedded by `build.rs`, reported by `Ping` and `--version`.

/// Short git commit hash at build time, or `unknown` outside a checkout.
pub const GIT_HASH: &str = env!("ISCSI_COMMAND_GIT_HASH");

/// Build timestamp as seconds since the Unix epoch.
pub const BUILD_TIMESTAMP: &str = env!("ISCSI_COMMAND_BUILD_TIMESTAMP");

/// Cargo profile the binary was built with.
pub const BUILD_PROFILE: &str = env!("ISCSI_COMMAND_BUILD_PROFILE");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `"0.1.0 (abc1234, release)"`
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("ISCSI_COMMAND_GIT_HASH"),
    ", ",
    env!("ISCSI_COMMAND_BUILD_PROFILE"),
    ")"
);

pub fn version_string() -> String {
    LONG_VERSION.to_string()
}
