//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::Path;

use iscsi_command_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .socket_path(dir.path().join("iscsi.sock"))
///     .iscsi_ls_path("/opt/bin/iscsi-ls")
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    /// Defaults plus a placeholder socket path, so the result validates.
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.socket_path = "/tmp/iscsi-command-test.sock".to_string();
        Self { config }
    }

    pub fn socket_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.socket_path = path.as_ref().display().to_string();
        self
    }

    pub fn socket_mode(mut self, mode: u32) -> Self {
        self.config.socket_mode = mode;
        self
    }

    pub fn port(mut self, port: &str) -> Self {
        self.config.port = port.to_string();
        self
    }

    pub fn iscsi_ls_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.iscsi_ls_path = path.as_ref().display().to_string();
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.log_level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
