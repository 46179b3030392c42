//! Worker node configuration

use crate::domain::{AddressMode, MetricsBackend};
use crate::error::{Error, Result};
use crate::host::LookupConfig;
use std::path::PathBuf;

/// Maximum accepted upload body in bytes
pub const DEFAULT_UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

/// Configuration for a worker node
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Port the node listens on and advertises
    pub port: u16,
    /// Base URL of the directory service
    pub directory_url: String,
    pub address_mode: AddressMode,
    pub metrics_backend: MetricsBackend,
    /// Holds uploads and the node's CSV activity logs
    pub data_dir: PathBuf,
    pub upload_limit: usize,
    pub lookup: LookupConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            directory_url: "http://localhost:8080".to_string(),
            address_mode: AddressMode::Tunnel,
            metrics_backend: MetricsBackend::Procfs,
            data_dir: PathBuf::from("serverNodeData"),
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            lookup: LookupConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        let url = self.directory_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Configuration(format!(
                "directory URL must be http(s), got '{}'",
                self.directory_url
            )));
        }
        if self.upload_limit == 0 {
            return Err(Error::Configuration("upload limit must be positive".into()));
        }
        Ok(())
    }

    /// URL of the directory's registration endpoint
    pub fn register_url(&self) -> String {
        format!("{}/register-node", self.directory_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.port, 8081);
        assert_eq!(config.address_mode, AddressMode::Tunnel);
        assert_eq!(config.data_dir, PathBuf::from("serverNodeData"));
        assert_eq!(config.upload_limit, 10 << 20);
        assert_eq!(config.lookup.latency_target, "https://google.com");
    }

    #[test]
    fn test_validate() {
        assert!(WorkerConfig::default().validate().is_ok());

        let mut config = WorkerConfig::default();
        config.directory_url = "localhost:8080".into();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let mut config = WorkerConfig::default();
        config.upload_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_register_url() {
        let mut config = WorkerConfig::default();
        assert_eq!(config.register_url(), "http://localhost:8080/register-node");
        config.directory_url = "https://dir.example.com/".into();
        assert_eq!(config.register_url(), "https://dir.example.com/register-node");
    }
}
