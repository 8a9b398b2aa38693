//! # config 模块说明
//!
//! ## 角色定位（Why）
//! - 让运维以一份 TOML 文件给出 TLS 材料、引擎限额与监听列表，避免把部署参数硬编码在装配链里；
//! - 解析与校验集中在这里完成，装配器本身仍然只接收已经归一好的 [`TransportOptions`]
//!   与 [`ListenRequest`]。
//!
//! ## 文件格式（What）
//! ```toml
//! [tls]
//! key_file = "key.pem"
//! cert_file = "cert.pem"
//!
//! [engine]
//! idle_timeout_ms = 30000
//!
//! [[listen]]
//! port = 4433
//!
//! [[listen]]
//! host = "127.0.0.1"
//! port = 8443
//! options = 1
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::{ListenRequest, TransportOptions};

/// 配置加载或校验失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// 引擎限额。
///
/// 默认值面向单机部署：30 秒空闲超时、每连接 100 条并发请求流、1 MiB 请求体上限。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineLimits {
    /// 连接空闲超时（毫秒）。
    pub idle_timeout_ms: u64,
    /// 单连接允许的并发双向流数量。
    pub max_concurrent_streams: u32,
    /// 单个请求体的最大字节数，超出返回 413。
    pub max_body_bytes: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 30_000,
            max_concurrent_streams: 100,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl EngineLimits {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// 校验限额是否处于可用范围。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.idle_timeout_ms must be non-zero".into(),
            ));
        }
        if self.max_concurrent_streams == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_concurrent_streams must be non-zero".into(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_body_bytes must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// 完整的应用配置：`[tls]`、`[engine]` 与若干 `[[listen]]`。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub tls: TransportOptions,
    pub engine: EngineLimits,
    pub listen: Vec<ListenRequest>,
}

impl AppConfig {
    /// 从 TOML 文本解析，不做语义校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// 读取并解析文件，随后执行 [`AppConfig::validate`]。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// 语义校验。
    ///
    /// - 引擎限额均为非零；
    /// - 至少一个监听项；
    /// - 归一后的 `(主机, 端口)` 不得重复（端口 0 表示临时端口，可重复）。
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.listen.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[listen]] entry is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for request in self.listen.iter().filter(|request| request.port != 0) {
            if !seen.insert((request.bind_host(), request.port)) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate listener {}:{}",
                    request.bind_host().unwrap_or("*"),
                    request.port
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ListenOptions;

    const SAMPLE: &str = r#"
        [tls]
        key_file = "key.pem"
        cert_file = "cert.pem"
        passphrase = "pw"

        [engine]
        idle_timeout_ms = 5000

        [[listen]]
        port = 4433

        [[listen]]
        host = "127.0.0.1"
        port = 8443
        options = 1
    "#;

    #[test]
    fn parses_full_document() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.tls.key_file.as_deref(), Some("key.pem"));
        assert_eq!(config.tls.passphrase.as_deref(), Some("pw"));
        assert_eq!(config.engine.idle_timeout(), Duration::from_secs(5));
        assert_eq!(config.engine.max_concurrent_streams, 100);
        assert_eq!(config.listen.len(), 2);
        assert_eq!(config.listen[0], ListenRequest::new(4433));
        assert_eq!(
            config.listen[1],
            ListenRequest::new(8443)
                .with_host("127.0.0.1")
                .with_options(ListenOptions::EXCLUSIVE_PORT)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = AppConfig::from_toml_str("[tls]\nkey = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn requires_a_listener() {
        let config = AppConfig::from_toml_str("[tls]\nkey_file = \"k\"").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_host_collides_with_missing_host() {
        let text = r#"
            [[listen]]
            port = 80
            [[listen]]
            host = ""
            port = 80
        "#;
        let config = AppConfig::from_toml_str(text).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate listener *:80"));
    }

    #[test]
    fn ephemeral_ports_may_repeat() {
        let text = "[[listen]]\nport = 0\n[[listen]]\nport = 0\n";
        assert!(AppConfig::from_toml_str(text).unwrap().validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut limits = EngineLimits::default();
        assert!(limits.validate().is_ok());
        limits.max_body_bytes = 0;
        assert!(limits.validate().is_err());
        limits = EngineLimits {
            idle_timeout_ms: 0,
            ..EngineLimits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = AppConfig::from_file("/nonexistent/spark-h3.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn from_file_validates_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h3.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.listen.len(), 2);

        std::fs::write(&path, "[engine]\nmax_body_bytes = 0\n[[listen]]\nport = 1\n").unwrap();
        assert!(AppConfig::from_file(&path).is_err());
    }
}
