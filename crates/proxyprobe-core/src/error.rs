use std::io;

/// Error type for ProxyProbe operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO操作错误
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// 配置错误（非法的延迟阈值或并发数等）
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 代理地址无法被HTTP客户端识别
    #[error("Invalid proxy '{0}'")]
    InvalidProxy(String),
    /// 代理连接错误
    #[error("Proxy connection failed: {0}")]
    ProxyConnection(String),
    /// 超时错误
    #[error("Connection timed out after {0}ms")]
    Timeout(u64),
    /// 请求错误
    #[error("Request failed: {0}")]
    Request(String),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 运行时错误（例如不在tokio运行时中调用）
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type for ProxyProbe operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 创建配置错误
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// 是否为配置错误
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

/// 从reqwest错误转换
///
/// 超时在探测器中单独处理，因为只有调用方知道实际的超时值。
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Error::InvalidProxy(err.to_string())
        } else if err.is_connect() {
            Error::ProxyConnection(err.to_string())
        } else {
            Error::Request(err.to_string())
        }
    }
}

/// 从toml错误转换
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// 从toml序列化错误转换
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_recognised() {
        let err = Error::configuration("concurrency_limit must be greater than 0");
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Configuration error: concurrency_limit must be greater than 0"
        );
        assert!(!Error::Timeout(1500).is_configuration());
    }

    #[test]
    fn timeout_message_carries_milliseconds() {
        assert_eq!(Error::Timeout(1500).to_string(), "Connection timed out after 1500ms");
    }

    #[test]
    fn toml_errors_become_serialization_errors() {
        let err: Error = toml::from_str::<toml::Table>("max_latency_ms = = 3")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
