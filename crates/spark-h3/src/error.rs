//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为协议引擎的创建、TLS 装载与端口绑定提供统一的失败语义；
//! - 装配器本身从不把这些错误交给调用方，而是记录日志后按“停用 / 回调 `None`”降级，
//!   因此错误类型的主要读者是日志与引擎实现者。

use std::io;

use thiserror::Error;

/// 协议引擎在创建或监听阶段可能出现的错误。
///
/// - **契约 (What)**：所有变体满足 `Send + Sync + 'static`，可以在事件循环线程之间传递；
/// - **设计权衡 (Trade-offs)**：使用 `String` 记录上下文，牺牲少量堆分配换取日志可读性。
#[derive(Debug, Error)]
pub enum EngineError {
    /// 证书、私钥或 TLS 配置不可用。
    #[error("tls setup failed: {reason}")]
    Tls { reason: String },

    /// 读取文件或操作套接字时出现 IO 错误。
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// 主机名无法解析为任何套接字地址。
    #[error("cannot resolve listen address `{host}:{port}`")]
    AddrResolve { host: String, port: u16 },

    /// 套接字绑定失败。
    #[error("bind to {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 事件循环不可用（例如运行时未能启动）。
    #[error("event loop unavailable: {reason}")]
    Runtime { reason: String },

    /// 引擎配置不合法。
    #[error("invalid engine configuration: {reason}")]
    Config { reason: String },
}

impl EngineError {
    pub fn tls(reason: impl Into<String>) -> Self {
        Self::Tls {
            reason: reason.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
