//! 日志订阅器安装。
//!
//! 使用 `tracing-subscriber` 的 `fmt` 层与 `EnvFilter`：`RUST_LOG` 未设置或不合法时退回 `info`。

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 安装全局订阅器。
///
/// 返回 `false` 表示进程内已有全局订阅器（例如测试框架已安装），此时保持原样。
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
