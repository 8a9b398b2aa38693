#![deny(unsafe_code)]
#![doc = r#"
# spark-h3

## 设计动机（Why）
- **链式装配**：以“按值消费、按值返回”的方式组织路由注册与端口监听，
  让 `H3App::new(..).get(..).listen(..).run()` 这样的长链在没有引用计数的前提下保持安全。
- **独占所有权**：每个 [`H3App`] 至多持有一个协议引擎实例，所有权只会转移、不会复制；
  被转移后的装配器进入“停用”状态，后续调用全部退化为无副作用的空操作。
- **失败即降级**：引擎创建失败不会向调用方抛错，而是让装配器停用；监听失败只通过回调中的
  `None` 表达，链式调用无需逐步检查错误。

## 核心契约（What）
- [`H3App`]：装配器本体，暴露 `get/post/.../any`、四种 `listen` 形态与 `run`。
- [`ProtocolEngine`] / [`EventLoop`]：外部协议引擎与进程级事件循环的接缝 trait。
- [`TransportOptions`]、[`ListenOptions`]、[`ListenRequest`]：构造与监听参数。
- [`AppConfig`]：TOML 配置入口，可一次性给出 TLS 材料、引擎限额与监听列表。

## 风险与注意（Trade-offs）
- `ListenOptions` 目前只在签名层面保留，不会传递给引擎；详见 [`ListenOptions`] 文档。
- `run` 会阻塞调用线程，必须放在所有注册与监听之后调用。
"#]

pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod method;
pub mod options;

pub use app::H3App;
pub use config::{AppConfig, ConfigError, EngineLimits};
pub use engine::{EventLoop, Handler, ProtocolEngine};
pub use error::EngineError;
pub use method::Method;
pub use options::{ListenOptions, ListenRequest, TransportOptions};
