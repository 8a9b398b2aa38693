#![deny(unsafe_code)]
#![doc = r#"
# spark-h3-quinn

## 设计动机（Why）
- 为 [`spark_h3::H3App`] 提供一个可直接上线的协议引擎：QUIC 传输由 `quinn` 承担，
  HTTP/3 帧与 QPACK 由 `h3` 承担，TLS 1.3 由 `rustls`（ring 后端）承担。
- 事件循环是进程级的多线程 Tokio 运行时，[`TokioLoop::stop`] 可从任意线程让 `run` 返回。

## 核心契约（What）
- [`QuinnApp`]：`H3App<QuinnEngine>` 的别名，即开即用的装配器；
- [`QuinnEngine`]：实现 [`spark_h3::ProtocolEngine`]，配置类型为 [`spark_h3::EngineLimits`]；
- [`Http3Request`] / [`Http3Response`]：处理器看到的请求与响应；
- [`telemetry::init`]：安装 `fmt + EnvFilter` 日志订阅器。

## 示例
```no_run
use spark_h3::{EventLoop, TransportOptions};
use spark_h3_quinn::{QuinnApp, TokioLoop};

let options = TransportOptions::new("key.pem", "cert.pem");
QuinnApp::new(&options)
    .get("/hello", |res, _req| res.end("Hello from HTTP/3!"))
    .listen(4433, |socket| {
        if socket.is_none() {
            TokioLoop::get().stop();
        }
    })
    .run();
```
"#]

pub mod endpoint;
pub mod engine;
pub mod event_loop;
pub mod message;
pub mod routes;
pub mod telemetry;
pub mod tls;

pub use engine::{QuinnEngine, QuinnListenSocket};
pub use event_loop::{TaskTracker, TokioLoop};
pub use message::{Http3Request, Http3Response};
pub use routes::{RoutePattern, RouteTable};

/// 以 quinn 引擎装配的 HTTP/3 应用。
pub type QuinnApp = spark_h3::H3App<QuinnEngine>;
