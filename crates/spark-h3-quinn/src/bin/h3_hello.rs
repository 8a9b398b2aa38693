//! HTTP/3 问候服务：读取 TOML 配置，注册两条路由并在配置的全部地址上监听。
//!
//! # 使用方法
//! ```bash
//! cargo run --bin h3_hello -- h3.toml
//! ```
//! - 参数缺省时读取当前目录下的 `h3.toml`，格式见 [`spark_h3::AppConfig`]；
//! - `GET /hello` 返回问候语，其余任意请求返回 404 并回显动词与路径；
//! - 日志级别由 `RUST_LOG` 控制，缺省 `info`。

use std::env;

use http::StatusCode;
use spark_h3::{AppConfig, ConfigError};
use spark_h3_quinn::{QuinnApp, telemetry};
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "h3.toml";

fn main() {
    telemetry::init();
    if let Err(error) = run() {
        error!(%error, "h3_hello failed to start");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ConfigError> {
    let path = env::args()
        .skip(1)
        .find(|arg| arg.trim_start_matches('-') != "quick")
        .unwrap_or_else(|| DEFAULT_CONFIG.to_owned());
    let config = AppConfig::from_file(&path)?;
    info!(%path, listeners = config.listen.len(), "configuration loaded");

    let mut app = QuinnApp::with_config(&config.tls, config.engine.clone())
        .get("/hello", |res, _req| {
            res.write_header("content-type", "text/plain; charset=utf-8")
                .end("Hello from HTTP/3!");
        })
        .any("/*", |res, req| {
            res.write_status(StatusCode::NOT_FOUND)
                .end(format!("no route for {} {}", req.method(), req.path()));
        });
    if app.is_disabled() {
        return Err(ConfigError::Invalid(
            "http3 engine could not be created, see the log above".into(),
        ));
    }

    let mut bound = 0_usize;
    for request in &config.listen {
        app = app.listen_request(request, |socket| match socket {
            Some(socket) => {
                bound += 1;
                info!(addr = %socket.local_addr(), "serving http3");
            }
            None => error!(host = ?request.bind_host(), port = request.port, "listener not bound"),
        });
    }
    if bound == 0 {
        return Err(ConfigError::Invalid("no listener could be bound".into()));
    }

    app.run();
    Ok(())
}
