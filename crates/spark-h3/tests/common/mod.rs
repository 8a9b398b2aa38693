//! 集成测试共用的记录型引擎与事件循环。
//!
//! `RecordingEngine` 把每一次引擎调用追加到调用日志，测试据此断言转发顺序、
//! 主机归一化与“停用即空操作”等装配器契约。

#![allow(dead_code)]

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use spark_h3::{EngineError, EventLoop, Handler, Method, ProtocolEngine, TransportOptions};

/// 触发引擎创建失败的私钥路径。
pub const INVALID_KEY_FILE: &str = "/nonexistent/spark-h3/key.pem";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Init,
    Route { token: &'static str, pattern: String },
    Listen { host: Option<String>, port: u16 },
}

#[derive(Debug, Default)]
pub struct RecordingLoop {
    runs: AtomicUsize,
}

impl RecordingLoop {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl EventLoop for RecordingLoop {
    fn get() -> &'static Self {
        static LOOP: OnceLock<RecordingLoop> = OnceLock::new();
        LOOP.get_or_init(RecordingLoop::default)
    }

    fn run(&self) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug, Default)]
pub struct RecordingConfig {
    /// 监听该端口时模拟绑定失败。
    pub refuse_port: Option<u16>,
}

#[derive(Debug, Default)]
pub struct RecordedRequest {
    pub path: String,
}

#[derive(Debug, Default)]
pub struct RecordedResponse {
    pub written: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedSocket {
    pub host: Option<String>,
    pub port: u16,
}

pub struct RecordingEngine {
    pub options: TransportOptions,
    config: RecordingConfig,
    calls: Vec<Call>,
    handlers: Vec<(Method, String, Handler<RecordedResponse, RecordedRequest>)>,
}

impl RecordingEngine {
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// 按注册顺序查找首个可受理的处理器并调用，模拟引擎分发。
    pub fn dispatch(&self, method: Method, path: &str) -> Option<RecordedResponse> {
        let (_, _, handler) = self
            .handlers
            .iter()
            .find(|(registered, pattern, _)| registered.accepts(method) && pattern == path)?;
        let mut response = RecordedResponse::default();
        let mut request = RecordedRequest {
            path: path.to_owned(),
        };
        handler(&mut response, &mut request);
        Some(response)
    }
}

impl ProtocolEngine for RecordingEngine {
    type Loop = RecordingLoop;
    type Config = RecordingConfig;
    type Request = RecordedRequest;
    type Response = RecordedResponse;
    type ListenSocket = RecordedSocket;

    fn create(
        _event_loop: &'static Self::Loop,
        options: TransportOptions,
        config: Self::Config,
    ) -> Result<Self, EngineError> {
        if options.key_file.as_deref() == Some(INVALID_KEY_FILE) {
            return Err(EngineError::tls("private key file not found"));
        }
        Ok(Self {
            options,
            config,
            calls: Vec::new(),
            handlers: Vec::new(),
        })
    }

    fn init(&mut self) {
        self.calls.push(Call::Init);
    }

    fn listen(&mut self, host: Option<&str>, port: u16) -> Result<RecordedSocket, EngineError> {
        self.calls.push(Call::Listen {
            host: host.map(str::to_owned),
            port,
        });
        if self.config.refuse_port == Some(port) {
            return Err(EngineError::Bind {
                addr: format!("{}:{port}", host.unwrap_or("*")),
                source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
            });
        }
        Ok(RecordedSocket {
            host: host.map(str::to_owned),
            port,
        })
    }

    fn on_http(
        &mut self,
        method: Method,
        pattern: String,
        handler: Handler<RecordedResponse, RecordedRequest>,
    ) {
        self.calls.push(Call::Route {
            token: method.token(),
            pattern: pattern.clone(),
        });
        self.handlers.push((method, pattern, handler));
    }
}

pub type TestApp = spark_h3::H3App<RecordingEngine>;

pub fn valid_options() -> TransportOptions {
    TransportOptions::new("tests/key.pem", "tests/cert.pem").with_passphrase("secret")
}

pub fn invalid_options() -> TransportOptions {
    TransportOptions::new(INVALID_KEY_FILE, "tests/cert.pem")
}

pub fn route(token: &'static str, pattern: &str) -> Call {
    Call::Route {
        token,
        pattern: pattern.to_owned(),
    }
}

pub fn listen(host: Option<&str>, port: u16) -> Call {
    Call::Listen {
        host: host.map(str::to_owned),
        port,
    }
}
