//! 基于 quinn + h3 的 [`ProtocolEngine`] 实现。
//!
//! # 教案式注释
//!
//! ## 意图（Why）
//! - 把装配器的同步调用（`create`/`listen`/`on_http`）落到异步的 QUIC 栈上：
//!   绑定在调用线程同步完成，连接受理与请求处理作为任务派生到 [`TokioLoop`]；
//!
//! ## 逻辑（How）
//! 1. `create` 校验限额、装载 TLS 材料并生成 `quinn::ServerConfig`，任何失败都让装配器停用；
//! 2. `listen` 绑定 UDP 套接字，构建 Endpoint，并派生一个受理循环；
//! 3. 每个连接完成 h3 握手后逐个受理请求流，每条请求流一个任务；
//! 4. 请求体读满（或超限返回 413）后在路由表中选出处理器，同步调用，随后写回响应。
//!
//! ## 契约（What）
//! - 路由可在监听之后继续注册，新路由对后续请求立即可见；
//! - 未命中路由的请求返回 404；`HEAD` 请求只发送响应头；
//! - 引擎被释放时关闭其全部监听，受理循环随之结束。

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use h3::error::ErrorLevel;
use h3::server::RequestStream;
use http::StatusCode;
use quinn::{Endpoint, VarInt};
use spark_h3::{EngineError, EngineLimits, Handler, Method, ProtocolEngine, TransportOptions};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::endpoint;
use crate::event_loop::TokioLoop;
use crate::message::{Http3Request, Http3Response};
use crate::routes::RouteTable;
use crate::tls;

type QuinnRequestStream = RequestStream<h3_quinn::BidiStream<Bytes>, Bytes>;

/// 单个连接上的失败原因，仅用于日志。
#[derive(Debug, Error)]
enum ServeError {
    #[error("quic handshake failed: {0}")]
    Handshake(#[from] quinn::ConnectionError),
    #[error("http3 connection error: {0}")]
    Http3(#[from] h3::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// 成功绑定的监听句柄。克隆共享同一个 Endpoint。
#[derive(Clone, Debug)]
pub struct QuinnListenSocket {
    endpoint: Endpoint,
    local_addr: SocketAddr,
}

impl QuinnListenSocket {
    /// 实际绑定地址；端口 0 时为内核分配的端口。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 停止受理新连接并关闭该 Endpoint 上的现有连接。可重复调用，后续调用无效果。
    pub fn close(&self) {
        self.endpoint.close(VarInt::from_u32(0), b"listener closed");
    }
}

/// 请求分发器：路由表与请求体上限，在所有请求任务间共享。
#[derive(Debug)]
pub(crate) struct Dispatcher {
    routes: RouteTable,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub(crate) fn new(max_body_bytes: usize) -> Self {
        Self {
            routes: RouteTable::new(),
            max_body_bytes,
        }
    }

    /// 选路并同步调用处理器；`HEAD` 退回 `GET` 的规则见 [`RouteTable::resolve`]。
    pub(crate) fn dispatch(&self, parts: http::request::Parts, body: Bytes) -> Http3Response {
        let method = Method::from_request_token(parts.method.as_str());
        let path = parts.uri.path();
        let Some(resolved) = self.routes.resolve(method, path) else {
            debug!(method = %parts.method, path, "no route matched");
            return Http3Response::with_status(StatusCode::NOT_FOUND);
        };
        trace!(method = %parts.method, pattern = %resolved.pattern, "route matched");
        let mut request = Http3Request::new(parts, resolved.params, body);
        let mut response = Http3Response::default();
        (resolved.handler)(&mut response, &mut request);
        response
    }

    async fn read_body(
        &self,
        stream: &mut QuinnRequestStream,
    ) -> Result<Option<Bytes>, h3::Error> {
        let mut body = BytesMut::new();
        while let Some(chunk) = stream.recv_data().await? {
            if body.len() + chunk.remaining() > self.max_body_bytes {
                return Ok(None);
            }
            body.put(chunk);
        }
        Ok(Some(body.freeze()))
    }

    async fn serve_request(
        &self,
        request: http::Request<()>,
        mut stream: QuinnRequestStream,
    ) -> Result<(), h3::Error> {
        let (parts, ()) = request.into_parts();
        let head_only = parts.method == http::Method::HEAD;
        let response = match self.read_body(&mut stream).await? {
            Some(body) => self.dispatch(parts, body),
            None => {
                debug!(
                    path = parts.uri.path(),
                    limit = self.max_body_bytes,
                    "request body too large"
                );
                Http3Response::with_status(StatusCode::PAYLOAD_TOO_LARGE)
            }
        };

        let (head, body) = response.into_parts();
        stream.send_response(head).await?;
        if !head_only && !body.is_empty() {
            stream.send_data(body).await?;
        }
        stream.finish().await
    }
}

async fn serve_connection(
    incoming: quinn::Incoming,
    dispatcher: Arc<Dispatcher>,
    event_loop: &'static TokioLoop,
) -> Result<(), ServeError> {
    let connection = incoming.await?;
    let remote = connection.remote_address();
    debug!(%remote, "quic connection established");

    let mut h3_conn: h3::server::Connection<h3_quinn::Connection, Bytes> = h3::server::builder()
        .build(h3_quinn::Connection::new(connection))
        .await?;

    loop {
        match h3_conn.accept().await {
            Ok(Some((request, stream))) => {
                let dispatcher = Arc::clone(&dispatcher);
                event_loop.spawn(async move {
                    if let Err(error) = dispatcher.serve_request(request, stream).await {
                        debug!(%remote, %error, "request stream failed");
                    }
                })?;
            }
            Ok(None) => {
                debug!(%remote, "http3 connection closed by peer");
                return Ok(());
            }
            Err(error) => match error.get_error_level() {
                ErrorLevel::ConnectionError => return Err(error.into()),
                ErrorLevel::StreamError => {
                    debug!(%remote, %error, "stream error while accepting request");
                    continue;
                }
            },
        }
    }
}

async fn accept_loop(
    endpoint: Endpoint,
    dispatcher: Arc<Dispatcher>,
    event_loop: &'static TokioLoop,
) {
    while let Some(incoming) = endpoint.accept().await {
        let remote = incoming.remote_address();
        let dispatcher = Arc::clone(&dispatcher);
        let spawned = event_loop.spawn(async move {
            if let Err(error) = serve_connection(incoming, dispatcher, event_loop).await {
                debug!(%remote, %error, "connection ended with error");
            }
        });
        if let Err(error) = spawned {
            warn!(%error, "cannot spawn connection task, stopping accept loop");
            break;
        }
    }
    debug!(local = ?endpoint.local_addr().ok(), "accept loop finished");
}

/// quinn + h3 协议引擎。
pub struct QuinnEngine {
    event_loop: &'static TokioLoop,
    options: TransportOptions,
    limits: EngineLimits,
    server_config: quinn::ServerConfig,
    dispatcher: Arc<Dispatcher>,
    /// 成功绑定过的全部监听句柄，只增不减：调用方先行 `close` 的句柄仍留在表中，
    /// 引擎释放时统一再关闭一次。监听次数由装配代码决定，不做剪枝。
    listeners: Vec<QuinnListenSocket>,
}

impl std::fmt::Debug for QuinnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuinnEngine")
            .field("options", &self.options)
            .field("limits", &self.limits)
            .field("routes", &self.dispatcher.routes)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl QuinnEngine {
    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    pub fn limits(&self) -> &EngineLimits {
        &self.limits
    }

    pub fn routes(&self) -> &RouteTable {
        &self.dispatcher.routes
    }

    /// 成功绑定过的监听句柄，含已被调用方关闭的句柄。
    pub fn listeners(&self) -> &[QuinnListenSocket] {
        &self.listeners
    }
}

impl ProtocolEngine for QuinnEngine {
    type Loop = TokioLoop;
    type Config = EngineLimits;
    type Request = Http3Request;
    type Response = Http3Response;
    type ListenSocket = QuinnListenSocket;

    fn create(
        event_loop: &'static TokioLoop,
        options: TransportOptions,
        limits: EngineLimits,
    ) -> Result<Self, EngineError> {
        event_loop.handle()?;
        limits.validate().map_err(|error| EngineError::Config {
            reason: error.to_string(),
        })?;
        let server_config = tls::server_config(&options, &limits)?;
        Ok(Self {
            event_loop,
            dispatcher: Arc::new(Dispatcher::new(limits.max_body_bytes)),
            options,
            limits,
            server_config,
            listeners: Vec::new(),
        })
    }

    fn init(&mut self) {
        info!(
            idle_timeout_ms = self.limits.idle_timeout_ms,
            max_concurrent_streams = self.limits.max_concurrent_streams,
            max_body_bytes = self.limits.max_body_bytes,
            "quinn http3 engine initialised"
        );
    }

    fn listen(
        &mut self,
        host: Option<&str>,
        port: u16,
    ) -> Result<QuinnListenSocket, EngineError> {
        let socket = endpoint::bind_udp(host, port)?;
        let endpoint =
            endpoint::server_endpoint(self.event_loop, socket, self.server_config.clone())?;
        let local_addr = endpoint
            .local_addr()
            .map_err(|source| EngineError::io("read listener address", source))?;

        self.event_loop.spawn(accept_loop(
            endpoint.clone(),
            Arc::clone(&self.dispatcher),
            self.event_loop,
        ))?;
        info!(%local_addr, "http3 listener bound");

        let listener = QuinnListenSocket {
            endpoint,
            local_addr,
        };
        self.listeners.push(listener.clone());
        Ok(listener)
    }

    fn on_http(
        &mut self,
        method: Method,
        pattern: String,
        handler: Handler<Http3Response, Http3Request>,
    ) {
        trace!(%method, %pattern, "route registered");
        self.dispatcher
            .routes
            .insert(method, &pattern, Arc::from(handler));
    }
}

impl Drop for QuinnEngine {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.close();
        }
        if !self.listeners.is_empty() {
            debug!(count = self.listeners.len(), "engine released, listeners closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(method: http::Method, uri: &str) -> http::request::Parts {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn dispatcher() -> Dispatcher {
        let dispatcher = Dispatcher::new(1024);
        dispatcher.routes.insert(
            Method::Get,
            "/users/:id",
            Arc::new(|res: &mut Http3Response, req: &mut Http3Request| {
                res.write_header("content-type", "text/plain")
                    .end(format!("user {}", req.parameter(0).unwrap_or("?")));
            }),
        );
        dispatcher.routes.insert(
            Method::Any,
            "/echo",
            Arc::new(|res: &mut Http3Response, req: &mut Http3Request| {
                res.end(req.body().clone());
            }),
        );
        dispatcher
    }

    #[test]
    fn dispatch_invokes_matching_handler() {
        let response =
            dispatcher().dispatch(parts(http::Method::GET, "/users/7?x=1"), Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"user 7");
    }

    #[test]
    fn unmatched_route_is_not_found() {
        let response =
            dispatcher().dispatch(parts(http::Method::POST, "/users/7"), Bytes::new());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().is_empty());
    }

    #[test]
    fn head_falls_back_to_get_route() {
        let response = dispatcher().dispatch(parts(http::Method::HEAD, "/users/3"), Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"user 3");
    }

    #[test]
    fn head_reaches_get_route_despite_catch_all() {
        let dispatcher = dispatcher();
        dispatcher.routes.insert(
            Method::Any,
            "/*",
            Arc::new(|res: &mut Http3Response, _: &mut Http3Request| {
                res.write_status(StatusCode::NOT_FOUND).end("catch-all");
            }),
        );
        let response = dispatcher.dispatch(parts(http::Method::HEAD, "/users/3"), Bytes::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"user 3");

        let response = dispatcher.dispatch(parts(http::Method::HEAD, "/nowhere"), Bytes::new());
        assert_eq!(response.body(), b"catch-all");
    }

    #[test]
    fn custom_verbs_reach_any_routes() {
        let custom = http::Method::from_bytes(b"PURGE").unwrap();
        let response =
            dispatcher().dispatch(parts(custom, "/echo"), Bytes::from_static(b"ping"));
        assert_eq!(response.body(), b"ping");
    }
}
