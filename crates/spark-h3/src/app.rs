use core::fmt;

use tracing::{debug, trace, warn};

use crate::{
    EventLoop, Handler, ListenOptions, ListenRequest, Method, ProtocolEngine, TransportOptions,
};

/// `H3App` 以链式调用装配一个 HTTP/3 服务：注册路由、绑定端口，最后交由事件循环驱动。
///
/// # 教案级注释
/// - **设计目标 (Why)**
///   - 一个装配器至多独占一个协议引擎，所有权只转移不复制，长链调用无需引用计数；
///   - 引擎缺失（创建失败或已被转移）时所有操作安全退化为空操作，链式调用无需逐步检查错误。
/// - **体系位置 (Where)**
///   - 位于应用作者与 [`ProtocolEngine`] 之间，是启动阶段唯一的装配入口；
///   - `run` 之后控制权交给 [`EventLoop`]，装配阶段结束。
/// - **关键流程 (How)**
///   1. `new`：复制传输参数、获取进程级事件循环、创建并初始化引擎；
///   2. `get/post/.../any`：把 `(动词, 模式, 处理器)` 原样转交引擎；
///   3. `listen*`：归一主机与选项后同步绑定，并在返回前恰好调用一次回调；
///   4. `run`：驱动事件循环直至其退出。
/// - **契约说明 (What)**
///   - 不实现 `Clone`：复制意味着两个所有者共享同一引擎；
///   - 每个链式方法按值消费 `self` 并按值返回，调用顺序即执行顺序，不做缓冲或重排；
///   - [`H3App::take`] 显式转移所有权，原装配器随即停用。
/// - **风险提示 (Trade-offs)**
///   - 停用状态是合法终态，不会报错；需要确认引擎是否可用时请检查 [`H3App::is_disabled`]。
pub struct H3App<E: ProtocolEngine> {
    engine: Option<E>,
}

impl<E: ProtocolEngine> fmt::Debug for H3App<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("H3App")
            .field("disabled", &self.is_disabled())
            .finish()
    }
}

impl<E: ProtocolEngine> H3App<E> {
    /// 使用默认引擎配置构造装配器。
    ///
    /// - **前置条件**：无；`options` 中的字符串会被复制，调用方随后即可释放原值；
    /// - **后置条件**：引擎创建失败时返回停用的装配器，失败原因以 `warn` 级日志记录。
    pub fn new(options: &TransportOptions) -> Self {
        Self::with_config(options, E::Config::default())
    }

    /// 使用显式引擎配置构造装配器，语义与 [`H3App::new`] 相同。
    pub fn with_config(options: &TransportOptions, config: E::Config) -> Self {
        let event_loop = E::Loop::get();
        match E::create(event_loop, options.clone(), config) {
            Ok(mut engine) => {
                engine.init();
                debug!("http3 engine created and initialised");
                Self {
                    engine: Some(engine),
                }
            }
            Err(error) => {
                warn!(%error, "http3 engine creation failed, builder is disabled");
                Self::disabled()
            }
        }
    }

    /// 构造一个不持有引擎的装配器。
    pub fn disabled() -> Self {
        Self { engine: None }
    }

    /// 把引擎所有权转移到返回值，`self` 随即停用。
    ///
    /// 对已停用的装配器调用时返回另一个停用装配器。
    pub fn take(&mut self) -> Self {
        Self {
            engine: self.engine.take(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.engine.is_none()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    /// 以给定动词注册路由；九个具名方法与 `any` 都委托到这里。
    ///
    /// # 教案级注释
    /// - **执行逻辑 (How)**：引擎存在时把 `(method, pattern, handler)` 原样交给 [`ProtocolEngine::on_http`]；
    ///   引擎缺失时丢弃处理器，不做任何记录之外的动作；
    /// - **返回值 (What)**：按值返回装配器本身，以便继续链式调用。
    pub fn route<P, F>(mut self, method: Method, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        match self.engine.as_mut() {
            Some(engine) => {
                let handler: Handler<E::Response, E::Request> = Box::new(handler);
                engine.on_http(method, pattern.into(), handler);
            }
            None => trace!(%method, "route ignored on disabled builder"),
        }
        self
    }

    pub fn get<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Get, pattern, handler)
    }

    pub fn post<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Post, pattern, handler)
    }

    pub fn put<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Put, pattern, handler)
    }

    pub fn patch<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Patch, pattern, handler)
    }

    /// 注册 `DELETE` 路由（`delete` 与常见 API 的删除语义易混淆，故沿用 `del`）。
    pub fn del<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Delete, pattern, handler)
    }

    pub fn head<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Head, pattern, handler)
    }

    pub fn options<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Options, pattern, handler)
    }

    pub fn connect<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Connect, pattern, handler)
    }

    pub fn trace<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Trace, pattern, handler)
    }

    /// 注册匹配任意动词的路由，交给引擎的动词记号为 `"*"`。
    pub fn any<P, F>(self, pattern: P, handler: F) -> Self
    where
        P: Into<String>,
        F: Fn(&mut E::Response, &mut E::Request) + Send + Sync + 'static,
    {
        self.route(Method::Any, pattern, handler)
    }

    /// 在全部网卡上监听 `port`。
    pub fn listen<F>(self, port: u16, on_bound: F) -> Self
    where
        F: FnOnce(Option<E::ListenSocket>),
    {
        self.bind_listen(None, port, None, on_bound)
    }

    /// 在全部网卡上监听 `port`，并携带选项位掩码（目前不会转交引擎）。
    pub fn listen_with_options<F>(self, port: u16, options: ListenOptions, on_bound: F) -> Self
    where
        F: FnOnce(Option<E::ListenSocket>),
    {
        self.bind_listen(None, port, Some(options), on_bound)
    }

    /// 在指定主机上监听；`host` 为空串时等价于 [`H3App::listen`]。
    pub fn listen_on<F>(self, host: &str, port: u16, on_bound: F) -> Self
    where
        F: FnOnce(Option<E::ListenSocket>),
    {
        self.bind_listen(Some(host), port, None, on_bound)
    }

    /// 在指定主机上监听并携带选项；`host` 为空串时等价于 [`H3App::listen_with_options`]。
    pub fn listen_on_with_options<F>(
        self,
        host: &str,
        port: u16,
        options: ListenOptions,
        on_bound: F,
    ) -> Self
    where
        F: FnOnce(Option<E::ListenSocket>),
    {
        self.bind_listen(Some(host), port, Some(options), on_bound)
    }

    /// 以预先组装好的 [`ListenRequest`] 监听，常用于配置文件驱动的场景。
    pub fn listen_request<F>(self, request: &ListenRequest, on_bound: F) -> Self
    where
        F: FnOnce(Option<E::ListenSocket>),
    {
        self.bind_listen(
            request.host.as_deref(),
            request.port,
            request.options,
            on_bound,
        )
    }

    /// 四种监听形态的唯一落点。
    ///
    /// # 教案级注释
    /// - **归一规则 (How)**：
    ///   1. 空主机串视为未给出主机，即绑定全部网卡；
    ///   2. 选项位掩码只用于区分调用形态，不参与引擎调用；
    ///   3. 引擎存在时同步调用 [`ProtocolEngine::listen`]，失败记为 `None`；
    ///   4. 无论成功、失败或停用，`on_bound` 都在本函数返回前恰好调用一次。
    /// - **风险提示**：引擎错误只体现在日志里，回调只能观察到 `None`。
    fn bind_listen<F>(
        mut self,
        host: Option<&str>,
        port: u16,
        options: Option<ListenOptions>,
        on_bound: F,
    ) -> Self
    where
        F: FnOnce(Option<E::ListenSocket>),
    {
        let host = host.filter(|host| !host.is_empty());
        if let Some(options) = options.filter(|options| !options.is_default()) {
            trace!(
                bits = options.bits(),
                "listen options are reserved and not forwarded to the engine"
            );
        }

        let socket = match self.engine.as_mut() {
            Some(engine) => match engine.listen(host, port) {
                Ok(socket) => Some(socket),
                Err(error) => {
                    warn!(%error, host = host.unwrap_or("*"), port, "listen failed");
                    None
                }
            },
            None => {
                debug!(port, "listen on disabled builder delivers no socket");
                None
            }
        };
        on_bound(socket);
        self
    }

    /// 把控制权交给进程级事件循环，阻塞直至循环退出。
    ///
    /// 装配器（连同引擎）在循环退出后才被释放；停用的装配器同样会驱动循环。
    pub fn run(self) {
        E::Loop::get().run();
        drop(self);
    }
}
