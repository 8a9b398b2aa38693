//! 协议引擎与事件循环的接缝 trait。
//!
//! 装配器只通过这里的两个 trait 与外部协作者交互：握手、帧解析、流复用与路由分发
//! 全部属于引擎，I/O 就绪与定时器属于事件循环。

use crate::{EngineError, Method, TransportOptions};

/// 路由处理器：引擎命中路由后以 `(响应, 请求)` 调用。
///
/// 处理器的所有权在注册时永久移交给引擎；装配器不会保留、调用或检查它。
/// 处理器是 `Fn + Send + Sync`，引擎可能并发调用，可变状态需经 `Atomic*` 或 `Mutex` 等内部可变性持有。
pub type Handler<Res, Req> = Box<dyn Fn(&mut Res, &mut Req) + Send + Sync + 'static>;

/// 进程级事件循环。
///
/// # 教案级注释
/// - **契约 (What)**：`get` 总是返回同一个实例；`run` 阻塞调用线程，直到循环再无工作或被外部停止；
/// - **前置条件**：不得在循环自身的工作线程内调用 `run`；
/// - **风险提示**：停止循环的机制由实现方提供，装配器不参与取消。
pub trait EventLoop: Send + Sync + 'static {
    /// 获取进程级单例。
    fn get() -> &'static Self;

    /// 驱动循环，阻塞至循环退出。
    fn run(&self);
}

/// 外部 HTTP/3 协议引擎。
///
/// # 教案级注释
/// - **意图 (Why)**：把“引擎句柄”抽象为一个拥有所有权的值，让 [`crate::H3App`] 能以
///   `Option<E>` 表达“活跃 / 停用”两态，而无需引用计数；
/// - **契约 (What)**：
///   - `create` 绑定到给定事件循环并接管传输参数副本，失败时返回 [`EngineError`]；
///   - `init` 在 `create` 成功后恰好调用一次；
///   - `listen` 同步完成绑定，成功返回监听句柄；
///   - `on_http` 同步记录路由，动词与模式原样来自调用方；
/// - **前置条件**：以上方法均在装配线程上同步调用，不得挂起调用方；
/// - **风险提示**：路由匹配优先级、通配动词语义都由实现方定义。
pub trait ProtocolEngine: Sized {
    /// 引擎所绑定的事件循环类型。
    type Loop: EventLoop;
    /// 引擎私有的调优参数。
    type Config: Default;
    /// 交给处理器的请求对象。
    type Request;
    /// 交给处理器的响应对象。
    type Response;
    /// 成功绑定后的监听句柄。
    type ListenSocket;

    fn create(
        event_loop: &'static Self::Loop,
        options: TransportOptions,
        config: Self::Config,
    ) -> Result<Self, EngineError>;

    fn init(&mut self);

    /// `host` 为 `None` 时绑定全部网卡。
    fn listen(&mut self, host: Option<&str>, port: u16)
    -> Result<Self::ListenSocket, EngineError>;

    fn on_http(
        &mut self,
        method: Method,
        pattern: String,
        handler: Handler<Self::Response, Self::Request>,
    );
}
