//! Tokio 事件循环与在途任务计数。
//!
//! # 教案式注释
//!
//! ## 意图（Why）
//! - [`spark_h3::EventLoop`] 要求进程级单例与阻塞式 `run`，这里用一个惰性构建的多线程
//!   Tokio 运行时满足该契约；
//! - 引擎派生的每个异步任务（监听循环、连接、请求流）都登记到 [`TaskTracker`]，
//!   使 `run` 能在“再无工作”时自然返回。
//!
//! ## 契约（What）
//! - `run` 阻塞调用线程，直到在途任务归零或 [`TokioLoop::stop`] 被调用；
//! - 运行时构建失败不会 panic：`get` 仍返回单例，`run` 记录告警后立即返回，
//!   引擎在 `create` 时拿到 [`EngineError::Runtime`]。
//!
//! ## 风险与注意（Trade-offs）
//! - `stop` 采用 `Notify::notify_one` 语义：若调用时循环尚未运行，许可会保留到下一次 `run`，
//!   使其立即返回；
//! - 不得在运行时工作线程内调用 `run`，否则 Tokio 会拒绝嵌套 `block_on`。

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::Poll;

use futures_util::future::poll_fn;
use futures_util::task::AtomicWaker;
use spark_h3::{EngineError, EventLoop};
use tokio::runtime::{EnterGuard, Handle, Runtime};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

const WORKER_THREAD_NAME: &str = "spark-h3-worker";

/// 进程级 Tokio 事件循环。
pub struct TokioLoop {
    runtime: Result<Runtime, String>,
    tracker: TaskTracker,
    stop: Notify,
}

impl std::fmt::Debug for TokioLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioLoop")
            .field("available", &self.runtime.is_ok())
            .field("in_flight", &self.tracker.in_flight())
            .finish()
    }
}

impl TokioLoop {
    fn build() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name(WORKER_THREAD_NAME)
            .build()
            .map_err(|error| error.to_string());
        if let Err(reason) = &runtime {
            warn!(%reason, "tokio runtime could not be built, event loop is unavailable");
        }
        Self {
            runtime,
            tracker: TaskTracker::new(),
            stop: Notify::new(),
        }
    }

    fn runtime(&self) -> Result<&Runtime, EngineError> {
        self.runtime.as_ref().map_err(|reason| EngineError::Runtime {
            reason: reason.clone(),
        })
    }

    /// 运行时句柄；运行时不可用时返回 [`EngineError::Runtime`]。
    pub fn handle(&self) -> Result<&Handle, EngineError> {
        self.runtime().map(Runtime::handle)
    }

    /// 进入运行时上下文，供需要 Tokio 反应器的同步构造（如 UDP socket 注册）使用。
    pub fn enter(&self) -> Result<EnterGuard<'_>, EngineError> {
        self.runtime().map(Runtime::enter)
    }

    /// 在运行时上派生一个被计数的任务。
    pub fn spawn<F>(&self, future: F) -> Result<(), EngineError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = self.runtime()?;
        runtime.spawn(self.tracker.track_future(future));
        Ok(())
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// 请求 `run` 返回；已派生的任务不会被取消。
    pub fn stop(&self) {
        debug!("event loop stop requested");
        self.stop.notify_one();
    }
}

impl EventLoop for TokioLoop {
    fn get() -> &'static Self {
        static LOOP: OnceLock<TokioLoop> = OnceLock::new();
        LOOP.get_or_init(TokioLoop::build)
    }

    fn run(&self) {
        let runtime = match self.runtime() {
            Ok(runtime) => runtime,
            Err(error) => {
                warn!(%error, "event loop run skipped");
                return;
            }
        };
        if Handle::try_current().is_ok() {
            warn!("event loop run called from inside a tokio runtime, ignoring");
            return;
        }

        info!(in_flight = self.tracker.in_flight(), "event loop running");
        runtime.block_on(async {
            tokio::select! {
                _ = self.tracker.wait_for_idle() => info!("event loop idle, returning"),
                _ = self.stop.notified() => info!("event loop stopped"),
            }
        });
    }
}

/// 在途任务计数器。
///
/// 计数归零时唤醒 [`TaskTracker::wait_for_idle`] 的等待者。克隆共享同一计数。
#[derive(Clone, Default)]
pub struct TaskTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Default)]
struct TrackerInner {
    counter: AtomicUsize,
    waker: AtomicWaker,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.counter.load(Ordering::Acquire)
    }

    /// 包装 Future：创建时计数加一，完成或被丢弃时减一。
    pub fn track_future<F>(&self, future: F) -> impl Future<Output = F::Output> + Send + 'static
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = TaskGuard::new(self.clone());
        async move {
            let output = future.await;
            drop(guard);
            output
        }
    }

    /// 等待在途任务归零；计数本就为零时立即完成。
    pub async fn wait_for_idle(&self) {
        poll_fn(|cx| {
            if self.in_flight() == 0 {
                return Poll::Ready(());
            }
            self.inner.waker.register(cx.waker());
            if self.in_flight() == 0 {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await;
    }
}

impl std::fmt::Debug for TaskTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTracker")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

struct TaskGuard {
    tracker: TaskTracker,
}

impl TaskGuard {
    fn new(tracker: TaskTracker) -> Self {
        tracker.inner.counter.fetch_add(1, Ordering::Release);
        Self { tracker }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.tracker.inner.counter.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.inner.waker.wake();
        }
    }
}
