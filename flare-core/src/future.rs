//! 完成通知 Future：携带监听器扇出与有界等待的异步结果载体。
//!
//! # 设计背景（Why）
//! - 每个出站操作都返回一个完成通知；传输层在 I/O 真正落定时完成它。回调
//!   （监听器）是首选的消费方式：注册是非阻塞的，通知在 Future 绑定的执行器上
//!   运行，调用方永远不会在意料之外的线程上被回调。
//! - 阻塞等待仅作为边缘工具保留，并内置自锁检测：负责完成该 Future 的执行器
//!   线程若自己发起等待，等待的事件永远不会到来。
//!
//! # 逻辑解析（How）
//! - 共享状态为“结果槽 + 监听器列表 + 等待者列表”的三元组，由自旋锁保护；
//!   终态迁移在锁内一次完成，因此“恰好一次终态”由锁的互斥直接给出。
//! - 监听器通知以批为单位在绑定执行器上排空：当前线程已是执行器线程则内联，
//!   否则入队；一批执行期间新注册的监听器进入下一批，不产生递归。
//! - 阻塞等待基于 `thread::park` / `unpark`（`std` 特性下可用），超时变体用
//!   `park_timeout` 收敛。
//!
//! # 契约说明（What）
//! - 状态机：Pending 恰好一次迁移到 Succeeded / Failed / Cancelled，终态不可变。
//! - 终态前注册的监听器恰好通知一次，顺序为注册序；终态后注册的立即调度。
//! - void 变体拒绝监听与等待，观察方法返回固定值，供放弃完成跟踪的写路径使用。

use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::fmt;
use core::mem;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::{CoreError, codes};
use crate::observability::Logger;
use crate::runtime::{CoreServices, EventExecutor};

#[cfg(feature = "std")]
use core::time::Duration;
#[cfg(feature = "std")]
use std::thread;
#[cfg(feature = "std")]
use std::time::Instant;

/// 监听器注册凭据，用于 [`Promise::remove_listener`] 的尽力而为移除。
///
/// `FnOnce` 闭包装箱后不具备可比较的身份，注册时返回的凭据是唯一的移除依据。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerHandle(u64);

/// 装箱的完成监听器，配合 [`Promise::add_listeners`] 批量注册。
pub type CompletionListener<T = ()> = Box<dyn FnOnce(&Promise<T>) + Send + 'static>;

type ListenerFn<T> = CompletionListener<T>;

/// 终态结果。
enum Outcome<T> {
    Success(T),
    Failure(CoreError),
    Cancelled,
}

struct State<T> {
    outcome: Option<Outcome<T>>,
    listeners: Vec<(u64, ListenerFn<T>)>,
    next_listener_id: u64,
    notify_scheduled: bool,
    #[cfg(feature = "std")]
    waiters: Vec<thread::Thread>,
}

struct Shared<T> {
    state: spin::Mutex<State<T>>,
    done: AtomicBool,
    executor: Arc<dyn EventExecutor>,
    logger: Arc<dyn Logger>,
    cancellable: bool,
    void: bool,
}

/// 异步 I/O 操作的完成通知句柄。
///
/// # 契约说明（What）
/// - 句柄可克隆，所有克隆指向同一份共享状态；写方（传输层）与读方（调用方）
///   持有的是同一个对象的不同视角。
/// - `try_success` / `try_failure` / `try_cancel` 中恰好一个能够赢得终态迁移，
///   其余返回 `false` 且无副作用。
/// - 监听器通知运行在构造时绑定的执行器上；见模块文档。
pub struct Promise<T = ()> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("void", &self.shared.void)
            .field("done", &self.shared.done.load(Ordering::Acquire))
            .finish()
    }
}

impl<T: Send + 'static> Promise<T> {
    /// 构造绑定 `executor` 的未完成 Promise，不允许取消。
    ///
    /// 绝大多数传输操作一旦发起便无法撤回，因此默认构造拒绝 `try_cancel`。
    pub fn new(executor: Arc<dyn EventExecutor>, services: &CoreServices) -> Self {
        Self::build(executor, services, true, false)
    }

    /// 构造允许协作取消的 Promise。
    pub fn cancellable(executor: Arc<dyn EventExecutor>, services: &CoreServices) -> Self {
        Self::build(executor, services, true, true)
    }

    /// 构造 void Promise：调用方声明放弃完成跟踪。
    ///
    /// # 契约说明
    /// - 监听与等待操作返回 [`codes::FUTURE_VOID_OPERATION`] 错误；
    /// - `is_done` / `is_success` 恒为真，`cause` 恒为空；
    /// - 写方的 `try_success` / `try_failure` 被接受并丢弃，传输实现无需区分。
    pub fn void(executor: Arc<dyn EventExecutor>, services: &CoreServices) -> Self {
        Self::build(executor, services, false, false)
    }

    fn build(
        executor: Arc<dyn EventExecutor>,
        services: &CoreServices,
        tracked: bool,
        cancellable: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: spin::Mutex::new(State {
                    outcome: None,
                    listeners: Vec::new(),
                    next_listener_id: 0,
                    notify_scheduled: false,
                    #[cfg(feature = "std")]
                    waiters: Vec::new(),
                }),
                done: AtomicBool::new(false),
                executor,
                logger: Arc::clone(services.logger()),
                cancellable,
                void: !tracked,
            }),
        }
    }

    /// Future 是否已进入终态。void 变体恒为真。
    pub fn is_done(&self) -> bool {
        self.shared.void || self.shared.done.load(Ordering::Acquire)
    }

    /// Future 是否以成功终结。void 变体恒为真。
    pub fn is_success(&self) -> bool {
        if self.shared.void {
            return true;
        }
        matches!(
            self.shared.state.lock().outcome,
            Some(Outcome::Success(_))
        )
    }

    /// Future 是否因取消终结。
    pub fn is_cancelled(&self) -> bool {
        if self.shared.void {
            return false;
        }
        matches!(self.shared.state.lock().outcome, Some(Outcome::Cancelled))
    }

    /// 该 Promise 是否接受 `try_cancel`。
    pub fn is_cancellable(&self) -> bool {
        self.shared.cancellable
    }

    /// 是否为 void 变体。
    pub fn is_void(&self) -> bool {
        self.shared.void
    }

    /// 获取失败或取消的原因；未终结或成功时返回 `None`。
    pub fn cause(&self) -> Option<CoreError> {
        if self.shared.void {
            return None;
        }
        match self.shared.state.lock().outcome.as_ref() {
            Some(Outcome::Failure(error)) => Some(error.clone()),
            Some(Outcome::Cancelled) => Some(cancelled_error()),
            _ => None,
        }
    }

    /// 尝试以成功终结。返回是否赢得终态迁移。
    pub fn try_success(&self, value: T) -> bool {
        if self.shared.void {
            return true;
        }
        self.complete(Outcome::Success(value))
    }

    /// 尝试以失败终结。返回是否赢得终态迁移。
    pub fn try_failure(&self, error: CoreError) -> bool {
        if self.shared.void {
            return true;
        }
        self.complete(Outcome::Failure(error))
    }

    /// 尝试取消。仅当构造时声明可取消且尚未终结时成功。
    pub fn try_cancel(&self) -> bool {
        if self.shared.void || !self.shared.cancellable {
            return false;
        }
        self.complete(Outcome::Cancelled)
    }

    /// 注册完成监听器。
    ///
    /// # 契约说明（What）
    /// - 注册与终态迁移互斥进行：Future 未终结时监听器入队等待通知，已终结时
    ///   立即在绑定执行器上调度。
    /// - 通知顺序为注册序；通知中注册的监听器进入下一批，不递归。
    /// - 返回的 [`ListenerHandle`] 是移除该监听器的唯一凭据。
    ///
    /// # 错误
    /// - void 变体返回 [`codes::FUTURE_VOID_OPERATION`]。
    pub fn add_listener<F>(&self, listener: F) -> Result<ListenerHandle, CoreError>
    where
        F: FnOnce(&Promise<T>) + Send + 'static,
    {
        if self.shared.void {
            return Err(void_operation_error());
        }
        let (handle, schedule) = {
            let mut state = self.shared.state.lock();
            let id = state.next_listener_id;
            state.next_listener_id += 1;
            state.listeners.push((id, Box::new(listener)));
            let schedule = state.outcome.is_some() && !state.notify_scheduled;
            if schedule {
                state.notify_scheduled = true;
            }
            (ListenerHandle(id), schedule)
        };
        if schedule {
            self.schedule_notification();
        }
        Ok(handle)
    }

    /// 批量注册监听器，语义与逐个调用 [`Promise::add_listener`] 一致。
    pub fn add_listeners(
        &self,
        listeners: impl IntoIterator<Item = CompletionListener<T>>,
    ) -> Result<Vec<ListenerHandle>, CoreError> {
        let mut handles = Vec::new();
        for listener in listeners {
            handles.push(self.add_listener(listener)?);
        }
        Ok(handles)
    }

    /// 移除尚未通知的监听器。尽力而为：已通知或不存在时静默返回。
    pub fn remove_listener(&self, handle: ListenerHandle) {
        if self.shared.void {
            return;
        }
        self.shared
            .state
            .lock()
            .listeners
            .retain(|(id, _)| *id != handle.0);
    }

    fn complete(&self, outcome: Outcome<T>) -> bool {
        let schedule;
        #[cfg(feature = "std")]
        let waiters;
        {
            let mut state = self.shared.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            self.shared.done.store(true, Ordering::Release);
            schedule = !state.listeners.is_empty() && !state.notify_scheduled;
            if schedule {
                state.notify_scheduled = true;
            }
            #[cfg(feature = "std")]
            {
                waiters = mem::take(&mut state.waiters);
            }
        }
        #[cfg(feature = "std")]
        for waiter in waiters {
            waiter.unpark();
        }
        if schedule {
            self.schedule_notification();
        }
        true
    }

    fn schedule_notification(&self) {
        if self.shared.executor.in_executor_thread() {
            self.run_listeners();
        } else {
            let promise = self.clone();
            self.shared
                .executor
                .execute(Box::new(move || promise.run_listeners()));
        }
    }

    /// 在执行器线程上排空监听器列表。
    ///
    /// 一批取走的监听器执行期间，新注册的监听器落入下一轮循环；列表清空后才
    /// 复位调度标记，保证不丢通知也不重复调度。
    fn run_listeners(&self) {
        loop {
            let batch = {
                let mut state = self.shared.state.lock();
                if state.listeners.is_empty() {
                    state.notify_scheduled = false;
                    return;
                }
                mem::take(&mut state.listeners)
            };
            for (_, listener) in batch {
                self.invoke_listener(listener);
            }
        }
    }

    #[cfg(feature = "std")]
    fn invoke_listener(&self, listener: ListenerFn<T>) {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(self)));
        if outcome.is_err() {
            self.shared
                .logger
                .warn("future.listener_panicked 监听器回调 panic，已跳过", None);
        }
    }

    #[cfg(not(feature = "std"))]
    fn invoke_listener(&self, listener: ListenerFn<T>) {
        listener(self);
    }

    /// 阻塞等待终态。
    ///
    /// # 错误
    /// - 在绑定执行器的线程上调用返回 [`codes::FUTURE_DEADLOCK`]；
    /// - void 变体返回 [`codes::FUTURE_VOID_OPERATION`]。
    #[cfg(feature = "std")]
    pub fn wait(&self) -> Result<(), CoreError> {
        self.wait_inner(None).map(|_| ())
    }

    /// 阻塞等待终态，至多 `timeout`。返回是否在限期内终结。
    ///
    /// 超时不是错误：Future 保持 Pending，调用方可以重试或改用监听器。
    #[cfg(feature = "std")]
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, CoreError> {
        self.wait_inner(Some(timeout))
    }

    /// 阻塞等待终态，失败或取消时重新抛出原因。
    #[cfg(feature = "std")]
    pub fn sync(&self) -> Result<(), CoreError> {
        self.wait()?;
        match self.shared.state.lock().outcome.as_ref() {
            Some(Outcome::Failure(error)) => Err(error.clone()),
            Some(Outcome::Cancelled) => Err(cancelled_error()),
            _ => Ok(()),
        }
    }

    #[cfg(feature = "std")]
    fn wait_inner(&self, timeout: Option<Duration>) -> Result<bool, CoreError> {
        if self.shared.void {
            return Err(void_operation_error());
        }
        if self.shared.done.load(Ordering::Acquire) {
            return Ok(true);
        }
        if self.shared.executor.in_executor_thread() {
            return Err(CoreError::new(
                codes::FUTURE_DEADLOCK,
                "在负责完成该 Future 的执行器线程上发起阻塞等待",
            ));
        }
        {
            let mut state = self.shared.state.lock();
            if state.outcome.is_some() {
                return Ok(true);
            }
            state.waiters.push(thread::current());
        }
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let completed = loop {
            if self.shared.done.load(Ordering::Acquire) {
                break true;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break false;
                    }
                    thread::park_timeout(deadline - now);
                }
                None => thread::park(),
            }
        };
        let current = thread::current().id();
        self.shared
            .state
            .lock()
            .waiters
            .retain(|waiter| waiter.id() != current);
        Ok(completed)
    }
}

fn cancelled_error() -> CoreError {
    CoreError::new(codes::FUTURE_CANCELLED, "操作已被取消")
}

fn void_operation_error() -> CoreError {
    CoreError::new(
        codes::FUTURE_VOID_OPERATION,
        "void Future 不支持监听或等待",
    )
}
