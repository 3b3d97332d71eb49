#![cfg_attr(not(feature = "std"), no_std)]
#![doc = "flare-core: 事件驱动网络框架的通道流水线核心。"]
#![doc = ""]
#![doc = "本 Crate 提供四块彼此咬合的机制："]
#![doc = "1. [`pipeline`]：以头尾哨兵包裹的 Handler 双向链，支持运行期增删改；"]
#![doc = "2. [`runtime`]：串行执行器契约，保证同一上下文的回调单线程执行；"]
#![doc = "3. [`future`]：携带监听器扇出与有界等待的完成通知 Promise；"]
#![doc = "4. [`channel`]：传输端点与流水线之间的最小接口约定。"]
#![doc = ""]
#![doc = "默认启用 `std` 特性以解锁阻塞等待与专用线程执行器；关闭后退化为"]
#![doc = "`no_std + alloc` 的纯契约构建，所有调度语义保持不变。"]

extern crate alloc;

pub mod channel;
pub mod error;
pub mod future;
pub mod observability;
pub mod pipeline;
pub mod runtime;
pub mod sync;

pub use channel::{Channel, PipelineMessage, Transport, TransportSocketAddr, UserEvent};
pub use error::{CoreError, ErrorCause, codes};
pub use future::{CompletionListener, ListenerHandle, Promise};
pub use observability::{AttributeSet, KeyValue, LogRecord, LogSeverity, Logger, NoopLogger};
pub use pipeline::{
    Attribute, AttributeKey, AttributeMap, DuplexHandler, Handler, HandlerContext, HandlerMask,
    HandlerSlot, InboundHandler, InboundOps, OutboundHandler, OutboundOps, Pipeline,
};
pub use runtime::{CoreServices, EventExecutor, EventExecutorGroup, ImmediateExecutor, Task};
#[cfg(feature = "std")]
pub use runtime::{MultiThreadExecutorGroup, SingleThreadExecutor};

use alloc::boxed::Box;
use core::fmt;

/// `flare-core` 中所有错误必须实现的 `no_std` 基础 Trait。
///
/// # 设计背景（Why）
/// - `std::error::Error` 在 `no_std` 环境中不可用，因此需要一个对象安全、与平台无关的
///   错误抽象来串联底层错误链。
/// - 该 Trait 作为所有错误类型的最小公共接口，帮助框架在 `alloc` 场景下完成跨模块错误传递。
///
/// # 逻辑解析（How）
/// - 约束实现者提供 `Debug` 与 `Display`，便于日志与可观测性收集。
/// - `source` 方法递归返回链路上的上游错误，与 `std::error::Error::source` 语义一致。
///
/// # 契约说明（What）
/// - **前置条件**：需要跨线程共享的实现类型应同时满足 `Send + Sync + 'static`，
///   并通过 [`ErrorCause`] 别名传递。
/// - **后置条件**：`source` 返回的引用生命周期受限于 `self`，以防悬垂引用。
pub trait Error: fmt::Debug + fmt::Display {
    /// 返回当前错误的上游来源。
    fn source(&self) -> Option<&(dyn Error + 'static)>;
}

impl<E> Error for Box<E>
where
    E: Error + ?Sized,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        (**self).source()
    }
}
