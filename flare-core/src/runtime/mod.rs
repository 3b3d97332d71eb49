//! 运行时契约：串行执行器与核心服务集合。
//!
//! # 设计背景（Why）
//! - 流水线的整个 Handler 模型建立在“每上下文单线程”的不变量之上：一个上下文的
//!   全部回调只在它绑定的串行执行器上运行。本模块定义该执行器契约，并提供两个
//!   参考实现。
//! - 任务以 `Box<dyn FnOnce()>` 形式提交而非 `async` Future：流水线的控制流是
//!   任务驱动的，事件派发与监听器通知天然映射为一次性闭包。
//!
//! # 模块说明（What）
//! - [`executor`]：[`EventExecutor`] / [`EventExecutorGroup`] 契约与
//!   [`ImmediateExecutor`]。
//! - [`single_thread`]（`std`）：专用线程执行器与轮询分配组，作为默认的
//!   反应器执行器替身。
//! - [`CoreServices`]：注入流水线与 Future 的框架服务集合。

pub mod executor;
#[cfg(feature = "std")]
pub mod single_thread;

pub use executor::{EventExecutor, EventExecutorGroup, ImmediateExecutor, Task};
#[cfg(feature = "std")]
pub use single_thread::{MultiThreadExecutorGroup, SingleThreadExecutor};

use crate::observability::{Logger, NoopLogger};
use alloc::sync::Arc;

/// 框架运行时服务集合，构造流水线与 Promise 时注入。
///
/// # 契约说明（What）
/// - 目前仅承载日志门面；集合整体可廉价克隆，内部均为共享引用。
/// - **后置条件**：`Default` 构造返回挂载 [`NoopLogger`] 的集合，适合测试与
///   嵌入式场景。
#[derive(Clone)]
pub struct CoreServices {
    logger: Arc<dyn Logger>,
}

impl CoreServices {
    /// 以给定日志器构造服务集合。
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        Self { logger }
    }

    /// 获取日志门面。
    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }
}

impl Default for CoreServices {
    fn default() -> Self {
        Self::new(Arc::new(NoopLogger))
    }
}
