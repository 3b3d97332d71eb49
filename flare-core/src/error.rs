use crate::Error;
use alloc::{string::String, sync::Arc};
use core::fmt;

/// `CoreError` 是流水线核心统一的错误域。
///
/// # 设计背景（Why）
/// - 框架需要跨层传递稳定的错误码，以便日志系统与上层调度器进行机器可读的根因识别。
/// - 错误必须运行在 `no_std` 环境下，因此不依赖 `std::error::Error`，底层原因通过
///   [`ErrorCause`] 串联。
///
/// # 逻辑解析（How）
/// - 结构体以 Builder 风格的 `with_cause` 累积上下文；`code` 承载稳定错误码，
///   `message` 面向人类调试。
/// - 底层原因保存在 `Arc` 中：同一个失败原因会同时交给完成 Future 的全部监听器
///   与每一个 `sync()` 调用方，错误必须可以廉价克隆。
///
/// # 契约说明（What）
/// - **前置条件**：`code` 应在 [`codes`] 模块中声明，或遵守 `namespace.reason` 命名。
/// - **后置条件**：所有构造方法都产生拥有所有权的 `CoreError`，可以跨线程移动与克隆。
#[derive(Clone, Debug)]
pub struct CoreError {
    code: &'static str,
    message: String,
    cause: Option<ErrorCause>,
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程共享。
pub type ErrorCause = Arc<dyn Error + Send + Sync + 'static>;

impl CoreError {
    /// 使用稳定错误码与消息创建 `CoreError`。
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取人类可读的错误描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 附带一个底层原因，形成错误链。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// 获取可选的底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|shared| shared.as_ref() as &(dyn Error + 'static))
    }
}

/// 框架内置的错误码常量集合，确保可观测性系统具有稳定识别符。
pub mod codes {
    /// 以重复名称向流水线插入 Handler。
    pub const PIPELINE_DUPLICATE_NAME: &str = "pipeline.duplicate_name";
    /// 变更操作引用了不存在的 Handler 名称或类型。
    pub const PIPELINE_NOT_FOUND: &str = "pipeline.not_found";
    /// Handler 名称为空或缺失。
    pub const PIPELINE_INVALID_NAME: &str = "pipeline.invalid_name";
    /// 流水线处于非法状态，例如出站遍历在哨兵之前断链。
    pub const PIPELINE_ILLEGAL_STATE: &str = "pipeline.illegal_state";
    /// 未声明可共享的 Handler 实例被绑定到多个上下文。
    pub const PIPELINE_NOT_SHAREABLE: &str = "pipeline.not_shareable";
    /// 对 void Future 执行监听或等待操作。
    pub const FUTURE_VOID_OPERATION: &str = "future.void_operation";
    /// 在负责完成该 Future 的执行器线程上发起阻塞等待。
    pub const FUTURE_DEADLOCK: &str = "future.deadlock";
    /// Future 因取消而终止。
    pub const FUTURE_CANCELLED: &str = "future.cancelled";
}
