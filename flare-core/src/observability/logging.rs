use crate::Error;
use alloc::borrow::Cow;

/// 日志级别枚举，参考 OpenTelemetry `SeverityNumber` 与 `tracing` crate 的交集。
///
/// # 契约说明（What）
/// - `Info` 表示业务常规事件，`Warn` 表示潜在风险，`Error` 表示故障，`Fatal`
///   代表不可恢复错误。
/// - **后置条件**：日志导出器可依据级别映射到目标系统（如 syslog、OpenTelemetry
///   LogData）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// 描述单个属性键值对的结构化条目。
///
/// # 设计背景（Why）
/// - 借鉴结构化日志中的 Key-Value Field 设计，键值均采用 `Cow<'a, str>`，
///   既支持静态常量也支持运行时拼接。
///
/// # 契约说明（What）
/// - **前置条件**：调用方需保证键名低基数、蛇形命名，避免日志存储爆炸。
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue<'a> {
    pub key: Cow<'a, str>,
    pub value: Cow<'a, str>,
}

impl<'a> KeyValue<'a> {
    /// 构建新的属性键值对。
    pub fn new(key: impl Into<Cow<'a, str>>, value: impl Into<Cow<'a, str>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// 结构化日志字段集合。
pub type AttributeSet<'a> = &'a [KeyValue<'a>];

/// 单条结构化日志记录。
///
/// # 逻辑解析（How）
/// - `message` 使用 `Cow<'a, str>`，既支持静态字符串也支持动态构建的消息。
/// - `target` 表示日志分类，可对齐 `tracing` 的 Target。
/// - `error` 允许携带实现 [`Error`] 的对象，用于根因追溯。
///
/// # 契约说明（What）
/// - **前置条件**：`attributes` 切片需在 [`Logger::log`] 返回前保持有效。
/// - **后置条件**：记录提交给 [`Logger`] 后应视为不可变对象。
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub message: Cow<'a, str>,
    pub severity: LogSeverity,
    pub target: Option<Cow<'a, str>>,
    pub error: Option<&'a dyn Error>,
    pub attributes: AttributeSet<'a>,
}

impl<'a> LogRecord<'a> {
    /// 构建新的日志记录，仅包含引用，不进行任何复制。
    pub fn new(
        message: impl Into<Cow<'a, str>>,
        severity: LogSeverity,
        target: Option<impl Into<Cow<'a, str>>>,
        error: Option<&'a dyn Error>,
        attributes: AttributeSet<'a>,
    ) -> Self {
        Self {
            message: message.into(),
            severity,
            target: target.map(Into::into),
            error,
            attributes,
        }
    }
}

/// 日志接口的核心契约。
///
/// # 设计背景（Why）
/// - 统一框架对宿主日志实现的依赖；`log` 为唯一必需方法，各级别便捷方法内部
///   构造 [`LogRecord`] 再调用 `log`，确保所有路径共享相同逻辑。
///
/// # 契约说明（What）
/// - **后置条件**：实现应尽量保证非阻塞，必要时可将日志异步写入后台线程；
///   流水线的事件派发路径假定 `log` 不会长时间占用调用线程。
pub trait Logger: Send + Sync + 'static {
    /// 提交结构化日志。
    fn log(&self, record: &LogRecord<'_>);

    /// 输出 DEBUG 日志（无额外字段）。
    fn debug(&self, message: &str) {
        self.debug_with_fields(message, &[]);
    }

    /// 输出带字段的 DEBUG 日志。
    fn debug_with_fields(&self, message: &str, attributes: AttributeSet<'_>) {
        let record = LogRecord::new(
            message,
            LogSeverity::Debug,
            None::<Cow<'_, str>>,
            None,
            attributes,
        );
        self.log(&record);
    }

    /// 输出 INFO 日志（无额外字段）。
    fn info(&self, message: &str) {
        self.info_with_fields(message, &[]);
    }

    /// 输出带字段的 INFO 日志。
    fn info_with_fields(&self, message: &str, attributes: AttributeSet<'_>) {
        let record = LogRecord::new(
            message,
            LogSeverity::Info,
            None::<Cow<'_, str>>,
            None,
            attributes,
        );
        self.log(&record);
    }

    /// 输出 WARN 日志（无额外字段）。
    fn warn(&self, message: &str, error: Option<&dyn Error>) {
        self.warn_with_fields(message, error, &[]);
    }

    /// 输出带字段的 WARN 日志。
    fn warn_with_fields(
        &self,
        message: &str,
        error: Option<&dyn Error>,
        attributes: AttributeSet<'_>,
    ) {
        let record = LogRecord::new(
            message,
            LogSeverity::Warn,
            None::<Cow<'_, str>>,
            error,
            attributes,
        );
        self.log(&record);
    }

    /// 输出 ERROR 日志（无额外字段）。
    fn error(&self, message: &str, error: Option<&dyn Error>) {
        self.error_with_fields(message, error, &[]);
    }

    /// 输出带字段的 ERROR 日志。
    fn error_with_fields(
        &self,
        message: &str,
        error: Option<&dyn Error>,
        attributes: AttributeSet<'_>,
    ) {
        let record = LogRecord::new(
            message,
            LogSeverity::Error,
            None::<Cow<'_, str>>,
            error,
            attributes,
        );
        self.log(&record);
    }
}

/// 丢弃全部记录的空日志器，用作 [`crate::runtime::CoreServices`] 的默认值与测试桩。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _record: &LogRecord<'_>) {}
}
