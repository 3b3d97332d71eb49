//! 可观测性契约：结构化日志门面。
//!
//! # 设计背景（Why）
//! - 流水线核心需要在尾哨兵丢弃消息、监听器失败、`handler_removed` 报错等路径上
//!   留下结构化痕迹，但不应绑定任何具体日志后端。
//! - 本模块提供对象安全的 [`Logger`] 契约，宿主可对接 `tracing`、OpenTelemetry
//!   或自研后端；核心代码只依赖该门面。

pub mod logging;

pub use logging::{AttributeSet, KeyValue, LogRecord, LogSeverity, Logger, NoopLogger};
