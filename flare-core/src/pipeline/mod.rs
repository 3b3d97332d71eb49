//! 流水线模块：Handler 链、上下文、能力掩码与端点属性。
//!
//! ## 模块说明（What）
//! - [`pipeline`]：双向链本体、头尾哨兵、变更 API 与派发入口。
//! - [`context`]：每 (Handler, Pipeline) 节点与双向派发面。
//! - [`handler`]：生命周期基契约、入站/出站事件面与变体封装。
//! - [`mask`]：每上下文一次性计算的能力位集。
//! - [`attributes`]：端点级类型安全属性存储。
//!
//! ## 执行语义速览
//! - 入站事件头到尾，出站操作尾到头；两个方向都按能力位 O(1) 跳过无关节点。
//! - 同一上下文的全部回调在其钉住的串行执行器上运行；跨执行器的事件在节点
//!   边界切换任务。
//! - 链表可在事件在途时变更：调用方同步看到链表更新，生命周期回调按执行器
//!   纪律延后。

pub mod attributes;
pub mod context;
pub mod handler;
pub mod mask;
#[allow(clippy::module_inception)]
pub mod pipeline;

pub use attributes::{Attribute, AttributeKey, AttributeMap};
pub use context::HandlerContext;
pub use handler::{DuplexHandler, Handler, HandlerSlot, InboundHandler, OutboundHandler};
pub use mask::{HandlerMask, InboundOps, OutboundOps};
pub use pipeline::Pipeline;
