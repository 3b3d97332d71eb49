//! Handler 合同：生命周期基契约、入站/出站事件面与变体封装。
//!
//! # 设计背景（Why）
//! - 入站事件从传输层流向业务层（头到尾），出站操作反向（尾到头）；两个方向的
//!   方法集分别固化为 [`InboundHandler`] 与 [`OutboundHandler`]，全双工 Handler
//!   同时实现两者。
//! - 所有事件方法都提供“转发给下一个”的默认实现，Handler 只需覆盖关心的方法；
//!   配合能力位声明，链式遍历可以 O(1) 跳过纯转发节点。
//!
//! # 契约说明（What）
//! - 方法返回 `Result<(), CoreError>`：入站错误由派发器转为从下一跳开始的
//!   `exception_caught` 事件，出站错误以失败完成关联的 Promise。
//! - 生命周期回调定义在 [`Handler`] 基契约上：`handler_added` 完成前 Handler
//!   不会收到任何事件；`handler_removed` 的错误被记录并吞掉。
//! - 未声明 [`Handler::is_shareable`] 的实例在全进程范围内至多绑定一个上下文。

use alloc::sync::Arc;
use core::any::{TypeId, type_name};
use core::fmt;

use hashbrown::HashSet;

use super::context::HandlerContext;
use super::mask::{HandlerMask, InboundOps, OutboundOps};
use crate::channel::{PipelineMessage, TransportSocketAddr, UserEvent};
use crate::error::{CoreError, codes};
use crate::future::Promise;

/// Handler 生命周期基契约。
///
/// # 契约说明（What）
/// - `handler_added`：上下文挂入链表后、在其执行器上调用；返回错误会导致上下文
///   被立即移除并以 `exception_caught` 事件上报原因。
/// - `handler_removed`：上下文摘出链表后、在其执行器上调用；错误被记录并吞掉。
/// - `is_shareable`：声明同一实例可同时存在于多个上下文；默认不可共享。
pub trait Handler: Send + Sync + 'static {
    /// 上下文挂入流水线后的回调。
    fn handler_added(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        Ok(())
    }

    /// 上下文摘出流水线后的回调。
    fn handler_removed(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        Ok(())
    }

    /// 声明实例可被多个上下文共享。
    fn is_shareable(&self) -> bool {
        false
    }
}

/// 入站事件处理合同，面向从传输层到业务层的正向数据流。
///
/// # 契约说明（What）
/// - 所有方法在上下文绑定的执行器上调用，必须无阻塞。
/// - 默认实现原样转发事件；覆盖方法的 Handler 应同步收窄
///   [`Self::inbound_ops`] 声明之外的方法保持默认。
/// - `on_channel_read` 收到消息即持有所有权：要么转发，要么就地消费。
pub trait InboundHandler: Handler {
    /// 声明本 Handler 覆盖的入站方法集合。
    ///
    /// 默认返回全集：未声明的 Handler 对每个事件都会被调用（默认实现转发，
    /// 行为不变，仅失去跳过优化）。
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::ALL
    }

    /// 端点完成注册。
    fn on_channel_registered(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        ctx.fire_channel_registered();
        Ok(())
    }

    /// 端点进入活跃态。
    fn on_channel_active(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        ctx.fire_channel_active();
        Ok(())
    }

    /// 端点离开活跃态。
    fn on_channel_inactive(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        ctx.fire_channel_inactive();
        Ok(())
    }

    /// 处理读到的消息。
    fn on_channel_read(&self, ctx: &HandlerContext, msg: PipelineMessage) -> Result<(), CoreError> {
        ctx.fire_channel_read(msg);
        Ok(())
    }

    /// 一批读取完成。
    fn on_channel_read_complete(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        ctx.fire_channel_read_complete();
        Ok(())
    }

    /// 用户事件广播。
    fn on_user_event(&self, ctx: &HandlerContext, event: UserEvent) -> Result<(), CoreError> {
        ctx.fire_user_event_triggered(event);
        Ok(())
    }

    /// 可写性变化。
    fn on_writability_changed(
        &self,
        ctx: &HandlerContext,
        is_writable: bool,
    ) -> Result<(), CoreError> {
        ctx.fire_channel_writability_changed(is_writable);
        Ok(())
    }

    /// 异常传播。
    fn on_exception_caught(&self, ctx: &HandlerContext, error: CoreError) -> Result<(), CoreError> {
        ctx.fire_exception_caught(error);
        Ok(())
    }

    /// 端点完成注销。
    fn on_channel_unregistered(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        ctx.fire_channel_unregistered();
        Ok(())
    }
}

/// 出站操作处理合同，面向从业务层到传输层的逆向数据流。
///
/// # 契约说明（What）
/// - 每个携带 [`Promise`] 的方法都收到该 Promise 的一个克隆；继续转发时必须把
///   它交给下一跳，自行消费时必须亲自完成它。
/// - 返回错误时派发器以该错误失败完成 Promise。
pub trait OutboundHandler: Handler {
    /// 声明本 Handler 覆盖的出站方法集合，语义同
    /// [`InboundHandler::inbound_ops`]。
    fn outbound_ops(&self) -> OutboundOps {
        OutboundOps::ALL
    }

    /// 绑定本地地址。
    fn on_bind(
        &self,
        ctx: &HandlerContext,
        addr: TransportSocketAddr,
        promise: Promise,
    ) -> Result<(), CoreError> {
        ctx.bind_with(addr, promise);
        Ok(())
    }

    /// 连接远端。
    fn on_connect(
        &self,
        ctx: &HandlerContext,
        remote: TransportSocketAddr,
        local: Option<TransportSocketAddr>,
        promise: Promise,
    ) -> Result<(), CoreError> {
        ctx.connect_with(remote, local, promise);
        Ok(())
    }

    /// 断开连接。
    fn on_disconnect(&self, ctx: &HandlerContext, promise: Promise) -> Result<(), CoreError> {
        ctx.disconnect_with(promise);
        Ok(())
    }

    /// 关闭端点。
    fn on_close(&self, ctx: &HandlerContext, promise: Promise) -> Result<(), CoreError> {
        ctx.close_with(promise);
        Ok(())
    }

    /// 从反应器注销。
    fn on_deregister(&self, ctx: &HandlerContext, promise: Promise) -> Result<(), CoreError> {
        ctx.deregister_with(promise);
        Ok(())
    }

    /// 请求一轮读取。
    fn on_read(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        ctx.read();
        Ok(())
    }

    /// 写出消息。
    fn on_write(
        &self,
        ctx: &HandlerContext,
        msg: PipelineMessage,
        promise: Promise,
    ) -> Result<(), CoreError> {
        ctx.write_with(msg, promise);
        Ok(())
    }

    /// 冲刷写缓冲。
    fn on_flush(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        ctx.flush();
        Ok(())
    }
}

/// 同时处理入站与出站的全双工 Handler。
///
/// 任何实现 `InboundHandler + OutboundHandler` 的类型自动实现本 Trait。
pub trait DuplexHandler: InboundHandler + OutboundHandler {}

impl<T> DuplexHandler for T where T: InboundHandler + OutboundHandler {}

enum HandlerVariant {
    Inbound(Arc<dyn InboundHandler>),
    Outbound(Arc<dyn OutboundHandler>),
    Duplex(Arc<dyn DuplexHandler>),
}

impl Clone for HandlerVariant {
    fn clone(&self) -> Self {
        match self {
            Self::Inbound(h) => Self::Inbound(Arc::clone(h)),
            Self::Outbound(h) => Self::Outbound(Arc::clone(h)),
            Self::Duplex(h) => Self::Duplex(Arc::clone(h)),
        }
    }
}

/// Handler 变体封装：声明方向的同时记录具体类型信息。
///
/// # 设计背景（Why）
/// - 流水线按变体决定事件派发面；按构造时捕获的 [`TypeId`] 支持类型化的查找
///   与变更操作，并为变参插入生成默认名称。
///
/// # 契约说明（What）
/// - `inbound` / `outbound` / `duplex` 接管新实例；`shared_*` 复用既有 `Arc`，
///   配合可共享 Handler 在多条流水线间复用同一实例。
/// - 变体声明决定事件面：以 `inbound` 封装的全双工类型只参与入站派发。
pub struct HandlerSlot {
    variant: HandlerVariant,
    type_id: TypeId,
    type_label: &'static str,
}

impl Clone for HandlerSlot {
    fn clone(&self) -> Self {
        Self {
            variant: self.variant.clone(),
            type_id: self.type_id,
            type_label: self.type_label,
        }
    }
}

impl fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.variant {
            HandlerVariant::Inbound(_) => "inbound",
            HandlerVariant::Outbound(_) => "outbound",
            HandlerVariant::Duplex(_) => "duplex",
        };
        f.debug_struct("HandlerSlot")
            .field("direction", &direction)
            .field("type", &self.type_label)
            .finish()
    }
}

impl HandlerSlot {
    /// 封装入站 Handler。
    pub fn inbound<H: InboundHandler>(handler: H) -> Self {
        Self::shared_inbound(Arc::new(handler))
    }

    /// 封装出站 Handler。
    pub fn outbound<H: OutboundHandler>(handler: H) -> Self {
        Self::shared_outbound(Arc::new(handler))
    }

    /// 封装全双工 Handler。
    pub fn duplex<H: DuplexHandler>(handler: H) -> Self {
        Self::shared_duplex(Arc::new(handler))
    }

    /// 以共享引用封装入站 Handler。
    pub fn shared_inbound<H: InboundHandler>(handler: Arc<H>) -> Self {
        Self {
            variant: HandlerVariant::Inbound(handler),
            type_id: TypeId::of::<H>(),
            type_label: type_name::<H>(),
        }
    }

    /// 以共享引用封装出站 Handler。
    pub fn shared_outbound<H: OutboundHandler>(handler: Arc<H>) -> Self {
        Self {
            variant: HandlerVariant::Outbound(handler),
            type_id: TypeId::of::<H>(),
            type_label: type_name::<H>(),
        }
    }

    /// 以共享引用封装全双工 Handler。
    pub fn shared_duplex<H: DuplexHandler>(handler: Arc<H>) -> Self {
        Self {
            variant: HandlerVariant::Duplex(handler),
            type_id: TypeId::of::<H>(),
            type_label: type_name::<H>(),
        }
    }

    /// 被封装 Handler 的具体类型标识。
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// 被封装 Handler 的类型名（完整路径）。
    pub fn type_label(&self) -> &'static str {
        self.type_label
    }

    /// 是否声明可共享。
    pub fn is_shareable(&self) -> bool {
        self.base().is_shareable()
    }

    pub(crate) fn base(&self) -> &dyn Handler {
        match &self.variant {
            HandlerVariant::Inbound(h) => h.as_ref(),
            HandlerVariant::Outbound(h) => h.as_ref(),
            HandlerVariant::Duplex(h) => h.as_ref(),
        }
    }

    pub(crate) fn inbound_view(&self) -> Option<&dyn InboundHandler> {
        match &self.variant {
            HandlerVariant::Inbound(h) => Some(h.as_ref()),
            HandlerVariant::Duplex(h) => Some(h.as_ref()),
            HandlerVariant::Outbound(_) => None,
        }
    }

    pub(crate) fn outbound_view(&self) -> Option<&dyn OutboundHandler> {
        match &self.variant {
            HandlerVariant::Outbound(h) => Some(h.as_ref()),
            HandlerVariant::Duplex(h) => Some(h.as_ref()),
            HandlerVariant::Inbound(_) => None,
        }
    }

    /// 根据变体声明与能力声明合成上下文掩码。
    pub(crate) fn mask(&self) -> HandlerMask {
        match &self.variant {
            HandlerVariant::Inbound(h) => HandlerMask::new(h.inbound_ops(), OutboundOps::NONE),
            HandlerVariant::Outbound(h) => HandlerMask::new(InboundOps::NONE, h.outbound_ops()),
            HandlerVariant::Duplex(h) => {
                let inbound: &dyn InboundHandler = h.as_ref();
                let outbound: &dyn OutboundHandler = h.as_ref();
                HandlerMask::new(inbound.inbound_ops(), outbound.outbound_ops())
            }
        }
    }

    /// 实例身份：数据指针，独立于变体封装与虚表。
    pub(crate) fn identity(&self) -> usize {
        match &self.variant {
            HandlerVariant::Inbound(h) => Arc::as_ptr(h) as *const () as usize,
            HandlerVariant::Outbound(h) => Arc::as_ptr(h) as *const () as usize,
            HandlerVariant::Duplex(h) => Arc::as_ptr(h) as *const () as usize,
        }
    }
}

static BOUND_HANDLERS: spin::Lazy<spin::Mutex<HashSet<usize>>> =
    spin::Lazy::new(|| spin::Mutex::new(HashSet::new()));

/// 登记非共享实例的独占绑定。
///
/// 进程级登记表以实例数据指针为键：同一个未声明可共享的实例无论被封装进多少
/// 个 [`HandlerSlot`]、投向多少条流水线，同一时刻只允许一个上下文持有它。
pub(crate) fn acquire_exclusive_binding(slot: &HandlerSlot) -> Result<(), CoreError> {
    if slot.is_shareable() {
        return Ok(());
    }
    let mut bound = BOUND_HANDLERS.lock();
    if bound.insert(slot.identity()) {
        Ok(())
    } else {
        Err(CoreError::new(
            codes::PIPELINE_NOT_SHAREABLE,
            "Handler 实例未声明可共享，无法绑定第二个上下文",
        ))
    }
}

/// 释放独占绑定，与 [`acquire_exclusive_binding`] 成对调用。
pub(crate) fn release_exclusive_binding(slot: &HandlerSlot) {
    if !slot.is_shareable() {
        BOUND_HANDLERS.lock().remove(&slot.identity());
    }
}
