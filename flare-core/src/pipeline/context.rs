//! Handler 上下文：链表节点、双向派发面与执行器交接纪律。
//!
//! # 设计背景（Why）
//! - 每个 (Handler, Pipeline) 组合对应一个上下文节点：名称、能力掩码、钉住的
//!   执行器、前后链接与生命周期状态都固化在这里。
//! - 事件派发遵循统一的交接纪律：目标上下文的执行器就是当前线程时内联调用，
//!   否则把事件连同消息所有权一起装入任务投递过去。每次派发是一个独立任务。
//!
//! # 逻辑解析（How）
//! - 链接以读写锁保护：`next` 持强引用（头到尾的存活链），`prev` 持弱引用，
//!   环由此打破；节点被摘除后保留最后一次链接，迟到事件仍能沿既有方向续传。
//! - 生命周期：节点以 `AddPending` 诞生；`handler_added` 在其执行器上成功返回
//!   后进入 `Added`，期间到达的事件缓存在节点上并按序重放；`Removed` 为终态，
//!   终态节点只转发不再调用 Handler。
//!
//! # 契约说明（What）
//! - 入站传播（`fire_*`）从 `next` 方向寻找能力位命中的上下文；出站调用从
//!   `prev` 方向寻找。哨兵掩码全集，遍历必然终止。
//! - 入站派发错误转为从失败节点下一跳开始的 `exception_caught`；出站派发错误
//!   以失败完成关联 Promise；`exception_caught` 自身的错误记录后吞掉。

use alloc::{
    boxed::Box,
    string::String,
    sync::{Arc, Weak},
    vec::Vec,
};
use core::fmt;
use core::mem;
use core::sync::atomic::{AtomicU8, Ordering};

use super::attributes::{Attribute, AttributeKey};
use super::handler::{self, HandlerSlot};
use super::mask::{HandlerMask, InboundOps, OutboundOps};
use super::pipeline::Pipeline;
use crate::channel::{PipelineMessage, TransportSocketAddr, UserEvent};
use crate::error::{CoreError, codes};
use crate::future::Promise;
use crate::runtime::{CoreServices, EventExecutor};

const STATE_ADD_PENDING: u8 = 0;
const STATE_ADDED: u8 = 1;
const STATE_REMOVED: u8 = 2;

struct Links {
    prev: Weak<ContextInner>,
    next: Option<Arc<ContextInner>>,
}

/// 在 `handler_added` 完成前缓存的事件。
///
/// 以数据而非闭包缓存：重放时按节点当前状态选择“调用 Handler”或“原样续传”。
enum PendingEvent {
    ChannelRegistered,
    ChannelActive,
    ChannelInactive,
    ChannelUnregistered,
    ChannelRead(PipelineMessage),
    ChannelReadComplete,
    UserEvent(UserEvent),
    WritabilityChanged(bool),
    ExceptionCaught(CoreError),
    Bind(TransportSocketAddr, Promise),
    Connect(TransportSocketAddr, Option<TransportSocketAddr>, Promise),
    Disconnect(Promise),
    Close(Promise),
    Deregister(Promise),
    Read,
    Write(PipelineMessage, Promise),
    WriteAndFlush(PipelineMessage, Promise),
    Flush,
}

pub(crate) struct ContextInner {
    name: String,
    slot: HandlerSlot,
    mask: HandlerMask,
    executor: Arc<dyn EventExecutor>,
    pipeline: Weak<Pipeline>,
    links: spin::RwLock<Links>,
    state: AtomicU8,
    pending: spin::Mutex<Vec<PendingEvent>>,
    sentinel: bool,
}

impl ContextInner {
    pub(crate) fn new(
        name: String,
        slot: HandlerSlot,
        executor: Arc<dyn EventExecutor>,
        pipeline: Weak<Pipeline>,
        sentinel: bool,
    ) -> Arc<Self> {
        let mask = slot.mask();
        Arc::new(Self {
            name,
            slot,
            mask,
            executor,
            pipeline,
            links: spin::RwLock::new(Links {
                prev: Weak::new(),
                next: None,
            }),
            // 哨兵没有用户生命周期回调，直接以 Added 状态参与派发。
            state: AtomicU8::new(if sentinel {
                STATE_ADDED
            } else {
                STATE_ADD_PENDING
            }),
            pending: spin::Mutex::new(Vec::new()),
            sentinel,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn slot(&self) -> &HandlerSlot {
        &self.slot
    }

    pub(crate) fn executor(&self) -> &Arc<dyn EventExecutor> {
        &self.executor
    }

    pub(crate) fn is_sentinel(&self) -> bool {
        self.sentinel
    }

    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.state() == STATE_REMOVED
    }

    pub(crate) fn handle(self: &Arc<Self>) -> HandlerContext {
        HandlerContext {
            inner: Arc::clone(self),
        }
    }

    fn services(&self) -> CoreServices {
        self.pipeline
            .upgrade()
            .map(|pipeline| pipeline.services().clone())
            .unwrap_or_default()
    }

    fn log_warn(&self, message: &str, error: Option<&CoreError>) {
        if let Some(pipeline) = self.pipeline.upgrade() {
            pipeline
                .services()
                .logger()
                .warn(message, error.map(|error| error as &dyn crate::Error));
        }
    }

    // ---- 链接维护（由流水线在监视器内调用） ----

    pub(crate) fn next(&self) -> Option<Arc<ContextInner>> {
        self.links.read().next.clone()
    }

    pub(crate) fn prev(&self) -> Option<Arc<ContextInner>> {
        self.links.read().prev.upgrade()
    }

    pub(crate) fn set_next(&self, next: Option<Arc<ContextInner>>) {
        self.links.write().next = next;
    }

    pub(crate) fn set_prev(&self, prev: Weak<ContextInner>) {
        self.links.write().prev = prev;
    }

    // ---- 遍历 ----

    fn find_next_inbound(&self, op: InboundOps) -> Option<Arc<ContextInner>> {
        let mut cursor = self.next();
        while let Some(ctx) = cursor {
            if ctx.mask.handles_inbound(op) {
                return Some(ctx);
            }
            cursor = ctx.next();
        }
        None
    }

    fn find_prev_outbound(&self, ops: OutboundOps) -> Option<Arc<ContextInner>> {
        let mut cursor = self.prev();
        while let Some(ctx) = cursor {
            if ctx.mask.handles_any_outbound(ops) {
                return Some(ctx);
            }
            cursor = ctx.prev();
        }
        None
    }

    // ---- 执行器交接 ----

    fn run_or_submit(executor: &Arc<dyn EventExecutor>, task: impl FnOnce() + Send + 'static) {
        if executor.in_executor_thread() {
            task();
        } else {
            executor.execute(Box::new(task));
        }
    }

    /// 事件是否应缓存到待重放队列。缓存决策与入队在队列锁内一次完成，避免与
    /// `handler_added` 后的排空竞争。
    fn buffer_if_pending(
        self: &Arc<Self>,
        build: impl FnOnce() -> PendingEvent,
    ) -> Option<PendingEvent> {
        if self.state() != STATE_ADD_PENDING {
            return Some(build());
        }
        let mut pending = self.pending.lock();
        if self.state() == STATE_ADD_PENDING {
            pending.push(build());
            None
        } else {
            Some(build())
        }
    }

    // ---- 生命周期回调 ----

    pub(crate) fn schedule_handler_added(self: &Arc<Self>) {
        let ctx = Arc::clone(self);
        let executor = Arc::clone(&self.executor);
        Self::run_or_submit(&executor, move || ctx.run_handler_added());
    }

    pub(crate) fn schedule_handler_removed(self: &Arc<Self>) {
        let ctx = Arc::clone(self);
        let executor = Arc::clone(&self.executor);
        Self::run_or_submit(&executor, move || ctx.run_handler_removed());
    }

    fn run_handler_added(self: &Arc<Self>) {
        // 回调尚未运行就被并发摘除：跳过 handler_added，缓冲事件原样续传。
        if self.is_removed() {
            self.drain_pending();
            return;
        }
        let handle = self.handle();
        match self.slot.base().handler_added(&handle) {
            Ok(()) => {
                self.set_state(STATE_ADDED);
                self.drain_pending();
            }
            Err(error) => {
                // handler_added 失败：立即摘除、补发 handler_removed、
                // 已缓存事件原样续传，最后把失败原因作为异常事件上报。
                if let Some(pipeline) = self.pipeline.upgrade() {
                    pipeline.abort_pending_context(self);
                }
                self.set_state(STATE_REMOVED);
                if let Err(removal_error) = self.slot.base().handler_removed(&handle) {
                    self.log_warn(
                        "pipeline.handler_removed_failed handler_removed 回调报错，已吞掉",
                        Some(&removal_error),
                    );
                }
                handler::release_exclusive_binding(&self.slot);
                self.drain_pending();
                handle.fire_exception_caught(error);
            }
        }
    }

    fn run_handler_removed(self: &Arc<Self>) {
        // 失败回滚路径可能已经完成过摘除回调；终态节点不再重复执行。
        if self.is_removed() {
            return;
        }
        // handler_added 尚未运行：不补发 handler_removed（两个回调成对出现），
        // 直接进入终态并续传缓冲事件。
        if self.state() == STATE_ADD_PENDING {
            self.set_state(STATE_REMOVED);
            handler::release_exclusive_binding(&self.slot);
            self.drain_pending();
            return;
        }
        let handle = self.handle();
        if let Err(error) = self.slot.base().handler_removed(&handle) {
            self.log_warn(
                "pipeline.handler_removed_failed handler_removed 回调报错，已吞掉",
                Some(&error),
            );
        }
        self.set_state(STATE_REMOVED);
        handler::release_exclusive_binding(&self.slot);
        self.drain_pending();
    }

    fn drain_pending(self: &Arc<Self>) {
        loop {
            let batch = {
                let mut pending = self.pending.lock();
                if pending.is_empty() {
                    return;
                }
                mem::take(&mut *pending)
            };
            for event in batch {
                self.replay(event);
            }
        }
    }

    fn replay(self: &Arc<Self>, event: PendingEvent) {
        match event {
            PendingEvent::ChannelRegistered => self.do_channel_registered(),
            PendingEvent::ChannelActive => self.do_channel_active(),
            PendingEvent::ChannelInactive => self.do_channel_inactive(),
            PendingEvent::ChannelUnregistered => self.do_channel_unregistered(),
            PendingEvent::ChannelRead(msg) => self.do_channel_read(msg),
            PendingEvent::ChannelReadComplete => self.do_channel_read_complete(),
            PendingEvent::UserEvent(event) => self.do_user_event(event),
            PendingEvent::WritabilityChanged(is_writable) => {
                self.do_writability_changed(is_writable)
            }
            PendingEvent::ExceptionCaught(error) => self.do_exception_caught(error),
            PendingEvent::Bind(addr, promise) => self.do_bind(addr, promise),
            PendingEvent::Connect(remote, local, promise) => self.do_connect(remote, local, promise),
            PendingEvent::Disconnect(promise) => self.do_disconnect(promise),
            PendingEvent::Close(promise) => self.do_close(promise),
            PendingEvent::Deregister(promise) => self.do_deregister(promise),
            PendingEvent::Read => self.do_read(),
            PendingEvent::Write(msg, promise) => self.do_write(msg, promise),
            PendingEvent::WriteAndFlush(msg, promise) => self.do_write_and_flush(msg, promise),
            PendingEvent::Flush => self.do_flush(),
        }
    }

    // ---- 入站派发 ----

    pub(crate) fn invoke_channel_registered(ctx: Arc<ContextInner>) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_channel_registered());
    }

    pub(crate) fn invoke_channel_active(ctx: Arc<ContextInner>) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_channel_active());
    }

    pub(crate) fn invoke_channel_inactive(ctx: Arc<ContextInner>) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_channel_inactive());
    }

    pub(crate) fn invoke_channel_unregistered(ctx: Arc<ContextInner>) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_channel_unregistered());
    }

    pub(crate) fn invoke_channel_read(ctx: Arc<ContextInner>, msg: PipelineMessage) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_channel_read(msg));
    }

    pub(crate) fn invoke_channel_read_complete(ctx: Arc<ContextInner>) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_channel_read_complete());
    }

    pub(crate) fn invoke_user_event(ctx: Arc<ContextInner>, event: UserEvent) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_user_event(event));
    }

    pub(crate) fn invoke_writability_changed(ctx: Arc<ContextInner>, is_writable: bool) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_writability_changed(is_writable));
    }

    pub(crate) fn invoke_exception_caught(ctx: Arc<ContextInner>, error: CoreError) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_exception_caught(error));
    }

    fn do_channel_registered(self: &Arc<Self>) {
        let Some(PendingEvent::ChannelRegistered) =
            self.buffer_if_pending(|| PendingEvent::ChannelRegistered)
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.fire_channel_registered();
        }
        match self.slot.inbound_view() {
            Some(h) => {
                if let Err(error) = h.on_channel_registered(&handle) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.fire_channel_registered(),
        }
    }

    fn do_channel_active(self: &Arc<Self>) {
        let Some(PendingEvent::ChannelActive) =
            self.buffer_if_pending(|| PendingEvent::ChannelActive)
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.fire_channel_active();
        }
        match self.slot.inbound_view() {
            Some(h) => {
                if let Err(error) = h.on_channel_active(&handle) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.fire_channel_active(),
        }
    }

    fn do_channel_inactive(self: &Arc<Self>) {
        let Some(PendingEvent::ChannelInactive) =
            self.buffer_if_pending(|| PendingEvent::ChannelInactive)
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.fire_channel_inactive();
        }
        match self.slot.inbound_view() {
            Some(h) => {
                if let Err(error) = h.on_channel_inactive(&handle) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.fire_channel_inactive(),
        }
    }

    fn do_channel_unregistered(self: &Arc<Self>) {
        let Some(PendingEvent::ChannelUnregistered) =
            self.buffer_if_pending(|| PendingEvent::ChannelUnregistered)
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.fire_channel_unregistered();
        }
        match self.slot.inbound_view() {
            Some(h) => {
                if let Err(error) = h.on_channel_unregistered(&handle) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.fire_channel_unregistered(),
        }
    }

    fn do_channel_read(self: &Arc<Self>, msg: PipelineMessage) {
        let Some(PendingEvent::ChannelRead(msg)) =
            self.buffer_if_pending(|| PendingEvent::ChannelRead(msg))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.fire_channel_read(msg);
        }
        match self.slot.inbound_view() {
            Some(h) => {
                if let Err(error) = h.on_channel_read(&handle, msg) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.fire_channel_read(msg),
        }
    }

    fn do_channel_read_complete(self: &Arc<Self>) {
        let Some(PendingEvent::ChannelReadComplete) =
            self.buffer_if_pending(|| PendingEvent::ChannelReadComplete)
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.fire_channel_read_complete();
        }
        match self.slot.inbound_view() {
            Some(h) => {
                if let Err(error) = h.on_channel_read_complete(&handle) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.fire_channel_read_complete(),
        }
    }

    fn do_user_event(self: &Arc<Self>, event: UserEvent) {
        let Some(PendingEvent::UserEvent(event)) =
            self.buffer_if_pending(|| PendingEvent::UserEvent(event))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.fire_user_event_triggered(event);
        }
        match self.slot.inbound_view() {
            Some(h) => {
                if let Err(error) = h.on_user_event(&handle, event) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.fire_user_event_triggered(event),
        }
    }

    fn do_writability_changed(self: &Arc<Self>, is_writable: bool) {
        let Some(PendingEvent::WritabilityChanged(is_writable)) =
            self.buffer_if_pending(|| PendingEvent::WritabilityChanged(is_writable))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.fire_channel_writability_changed(is_writable);
        }
        match self.slot.inbound_view() {
            Some(h) => {
                if let Err(error) = h.on_writability_changed(&handle, is_writable) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.fire_channel_writability_changed(is_writable),
        }
    }

    fn do_exception_caught(self: &Arc<Self>, error: CoreError) {
        let Some(PendingEvent::ExceptionCaught(error)) =
            self.buffer_if_pending(|| PendingEvent::ExceptionCaught(error))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.fire_exception_caught(error);
        }
        match self.slot.inbound_view() {
            Some(h) => {
                // 异常处理器自身报错时只记录，不再回注链路，否则会无限循环。
                if let Err(secondary) = h.on_exception_caught(&handle, error) {
                    self.log_warn(
                        "pipeline.exception_handler_failed 异常处理器报错，已吞掉",
                        Some(&secondary),
                    );
                }
            }
            None => handle.fire_exception_caught(error),
        }
    }

    // ---- 出站派发 ----

    pub(crate) fn invoke_bind(ctx: Arc<ContextInner>, addr: TransportSocketAddr, promise: Promise) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_bind(addr, promise));
    }

    pub(crate) fn invoke_connect(
        ctx: Arc<ContextInner>,
        remote: TransportSocketAddr,
        local: Option<TransportSocketAddr>,
        promise: Promise,
    ) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_connect(remote, local, promise));
    }

    pub(crate) fn invoke_disconnect(ctx: Arc<ContextInner>, promise: Promise) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_disconnect(promise));
    }

    pub(crate) fn invoke_close(ctx: Arc<ContextInner>, promise: Promise) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_close(promise));
    }

    pub(crate) fn invoke_deregister(ctx: Arc<ContextInner>, promise: Promise) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_deregister(promise));
    }

    pub(crate) fn invoke_read(ctx: Arc<ContextInner>) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_read());
    }

    pub(crate) fn invoke_write(ctx: Arc<ContextInner>, msg: PipelineMessage, promise: Promise) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_write(msg, promise));
    }

    pub(crate) fn invoke_write_and_flush(
        ctx: Arc<ContextInner>,
        msg: PipelineMessage,
        promise: Promise,
    ) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_write_and_flush(msg, promise));
    }

    pub(crate) fn invoke_flush(ctx: Arc<ContextInner>) {
        let executor = Arc::clone(&ctx.executor);
        Self::run_or_submit(&executor, move || ctx.do_flush());
    }

    fn do_bind(self: &Arc<Self>, addr: TransportSocketAddr, promise: Promise) {
        let Some(PendingEvent::Bind(addr, promise)) =
            self.buffer_if_pending(|| PendingEvent::Bind(addr, promise))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            handle.bind_with(addr, promise);
            return;
        }
        match self.slot.outbound_view() {
            Some(h) => {
                if let Err(error) = h.on_bind(&handle, addr, promise.clone()) {
                    promise.try_failure(error);
                }
            }
            None => {
                handle.bind_with(addr, promise);
            }
        }
    }

    fn do_connect(
        self: &Arc<Self>,
        remote: TransportSocketAddr,
        local: Option<TransportSocketAddr>,
        promise: Promise,
    ) {
        let Some(PendingEvent::Connect(remote, local, promise)) =
            self.buffer_if_pending(|| PendingEvent::Connect(remote, local, promise))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            handle.connect_with(remote, local, promise);
            return;
        }
        match self.slot.outbound_view() {
            Some(h) => {
                if let Err(error) = h.on_connect(&handle, remote, local, promise.clone()) {
                    promise.try_failure(error);
                }
            }
            None => {
                handle.connect_with(remote, local, promise);
            }
        }
    }

    fn do_disconnect(self: &Arc<Self>, promise: Promise) {
        let Some(PendingEvent::Disconnect(promise)) =
            self.buffer_if_pending(|| PendingEvent::Disconnect(promise))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            handle.disconnect_with(promise);
            return;
        }
        match self.slot.outbound_view() {
            Some(h) => {
                if let Err(error) = h.on_disconnect(&handle, promise.clone()) {
                    promise.try_failure(error);
                }
            }
            None => {
                handle.disconnect_with(promise);
            }
        }
    }

    fn do_close(self: &Arc<Self>, promise: Promise) {
        let Some(PendingEvent::Close(promise)) =
            self.buffer_if_pending(|| PendingEvent::Close(promise))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            handle.close_with(promise);
            return;
        }
        match self.slot.outbound_view() {
            Some(h) => {
                if let Err(error) = h.on_close(&handle, promise.clone()) {
                    promise.try_failure(error);
                }
            }
            None => {
                handle.close_with(promise);
            }
        }
    }

    fn do_deregister(self: &Arc<Self>, promise: Promise) {
        let Some(PendingEvent::Deregister(promise)) =
            self.buffer_if_pending(|| PendingEvent::Deregister(promise))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            handle.deregister_with(promise);
            return;
        }
        match self.slot.outbound_view() {
            Some(h) => {
                if let Err(error) = h.on_deregister(&handle, promise.clone()) {
                    promise.try_failure(error);
                }
            }
            None => {
                handle.deregister_with(promise);
            }
        }
    }

    fn do_read(self: &Arc<Self>) {
        let Some(PendingEvent::Read) = self.buffer_if_pending(|| PendingEvent::Read) else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.read();
        }
        match self.slot.outbound_view() {
            Some(h) => {
                if let Err(error) = h.on_read(&handle) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.read(),
        }
    }

    fn do_write(self: &Arc<Self>, msg: PipelineMessage, promise: Promise) {
        let Some(PendingEvent::Write(msg, promise)) =
            self.buffer_if_pending(|| PendingEvent::Write(msg, promise))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            handle.write_with(msg, promise);
            return;
        }
        match self.slot.outbound_view() {
            Some(h) => {
                if let Err(error) = h.on_write(&handle, msg, promise.clone()) {
                    promise.try_failure(error);
                }
            }
            None => {
                handle.write_with(msg, promise);
            }
        }
    }

    fn do_write_and_flush(self: &Arc<Self>, msg: PipelineMessage, promise: Promise) {
        let Some(PendingEvent::WriteAndFlush(msg, promise)) =
            self.buffer_if_pending(|| PendingEvent::WriteAndFlush(msg, promise))
        else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            handle.write_and_flush_with(msg, promise);
            return;
        }
        match self.slot.outbound_view() {
            Some(h) => {
                if let Err(error) = h.on_write(&handle, msg, promise.clone()) {
                    promise.try_failure(error);
                }
                if let Err(error) = h.on_flush(&handle) {
                    promise.try_failure(error);
                }
            }
            None => {
                handle.write_and_flush_with(msg, promise);
            }
        }
    }

    fn do_flush(self: &Arc<Self>) {
        let Some(PendingEvent::Flush) = self.buffer_if_pending(|| PendingEvent::Flush) else {
            return;
        };
        let handle = self.handle();
        if self.is_removed() {
            return handle.flush();
        }
        match self.slot.outbound_view() {
            Some(h) => {
                if let Err(error) = h.on_flush(&handle) {
                    handle.fire_exception_caught(error);
                }
            }
            None => handle.flush(),
        }
    }
}

/// Handler 上下文句柄：Handler 与流水线交互的唯一入口。
///
/// # 契约说明（What）
/// - 句柄可克隆，克隆共享同一节点；Handler 可以把句柄保存下来在回调外使用
///   （如异步完成后续传事件），节点链接此时依旧有效。
/// - `fire_*` 从当前节点向尾方向传播；出站方法向头方向传播并返回完成通知。
pub struct HandlerContext {
    inner: Arc<ContextInner>,
}

impl Clone for HandlerContext {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("name", &self.inner.name())
            .field("removed", &self.inner.is_removed())
            .finish()
    }
}

impl HandlerContext {
    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    /// 上下文在流水线内的唯一名称。
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// 上下文钉住的执行器。
    pub fn executor(&self) -> &Arc<dyn EventExecutor> {
        self.inner.executor()
    }

    /// 所属流水线；流水线已销毁时返回 `None`。
    pub fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.inner.pipeline.upgrade()
    }

    /// 上下文是否已被摘除。
    pub fn is_removed(&self) -> bool {
        self.inner.is_removed()
    }

    /// 访问端点属性表中的单元格；流水线已销毁时返回 `None`。
    pub fn attr<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>) -> Option<Attribute<T>> {
        self.pipeline().map(|pipeline| pipeline.attributes().attr(key))
    }

    /// 构造绑定本上下文执行器的未完成 Promise。
    pub fn new_promise(&self) -> Promise {
        Promise::new(Arc::clone(self.inner.executor()), &self.inner.services())
    }

    /// 构造 void Promise，用于放弃完成跟踪的写路径。
    pub fn void_promise(&self) -> Promise {
        Promise::void(Arc::clone(self.inner.executor()), &self.inner.services())
    }

    // ---- 入站传播 ----

    /// 向尾方向传播“端点完成注册”。
    pub fn fire_channel_registered(&self) {
        if let Some(next) = self.inner.find_next_inbound(InboundOps::CHANNEL_REGISTERED) {
            ContextInner::invoke_channel_registered(next);
        }
    }

    /// 向尾方向传播“端点进入活跃态”。
    pub fn fire_channel_active(&self) {
        if let Some(next) = self.inner.find_next_inbound(InboundOps::CHANNEL_ACTIVE) {
            ContextInner::invoke_channel_active(next);
        }
    }

    /// 向尾方向传播“端点离开活跃态”。
    pub fn fire_channel_inactive(&self) {
        if let Some(next) = self.inner.find_next_inbound(InboundOps::CHANNEL_INACTIVE) {
            ContextInner::invoke_channel_inactive(next);
        }
    }

    /// 向尾方向传播读消息，消息所有权随事件转移。
    pub fn fire_channel_read(&self, msg: PipelineMessage) {
        if let Some(next) = self.inner.find_next_inbound(InboundOps::CHANNEL_READ) {
            ContextInner::invoke_channel_read(next, msg);
        }
    }

    /// 向尾方向传播“一批读取完成”。
    pub fn fire_channel_read_complete(&self) {
        if let Some(next) = self.inner.find_next_inbound(InboundOps::CHANNEL_READ_COMPLETE) {
            ContextInner::invoke_channel_read_complete(next);
        }
    }

    /// 向尾方向广播用户事件。
    pub fn fire_user_event_triggered(&self, event: UserEvent) {
        if let Some(next) = self.inner.find_next_inbound(InboundOps::USER_EVENT) {
            ContextInner::invoke_user_event(next, event);
        }
    }

    /// 向尾方向传播可写性变化。
    pub fn fire_channel_writability_changed(&self, is_writable: bool) {
        if let Some(next) = self.inner.find_next_inbound(InboundOps::WRITABILITY_CHANGED) {
            ContextInner::invoke_writability_changed(next, is_writable);
        }
    }

    /// 向尾方向传播异常。
    pub fn fire_exception_caught(&self, error: CoreError) {
        if let Some(next) = self.inner.find_next_inbound(InboundOps::EXCEPTION_CAUGHT) {
            ContextInner::invoke_exception_caught(next, error);
        }
    }

    /// 向尾方向传播“端点完成注销”。
    pub fn fire_channel_unregistered(&self) {
        if let Some(next) = self.inner.find_next_inbound(InboundOps::CHANNEL_UNREGISTERED) {
            ContextInner::invoke_channel_unregistered(next);
        }
    }

    // ---- 出站调用 ----

    /// 绑定本地地址，返回完成通知。
    pub fn bind(&self, addr: TransportSocketAddr) -> Promise {
        let promise = self.new_promise();
        self.bind_with(addr, promise)
    }

    /// 绑定本地地址，使用调用方提供的 Promise。
    pub fn bind_with(&self, addr: TransportSocketAddr, promise: Promise) -> Promise {
        match self.inner.find_prev_outbound(OutboundOps::BIND) {
            Some(prev) => ContextInner::invoke_bind(prev, addr, promise.clone()),
            None => fail_unreachable(&promise),
        }
        promise
    }

    /// 连接远端，返回完成通知。
    pub fn connect(
        &self,
        remote: TransportSocketAddr,
        local: Option<TransportSocketAddr>,
    ) -> Promise {
        let promise = self.new_promise();
        self.connect_with(remote, local, promise)
    }

    /// 连接远端，使用调用方提供的 Promise。
    pub fn connect_with(
        &self,
        remote: TransportSocketAddr,
        local: Option<TransportSocketAddr>,
        promise: Promise,
    ) -> Promise {
        match self.inner.find_prev_outbound(OutboundOps::CONNECT) {
            Some(prev) => ContextInner::invoke_connect(prev, remote, local, promise.clone()),
            None => fail_unreachable(&promise),
        }
        promise
    }

    /// 断开连接，返回完成通知。
    pub fn disconnect(&self) -> Promise {
        let promise = self.new_promise();
        self.disconnect_with(promise)
    }

    /// 断开连接，使用调用方提供的 Promise。
    pub fn disconnect_with(&self, promise: Promise) -> Promise {
        match self.inner.find_prev_outbound(OutboundOps::DISCONNECT) {
            Some(prev) => ContextInner::invoke_disconnect(prev, promise.clone()),
            None => fail_unreachable(&promise),
        }
        promise
    }

    /// 关闭端点，返回完成通知。
    pub fn close(&self) -> Promise {
        let promise = self.new_promise();
        self.close_with(promise)
    }

    /// 关闭端点，使用调用方提供的 Promise。
    pub fn close_with(&self, promise: Promise) -> Promise {
        match self.inner.find_prev_outbound(OutboundOps::CLOSE) {
            Some(prev) => ContextInner::invoke_close(prev, promise.clone()),
            None => fail_unreachable(&promise),
        }
        promise
    }

    /// 从反应器注销，返回完成通知。
    pub fn deregister(&self) -> Promise {
        let promise = self.new_promise();
        self.deregister_with(promise)
    }

    /// 从反应器注销，使用调用方提供的 Promise。
    pub fn deregister_with(&self, promise: Promise) -> Promise {
        match self.inner.find_prev_outbound(OutboundOps::DEREGISTER) {
            Some(prev) => ContextInner::invoke_deregister(prev, promise.clone()),
            None => fail_unreachable(&promise),
        }
        promise
    }

    /// 请求一轮读取。
    pub fn read(&self) {
        if let Some(prev) = self.inner.find_prev_outbound(OutboundOps::READ) {
            ContextInner::invoke_read(prev);
        }
    }

    /// 写出消息，返回完成通知。
    pub fn write(&self, msg: PipelineMessage) -> Promise {
        let promise = self.new_promise();
        self.write_with(msg, promise)
    }

    /// 写出消息，使用调用方提供的 Promise。
    pub fn write_with(&self, msg: PipelineMessage, promise: Promise) -> Promise {
        match self.inner.find_prev_outbound(OutboundOps::WRITE) {
            Some(prev) => ContextInner::invoke_write(prev, msg, promise.clone()),
            None => fail_unreachable(&promise),
        }
        promise
    }

    /// 写出消息并放弃完成跟踪。
    pub fn write_void(&self, msg: PipelineMessage) -> Promise {
        let promise = self.void_promise();
        self.write_with(msg, promise)
    }

    /// 写出并冲刷，返回完成通知。
    pub fn write_and_flush(&self, msg: PipelineMessage) -> Promise {
        let promise = self.new_promise();
        self.write_and_flush_with(msg, promise)
    }

    /// 写出并冲刷，使用调用方提供的 Promise。
    pub fn write_and_flush_with(&self, msg: PipelineMessage, promise: Promise) -> Promise {
        match self
            .inner
            .find_prev_outbound(OutboundOps::WRITE | OutboundOps::FLUSH)
        {
            Some(prev) => ContextInner::invoke_write_and_flush(prev, msg, promise.clone()),
            None => fail_unreachable(&promise),
        }
        promise
    }

    /// 冲刷写缓冲。
    pub fn flush(&self) {
        if let Some(prev) = self.inner.find_prev_outbound(OutboundOps::FLUSH) {
            ContextInner::invoke_flush(prev);
        }
    }
}

/// 出站遍历未命中任何目标。头哨兵掩码为全集，此分支仅在链接被外力破坏时出现。
fn fail_unreachable(promise: &Promise) {
    promise.try_failure(CoreError::new(
        codes::PIPELINE_ILLEGAL_STATE,
        "出站遍历在头哨兵之前断链",
    ));
}
