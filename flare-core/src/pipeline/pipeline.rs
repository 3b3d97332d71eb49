//! 流水线：头尾哨兵包裹的 Handler 上下文双向链。
//!
//! # 设计背景（Why）
//! - 每个传输端点独占一条流水线，端点与流水线同生共死；入站事件由传输层通过
//!   `fire_*` 入口注入，从头向尾穿过入站 Handler；出站操作从尾向头穿过出站
//!   Handler，最终由头哨兵落到传输原语上。
//! - 链表必须支持事件在途时的增删改：变更在内部监视器下串行化，观察者读取
//!   原子替换的快照，二者互不阻塞。
//!
//! # 逻辑解析（How）
//! - 链接结构：`next` 方向持强引用（头哨兵锚定整条链），`prev` 方向持弱引用；
//!   摘除节点时邻居互相绕接，被摘节点保留最后链接供迟到事件续传。
//! - 变更提交后重建名称快照并整体替换（`sync::ArcSwap`），`names` / `to_map`
//!   等观察方法只读快照。
//! - 生命周期回调调度到目标上下文的执行器：调用方同步看到链表更新，回调按
//!   执行器纪律延后；`handler_added` 失败触发立即回滚。
//!
//! # 契约说明（What）
//! - 哨兵恒在且不可摘除：头哨兵是出站终端（落到 [`Transport`]），尾哨兵是入站
//!   终端（释放未消费消息、记录未处理异常）。
//! - Handler 名称在流水线内唯一且非空；重名插入失败且不改变链表。
//! - 钉住辅助执行器组的插入形式（`*_with`）会让事件在该节点跨任务队列边界，
//!   跨边界的事件相对其它边界不保证全局顺序；见
//!   [`Pipeline::add_last_with`] 的说明。

use alloc::{
    format,
    string::{String, ToString},
    sync::{Arc, Weak},
    vec::Vec,
};
use core::any::TypeId;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use super::attributes::AttributeMap;
use super::context::{ContextInner, HandlerContext};
use super::handler::{self, Handler, HandlerSlot, InboundHandler, OutboundHandler};
use crate::channel::{PipelineMessage, Transport, TransportSocketAddr, UserEvent};
use crate::error::{CoreError, codes};
use crate::future::Promise;
use crate::observability::KeyValue;
use crate::runtime::{CoreServices, EventExecutor, EventExecutorGroup};
use crate::sync::ArcSwap;

const HEAD_NAME: &str = "flare-head";
const TAIL_NAME: &str = "flare-tail";

struct SnapshotEntry {
    name: String,
    ctx: Arc<ContextInner>,
}

/// 插入位置。
enum Position<'a> {
    First,
    Last,
    Before(&'a str),
    After(&'a str),
}

/// 端点独占的 Handler 链。
///
/// # 契约说明（What）
/// - 变更方法线程安全：任意线程可调用，链表更新同步可见，Handler 生命周期
///   回调在目标上下文的执行器上延后执行。
/// - 入站入口从头哨兵开始传播；出站入口从尾部开始并返回完成通知。
pub struct Pipeline {
    head: Arc<ContextInner>,
    tail: Arc<ContextInner>,
    transport: Arc<dyn Transport>,
    executor: Arc<dyn EventExecutor>,
    services: CoreServices,
    attributes: AttributeMap,
    mutation: spin::Mutex<()>,
    snapshot: ArcSwap<Vec<SnapshotEntry>>,
    name_seq: AtomicU64,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.names())
            .finish()
    }
}

impl Pipeline {
    /// 构造挂载头尾哨兵的空流水线。
    ///
    /// # 契约说明
    /// - `executor` 为端点的默认（反应器）执行器：未指定执行器组的 Handler、
    ///   流水线入口创建的 Promise 都绑定它。
    /// - `transport` 是头哨兵的出站终端，生命周期覆盖流水线。
    pub fn new(
        transport: Arc<dyn Transport>,
        executor: Arc<dyn EventExecutor>,
        services: CoreServices,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Pipeline>| {
            let head = ContextInner::new(
                String::from(HEAD_NAME),
                HandlerSlot::duplex(HeadHandler {
                    transport: Arc::clone(&transport),
                }),
                Arc::clone(&executor),
                weak.clone(),
                true,
            );
            let tail = ContextInner::new(
                String::from(TAIL_NAME),
                HandlerSlot::inbound(TailHandler {
                    services: services.clone(),
                }),
                Arc::clone(&executor),
                weak.clone(),
                true,
            );
            head.set_next(Some(Arc::clone(&tail)));
            tail.set_prev(Arc::downgrade(&head));
            Pipeline {
                head,
                tail,
                transport,
                executor,
                services,
                attributes: AttributeMap::new(),
                mutation: spin::Mutex::new(()),
                snapshot: ArcSwap::from_pointee(Vec::new()),
                name_seq: AtomicU64::new(0),
            }
        })
    }

    /// 端点属性表。
    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// 默认执行器。
    pub fn executor(&self) -> &Arc<dyn EventExecutor> {
        &self.executor
    }

    /// 头哨兵落地的传输原语。
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn services(&self) -> &CoreServices {
        &self.services
    }

    // ---- 变更操作 ----

    /// 在链首（头哨兵之后）插入 Handler。
    pub fn add_first(self: &Arc<Self>, name: &str, slot: HandlerSlot) -> Result<(), CoreError> {
        self.add_context(Arc::clone(&self.executor), Some(name), slot, Position::First)
    }

    /// 在链尾（尾哨兵之前）插入 Handler。
    pub fn add_last(self: &Arc<Self>, name: &str, slot: HandlerSlot) -> Result<(), CoreError> {
        self.add_context(Arc::clone(&self.executor), Some(name), slot, Position::Last)
    }

    /// 在名为 `base` 的 Handler 之前插入。
    pub fn add_before(
        self: &Arc<Self>,
        base: &str,
        name: &str,
        slot: HandlerSlot,
    ) -> Result<(), CoreError> {
        self.add_context(
            Arc::clone(&self.executor),
            Some(name),
            slot,
            Position::Before(base),
        )
    }

    /// 在名为 `base` 的 Handler 之后插入。
    pub fn add_after(
        self: &Arc<Self>,
        base: &str,
        name: &str,
        slot: HandlerSlot,
    ) -> Result<(), CoreError> {
        self.add_context(
            Arc::clone(&self.executor),
            Some(name),
            slot,
            Position::After(base),
        )
    }

    /// 在链首插入并把上下文钉到 `group` 抽取的执行器上。
    ///
    /// 钉住辅助执行器意味着事件在该节点跨任务队列边界：单个边界内保持提交
    /// 顺序，但与链上其它边界之间不再有全局顺序。
    pub fn add_first_with(
        self: &Arc<Self>,
        group: &dyn EventExecutorGroup,
        name: &str,
        slot: HandlerSlot,
    ) -> Result<(), CoreError> {
        self.add_context(group.next(), Some(name), slot, Position::First)
    }

    /// 在链尾插入并钉住辅助执行器，顺序语义见 [`Pipeline::add_first_with`]。
    pub fn add_last_with(
        self: &Arc<Self>,
        group: &dyn EventExecutorGroup,
        name: &str,
        slot: HandlerSlot,
    ) -> Result<(), CoreError> {
        self.add_context(group.next(), Some(name), slot, Position::Last)
    }

    /// 在 `base` 之前插入并钉住辅助执行器。
    pub fn add_before_with(
        self: &Arc<Self>,
        group: &dyn EventExecutorGroup,
        base: &str,
        name: &str,
        slot: HandlerSlot,
    ) -> Result<(), CoreError> {
        self.add_context(group.next(), Some(name), slot, Position::Before(base))
    }

    /// 在 `base` 之后插入并钉住辅助执行器。
    pub fn add_after_with(
        self: &Arc<Self>,
        group: &dyn EventExecutorGroup,
        base: &str,
        name: &str,
        slot: HandlerSlot,
    ) -> Result<(), CoreError> {
        self.add_context(group.next(), Some(name), slot, Position::After(base))
    }

    /// 以生成名称批量追加到链尾。
    ///
    /// 名称形如 `类型短名#序号`；中途失败时已插入的 Handler 保留在链上。
    pub fn add_last_all(
        self: &Arc<Self>,
        slots: impl IntoIterator<Item = HandlerSlot>,
    ) -> Result<(), CoreError> {
        for slot in slots {
            self.add_context(Arc::clone(&self.executor), None, slot, Position::Last)?;
        }
        Ok(())
    }

    /// 按名称摘除 Handler，返回其封装。
    pub fn remove(self: &Arc<Self>, name: &str) -> Result<HandlerSlot, CoreError> {
        self.remove_matching(|ctx| ctx.name() == name)
    }

    /// 摘除第一个（最靠近头部）类型为 `H` 的 Handler。
    pub fn remove_type<H: 'static>(self: &Arc<Self>) -> Result<HandlerSlot, CoreError> {
        self.remove_matching(|ctx| ctx.slot().type_id() == TypeId::of::<H>())
    }

    /// 以 `slot` 替换名为 `old_name` 的 Handler，返回旧封装。
    pub fn replace(
        self: &Arc<Self>,
        old_name: &str,
        new_name: &str,
        slot: HandlerSlot,
    ) -> Result<HandlerSlot, CoreError> {
        self.replace_matching(|ctx| ctx.name() == old_name, new_name, slot)
    }

    /// 替换第一个类型为 `H` 的 Handler，返回旧封装。
    pub fn replace_type<H: 'static>(
        self: &Arc<Self>,
        new_name: &str,
        slot: HandlerSlot,
    ) -> Result<HandlerSlot, CoreError> {
        self.replace_matching(
            |ctx| ctx.slot().type_id() == TypeId::of::<H>(),
            new_name,
            slot,
        )
    }

    fn add_context(
        self: &Arc<Self>,
        executor: Arc<dyn EventExecutor>,
        name: Option<&str>,
        slot: HandlerSlot,
        position: Position<'_>,
    ) -> Result<(), CoreError> {
        let ctx = {
            let _guard = self.mutation.lock();
            let name = match name {
                Some(name) if name.is_empty() => {
                    return Err(CoreError::new(
                        codes::PIPELINE_INVALID_NAME,
                        "Handler 名称不能为空",
                    ));
                }
                Some(name) => {
                    self.assert_name_free(name)?;
                    name.to_string()
                }
                None => self.generate_name(&slot),
            };
            let (anchor_prev, anchor_next) = self.resolve_position(position)?;
            handler::acquire_exclusive_binding(&slot)?;
            let ctx = ContextInner::new(
                name,
                slot,
                executor,
                Arc::downgrade(self),
                false,
            );
            Self::splice_between(&anchor_prev, &anchor_next, &ctx);
            self.rebuild_snapshot();
            ctx
        };
        ctx.schedule_handler_added();
        Ok(())
    }

    fn remove_matching(
        self: &Arc<Self>,
        pred: impl FnMut(&Arc<ContextInner>) -> bool,
    ) -> Result<HandlerSlot, CoreError> {
        let ctx = {
            let _guard = self.mutation.lock();
            let ctx = self.find_user_ctx(pred).ok_or_else(not_found)?;
            self.unlink(&ctx);
            self.rebuild_snapshot();
            ctx
        };
        ctx.schedule_handler_removed();
        Ok(ctx.slot().clone())
    }

    fn replace_matching(
        self: &Arc<Self>,
        pred: impl FnMut(&Arc<ContextInner>) -> bool,
        new_name: &str,
        slot: HandlerSlot,
    ) -> Result<HandlerSlot, CoreError> {
        let (old_ctx, new_ctx) = {
            let _guard = self.mutation.lock();
            if new_name.is_empty() {
                return Err(CoreError::new(
                    codes::PIPELINE_INVALID_NAME,
                    "Handler 名称不能为空",
                ));
            }
            let old_ctx = self.find_user_ctx(pred).ok_or_else(not_found)?;
            // 允许沿用被替换者的名称；与其它节点重名仍然拒绝。
            if new_name != old_ctx.name() {
                self.assert_name_free(new_name)?;
            }
            handler::acquire_exclusive_binding(&slot)?;
            let new_ctx = ContextInner::new(
                new_name.to_string(),
                slot,
                Arc::clone(old_ctx.executor()),
                Arc::downgrade(self),
                false,
            );
            let prev = old_ctx.prev().expect("sentinel links must be intact");
            let next = old_ctx.next().expect("sentinel links must be intact");
            Self::splice_between(&prev, &next, &new_ctx);
            // 旧节点双向指向替换者：迟到事件穿过旧节点后仍会经过新节点。
            old_ctx.set_prev(Arc::downgrade(&new_ctx));
            old_ctx.set_next(Some(Arc::clone(&new_ctx)));
            self.rebuild_snapshot();
            (old_ctx, new_ctx)
        };
        new_ctx.schedule_handler_added();
        old_ctx.schedule_handler_removed();
        Ok(old_ctx.slot().clone())
    }

    /// `handler_added` 失败时的回滚入口：仅当上下文仍在链上时摘除。
    pub(crate) fn abort_pending_context(&self, ctx: &Arc<ContextInner>) {
        let _guard = self.mutation.lock();
        if self
            .find_user_ctx(|candidate| Arc::ptr_eq(candidate, ctx))
            .is_some()
        {
            self.unlink(ctx);
            self.rebuild_snapshot();
        }
    }

    fn resolve_position(
        &self,
        position: Position<'_>,
    ) -> Result<(Arc<ContextInner>, Arc<ContextInner>), CoreError> {
        match position {
            Position::First => {
                let next = self.head.next().expect("sentinel links must be intact");
                Ok((Arc::clone(&self.head), next))
            }
            Position::Last => {
                let prev = self.tail.prev().expect("sentinel links must be intact");
                Ok((prev, Arc::clone(&self.tail)))
            }
            Position::Before(base) => {
                let base_ctx = self
                    .find_user_ctx(|ctx| ctx.name() == base)
                    .ok_or_else(not_found)?;
                let prev = base_ctx.prev().expect("sentinel links must be intact");
                Ok((prev, base_ctx))
            }
            Position::After(base) => {
                let base_ctx = self
                    .find_user_ctx(|ctx| ctx.name() == base)
                    .ok_or_else(not_found)?;
                let next = base_ctx.next().expect("sentinel links must be intact");
                Ok((base_ctx, next))
            }
        }
    }

    fn splice_between(
        prev: &Arc<ContextInner>,
        next: &Arc<ContextInner>,
        ctx: &Arc<ContextInner>,
    ) {
        ctx.set_prev(Arc::downgrade(prev));
        ctx.set_next(Some(Arc::clone(next)));
        prev.set_next(Some(Arc::clone(ctx)));
        next.set_prev(Arc::downgrade(ctx));
    }

    fn unlink(&self, ctx: &Arc<ContextInner>) {
        let prev = ctx.prev().expect("sentinel links must be intact");
        let next = ctx.next().expect("sentinel links must be intact");
        prev.set_next(Some(Arc::clone(&next)));
        next.set_prev(Arc::downgrade(&prev));
        // 被摘节点保留原链接：迟到事件沿既有方向续传。
    }

    fn find_user_ctx(
        &self,
        mut pred: impl FnMut(&Arc<ContextInner>) -> bool,
    ) -> Option<Arc<ContextInner>> {
        let mut cursor = self.head.next();
        while let Some(ctx) = cursor {
            if ctx.is_sentinel() {
                return None;
            }
            if pred(&ctx) {
                return Some(ctx);
            }
            cursor = ctx.next();
        }
        None
    }

    fn assert_name_free(&self, name: &str) -> Result<(), CoreError> {
        if self.find_user_ctx(|ctx| ctx.name() == name).is_some() {
            Err(CoreError::new(
                codes::PIPELINE_DUPLICATE_NAME,
                format!("Handler 名称已存在: {name}"),
            ))
        } else {
            Ok(())
        }
    }

    fn generate_name(&self, slot: &HandlerSlot) -> String {
        let short = slot
            .type_label()
            .rsplit("::")
            .next()
            .unwrap_or(slot.type_label());
        loop {
            let seq = self.name_seq.fetch_add(1, Ordering::Relaxed);
            let candidate = format!("{short}#{seq}");
            if self.find_user_ctx(|ctx| ctx.name() == candidate).is_none() {
                return candidate;
            }
        }
    }

    fn rebuild_snapshot(&self) {
        let mut entries = Vec::new();
        let mut cursor = self.head.next();
        while let Some(ctx) = cursor {
            if !ctx.is_sentinel() {
                entries.push(SnapshotEntry {
                    name: ctx.name().to_string(),
                    ctx: Arc::clone(&ctx),
                });
            }
            cursor = ctx.next();
        }
        self.snapshot.store(Arc::new(entries));
    }

    // ---- 观察者 ----

    /// 按链序返回全部 Handler 名称。
    pub fn names(&self) -> Vec<String> {
        self.snapshot
            .load_full()
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// 按链序返回名称与 Handler 封装的有序对。
    pub fn to_map(&self) -> Vec<(String, HandlerSlot)> {
        self.snapshot
            .load_full()
            .iter()
            .map(|entry| (entry.name.clone(), entry.ctx.slot().clone()))
            .collect()
    }

    /// 按名称查找 Handler 封装。
    pub fn get(&self, name: &str) -> Option<HandlerSlot> {
        self.snapshot
            .load_full()
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.ctx.slot().clone())
    }

    /// 查找第一个类型为 `H` 的 Handler 封装。
    pub fn get_type<H: 'static>(&self) -> Option<HandlerSlot> {
        self.snapshot
            .load_full()
            .iter()
            .find(|entry| entry.ctx.slot().type_id() == TypeId::of::<H>())
            .map(|entry| entry.ctx.slot().clone())
    }

    /// 按名称查找上下文句柄。
    pub fn context(&self, name: &str) -> Option<HandlerContext> {
        self.snapshot
            .load_full()
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| HandlerContext::from_inner(Arc::clone(&entry.ctx)))
    }

    /// 查找第一个类型为 `H` 的上下文句柄。
    pub fn context_type<H: 'static>(&self) -> Option<HandlerContext> {
        self.snapshot
            .load_full()
            .iter()
            .find(|entry| entry.ctx.slot().type_id() == TypeId::of::<H>())
            .map(|entry| HandlerContext::from_inner(Arc::clone(&entry.ctx)))
    }

    /// 最靠近头部的用户上下文。
    pub fn first_context(&self) -> Option<HandlerContext> {
        self.snapshot
            .load_full()
            .first()
            .map(|entry| HandlerContext::from_inner(Arc::clone(&entry.ctx)))
    }

    /// 最靠近尾部的用户上下文。
    pub fn last_context(&self) -> Option<HandlerContext> {
        self.snapshot
            .load_full()
            .last()
            .map(|entry| HandlerContext::from_inner(Arc::clone(&entry.ctx)))
    }

    // ---- 入站入口（由传输层调用） ----

    /// 广播“端点完成注册”。
    pub fn fire_channel_registered(&self) {
        ContextInner::invoke_channel_registered(Arc::clone(&self.head));
    }

    /// 广播“端点进入活跃态”。
    pub fn fire_channel_active(&self) {
        ContextInner::invoke_channel_active(Arc::clone(&self.head));
    }

    /// 广播“端点离开活跃态”。
    pub fn fire_channel_inactive(&self) {
        ContextInner::invoke_channel_inactive(Arc::clone(&self.head));
    }

    /// 注入一条读消息，消息所有权移交流水线。
    pub fn fire_channel_read(&self, msg: PipelineMessage) {
        ContextInner::invoke_channel_read(Arc::clone(&self.head), msg);
    }

    /// 宣告一批读取完成。
    pub fn fire_channel_read_complete(&self) {
        ContextInner::invoke_channel_read_complete(Arc::clone(&self.head));
    }

    /// 广播用户事件。
    pub fn fire_user_event_triggered(&self, event: UserEvent) {
        ContextInner::invoke_user_event(Arc::clone(&self.head), event);
    }

    /// 通知可写性变化。
    pub fn fire_channel_writability_changed(&self, is_writable: bool) {
        ContextInner::invoke_writability_changed(Arc::clone(&self.head), is_writable);
    }

    /// 注入异常事件。
    pub fn fire_exception_caught(&self, error: CoreError) {
        ContextInner::invoke_exception_caught(Arc::clone(&self.head), error);
    }

    /// 广播“端点完成注销”。
    pub fn fire_channel_unregistered(&self) {
        ContextInner::invoke_channel_unregistered(Arc::clone(&self.head));
    }

    // ---- 出站入口（由用户代码调用） ----

    /// 构造绑定默认执行器的未完成 Promise。
    pub fn new_promise(&self) -> Promise {
        Promise::new(Arc::clone(&self.executor), &self.services)
    }

    /// 构造 void Promise。
    pub fn void_promise(&self) -> Promise {
        Promise::void(Arc::clone(&self.executor), &self.services)
    }

    fn tail_handle(&self) -> HandlerContext {
        self.tail.handle()
    }

    /// 绑定本地地址。
    pub fn bind(&self, addr: TransportSocketAddr) -> Promise {
        self.tail_handle().bind(addr)
    }

    /// 绑定本地地址，使用调用方提供的 Promise。
    pub fn bind_with(&self, addr: TransportSocketAddr, promise: Promise) -> Promise {
        self.tail_handle().bind_with(addr, promise)
    }

    /// 连接远端。
    pub fn connect(
        &self,
        remote: TransportSocketAddr,
        local: Option<TransportSocketAddr>,
    ) -> Promise {
        self.tail_handle().connect(remote, local)
    }

    /// 连接远端，使用调用方提供的 Promise。
    pub fn connect_with(
        &self,
        remote: TransportSocketAddr,
        local: Option<TransportSocketAddr>,
        promise: Promise,
    ) -> Promise {
        self.tail_handle().connect_with(remote, local, promise)
    }

    /// 断开连接。
    pub fn disconnect(&self) -> Promise {
        self.tail_handle().disconnect()
    }

    /// 断开连接，使用调用方提供的 Promise。
    pub fn disconnect_with(&self, promise: Promise) -> Promise {
        self.tail_handle().disconnect_with(promise)
    }

    /// 关闭端点。
    pub fn close(&self) -> Promise {
        self.tail_handle().close()
    }

    /// 关闭端点，使用调用方提供的 Promise。
    pub fn close_with(&self, promise: Promise) -> Promise {
        self.tail_handle().close_with(promise)
    }

    /// 从反应器注销。
    pub fn deregister(&self) -> Promise {
        self.tail_handle().deregister()
    }

    /// 从反应器注销，使用调用方提供的 Promise。
    pub fn deregister_with(&self, promise: Promise) -> Promise {
        self.tail_handle().deregister_with(promise)
    }

    /// 请求一轮读取。
    pub fn read(&self) {
        self.tail_handle().read();
    }

    /// 写出消息。
    pub fn write(&self, msg: PipelineMessage) -> Promise {
        self.tail_handle().write(msg)
    }

    /// 写出消息，使用调用方提供的 Promise。
    pub fn write_with(&self, msg: PipelineMessage, promise: Promise) -> Promise {
        self.tail_handle().write_with(msg, promise)
    }

    /// 写出消息并放弃完成跟踪。
    pub fn write_void(&self, msg: PipelineMessage) -> Promise {
        self.tail_handle().write_void(msg)
    }

    /// 写出并冲刷。
    pub fn write_and_flush(&self, msg: PipelineMessage) -> Promise {
        self.tail_handle().write_and_flush(msg)
    }

    /// 写出并冲刷，使用调用方提供的 Promise。
    pub fn write_and_flush_with(&self, msg: PipelineMessage, promise: Promise) -> Promise {
        self.tail_handle().write_and_flush_with(msg, promise)
    }

    /// 冲刷写缓冲。
    pub fn flush(&self) {
        self.tail_handle().flush();
    }
}

fn not_found() -> CoreError {
    CoreError::new(codes::PIPELINE_NOT_FOUND, "指定的 Handler 不在流水线上")
}

/// 头哨兵：出站终端，把操作落到传输原语上；入站侧原样转发。
struct HeadHandler {
    transport: Arc<dyn Transport>,
}

impl Handler for HeadHandler {}

impl InboundHandler for HeadHandler {}

impl OutboundHandler for HeadHandler {
    fn on_bind(
        &self,
        _ctx: &HandlerContext,
        addr: TransportSocketAddr,
        promise: Promise,
    ) -> Result<(), CoreError> {
        self.transport.bind(addr, promise);
        Ok(())
    }

    fn on_connect(
        &self,
        _ctx: &HandlerContext,
        remote: TransportSocketAddr,
        local: Option<TransportSocketAddr>,
        promise: Promise,
    ) -> Result<(), CoreError> {
        self.transport.connect(remote, local, promise);
        Ok(())
    }

    fn on_disconnect(&self, _ctx: &HandlerContext, promise: Promise) -> Result<(), CoreError> {
        self.transport.disconnect(promise);
        Ok(())
    }

    fn on_close(&self, _ctx: &HandlerContext, promise: Promise) -> Result<(), CoreError> {
        self.transport.close(promise);
        Ok(())
    }

    fn on_deregister(&self, _ctx: &HandlerContext, promise: Promise) -> Result<(), CoreError> {
        self.transport.deregister(promise);
        Ok(())
    }

    fn on_read(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        self.transport.begin_read();
        Ok(())
    }

    fn on_write(
        &self,
        _ctx: &HandlerContext,
        msg: PipelineMessage,
        promise: Promise,
    ) -> Result<(), CoreError> {
        self.transport.write(msg, promise);
        Ok(())
    }

    fn on_flush(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        self.transport.flush();
        Ok(())
    }
}

/// 尾哨兵：入站终端。未被消费的读消息在此释放，未被处理的异常在此记录。
struct TailHandler {
    services: CoreServices,
}

impl Handler for TailHandler {}

impl InboundHandler for TailHandler {
    fn on_channel_registered(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        Ok(())
    }

    fn on_channel_active(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        Ok(())
    }

    fn on_channel_inactive(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        Ok(())
    }

    fn on_channel_read(
        &self,
        _ctx: &HandlerContext,
        msg: PipelineMessage,
    ) -> Result<(), CoreError> {
        self.services.logger().debug_with_fields(
            "pipeline.inbound_discarded 读消息到达链尾未被消费，已释放",
            &[KeyValue::new("pipeline.message", format!("{msg:?}"))],
        );
        drop(msg);
        Ok(())
    }

    fn on_channel_read_complete(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        Ok(())
    }

    fn on_user_event(&self, _ctx: &HandlerContext, event: UserEvent) -> Result<(), CoreError> {
        drop(event);
        Ok(())
    }

    fn on_writability_changed(
        &self,
        _ctx: &HandlerContext,
        _is_writable: bool,
    ) -> Result<(), CoreError> {
        Ok(())
    }

    fn on_exception_caught(&self, _ctx: &HandlerContext, error: CoreError) -> Result<(), CoreError> {
        self.services.logger().warn(
            "pipeline.exception_unhandled 异常到达链尾未被处理",
            Some(&error as &dyn crate::Error),
        );
        Ok(())
    }

    fn on_channel_unregistered(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        Ok(())
    }
}
