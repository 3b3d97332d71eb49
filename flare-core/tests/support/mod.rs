//! 集成测试共用桩件：记录型 Handler、桩传输与轮询断言工具。

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use flare_core::{
    Channel, CoreError, CoreServices, EventExecutor, Handler, HandlerContext, InboundHandler,
    InboundOps, LogRecord, LogSeverity, Logger, NoopLogger, OutboundHandler, OutboundOps, Pipeline,
    PipelineMessage, Promise, Transport, TransportSocketAddr, UserEvent,
};

/// 事件记录：`标签:动作:载荷` 三段式文本。
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(log: &EventLog) -> Vec<String> {
    log.lock().expect("event log lock").clone()
}

fn push(log: &EventLog, label: &str, action: &str, payload: &str) {
    log.lock()
        .expect("event log lock")
        .push(format!("{label}:{action}:{payload}"));
}

/// 轮询直到条件成立或超时，吸收跨执行器派发的异步性。
pub fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// 在执行器上放置同步栅栏：返回时此前提交的任务已全部执行。
pub fn barrier(executor: &Arc<dyn EventExecutor>) {
    let (tx, rx) = mpsc::channel();
    executor.execute(Box::new(move || {
        let _ = tx.send(());
    }));
    rx.recv_timeout(Duration::from_secs(5))
        .expect("executor should drain barrier task");
}

/// 捕获执行器工作线程的 ThreadId。
pub fn executor_thread_id(executor: &Arc<dyn EventExecutor>) -> ThreadId {
    let (tx, rx) = mpsc::channel();
    executor.execute(Box::new(move || {
        let _ = tx.send(std::thread::current().id());
    }));
    rx.recv_timeout(Duration::from_secs(5))
        .expect("executor should report its thread id")
}

/// 记录全部日志的 Logger，供断言尾哨兵行为使用。
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<(LogSeverity, String)>>,
}

impl RecordingLogger {
    pub fn entries(&self) -> Vec<(LogSeverity, String)> {
        self.records.lock().expect("logger lock").clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(_, message)| message.contains(needle))
    }
}

impl Logger for RecordingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        self.records
            .lock()
            .expect("logger lock")
            .push((record.severity, record.message.to_string()));
    }
}

/// 桩传输：记录原语调用，写操作的 Promise 留待测试显式确认。
#[derive(Default)]
pub struct StubTransport {
    calls: Mutex<Vec<String>>,
    written: Mutex<Vec<PipelineMessage>>,
    pending_writes: Mutex<Vec<Promise>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("transport lock").clone()
    }

    fn record(&self, call: &str) {
        self.calls
            .lock()
            .expect("transport lock")
            .push(call.to_string());
    }

    pub fn written_count(&self) -> usize {
        self.written.lock().expect("transport lock").len()
    }

    /// 取出第 `index` 条已写消息的用户载荷。
    pub fn written_text(&self, index: usize) -> Option<&'static str> {
        let mut written = self.written.lock().expect("transport lock");
        if index >= written.len() {
            return None;
        }
        match written.remove(index).try_into_user::<&'static str>() {
            Ok(text) => Some(text),
            Err(other) => {
                written.insert(index, other);
                None
            }
        }
    }

    /// 以成功确认全部滞留的写 Promise。
    pub fn ack_writes(&self) {
        for promise in self.pending_writes.lock().expect("transport lock").drain(..) {
            promise.try_success(());
        }
    }

    /// 释放全部滞留消息与 Promise（不确认）。
    pub fn clear(&self) {
        self.written.lock().expect("transport lock").clear();
        self.pending_writes.lock().expect("transport lock").clear();
    }
}

impl Transport for StubTransport {
    fn bind(&self, _addr: TransportSocketAddr, promise: Promise) {
        self.record("bind");
        promise.try_success(());
    }

    fn connect(
        &self,
        _remote: TransportSocketAddr,
        _local: Option<TransportSocketAddr>,
        promise: Promise,
    ) {
        self.record("connect");
        promise.try_success(());
    }

    fn disconnect(&self, promise: Promise) {
        self.record("disconnect");
        promise.try_success(());
    }

    fn close(&self, promise: Promise) {
        self.record("close");
        promise.try_success(());
    }

    fn deregister(&self, promise: Promise) {
        self.record("deregister");
        promise.try_success(());
    }

    fn begin_read(&self) {
        self.record("begin_read");
    }

    fn write(&self, msg: PipelineMessage, promise: Promise) {
        self.record("write");
        self.written.lock().expect("transport lock").push(msg);
        self.pending_writes
            .lock()
            .expect("transport lock")
            .push(promise);
    }

    fn flush(&self) {
        self.record("flush");
    }
}

/// 构造挂载桩传输的流水线。
pub fn new_pipeline(executor: Arc<dyn EventExecutor>) -> (Arc<Pipeline>, Arc<StubTransport>) {
    new_pipeline_with_logger(executor, Arc::new(NoopLogger))
}

pub fn new_pipeline_with_logger(
    executor: Arc<dyn EventExecutor>,
    logger: Arc<dyn Logger>,
) -> (Arc<Pipeline>, Arc<StubTransport>) {
    let transport = StubTransport::new();
    let pipeline = Pipeline::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        executor,
        CoreServices::new(logger),
    );
    (pipeline, transport)
}

/// 记录读事件与异常的入站 Handler。
pub struct RecordingInbound {
    label: &'static str,
    log: EventLog,
    forward: bool,
}

impl RecordingInbound {
    pub fn new(label: &'static str, log: EventLog, forward: bool) -> Self {
        Self {
            label,
            log,
            forward,
        }
    }
}

impl Handler for RecordingInbound {
    fn handler_added(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, self.label, "lifecycle", "added");
        Ok(())
    }

    fn handler_removed(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, self.label, "lifecycle", "removed");
        Ok(())
    }
}

impl InboundHandler for RecordingInbound {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::CHANNEL_READ | InboundOps::EXCEPTION_CAUGHT
    }

    fn on_channel_read(&self, ctx: &HandlerContext, msg: PipelineMessage) -> Result<(), CoreError> {
        let forwarded = match msg.try_into_user::<&'static str>() {
            Ok(text) => {
                push(&self.log, self.label, "read", text);
                PipelineMessage::from_user(text)
            }
            Err(other) => {
                push(&self.log, self.label, "read", "?");
                other
            }
        };
        if self.forward {
            ctx.fire_channel_read(forwarded);
        }
        Ok(())
    }

    fn on_exception_caught(&self, ctx: &HandlerContext, error: CoreError) -> Result<(), CoreError> {
        push(&self.log, self.label, "error", error.code());
        if self.forward {
            ctx.fire_exception_caught(error);
        }
        Ok(())
    }
}

/// 记录写与冲刷的出站 Handler。
pub struct RecordingOutbound {
    label: &'static str,
    log: EventLog,
}

impl RecordingOutbound {
    pub fn new(label: &'static str, log: EventLog) -> Self {
        Self { label, log }
    }
}

impl Handler for RecordingOutbound {}

impl OutboundHandler for RecordingOutbound {
    fn outbound_ops(&self) -> OutboundOps {
        OutboundOps::WRITE | OutboundOps::FLUSH
    }

    fn on_write(
        &self,
        ctx: &HandlerContext,
        msg: PipelineMessage,
        promise: Promise,
    ) -> Result<(), CoreError> {
        let forwarded = match msg.try_into_user::<&'static str>() {
            Ok(text) => {
                push(&self.log, self.label, "write", text);
                PipelineMessage::from_user(text)
            }
            Err(other) => {
                push(&self.log, self.label, "write", "?");
                other
            }
        };
        ctx.write_with(forwarded, promise);
        Ok(())
    }

    fn on_flush(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, self.label, "flush", "");
        ctx.flush();
        Ok(())
    }
}

/// 全双工记录 Handler：读与写都记录后转发。
pub struct RecordingDuplex {
    label: &'static str,
    log: EventLog,
}

impl RecordingDuplex {
    pub fn new(label: &'static str, log: EventLog) -> Self {
        Self { label, log }
    }
}

impl Handler for RecordingDuplex {}

impl InboundHandler for RecordingDuplex {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::CHANNEL_READ
    }

    fn on_channel_read(&self, ctx: &HandlerContext, msg: PipelineMessage) -> Result<(), CoreError> {
        match msg.try_into_user::<&'static str>() {
            Ok(text) => {
                push(&self.log, self.label, "read", text);
                ctx.fire_channel_read(PipelineMessage::from_user(text));
            }
            Err(other) => {
                push(&self.log, self.label, "read", "?");
                ctx.fire_channel_read(other);
            }
        }
        Ok(())
    }
}

impl OutboundHandler for RecordingDuplex {
    fn outbound_ops(&self) -> OutboundOps {
        OutboundOps::WRITE | OutboundOps::FLUSH
    }

    fn on_write(
        &self,
        ctx: &HandlerContext,
        msg: PipelineMessage,
        promise: Promise,
    ) -> Result<(), CoreError> {
        match msg.try_into_user::<&'static str>() {
            Ok(text) => {
                push(&self.log, self.label, "write", text);
                ctx.write_with(PipelineMessage::from_user(text), promise);
            }
            Err(other) => {
                push(&self.log, self.label, "write", "?");
                ctx.write_with(other, promise);
            }
        }
        Ok(())
    }

    fn on_flush(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, self.label, "flush", "");
        ctx.flush();
        Ok(())
    }
}

/// 保持默认全转发实现的入站节点：能力全集，事件逐一经过它。
pub struct ForwardAll;

impl Handler for ForwardAll {}

impl InboundHandler for ForwardAll {}

/// 按动作过滤事件记录，去除生命周期噪音。
pub fn filtered(log: &EventLog, action: &str) -> Vec<String> {
    let needle = format!(":{action}:");
    snapshot(log)
        .into_iter()
        .filter(|entry| entry.contains(&needle))
        .collect()
}

/// 声明空能力集的纯转发节点：链式遍历应当直接跳过它。
pub struct SkippedPassthrough;

impl Handler for SkippedPassthrough {}

impl InboundHandler for SkippedPassthrough {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::NONE
    }
}

impl OutboundHandler for SkippedPassthrough {
    fn outbound_ops(&self) -> OutboundOps {
        OutboundOps::NONE
    }
}

/// 读事件上固定报错的入站 Handler。
pub struct FailingInbound {
    code: &'static str,
}

impl FailingInbound {
    pub fn new(code: &'static str) -> Self {
        Self { code }
    }
}

impl Handler for FailingInbound {}

impl InboundHandler for FailingInbound {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::CHANNEL_READ
    }

    fn on_channel_read(
        &self,
        _ctx: &HandlerContext,
        _msg: PipelineMessage,
    ) -> Result<(), CoreError> {
        Err(CoreError::new(self.code, "handler 故意失败"))
    }
}

/// `handler_added` 固定失败的 Handler。
pub struct FailingLifecycle {
    label: &'static str,
    log: EventLog,
}

impl FailingLifecycle {
    pub fn new(label: &'static str, log: EventLog) -> Self {
        Self { label, log }
    }
}

impl Handler for FailingLifecycle {
    fn handler_added(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, self.label, "lifecycle", "added_attempt");
        Err(CoreError::new("test.added_boom", "handler_added 故意失败"))
    }

    fn handler_removed(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, self.label, "lifecycle", "removed");
        Ok(())
    }
}

impl InboundHandler for FailingLifecycle {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::CHANNEL_READ
    }
}

/// 读事件中先在自身之后插入新 Handler、再摘除自身的入站 Handler。
pub struct SelfRemovingInbound {
    label: &'static str,
    log: EventLog,
}

impl SelfRemovingInbound {
    pub fn new(label: &'static str, log: EventLog) -> Self {
        Self { label, log }
    }
}

impl Handler for SelfRemovingInbound {
    fn handler_removed(&self, _ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, self.label, "lifecycle", "removed");
        Ok(())
    }
}

impl InboundHandler for SelfRemovingInbound {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::CHANNEL_READ
    }

    fn on_channel_read(&self, ctx: &HandlerContext, msg: PipelineMessage) -> Result<(), CoreError> {
        let text = match msg.try_into_user::<&'static str>() {
            Ok(text) => text,
            Err(_) => "?",
        };
        push(&self.log, self.label, "read", text);
        let pipeline = ctx.pipeline().expect("pipeline alive during dispatch");
        pipeline
            .add_after(
                ctx.name(),
                "late",
                flare_core::HandlerSlot::inbound(RecordingInbound::new(
                    "late",
                    Arc::clone(&self.log),
                    true,
                )),
            )
            .expect("insert successor");
        pipeline.remove(ctx.name()).expect("remove self");
        ctx.fire_channel_read(PipelineMessage::from_user(text));
        Ok(())
    }
}

/// 记录线程身份的入站 Handler，用于执行器交接断言。
pub struct ThreadRecordingInbound {
    label: &'static str,
    log: Arc<Mutex<Vec<(String, String, ThreadId)>>>,
    forward: bool,
}

impl ThreadRecordingInbound {
    pub fn new(
        label: &'static str,
        log: Arc<Mutex<Vec<(String, String, ThreadId)>>>,
        forward: bool,
    ) -> Self {
        Self {
            label,
            log,
            forward,
        }
    }
}

impl Handler for ThreadRecordingInbound {}

impl InboundHandler for ThreadRecordingInbound {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::CHANNEL_READ
    }

    fn on_channel_read(&self, ctx: &HandlerContext, msg: PipelineMessage) -> Result<(), CoreError> {
        let text = match msg.try_into_user::<&'static str>() {
            Ok(text) => text,
            Err(_) => "?",
        };
        self.log.lock().expect("thread log lock").push((
            self.label.to_string(),
            text.to_string(),
            std::thread::current().id(),
        ));
        if self.forward {
            ctx.fire_channel_read(PipelineMessage::from_user(text));
        }
        Ok(())
    }
}

/// 读事件中阻塞等待放行信号的 Handler，用于制造回调窗口。
pub struct GatedInbound {
    started: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl GatedInbound {
    pub fn new(started: mpsc::Sender<()>, release: mpsc::Receiver<()>) -> Self {
        Self {
            started: Mutex::new(Some(started)),
            release: Mutex::new(Some(release)),
        }
    }
}

impl Handler for GatedInbound {}

impl InboundHandler for GatedInbound {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::CHANNEL_READ
    }

    fn on_channel_read(&self, ctx: &HandlerContext, msg: PipelineMessage) -> Result<(), CoreError> {
        if let Some(started) = self.started.lock().expect("gate lock").take() {
            let _ = started.send(());
        }
        if let Some(release) = self.release.lock().expect("gate lock").take() {
            let _ = release.recv_timeout(Duration::from_secs(5));
        }
        ctx.fire_channel_read(msg);
        Ok(())
    }
}

/// 析构计数载荷：验证消息恰好释放一次。
pub struct DropGuard {
    drops: Arc<AtomicUsize>,
}

impl DropGuard {
    pub fn new(drops: Arc<AtomicUsize>) -> Self {
        Self { drops }
    }
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// 消费消息（不转发）的入站 Handler。
pub struct ConsumingInbound;

impl Handler for ConsumingInbound {}

impl InboundHandler for ConsumingInbound {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::CHANNEL_READ
    }

    fn on_channel_read(
        &self,
        _ctx: &HandlerContext,
        msg: PipelineMessage,
    ) -> Result<(), CoreError> {
        drop(msg);
        Ok(())
    }
}

/// 覆盖全部九个入站事件并转发的记录 Handler。
pub struct AllEventsInbound {
    log: EventLog,
}

impl AllEventsInbound {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl Handler for AllEventsInbound {}

impl InboundHandler for AllEventsInbound {
    fn on_channel_registered(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, "all", "event", "registered");
        ctx.fire_channel_registered();
        Ok(())
    }

    fn on_channel_active(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, "all", "event", "active");
        ctx.fire_channel_active();
        Ok(())
    }

    fn on_channel_inactive(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, "all", "event", "inactive");
        ctx.fire_channel_inactive();
        Ok(())
    }

    fn on_channel_read(&self, ctx: &HandlerContext, msg: PipelineMessage) -> Result<(), CoreError> {
        push(&self.log, "all", "event", "read");
        ctx.fire_channel_read(msg);
        Ok(())
    }

    fn on_channel_read_complete(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, "all", "event", "read_complete");
        ctx.fire_channel_read_complete();
        Ok(())
    }

    fn on_user_event(&self, ctx: &HandlerContext, event: UserEvent) -> Result<(), CoreError> {
        push(&self.log, "all", "event", "user_event");
        ctx.fire_user_event_triggered(event);
        Ok(())
    }

    fn on_writability_changed(
        &self,
        ctx: &HandlerContext,
        is_writable: bool,
    ) -> Result<(), CoreError> {
        push(
            &self.log,
            "all",
            "event",
            if is_writable {
                "writable"
            } else {
                "unwritable"
            },
        );
        ctx.fire_channel_writability_changed(is_writable);
        Ok(())
    }

    fn on_exception_caught(&self, ctx: &HandlerContext, error: CoreError) -> Result<(), CoreError> {
        push(&self.log, "all", "event", error.code());
        ctx.fire_exception_caught(error);
        Ok(())
    }

    fn on_channel_unregistered(&self, ctx: &HandlerContext) -> Result<(), CoreError> {
        push(&self.log, "all", "event", "unregistered");
        ctx.fire_channel_unregistered();
        Ok(())
    }
}

/// 最小端点句柄：流水线独占持有，便捷方法走默认委托。
pub struct StubChannel {
    id: String,
    pipeline: Arc<Pipeline>,
}

impl StubChannel {
    pub fn new(id: &str, pipeline: Arc<Pipeline>) -> Self {
        Self {
            id: id.to_string(),
            pipeline,
        }
    }
}

impl Channel for StubChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

/// 可共享 Handler：以属性单元格维护每端点计数。
pub struct SharedCounter {
    key: Arc<flare_core::AttributeKey<u32>>,
}

impl SharedCounter {
    pub fn new(key: Arc<flare_core::AttributeKey<u32>>) -> Self {
        Self { key }
    }
}

impl Handler for SharedCounter {
    fn is_shareable(&self) -> bool {
        true
    }
}

impl InboundHandler for SharedCounter {
    fn inbound_ops(&self) -> InboundOps {
        InboundOps::CHANNEL_READ
    }

    fn on_channel_read(&self, ctx: &HandlerContext, msg: PipelineMessage) -> Result<(), CoreError> {
        let attr = ctx
            .attr(self.key.as_ref())
            .expect("pipeline alive during dispatch");
        let current = attr.get().unwrap_or(0);
        attr.set(current + 1);
        ctx.fire_channel_read(msg);
        Ok(())
    }
}
