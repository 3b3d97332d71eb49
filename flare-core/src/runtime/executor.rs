use alloc::{boxed::Box, sync::Arc};

/// 提交给执行器的一次性任务。
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// `EventExecutor` 定义串行任务执行器的调度契约。
///
/// # 设计背景（Why）
/// - 流水线中每个 Handler 上下文都绑定一个串行执行器；该执行器是“每上下文
///   单线程”不变量的唯一承载者，也是完成 Future 判定死锁的依据。
///
/// # 契约说明（What）
/// - `execute`：将任务入队。实现必须保证同一执行器接收的任务按提交顺序执行，
///   且任意时刻至多一个任务在运行（串行语义）。
/// - `in_executor_thread`：判断当前线程是否就是该执行器的执行线程。调度器据此
///   决定内联调用还是入队，阻塞等待据此拒绝会自锁的调用。
///
/// # 前置/后置条件（Contract）
/// - **前置**：任务闭包必须 `Send`，提交后所有权移交执行器。
/// - **后置**：已入队任务要么被执行，要么在执行器关闭时被整体丢弃；实现不得
///   乱序或并发运行同一执行器的任务。
///
/// # 风险提示（Trade-offs）
/// - 执行器可以被多个上下文共享，串行语义因此自动给出跨上下文的提交序；
///   将上下文迁移到不同执行器会把事件切分到另一条任务队列，跨队列不保序。
pub trait EventExecutor: Send + Sync + 'static {
    /// 将任务提交到执行器队列。
    fn execute(&self, task: Task);

    /// 判断当前线程是否为该执行器的执行线程。
    fn in_executor_thread(&self) -> bool;
}

/// `EventExecutorGroup` 表示一组串行执行器，供流水线在插入 Handler 时抽取并钉住
/// 一个成员。
///
/// # 契约说明（What）
/// - `next`：返回组内的一个执行器。同一上下文只在插入时抽取一次，之后终生绑定；
///   实现可自由选择轮询、负载感知等分配策略。
pub trait EventExecutorGroup: Send + Sync + 'static {
    /// 从组中抽取一个执行器。
    fn next(&self) -> Arc<dyn EventExecutor>;
}

/// 在调用线程立即执行任务的执行器。
///
/// # 契约说明（What）
/// - `execute` 直接运行任务；`in_executor_thread` 恒为真，因此调度层永远选择
///   内联路径。
/// - 仅适合单线程宿主或测试：多个线程同时提交时串行语义由调用方退化保证。
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateExecutor;

impl EventExecutor for ImmediateExecutor {
    fn execute(&self, task: Task) {
        task();
    }

    fn in_executor_thread(&self) -> bool {
        true
    }
}

impl EventExecutorGroup for ImmediateExecutor {
    fn next(&self) -> Arc<dyn EventExecutor> {
        Arc::new(ImmediateExecutor)
    }
}
