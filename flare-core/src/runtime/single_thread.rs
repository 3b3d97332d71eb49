use alloc::{string::String, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};

use super::executor::{EventExecutor, EventExecutorGroup, Task};

/// 拥有专用工作线程的串行执行器。
///
/// # 设计背景（Why）
/// - 流水线默认把一个端点的全部上下文钉在同一个反应器执行器上；本类型以
///   “单线程 + FIFO 队列”的最小形态实现该角色，既用于测试也可直接充当
///   轻量宿主的反应器替身。
///
/// # 逻辑解析（How）
/// - 构造时启动一个工作线程，循环消费 `mpsc` 队列中的任务；队列天然给出
///   提交顺序执行与串行语义。
/// - `in_executor_thread` 通过比较 [`ThreadId`] 判定，开销为一次 TLS 读取。
/// - `shutdown` 丢弃发送端使工作线程自然退出，随后在非工作线程上合流。
///
/// # 契约说明（What）
/// - **后置条件**：`shutdown` 返回后队列中尚未执行的任务已全部执行完毕
///   （发送端关闭后接收端仍会清空既有队列）；关闭后的 `execute` 调用静默
///   丢弃任务。
///
/// # 风险提示（Trade-offs）
/// - 任务内 panic 会终止工作线程，后续任务不再执行；流水线的派发路径以
///   `Result` 传递错误，不依赖 panic 恢复。
pub struct SingleThreadExecutor {
    sender: spin::Mutex<Option<mpsc::Sender<Task>>>,
    worker: spin::Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl SingleThreadExecutor {
    /// 启动一个以 `name` 命名工作线程的执行器。
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
            })
            .expect("spawn executor worker thread");
        let thread_id = worker.thread().id();
        Arc::new(Self {
            sender: spin::Mutex::new(Some(sender)),
            worker: spin::Mutex::new(Some(worker)),
            thread_id,
        })
    }

    /// 关闭执行器：停止接收新任务，清空队列后合流工作线程。
    ///
    /// # 契约说明
    /// - 幂等；在工作线程自身上调用时只关闭队列、不合流。
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        if thread::current().id() != self.thread_id {
            if let Some(worker) = self.worker.lock().take() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for SingleThreadExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl EventExecutor for SingleThreadExecutor {
    fn execute(&self, task: Task) {
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(task);
        }
    }

    fn in_executor_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

/// 以轮询方式分配成员的执行器组。
///
/// # 契约说明（What）
/// - 构造时启动 `size` 个 [`SingleThreadExecutor`]；`next` 按轮询返回成员，
///   流水线在插入 Handler 时抽取一次并终生钉住。
/// - `shutdown` 依次关闭全部成员。
pub struct MultiThreadExecutorGroup {
    members: Vec<Arc<SingleThreadExecutor>>,
    cursor: AtomicUsize,
}

impl MultiThreadExecutorGroup {
    /// 构造包含 `size` 个工作线程的组，线程名为 `{prefix}-{index}`。
    pub fn new(size: usize, prefix: &str) -> Self {
        let members = (0..size)
            .map(|index| SingleThreadExecutor::new(alloc::format!("{prefix}-{index}")))
            .collect();
        Self {
            members,
            cursor: AtomicUsize::new(0),
        }
    }

    /// 关闭组内全部执行器。
    pub fn shutdown(&self) {
        for member in &self.members {
            member.shutdown();
        }
    }
}

impl EventExecutorGroup for MultiThreadExecutorGroup {
    fn next(&self) -> Arc<dyn EventExecutor> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.members.len();
        Arc::clone(&self.members[index]) as Arc<dyn EventExecutor>
    }
}
