//! 条件性 `ArcSwap` 适配层。
//!
//! # 设计初衷（Why）
//! - 流水线观察者（`names`、`to_map` 等）必须在任意线程读取一致快照，而变更路径
//!   在内部监视器下重建快照后整体替换；`std` 构建复用社区成熟的
//!   [`arc-swap`](https://crates.io/crates/arc-swap) 获得锁自由的读路径。
//! - `no_std + alloc` 构建下该三方库不可用，改以 `spin::RwLock` 封装同形 API，
//!   保证契约代码无需条件编译分支。
//!
//! # 契约说明（What）
//! - 两种后端均暴露 `new`、`from_pointee`、`load_full`、`store` 四个方法；
//!   读操作返回的 `Arc<T>` 可长期保存，旧快照在所有持有者释放后自动回收。
//!
//! # 权衡与注意事项（Trade-offs）
//! - 回退实现的写操作会短暂阻塞读者；流水线变更频率远低于读频率，正确性优先。

#[cfg(feature = "std")]
pub use ::arc_swap::ArcSwap;

#[cfg(not(feature = "std"))]
mod fallback {
    use alloc::sync::Arc;
    use core::fmt;
    use spin::RwLock;

    /// `no_std` 环境下的精简 `ArcSwap` 仿制实现。
    ///
    /// - **逻辑（How）**：内部以 `spin::RwLock<Arc<T>>` 保存快照；读操作克隆
    ///   `Arc`，写操作独占替换。
    /// - **契约（What）**：读操作返回的快照与最近一次 `store` 写入的值一致；
    ///   `T: Send + Sync` 时容器可跨线程共享。
    pub struct ArcSwap<T> {
        inner: RwLock<Arc<T>>,
    }

    impl<T> ArcSwap<T> {
        /// 以现成的 `Arc` 构造交换容器。
        pub fn new(initial: Arc<T>) -> Self {
            Self {
                inner: RwLock::new(initial),
            }
        }

        /// 以值语义构造容器，内部自动封装为 `Arc`。
        pub fn from_pointee(value: T) -> Self {
            Self::new(Arc::new(value))
        }

        /// 读取当前快照，仅增加引用计数，不复制 `T`。
        pub fn load_full(&self) -> Arc<T> {
            self.inner.read().clone()
        }

        /// 用新的快照替换当前值。
        pub fn store(&self, value: Arc<T>) {
            *self.inner.write() = value;
        }
    }

    impl<T: fmt::Debug> fmt::Debug for ArcSwap<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ArcSwap")
                .field("inner", &self.inner.read())
                .finish()
        }
    }
}

#[cfg(not(feature = "std"))]
pub use fallback::ArcSwap;
