//! 端点级类型安全属性存储。
//!
//! # 设计背景（Why）
//! - Handler 经常需要跨事件、跨实例（可共享 Handler 的每上下文状态）存放少量
//!   状态；属性表以“键即身份”的方式提供类型安全的存取，避免各 Handler 自行
//!   维护全局表。
//!
//! # 契约说明（What）
//! - [`AttributeKey`] 的身份在进程内全局唯一：同名的两次构造是两个不同的键。
//! - 单元格按键惰性创建，创建对并发查找原子；各单元格彼此独立加锁。

use alloc::sync::Arc;
use core::any::Any;
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// 类型化属性键。
///
/// # 逻辑解析（How）
/// - 构造时从进程级单调计数器领取唯一 ID；`name` 仅用于调试输出。
/// - `PhantomData<fn() -> T>` 让键在不持有 `T` 的情况下参与类型推导，且保持
///   `Send + Sync` 不受 `T` 约束。
#[derive(Debug)]
pub struct AttributeKey<T> {
    id: u64,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    /// 构造具备全新身份的键。
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed),
            name,
            _marker: PhantomData,
        }
    }

    /// 键的调试名称。
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn id(&self) -> u64 {
        self.id
    }
}

struct AttributeCell<T> {
    value: spin::Mutex<Option<T>>,
}

impl<T> AttributeCell<T> {
    fn new() -> Self {
        Self {
            value: spin::Mutex::new(None),
        }
    }
}

/// 属性单元格句柄，可克隆并跨线程共享。
///
/// # 契约说明（What）
/// - 各单元格独立加锁；复合操作（`compare_and_set` 等）在单元格锁内原子完成。
pub struct Attribute<T> {
    cell: Arc<AttributeCell<T>>,
}

impl<T> Clone for Attribute<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("value", &*self.cell.value.lock())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Attribute<T> {
    /// 读取当前值的克隆。
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.cell.value.lock().clone()
    }

    /// 覆盖当前值。
    pub fn set(&self, value: T) {
        *self.cell.value.lock() = Some(value);
    }

    /// 覆盖当前值并返回旧值。
    pub fn get_and_set(&self, value: T) -> Option<T> {
        self.cell.value.lock().replace(value)
    }

    /// 仅当单元格为空时写入；返回操作后的单元格值。
    pub fn set_if_absent(&self, value: T) -> T
    where
        T: Clone,
    {
        let mut slot = self.cell.value.lock();
        match slot.as_ref() {
            Some(existing) => existing.clone(),
            None => {
                *slot = Some(value.clone());
                value
            }
        }
    }

    /// 当前值等于 `expect` 时原子替换为 `update`，返回是否替换。
    pub fn compare_and_set(&self, expect: Option<&T>, update: Option<T>) -> bool
    where
        T: PartialEq,
    {
        let mut slot = self.cell.value.lock();
        let matches = match (slot.as_ref(), expect) {
            (Some(current), Some(expect)) => current == expect,
            (None, None) => true,
            _ => false,
        };
        if matches {
            *slot = update;
        }
        matches
    }
}

/// 端点级属性表：键身份到单元格的映射。
#[derive(Default)]
pub struct AttributeMap {
    cells: spin::Mutex<HashMap<u64, Arc<dyn Any + Send + Sync>>>,
}

impl AttributeMap {
    /// 构造空表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取键对应的单元格，不存在时原子创建。
    pub fn attr<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>) -> Attribute<T> {
        let mut cells = self.cells.lock();
        let entry = cells
            .entry(key.id())
            .or_insert_with(|| Arc::new(AttributeCell::<T>::new()) as Arc<dyn Any + Send + Sync>);
        let cell = Arc::clone(entry)
            .downcast::<AttributeCell<T>>()
            .expect("attribute cell type must match its key identity");
        Attribute { cell }
    }

    /// 判断键是否已有单元格，不触发创建。
    pub fn has_attr<T: Send + Sync + 'static>(&self, key: &AttributeKey<T>) -> bool {
        self.cells.lock().contains_key(&key.id())
    }
}

impl fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeMap")
            .field("cells", &self.cells.lock().len())
            .finish()
    }
}
