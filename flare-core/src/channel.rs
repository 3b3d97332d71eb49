//! 传输端点与流水线之间的接口约定。
//!
//! # 模块说明（What）
//! - [`PipelineMessage`]：在 Handler 链中穿梭的统一消息载体；
//! - [`TransportSocketAddr`]：`no_std` 可用的通用 Socket 地址；
//! - [`Transport`]：头哨兵调用的传输原语集合，每个操作携带由传输层完成的
//!   [`Promise`]；
//! - [`Channel`]：暴露给用户的端点句柄表面，便捷方法全部委托给流水线。
//!
//! # 设计背景（Why）
//! - 具体的 Socket、事件循环与缓冲池实现都在本 Crate 之外；这里只固化流水线
//!   赖以工作的最小契约，传输实现与流水线各自独立演进。

use alloc::{boxed::Box, format, string::String, sync::Arc, vec::Vec};
use core::any::Any;
use core::fmt;

use crate::future::Promise;
use crate::pipeline::Pipeline;

/// 用户事件载体：任意线程安全对象的类型擦除封装。
pub type UserEvent = Box<dyn Any + Send + Sync>;

/// `PipelineMessage` 统一承载网络层字节与业务层对象。
///
/// # 逻辑解析（How）
/// - `Bytes` 变体承载 L4/L5 字节快照；`User` 变体通过 `Any` 封装任意
///   `Send + Sync` 业务对象，消费前显式下转型。
/// - 消息沿链传递即所有权转移：接收方要么继续转发，要么就地消费；消息离开
///   作用域即释放，尾哨兵对未被消费的消息执行最后一次释放。
///
/// # 契约说明（What）
/// - **前置条件**：创建 `User` 时调用方必须保证内部类型满足线程安全语义。
/// - **后置条件**：`try_into_user` 失败时原样返还消息，调用方应转发而非丢弃。
///
/// # 设计考量（Trade-offs）
/// - `Debug` 实现刻意隐藏内部细节，避免在日志中泄漏载荷。
pub enum PipelineMessage {
    /// L4/L5 字节缓冲快照。
    Bytes(Vec<u8>),
    /// L7 业务消息。
    User(Box<dyn Any + Send + Sync>),
}

impl PipelineMessage {
    /// 封装业务对象。
    pub fn from_user<T: Send + Sync + 'static>(value: T) -> Self {
        Self::User(Box::new(value))
    }

    /// 尝试取出业务对象；类型不符时原样返还消息。
    pub fn try_into_user<T: Send + Sync + 'static>(self) -> Result<T, PipelineMessage> {
        match self {
            Self::User(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(boxed) => Err(Self::User(boxed)),
            },
            other => Err(other),
        }
    }

    /// 以字节切片视角读取消息；业务消息返回 `None`。
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::User(_) => None,
        }
    }
}

impl From<Vec<u8>> for PipelineMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl fmt::Debug for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMessage::Bytes(bytes) => {
                f.debug_tuple("Bytes").field(&bytes.len()).finish()
            }
            PipelineMessage::User(_) => f.debug_tuple("User").field(&"<erased-user>").finish(),
        }
    }
}

/// `TransportSocketAddr` 在 `no_std` 环境中表示通用 Socket 地址。
///
/// # 契约说明（What）
/// - `V4`、`V6` 分别表示 IPv4、IPv6；Display 实现遵循人类可读格式。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransportSocketAddr {
    /// IPv4 地址。
    V4 { addr: [u8; 4], port: u16 },
    /// IPv6 地址。
    V6 { addr: [u16; 8], port: u16 },
}

impl fmt::Display for TransportSocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSocketAddr::V4 { addr, port } => write!(
                f,
                "{}.{}.{}.{}:{}",
                addr[0], addr[1], addr[2], addr[3], port
            ),
            TransportSocketAddr::V6 { addr, port } => {
                let segments: Vec<String> =
                    addr.iter().map(|segment| format!("{segment:x}")).collect();
                write!(f, "[{}]:{}", segments.join(":"), port)
            }
        }
    }
}

#[cfg(feature = "std")]
impl From<std::net::SocketAddr> for TransportSocketAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        match addr {
            std::net::SocketAddr::V4(v4) => Self::V4 {
                addr: v4.ip().octets(),
                port: v4.port(),
            },
            std::net::SocketAddr::V6(v6) => Self::V6 {
                addr: v6.ip().segments(),
                port: v6.port(),
            },
        }
    }
}

/// 头哨兵调用的传输原语集合。
///
/// # 契约说明（What）
/// - 每个携带 [`Promise`] 的操作都必须在 I/O 落定时以成功、失败或取消完成它；
///   传输层是这些 Promise 的唯一写方。
/// - `begin_read` 与 `flush` 不产生完成通知。
///
/// # 前置/后置条件（Contract）
/// - **前置**：方法均在流水线头哨兵的执行器线程上被调用；实现不得阻塞。
/// - **后置**：`write` 收到的消息所有权移交传输层，由其负责发送或释放。
pub trait Transport: Send + Sync + 'static {
    /// 绑定本地地址。
    fn bind(&self, addr: TransportSocketAddr, promise: Promise);

    /// 连接远端，可选指定本地地址。
    fn connect(
        &self,
        remote: TransportSocketAddr,
        local: Option<TransportSocketAddr>,
        promise: Promise,
    );

    /// 断开连接。
    fn disconnect(&self, promise: Promise);

    /// 关闭端点。
    fn close(&self, promise: Promise);

    /// 从反应器注销。
    fn deregister(&self, promise: Promise);

    /// 请求一轮读取。
    fn begin_read(&self);

    /// 写出一条消息。
    fn write(&self, msg: PipelineMessage, promise: Promise);

    /// 冲刷写缓冲。
    fn flush(&self);
}

/// 暴露给用户的端点句柄表面。
///
/// # 设计背景（Why）
/// - 具体实现属于传输层；这里只约定端点必须持有唯一的流水线，并以便捷方法
///   转发全部入站与出站传播。
///
/// # 契约说明（What）
/// - 端点与流水线一一对应且同生共死；`pipeline()` 返回的引用在端点生命周期内
///   始终有效。
pub trait Channel: Send + Sync + 'static {
    /// 返回便于日志关联的端点唯一 ID。
    fn id(&self) -> &str;

    /// 返回端点独占的流水线。
    fn pipeline(&self) -> &Arc<Pipeline>;

    /// 指示当前是否可写。
    fn is_writable(&self) -> bool {
        true
    }

    /// 写入消息，返回完成通知。
    fn write(&self, msg: PipelineMessage) -> Promise {
        self.pipeline().write(msg)
    }

    /// 写入并冲刷，返回完成通知。
    fn write_and_flush(&self, msg: PipelineMessage) -> Promise {
        self.pipeline().write_and_flush(msg)
    }

    /// 冲刷写缓冲。
    fn flush(&self) {
        self.pipeline().flush();
    }

    /// 关闭端点，返回完成通知。
    fn close(&self) -> Promise {
        self.pipeline().close()
    }

    /// 请求一轮读取。
    fn read(&self) {
        self.pipeline().read();
    }
}
