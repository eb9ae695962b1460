//! # CANUSB Transport Layer
//!
//! 传输适配层，提供串口字节流端点和 SocketCAN 网络端点的统一抽象。
//!
//! 桥接引擎只依赖本模块的 trait（[`SerialByteRx`]/[`SerialFrameTx`]/
//! [`CanRxAdapter`]/[`CanTxAdapter`]），真实的 OS 传输实现在
//! [`serial`] 和 [`socketcan`] 模块中。

use canusb_protocol::CanMessage;
use thiserror::Error;

pub mod serial;

#[cfg(target_os = "linux")]
pub mod socketcan;

pub use serial::{SerialReader, SerialTransport, SerialWriter};

#[cfg(target_os = "linux")]
pub use socketcan::SocketCanAdapter;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    #[error("Read timeout")]
    Timeout,
}

impl TransportError {
    /// 该错误是否致命（应触发桥接引擎停机）
    ///
    /// 超时是非阻塞 IO 下的正常情况；其余 IO 错误
    /// （would-block 已在适配器内部转换为超时）一律视为致命。
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Timeout => false,
            TransportError::Device(e) => e.is_fatal(),
            TransportError::Io(_) => true,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            DeviceErrorKind::NoDevice | DeviceErrorKind::AccessDenied | DeviceErrorKind::NotFound
        )
    }
}

impl From<String> for DeviceError {
    fn from(message: String) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for DeviceError {
    fn from(message: &str) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

/// 串口接收端：逐字节读取
pub trait SerialByteRx {
    /// 读一个字节（带超时）
    ///
    /// # 返回值
    /// - `Ok(Some(byte))`: 读到一个字节
    /// - `Ok(None)`: 超时/暂无数据，调用方应检查停止标志后重试
    /// - `Err`: 传输错误（would-block 之外的读错误视为致命）
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError>;
}

/// 串口发送端：整帧写入
pub trait SerialFrameTx {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

/// CAN 网络接收端
pub trait CanRxAdapter {
    /// 接收一个报文（带超时，超时返回 [`TransportError::Timeout`]）
    fn receive(&mut self) -> Result<CanMessage, TransportError>;
}

/// CAN 网络发送端
pub trait CanTxAdapter {
    fn send(&mut self, msg: &CanMessage) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_not_fatal() {
        assert!(!TransportError::Timeout.is_fatal());
    }

    #[test]
    fn test_io_error_is_fatal() {
        let e = TransportError::Io(std::io::Error::other("tty gone"));
        assert!(e.is_fatal());
    }

    #[test]
    fn test_device_error_fatality_by_kind() {
        assert!(DeviceError::new(DeviceErrorKind::NoDevice, "unplugged").is_fatal());
        assert!(DeviceError::new(DeviceErrorKind::NotFound, "no such interface").is_fatal());
        assert!(DeviceError::new(DeviceErrorKind::AccessDenied, "permission").is_fatal());
        assert!(!DeviceError::new(DeviceErrorKind::InvalidFrame, "bad id").is_fatal());
        assert!(!DeviceError::new(DeviceErrorKind::Unknown, "???").is_fatal());
    }

    #[test]
    fn test_device_error_display() {
        let e = DeviceError::new(DeviceErrorKind::NotFound, "no such interface");
        assert_eq!(format!("{}", e), "NotFound: no such interface");
    }

    #[test]
    fn test_device_error_from_str() {
        let e: DeviceError = "something".into();
        assert_eq!(e.kind, DeviceErrorKind::Unknown);
    }
}
