//! # CANUSB Protocol
//!
//! USB-CAN-A 串口适配器线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 线协议常量定义
//! - `config`: 波特率/帧类型/工作模式编码
//! - `codec`: 帧编解码与增量组帧状态机
//!
//! ## 线格式
//!
//! 所有帧以 0xAA 起始。命令帧固定 20 字节并以加和校验和收尾；
//! 数据帧变长（标识符 little-endian，2 或 4 字节），以 0x55 收尾，
//! 不携带校验和。

pub mod codec;
pub mod config;
pub mod constants;

// 重新导出常用类型
pub use codec::*;
pub use config::*;
pub use constants::*;

/// CAN 2.0 报文的统一抽象
///
/// # 设计目的
///
/// `CanMessage` 是协议层和传输层之间的中间抽象：
/// - **层次解耦**：编解码不依赖 SocketCAN/串口实现
/// - **统一接口**：桥接引擎通过 trait 收发统一的报文类型
///
/// # 设计特性
///
/// - **Copy trait**：零成本复制，适合高频 CAN 场景
/// - **固定 8 字节**：避免堆分配
/// - **无生命周期**：自包含数据结构
///
/// # 转换示例
///
/// ```rust
/// use canusb_protocol::CanMessage;
///
/// let msg = CanMessage::new_standard(0x123, &[1, 2, 3, 4]);
/// assert_eq!(msg.id(), 0x123);
/// assert_eq!(msg.data_slice(), &[1, 2, 3, 4]);
///
/// let msg_ext = CanMessage::new_extended(0x1234_5678, &[5, 6]);
/// assert!(msg_ext.is_extended);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanMessage {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 报文数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,
}

impl CanMessage {
    /// 创建标准帧报文
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false)
    }

    /// 创建扩展帧报文
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true)
    }

    /// 通用构造器
    fn new(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }
}

use thiserror::Error;

/// 协议编解码错误类型
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid payload length: {len} (max 8)")]
    InvalidLength { len: usize },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Truncated frame: {actual} bytes (expected at least {expected})")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("Not a data frame (type byte 0x{type_byte:02X})")]
    NotDataFrame { type_byte: u8 },

    #[error("Frame assembly buffer overflow")]
    BufferOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_message_standard() {
        let msg = CanMessage::new_standard(0x123, &[1, 2, 3]);
        assert_eq!(msg.id(), 0x123);
        assert_eq!(msg.len, 3);
        assert_eq!(msg.data_slice(), &[1, 2, 3]);
        assert!(!msg.is_extended);
        // 未使用部分填零
        assert_eq!(msg.data[3..], [0u8; 5]);
    }

    #[test]
    fn test_can_message_extended() {
        let msg = CanMessage::new_extended(0x1FFF_FFFF, &[0xAA; 8]);
        assert_eq!(msg.id(), 0x1FFF_FFFF);
        assert_eq!(msg.len, 8);
        assert!(msg.is_extended);
    }

    #[test]
    fn test_can_message_empty_payload() {
        let msg = CanMessage::new_standard(0x7FF, &[]);
        assert_eq!(msg.len, 0);
        assert_eq!(msg.data_slice(), &[] as &[u8]);
    }

    #[test]
    fn test_can_message_truncates_over_8() {
        // 超过 8 字节的输入截断到 8（构造器保证不变量）
        let msg = CanMessage::new_standard(0x100, &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(msg.len, 8);
        assert_eq!(msg.data_slice(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_protocol_error_display() {
        let e = ProtocolError::InvalidLength { len: 9 };
        assert_eq!(format!("{}", e), "Invalid payload length: 9 (max 8)");

        let e = ProtocolError::ChecksumMismatch {
            expected: 0x17,
            actual: 0x18,
        };
        assert_eq!(
            format!("{}", e),
            "Checksum mismatch: expected 0x17, got 0x18"
        );
    }
}
