//! # CANUSB Bridge
//!
//! USB-CAN-A 串口适配器与 SocketCAN 之间的双向桥接引擎。
//!
//! ## 模块
//!
//! - `echo`: 回声抑制存储（防止桥接注入的帧被反向再转发）
//! - `config`: 桥接配置
//! - `engine`: 两个方向循环 + 引擎生命周期
//!
//! ## 架构
//!
//! ```text
//! Serial TTY (USB-CAN-A)          SocketCAN (slcan0)
//!        │  serial->bus loop             ▲
//!        │  组帧 → 解码 → 记录 ──────────┘
//!        ▲                               │
//!        │  编码 ← 回声抑制 ← 轮询       │
//!        └────────── bus->serial loop ───┘
//! ```
//!
//! 两个循环只共享回声抑制存储（单互斥锁）和原子停止标志。

pub mod config;
pub mod echo;
pub mod engine;

pub use config::BridgeConfig;
pub use echo::{EchoStore, StoreError, DEFAULT_ECHO_CAPACITY};
pub use engine::{
    bus_to_serial_loop, serial_to_bus_loop, BridgeContext, BridgeEngine, BridgeOutcome,
    BridgeState, BridgeStats, StopHandle,
};

use canusb_protocol::ProtocolError;
use canusb_transport::TransportError;
use thiserror::Error;

/// 桥接层错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 启动时配置命令帧写入失败
    #[error("Failed to configure adapter: {0}")]
    Configure(#[source] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let e = BridgeError::Configure(TransportError::Timeout);
        assert_eq!(format!("{}", e), "Failed to configure adapter: Read timeout");

        let e: BridgeError = TransportError::Timeout.into();
        assert!(matches!(e, BridgeError::Transport(_)));

        let e: BridgeError = ProtocolError::InvalidLength { len: 9 }.into();
        assert!(matches!(e, BridgeError::Protocol(_)));
    }
}
