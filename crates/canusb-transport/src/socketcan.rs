//! SocketCAN CAN 适配器实现
//!
//! 基于 Linux SocketCAN 子系统的网络端点。
//!
//! ## 特性
//!
//! - 支持标准帧和扩展帧
//! - 读超时有界（`SO_RCVTIMEO`），保证停止标志的响应上界
//! - 自动过滤错误帧和远程帧，只交付有效数据帧
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**：SocketCAN 是 Linux 内核特性
//! - **接口配置**：接口的创建/启动由系统工具（`ip link`）完成，
//!   不在适配层设置
//!
//! ## 回环与回声
//!
//! 有意保留内核默认的 `CAN_RAW_LOOPBACK`：桥接器在同一接口上
//! 使用独立的收/发 socket，发出的帧会被回环到接收 socket——
//! 这正是回声抑制存储要处理的路径，不要在这里关掉它。

use crate::{CanRxAdapter, CanTxAdapter, DeviceError, DeviceErrorKind, TransportError};
use canusb_protocol::CanMessage;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};
use std::time::Duration;
use tracing::{trace, warn};

/// SocketCAN 适配器
///
/// 同时实现 [`CanRxAdapter`] 和 [`CanTxAdapter`]；桥接守护进程
/// 在同一接口上打开两个实例，一个只收一个只发。
///
/// # 示例
///
/// ```no_run
/// use canusb_transport::{SocketCanAdapter, CanTxAdapter};
/// use canusb_protocol::CanMessage;
/// use std::time::Duration;
///
/// let mut adapter = SocketCanAdapter::open("vcan0", Duration::from_millis(100)).unwrap();
/// adapter.send(&CanMessage::new_standard(0x123, &[1, 2, 3, 4])).unwrap();
/// ```
pub struct SocketCanAdapter {
    socket: CanSocket,
    interface: String,
    read_timeout: Duration,
}

impl SocketCanAdapter {
    /// 打开 CAN 接口
    ///
    /// # 参数
    /// - `interface`: CAN 接口名称（如 "can0" 或 "vcan0"）
    /// - `read_timeout`: 接收超时，决定停止标志的响应上界
    ///
    /// # 错误
    /// - `TransportError::Device`: 接口不存在或无法打开
    ///   （错误信息会提示 `ip link` 修复命令）
    /// - `TransportError::Io`: 设置超时失败
    pub fn open(interface: impl Into<String>, read_timeout: Duration) -> Result<Self, TransportError> {
        let interface = interface.into();

        let socket = CanSocket::open(&interface).map_err(|e| {
            DeviceError::new(
                DeviceErrorKind::NotFound,
                format!(
                    "Failed to open CAN interface '{}': {}. \
                     Create it with: ip link add dev {} type vcan && ip link set up {}",
                    interface, e, interface, interface
                ),
            )
        })?;

        socket.set_read_timeout(read_timeout).map_err(TransportError::Io)?;

        trace!(
            "SocketCAN interface '{}' opened (read timeout {:?})",
            interface, read_timeout
        );

        Ok(Self {
            socket,
            interface,
            read_timeout,
        })
    }

    /// 获取接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 获取读超时时间
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

impl CanRxAdapter for SocketCanAdapter {
    /// 接收报文（阻塞直到收到有效数据帧或超时）
    ///
    /// 错误帧和远程帧在这里被过滤掉，循环等待下一个有效帧；
    /// 超时返回 [`TransportError::Timeout`]。
    fn receive(&mut self) -> Result<CanMessage, TransportError> {
        loop {
            let frame = match self.socket.read_frame() {
                Ok(frame) => frame,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return Err(TransportError::Timeout);
                },
                Err(e) => return Err(TransportError::Io(e)),
            };

            match frame {
                CanFrame::Data(data_frame) => {
                    let (id, is_extended) = match data_frame.id() {
                        Id::Standard(id) => (id.as_raw() as u32, false),
                        Id::Extended(id) => (id.as_raw(), true),
                    };

                    let msg = if is_extended {
                        CanMessage::new_extended(id, data_frame.data())
                    } else {
                        CanMessage::new_standard(id as u16, data_frame.data())
                    };

                    trace!(
                        "Received CAN frame: ID=0x{:X}, len={}",
                        msg.id, msg.len
                    );
                    return Ok(msg);
                },
                CanFrame::Remote(_) => {
                    // 远程帧不携带数据，桥接协议无法表达，丢弃
                    trace!("Ignoring RTR frame on '{}'", self.interface);
                },
                CanFrame::Error(err_frame) => {
                    warn!(
                        "CAN error frame on '{}': {:?}, ignoring",
                        self.interface, err_frame
                    );
                },
            }
        }
    }
}

impl CanTxAdapter for SocketCanAdapter {
    /// 发送报文（Fire-and-Forget）
    ///
    /// # 错误
    /// - `TransportError::Device`: 构造帧失败（如 ID 超出范围）
    /// - `TransportError::Io`: 发送失败（如总线错误、接口关闭）
    fn send(&mut self, msg: &CanMessage) -> Result<(), TransportError> {
        let frame = if msg.is_extended {
            ExtendedId::new(msg.id)
                .and_then(|id| CanFrame::new(id, msg.data_slice()))
                .ok_or_else(|| {
                    DeviceError::new(
                        DeviceErrorKind::InvalidFrame,
                        format!("Failed to create extended frame with ID 0x{:X}", msg.id),
                    )
                })?
        } else {
            StandardId::new(msg.id as u16)
                .and_then(|id| CanFrame::new(id, msg.data_slice()))
                .ok_or_else(|| {
                    DeviceError::new(
                        DeviceErrorKind::InvalidFrame,
                        format!("Failed to create standard frame with ID 0x{:X}", msg.id),
                    )
                })?
        };

        self.socket.write_frame(&frame).map_err(TransportError::Io)?;

        trace!("Sent CAN frame: ID=0x{:X}, len={}", msg.id, msg.len);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    /// 检查 CAN 接口是否存在
    fn can_interface_exists(interface: &str) -> bool {
        let output = Command::new("ip").args(["link", "show", interface]).output();

        output.is_ok() && output.unwrap().status.success()
    }

    /// 宏：要求 vcan0 接口存在，如果不存在则跳过测试
    macro_rules! require_vcan0 {
        () => {{
            if !can_interface_exists("vcan0") {
                eprintln!("Skipping test: vcan0 interface not available");
                return;
            }
            "vcan0"
        }};
    }

    #[test]
    fn test_open_invalid_interface() {
        let result = SocketCanAdapter::open("nonexistent_can99", Duration::from_millis(100));
        assert!(result.is_err());
        if let Err(TransportError::Device(e)) = result {
            assert!(e.message.contains("nonexistent_can99"));
            assert!(e.is_fatal());
        } else {
            panic!("Expected Device error");
        }
    }

    #[test]
    fn test_open_stores_interface_name() {
        let interface = require_vcan0!();
        let adapter = SocketCanAdapter::open(interface, Duration::from_millis(100)).unwrap();
        assert_eq!(adapter.interface(), "vcan0");
        assert_eq!(adapter.read_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_receive_times_out_when_bus_idle() {
        let interface = require_vcan0!();
        let mut adapter = SocketCanAdapter::open(interface, Duration::from_millis(10)).unwrap();

        // 排空缓冲后，空闲总线上的接收必须以 Timeout 返回
        // （其他并发测试可能在 vcan0 上发帧，Ok 一律跳过）
        loop {
            match adapter.receive() {
                Ok(_) => continue,
                Err(TransportError::Timeout) => break,
                Err(e) => panic!("Unexpected error while draining: {:?}", e),
            }
        }
    }

    #[test]
    fn test_send_and_receive_roundtrip() {
        // vcan 默认回环：一个 socket 发送，另一个 socket 能收到
        let interface = require_vcan0!();
        let mut tx = SocketCanAdapter::open(interface, Duration::from_millis(100)).unwrap();
        let mut rx = SocketCanAdapter::open(interface, Duration::from_millis(500)).unwrap();

        // 清空接收缓冲
        loop {
            match rx.receive() {
                Ok(_) => continue,
                Err(TransportError::Timeout) => break,
                Err(e) => panic!("Unexpected error while clearing: {:?}", e),
            }
        }

        let sent = CanMessage::new_standard(0x456, &[0xAA, 0xBB, 0xCC, 0xDD]);
        tx.send(&sent).unwrap();

        let received = rx.receive().unwrap();
        assert_eq!(received.id, 0x456);
        assert_eq!(received.data_slice(), &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert!(!received.is_extended);
    }
}
