//! 串口 TTY 适配器实现
//!
//! USB-CAN-A 适配器枚举为 CDC 串口设备，线参数固定：
//! 2 Mbaud、8 数据位、2 停止位、无校验、无流控。
//!
//! ## 读模型
//!
//! 使用带超时的阻塞单字节读取：超时返回 `Ok(None)`，让调用方有机会
//! 检查停止标志。这替代了裸 `O_NONBLOCK` + 微秒轮询的写法，
//! 在保持停机延迟上界的同时不再空转。
//!
//! ## 读写分离
//!
//! [`SerialTransport::split`] 通过 `try_clone()` 把端口拆成独立的
//! 读端和写端（共享同一个打开文件描述），两个方向的循环各自独占
//! 一端，串口写因此天然串行化。

use crate::{DeviceError, DeviceErrorKind, SerialByteRx, SerialFrameTx, TransportError};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::trace;

/// 串口传输端点
///
/// # 示例
///
/// ```no_run
/// use canusb_transport::SerialTransport;
/// use std::time::Duration;
///
/// let port = SerialTransport::open("/dev/ttyUSB0", 2_000_000, Duration::from_millis(5)).unwrap();
/// let (rx, tx) = port.split().unwrap();
/// ```
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialTransport {
    /// 打开串口设备
    ///
    /// # 参数
    /// - `path`: TTY 设备路径（如 "/dev/ttyUSB0"）
    /// - `baudrate`: 串口波特率（适配器固件固定 2 Mbaud）
    /// - `read_timeout`: 单字节读取超时，决定停止标志的响应上界
    ///
    /// # 错误
    /// - `TransportError::Device`: 设备不存在或无法打开
    pub fn open(
        path: impl Into<String>,
        baudrate: u32,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let path = path.into();

        let port = serialport::new(&path, baudrate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::Two)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| {
                let kind = match e.kind() {
                    serialport::ErrorKind::NoDevice => DeviceErrorKind::NoDevice,
                    serialport::ErrorKind::InvalidInput => DeviceErrorKind::NotFound,
                    _ => DeviceErrorKind::Backend,
                };
                DeviceError::new(kind, format!("Failed to open serial device '{}': {}", path, e))
            })?;

        trace!(
            "Serial device '{}' opened at {} baud (8N2, read timeout {:?})",
            path, baudrate, read_timeout
        );

        Ok(Self { port, path })
    }

    /// 获取设备路径
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 分离为独立的读端和写端
    ///
    /// 两个句柄通过 `try_clone()` 共享同一个打开文件描述，
    /// 可以安全地在不同线程中并发使用（一读一写）。
    ///
    /// # 错误
    /// - `TransportError::Device`: 克隆文件描述符失败
    pub fn split(self) -> Result<(SerialReader, SerialWriter), TransportError> {
        let writer_port = self.port.try_clone().map_err(|e| {
            DeviceError::new(
                DeviceErrorKind::Backend,
                format!("Failed to clone serial handle for '{}': {}", self.path, e),
            )
        })?;

        trace!("Serial device '{}' split into reader and writer", self.path);

        Ok((
            SerialReader {
                port: self.port,
                path: self.path.clone(),
            },
            SerialWriter {
                port: writer_port,
                path: self.path,
            },
        ))
    }
}

/// 串口读端（串行→总线方向独占）
pub struct SerialReader {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialReader {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SerialByteRx for SerialReader {
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                // 超时是正常情况，调用方会重新检查停止标志
                Ok(None)
            },
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

/// 串口写端（总线→串行方向独占）
pub struct SerialWriter {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialWriter {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SerialFrameTx for SerialWriter {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(frame)?;
        trace!(">>> {:02X?}", frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_nonexistent_device_fails() {
        let result = SerialTransport::open(
            "/dev/nonexistent_tty99",
            2_000_000,
            Duration::from_millis(5),
        );
        assert!(result.is_err());
        if let Err(TransportError::Device(e)) = result {
            assert!(e.message.contains("nonexistent_tty99"));
        } else {
            panic!("Expected Device error");
        }
    }
}
