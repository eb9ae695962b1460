//! 桥接配置

use canusb_protocol::{CanSpeed, FrameType, OperatingMode};
use crate::echo::DEFAULT_ECHO_CAPACITY;

/// 桥接引擎配置
///
/// 控制适配器的配置命令内容和两个方向循环的行为。
///
/// # Example
///
/// ```
/// use canusb_bridge::BridgeConfig;
/// use canusb_protocol::{CanSpeed, FrameType, OperatingMode};
///
/// let config = BridgeConfig {
///     can_speed: CanSpeed::S500000,
///     frame_type: FrameType::Standard,
///     mode: OperatingMode::Normal,
///     ..BridgeConfig::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// CAN 总线波特率（写入配置命令帧）
    pub can_speed: CanSpeed,
    /// 寻址模式（决定出方向数据帧的标识符宽度）
    pub frame_type: FrameType,
    /// 适配器工作模式；静默模式下不启动总线→串行方向
    pub mode: OperatingMode,
    /// 回声抑制存储容量（帧）
    pub echo_capacity: usize,
    /// 串口单字节读取超时（毫秒）
    /// 决定串行→总线循环对停止标志的响应上界
    pub serial_read_timeout_ms: u64,
    /// CAN 接收超时（毫秒）
    /// 决定总线→串行循环对停止标志的响应上界
    pub can_receive_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            can_speed: CanSpeed::S500000,
            frame_type: FrameType::Standard,
            mode: OperatingMode::Normal,
            echo_capacity: DEFAULT_ECHO_CAPACITY,
            serial_read_timeout_ms: 5,
            can_receive_timeout_ms: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = BridgeConfig::default();
        assert_eq!(config.can_speed, CanSpeed::S500000);
        assert_eq!(config.frame_type, FrameType::Standard);
        assert_eq!(config.mode, OperatingMode::Normal);
        assert_eq!(config.echo_capacity, 128);
        assert_eq!(config.serial_read_timeout_ms, 5);
        assert_eq!(config.can_receive_timeout_ms, 100);
    }

    #[test]
    fn test_config_custom() {
        let config = BridgeConfig {
            can_speed: CanSpeed::S1000000,
            frame_type: FrameType::Extended,
            mode: OperatingMode::Silent,
            echo_capacity: 64,
            ..BridgeConfig::default()
        };
        assert_eq!(config.can_speed, CanSpeed::S1000000);
        assert_eq!(config.frame_type, FrameType::Extended);
        assert!(config.mode.is_silent());
        assert_eq!(config.echo_capacity, 64);
    }
}
