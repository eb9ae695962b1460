//! 适配器配置码定义
//!
//! 配置命令帧中使用的波特率/帧类型/工作模式编码。
//! 编码值由适配器固件定义，不可更改。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// CAN 总线波特率编码
///
/// 适配器支持的 12 档波特率（5 kbps - 1 Mbps）。
/// 使用 [`CanSpeed::from_bps`] 从 bps 数值转换，非法值返回 `None`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CanSpeed {
    S1000000 = 0x01,
    S800000 = 0x02,
    S500000 = 0x03,
    S400000 = 0x04,
    S250000 = 0x05,
    S200000 = 0x06,
    S125000 = 0x07,
    S100000 = 0x08,
    S50000 = 0x09,
    S20000 = 0x0A,
    S10000 = 0x0B,
    S5000 = 0x0C,
}

impl CanSpeed {
    /// 从 bps 数值转换为波特率编码
    ///
    /// # 参数
    /// - `bps`: 总线波特率（bit/s）
    ///
    /// # 返回值
    /// - `Some(CanSpeed)`: 适配器支持的档位
    /// - `None`: 不在支持列表中
    pub fn from_bps(bps: u32) -> Option<Self> {
        match bps {
            1_000_000 => Some(CanSpeed::S1000000),
            800_000 => Some(CanSpeed::S800000),
            500_000 => Some(CanSpeed::S500000),
            400_000 => Some(CanSpeed::S400000),
            250_000 => Some(CanSpeed::S250000),
            200_000 => Some(CanSpeed::S200000),
            125_000 => Some(CanSpeed::S125000),
            100_000 => Some(CanSpeed::S100000),
            50_000 => Some(CanSpeed::S50000),
            20_000 => Some(CanSpeed::S20000),
            10_000 => Some(CanSpeed::S10000),
            5_000 => Some(CanSpeed::S5000),
            _ => None,
        }
    }

    /// 波特率数值（bit/s）
    pub fn bps(&self) -> u32 {
        match self {
            CanSpeed::S1000000 => 1_000_000,
            CanSpeed::S800000 => 800_000,
            CanSpeed::S500000 => 500_000,
            CanSpeed::S400000 => 400_000,
            CanSpeed::S250000 => 250_000,
            CanSpeed::S200000 => 200_000,
            CanSpeed::S125000 => 125_000,
            CanSpeed::S100000 => 100_000,
            CanSpeed::S50000 => 50_000,
            CanSpeed::S20000 => 20_000,
            CanSpeed::S10000 => 10_000,
            CanSpeed::S5000 => 5_000,
        }
    }
}

/// 帧类型编码（寻址模式）
///
/// 决定数据帧标识符字段的宽度：标准帧 2 字节（11-bit ID），
/// 扩展帧 4 字节（29-bit ID）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Standard = 0x01,
    Extended = 0x02,
}

impl FrameType {
    /// 数据帧中标识符字段的字节数
    pub fn id_len(&self) -> usize {
        match self {
            FrameType::Standard => 2,
            FrameType::Extended => 4,
        }
    }
}

/// 适配器工作模式编码
///
/// - `Normal`: 正常收发
/// - `Loopback`: 回环测试模式
/// - `Silent`: 静默模式（只听不发，即 listen-only）
/// - `LoopbackSilent`: 回环 + 静默
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum OperatingMode {
    Normal = 0x00,
    Loopback = 0x01,
    Silent = 0x02,
    LoopbackSilent = 0x03,
}

impl OperatingMode {
    /// 静默模式下适配器不向总线发送任何帧，桥接器也不应运行发送方向
    pub fn is_silent(&self) -> bool {
        matches!(self, OperatingMode::Silent | OperatingMode::LoopbackSilent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_from_bps() {
        assert_eq!(CanSpeed::from_bps(500_000), Some(CanSpeed::S500000));
        assert_eq!(CanSpeed::from_bps(1_000_000), Some(CanSpeed::S1000000));
        assert_eq!(CanSpeed::from_bps(5_000), Some(CanSpeed::S5000));
    }

    #[test]
    fn test_speed_from_bps_invalid() {
        // 不在 12 档列表里的值一律拒绝
        assert_eq!(CanSpeed::from_bps(0), None);
        assert_eq!(CanSpeed::from_bps(300_000), None);
        assert_eq!(CanSpeed::from_bps(2_000_000), None);
    }

    #[test]
    fn test_speed_wire_codes() {
        assert_eq!(u8::from(CanSpeed::S1000000), 0x01);
        assert_eq!(u8::from(CanSpeed::S500000), 0x03);
        assert_eq!(u8::from(CanSpeed::S5000), 0x0C);
    }

    #[test]
    fn test_speed_bps_roundtrip() {
        for bps in [
            1_000_000, 800_000, 500_000, 400_000, 250_000, 200_000, 125_000, 100_000, 50_000,
            20_000, 10_000, 5_000,
        ] {
            let speed = CanSpeed::from_bps(bps).unwrap();
            assert_eq!(speed.bps(), bps);
        }
    }

    #[test]
    fn test_frame_type_codes() {
        assert_eq!(u8::from(FrameType::Standard), 0x01);
        assert_eq!(u8::from(FrameType::Extended), 0x02);
        assert_eq!(FrameType::Standard.id_len(), 2);
        assert_eq!(FrameType::Extended.id_len(), 4);
    }

    #[test]
    fn test_operating_mode_codes() {
        assert_eq!(u8::from(OperatingMode::Normal), 0x00);
        assert_eq!(u8::from(OperatingMode::Loopback), 0x01);
        assert_eq!(u8::from(OperatingMode::Silent), 0x02);
        assert_eq!(u8::from(OperatingMode::LoopbackSilent), 0x03);
    }

    #[test]
    fn test_operating_mode_is_silent() {
        assert!(!OperatingMode::Normal.is_silent());
        assert!(!OperatingMode::Loopback.is_silent());
        assert!(OperatingMode::Silent.is_silent());
        assert!(OperatingMode::LoopbackSilent.is_silent());
    }

    #[test]
    fn test_try_from_primitive() {
        assert_eq!(CanSpeed::try_from(0x03), Ok(CanSpeed::S500000));
        assert!(CanSpeed::try_from(0x0D).is_err());
        assert_eq!(FrameType::try_from(0x02), Ok(FrameType::Extended));
        assert!(OperatingMode::try_from(0x04).is_err());
    }
}
