//! 帧编解码与增量组帧状态机
//!
//! 串口字节流没有任何原子性保证，字节逐个到达，因此组帧必须是
//! 增量式、可重同步的：每收到一个字节调用一次 [`classify`]，
//! 首字节不是起始标志时丢弃缓冲并等待下一个 0xAA。
//!
//! 校验和只覆盖命令帧；数据帧不携带校验和（协议特性，非遗漏）。

use crate::constants::*;
use crate::{CanMessage, CanSpeed, FrameType, OperatingMode, ProtocolError};

/// 组帧状态
///
/// [`classify`] 的返回值，驱动调用方的组帧循环。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// 帧未完整，继续接收
    Receiving,
    /// 帧已完整，可以交付
    Complete,
    /// 首字节不是起始标志，需要丢弃缓冲重新同步
    Resynchronize,
}

/// 判断缓冲区开头是否为数据帧
///
/// 类型字节高 nibble 为 0xC（标准帧）或 0xE（扩展帧）时为数据帧。
pub fn is_data_frame(buf: &[u8]) -> bool {
    buf.len() >= 2 && matches!(buf[1] >> 4, DATA_NIBBLE_STANDARD | DATA_NIBBLE_EXTENDED)
}

/// 加和校验和（指定窗口逐字节求和，截断到 8 bit）
pub fn checksum(window: &[u8]) -> u8 {
    window.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// 对已累积的字节做组帧判定
///
/// 每追加一个字节调用一次。完整长度的判定规则：
/// - 命令帧（字节 1 == 0x55）：固定 20 字节
/// - 数据帧：`5 + 长度 nibble`（标准）或 `7 + 长度 nibble`（扩展），
///   标识符宽度由类型 nibble 自描述
/// - 未知帧类型：立即视为完整，由调用方丢弃
///
/// 返回 [`FrameState::Resynchronize`] 时调用方必须清空缓冲，
/// 从下一个字节重新开始组帧。
pub fn classify(buf: &[u8]) -> FrameState {
    if buf.is_empty() {
        return FrameState::Receiving;
    }

    if buf[0] != PACKET_START {
        // 只能在 0xAA 上同步帧边界，其余一律跳过
        return FrameState::Resynchronize;
    }

    if buf.len() < 2 {
        return FrameState::Receiving;
    }

    if buf[1] == COMMAND_TYPE {
        // 命令帧固定 20 字节
        if buf.len() >= COMMAND_FRAME_LEN {
            return FrameState::Complete;
        }
        return FrameState::Receiving;
    }

    if is_data_frame(buf) {
        let payload_len = (buf[1] & 0x0F) as usize;
        let overhead = match buf[1] >> 4 {
            DATA_NIBBLE_EXTENDED => DATA_OVERHEAD_EXTENDED,
            _ => DATA_OVERHEAD_STANDARD,
        };
        if buf.len() >= overhead + payload_len {
            return FrameState::Complete;
        }
        return FrameState::Receiving;
    }

    // 未知帧类型：按完整处理，交由上层丢弃
    FrameState::Complete
}

/// 增量组帧缓冲区
///
/// 持有一个有界的帧缓冲，逐字节追加并返回最新的组帧状态。
/// 超出容量（[`MAX_FRAME_LEN`]）时返回错误而不是越界写入。
///
/// # 示例
///
/// ```
/// use canusb_protocol::codec::{FrameAssembler, FrameState};
///
/// let mut asm = FrameAssembler::new();
/// let frame = [0xAA, 0xC1, 0x23, 0x01, 0x42, 0x55];
/// for (i, byte) in frame.iter().enumerate() {
///     let state = asm.push(*byte).unwrap();
///     if i + 1 == frame.len() {
///         assert_eq!(state, FrameState::Complete);
///     } else {
///         assert_eq!(state, FrameState::Receiving);
///     }
/// }
/// assert_eq!(asm.frame(), &frame);
/// ```
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// 追加一个字节并返回组帧状态
    ///
    /// # 错误
    /// - `ProtocolError::BufferOverflow`: 缓冲区已满，字节被拒绝；
    ///   调用方应 [`reset`](Self::reset) 后重新同步
    pub fn push(&mut self, byte: u8) -> Result<FrameState, ProtocolError> {
        if self.buf.len() >= MAX_FRAME_LEN {
            return Err(ProtocolError::BufferOverflow);
        }
        self.buf.push(byte);
        Ok(classify(&self.buf))
    }

    /// 当前已累积的帧内容
    pub fn frame(&self) -> &[u8] {
        &self.buf
    }

    /// 丢弃已累积的内容，从空缓冲重新开始组帧
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// 构建 20 字节配置命令帧
///
/// 布局（与适配器固件约定一致）：
/// `[0xAA, 0x55, 0x12, speed, frame_type, filter×4, mask×4, mode, 0x01, 0×4, checksum]`
///
/// 过滤器/掩码字段固定填零（不启用硬件过滤）。
/// 纯函数，无失败路径：非法枚举值在类型系统层面已被拒绝。
pub fn encode_command(speed: CanSpeed, mode: OperatingMode, frame_type: FrameType) -> [u8; 20] {
    let mut frame = [0u8; COMMAND_FRAME_LEN];
    frame[0] = PACKET_START;
    frame[1] = COMMAND_TYPE;
    frame[2] = COMMAND_SETTINGS;
    frame[3] = speed.into();
    frame[4] = frame_type.into();
    // frame[5..=8]: Filter ID（不处理，填零）
    // frame[9..=12]: Mask ID（不处理，填零）
    frame[13] = mode.into();
    frame[14] = 0x01;
    // frame[15..=18]: 保留，填零
    frame[19] = checksum(&frame[CHECKSUM_FIRST..CHECKSUM_LAST]);
    frame
}

/// 校验命令帧的校验和
///
/// 仅命令帧受校验和保护。校验窗口为字节 2..=18，
/// 与最后一个字节比较。
///
/// # 错误
/// - `ProtocolError::TruncatedFrame`: 长度不足 20 字节
/// - `ProtocolError::ChecksumMismatch`: 校验和不匹配
pub fn validate_command(frame: &[u8]) -> Result<(), ProtocolError> {
    if frame.len() < COMMAND_FRAME_LEN {
        return Err(ProtocolError::TruncatedFrame {
            expected: COMMAND_FRAME_LEN,
            actual: frame.len(),
        });
    }

    let expected = checksum(&frame[CHECKSUM_FIRST..CHECKSUM_LAST]);
    let actual = frame[CHECKSUM_LAST];
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }

    Ok(())
}

/// 构建变长数据帧
///
/// 标识符按 little-endian 写入：标准帧 2 字节，扩展帧 4 字节。
/// 数据帧不携带校验和，以结束标志 0x55 收尾。
///
/// # 错误
/// - `ProtocolError::InvalidLength`: 载荷超过 8 字节，拒绝上线
pub fn encode_data(payload: &[u8], frame_type: FrameType, id: u32) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > CAN_MAX_DLEN {
        return Err(ProtocolError::InvalidLength { len: payload.len() });
    }

    let overhead = match frame_type {
        FrameType::Standard => DATA_OVERHEAD_STANDARD,
        FrameType::Extended => DATA_OVERHEAD_EXTENDED,
    };
    let mut frame = Vec::with_capacity(overhead + payload.len());

    frame.push(PACKET_START);
    match frame_type {
        FrameType::Standard => {
            frame.push((DATA_NIBBLE_STANDARD << 4) | payload.len() as u8);
            frame.extend_from_slice(&(id as u16).to_le_bytes());
        },
        FrameType::Extended => {
            frame.push((DATA_NIBBLE_EXTENDED << 4) | payload.len() as u8);
            frame.extend_from_slice(&id.to_le_bytes());
        },
    }
    frame.extend_from_slice(payload);
    frame.push(PACKET_END);

    Ok(frame)
}

/// 从数据帧中提取 CAN 标识符
///
/// 标识符字段从偏移 2 开始，little-endian，宽度由寻址模式决定。
///
/// # Panics
/// 输入必须至少覆盖完整的标识符字段（由 [`decode_data`] 保证）。
pub fn decode_identifier(frame: &[u8], frame_type: FrameType) -> u32 {
    match frame_type {
        FrameType::Standard => u16::from_le_bytes([frame[2], frame[3]]) as u32,
        FrameType::Extended => u32::from_le_bytes([frame[2], frame[3], frame[4], frame[5]]),
    }
}

/// 解码一个完整的数据帧
///
/// 寻址模式由类型 nibble 自描述（0xC 标准 / 0xE 扩展），
/// 不依赖外部配置，因此对端切换模式时入方向不会解错。
///
/// # 错误
/// - `ProtocolError::NotDataFrame`: 类型 nibble 不是数据帧
/// - `ProtocolError::InvalidLength`: 长度 nibble 超过 8
/// - `ProtocolError::TruncatedFrame`: 实际字节数少于声明长度
pub fn decode_data(frame: &[u8]) -> Result<CanMessage, ProtocolError> {
    if frame.len() < 2 {
        return Err(ProtocolError::TruncatedFrame {
            expected: 2,
            actual: frame.len(),
        });
    }

    let type_byte = frame[1];
    let frame_type = match type_byte >> 4 {
        DATA_NIBBLE_STANDARD => FrameType::Standard,
        DATA_NIBBLE_EXTENDED => FrameType::Extended,
        _ => return Err(ProtocolError::NotDataFrame { type_byte }),
    };

    let payload_len = (type_byte & 0x0F) as usize;
    if payload_len > CAN_MAX_DLEN {
        return Err(ProtocolError::InvalidLength { len: payload_len });
    }

    let overhead = match frame_type {
        FrameType::Standard => DATA_OVERHEAD_STANDARD,
        FrameType::Extended => DATA_OVERHEAD_EXTENDED,
    };
    if frame.len() < overhead + payload_len {
        return Err(ProtocolError::TruncatedFrame {
            expected: overhead + payload_len,
            actual: frame.len(),
        });
    }

    let id = decode_identifier(frame, frame_type);
    let payload_start = 2 + frame_type.id_len();
    let payload = &frame[payload_start..payload_start + payload_len];

    Ok(match frame_type {
        FrameType::Standard => CanMessage::new_standard(id as u16, payload),
        FrameType::Extended => CanMessage::new_extended(id, payload),
    })
}
