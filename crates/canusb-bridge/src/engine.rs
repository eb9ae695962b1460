//! 桥接引擎：两个方向循环的并行组合
//!
//! 串行→总线循环逐字节组帧、解码并转发到 CAN 网络；
//! 总线→串行循环轮询 CAN 网络、抑制回声后编码写回串口。
//! 两个循环只共享回声抑制存储和停止/致命标志，没有其他可变共享状态。
//!
//! 生命周期：`Stopped → Running → Stopping → Stopped`。
//! `Running` 在传输端点打开且配置命令帧写入适配器之后进入；
//! 停止信号（外部 [`StopHandle`] 或致命传输错误）使两个循环在
//! 各自的下一个轮询点退出。

use crate::config::BridgeConfig;
use crate::echo::{EchoStore, StoreError};
use crate::BridgeError;
use canusb_protocol::codec::{decode_data, encode_data, is_data_frame, validate_command, FrameAssembler, FrameState};
use canusb_protocol::{encode_command, FrameType, COMMAND_TYPE};
use canusb_transport::{CanRxAdapter, CanTxAdapter, SerialByteRx, SerialFrameTx, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{spawn, JoinHandle};
use tracing::{debug, error, info, trace, warn};

/// 桥接计数器（Relaxed 原子，仅用于观测）
#[derive(Debug, Default)]
pub struct BridgeStats {
    /// 串口侧收到的完整帧数
    pub serial_rx_frames: AtomicU64,
    /// 转发到 CAN 网络的帧数
    pub bus_tx_frames: AtomicU64,
    /// CAN 网络侧收到的报文数
    pub bus_rx_frames: AtomicU64,
    /// 写回串口的帧数
    pub serial_tx_frames: AtomicU64,
    /// 被抑制的回声数
    pub suppressed_echoes: AtomicU64,
    /// 重同步次数
    pub resyncs: AtomicU64,
    /// 命令帧校验和错误数
    pub checksum_errors: AtomicU64,
    /// 丢弃的帧数（畸形/无法表达/发送失败）
    pub dropped_frames: AtomicU64,
}

/// 两个循环共享的运行上下文
#[derive(Debug)]
pub struct BridgeContext {
    is_running: AtomicBool,
    fatal: AtomicBool,
    pub stats: BridgeStats,
}

impl BridgeContext {
    pub fn new() -> Self {
        Self {
            is_running: AtomicBool::new(true),
            fatal: AtomicBool::new(false),
            stats: BridgeStats::default(),
        }
    }

    /// 请求停止（干净停机路径）
    pub fn request_stop(&self) {
        // Release: 置位前的全部写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 致命传输错误：标记后触发两个循环退出
    pub(crate) fn fail(&self) {
        self.fatal.store(true, Ordering::Release);
        self.is_running.store(false, Ordering::Release);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }
}

impl Default for BridgeContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 外部生命周期控制器持有的停止句柄
///
/// 可以克隆进信号处理闭包（替代信号处理函数改写全局变量的写法）。
#[derive(Debug, Clone)]
pub struct StopHandle {
    ctx: Arc<BridgeContext>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.ctx.request_stop();
    }
}

/// 引擎状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// 两个循环都已退出
    Stopped,
    /// 正常桥接中
    Running,
    /// 停止标志已置位，等待循环在下一个轮询点退出
    Stopping,
}

/// 引擎退出结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// 外部请求的干净停机
    Clean,
    /// 致命传输错误导致的停机
    Fatal,
}

/// 串行→总线方向循环
///
/// 逐字节读取串口、增量组帧；完整的数据帧解码后**先记录进回声
/// 抑制存储、再发送到 CAN 网络**（顺序不可颠倒：先发送的话，
/// 回声可能在记录完成前被对向循环读走）。命令帧校验后丢弃
/// （设备→主机方向的命令帧只是应答，不产生网络动作）。
///
/// # 参数
/// - `serial_rx`: 串口读端（独占）
/// - `can_tx`: CAN 发送端（独占）
/// - `store`: 回声抑制存储（与对向循环共享）
/// - `ctx`: 运行上下文（停止标志 + 计数器）
pub fn serial_to_bus_loop(
    mut serial_rx: impl SerialByteRx,
    mut can_tx: impl CanTxAdapter,
    store: Arc<EchoStore>,
    ctx: Arc<BridgeContext>,
) {
    let mut assembler = FrameAssembler::new();

    loop {
        // Acquire: 看到 false 时必须看到置位线程之前的全部写入
        if !ctx.is_running.load(Ordering::Acquire) {
            trace!("serial->bus thread: is_running flag is false, exiting");
            break;
        }

        // ============================================================
        // 1. 读一个字节（带超时；超时回到循环头重查停止标志）
        // ============================================================
        let byte = match serial_rx.read_byte() {
            Ok(Some(byte)) => byte,
            Ok(None) => continue,
            Err(e) => {
                error!("serial->bus thread: serial read error: {}", e);
                ctx.fail();
                break;
            },
        };
        trace!("<<< {:02X}", byte);

        // ============================================================
        // 2. 增量组帧
        // ============================================================
        let state = match assembler.push(byte) {
            Ok(state) => state,
            Err(e) => {
                warn!("serial->bus thread: {}, resynchronizing", e);
                ctx.stats.resyncs.fetch_add(1, Ordering::Relaxed);
                assembler.reset();
                continue;
            },
        };

        match state {
            FrameState::Receiving => {},
            FrameState::Resynchronize => {
                // 只能在 0xAA 上同步帧边界，丢弃半帧
                trace!(
                    "serial->bus thread: missed frame header, dropping {} byte(s)",
                    assembler.len()
                );
                ctx.stats.resyncs.fetch_add(1, Ordering::Relaxed);
                assembler.reset();
            },
            FrameState::Complete => {
                ctx.stats.serial_rx_frames.fetch_add(1, Ordering::Relaxed);
                handle_serial_frame(assembler.frame(), &mut can_tx, &store, &ctx);
                assembler.reset();
            },
        }
    }

    trace!("serial->bus thread: loop exited");
}

/// 处理一个完整的串口帧
///
/// 数据帧 → 解码、记录、转发；命令帧 → 校验后丢弃；其余 → 丢弃。
fn handle_serial_frame(
    frame: &[u8],
    can_tx: &mut impl CanTxAdapter,
    store: &EchoStore,
    ctx: &BridgeContext,
) {
    if is_data_frame(frame) {
        let msg = match decode_data(frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("serial->bus thread: dropping malformed data frame: {}", e);
                ctx.stats.dropped_frames.fetch_add(1, Ordering::Relaxed);
                return;
            },
        };

        // 先记录后发送（见模块文档的顺序约束）
        if let Err(StoreError::Full { capacity }) = store.record(msg.data_slice()) {
            warn!(
                "serial->bus thread: echo store full (capacity {}), evicting oldest record",
                capacity
            );
            store.evict_oldest();
            let _ = store.record(msg.data_slice());
        }

        debug!(
            "serial->bus: ID=0x{:X}, data={:02X?}",
            msg.id,
            msg.data_slice()
        );

        if let Err(e) = can_tx.send(&msg) {
            // 发送未成功，撤销刚武装的抑制记录
            store.try_consume(msg.data_slice());
            if e.is_fatal() {
                error!("serial->bus thread: fatal CAN send error: {}", e);
                ctx.fail();
            } else {
                warn!("serial->bus thread: CAN send failed: {}", e);
                ctx.stats.dropped_frames.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            ctx.stats.bus_tx_frames.fetch_add(1, Ordering::Relaxed);
        }
    } else if frame.len() >= 2 && frame[1] == COMMAND_TYPE {
        match validate_command(frame) {
            // 设备→主机方向的命令帧只是配置应答，没有网络动作
            Ok(()) => trace!("serial->bus thread: adapter command frame (ack)"),
            Err(e) => {
                warn!("serial->bus thread: dropping command frame: {}", e);
                ctx.stats.checksum_errors.fetch_add(1, Ordering::Relaxed);
            },
        }
    } else {
        trace!(
            "serial->bus thread: dropping unrecognized frame: {:02X?}",
            frame
        );
        ctx.stats.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }
}

/// 总线→串行方向循环
///
/// 带超时轮询 CAN 网络；收到的报文先做回声抑制查询，命中即丢弃
/// （是本桥自己注入的帧），否则按配置的寻址模式编码写回串口。
///
/// # 参数
/// - `can_rx`: CAN 接收端（独占，接收超时有界）
/// - `serial_tx`: 串口写端（独占）
/// - `store`: 回声抑制存储（与对向循环共享）
/// - `ctx`: 运行上下文
/// - `config`: 桥接配置（出方向寻址模式）
pub fn bus_to_serial_loop(
    mut can_rx: impl CanRxAdapter,
    mut serial_tx: impl SerialFrameTx,
    store: Arc<EchoStore>,
    ctx: Arc<BridgeContext>,
    config: BridgeConfig,
) {
    loop {
        if !ctx.is_running.load(Ordering::Acquire) {
            trace!("bus->serial thread: is_running flag is false, exiting");
            break;
        }

        // ============================================================
        // 1. 轮询 CAN 网络（带超时）
        // ============================================================
        let msg = match can_rx.receive() {
            Ok(msg) => msg,
            Err(TransportError::Timeout) => continue,
            Err(e) => {
                error!("bus->serial thread: CAN receive error: {}", e);
                if e.is_fatal() {
                    ctx.fail();
                    break;
                }
                continue;
            },
        };
        ctx.stats.bus_rx_frames.fetch_add(1, Ordering::Relaxed);

        // ============================================================
        // 2. 回声抑制：命中说明是本桥刚注入的帧
        // ============================================================
        if store.try_consume(msg.data_slice()) {
            trace!(
                "bus->serial thread: suppressed echo: ID=0x{:X}, data={:02X?}",
                msg.id,
                msg.data_slice()
            );
            ctx.stats.suppressed_echoes.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        // ============================================================
        // 3. 编码并写回串口
        // ============================================================
        if msg.is_extended && config.frame_type == FrameType::Standard {
            // 29-bit 标识符无法放进 2 字节字段，丢弃而不是截断污染串口侧
            warn!(
                "bus->serial thread: dropping extended frame ID=0x{:X} (adapter configured for standard addressing)",
                msg.id
            );
            ctx.stats.dropped_frames.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let frame = match encode_data(msg.data_slice(), config.frame_type, msg.id) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    "bus->serial thread: cannot encode frame ID=0x{:X}: {}",
                    msg.id, e
                );
                ctx.stats.dropped_frames.fetch_add(1, Ordering::Relaxed);
                continue;
            },
        };

        debug!(
            "bus->serial: ID=0x{:X}, data={:02X?}",
            msg.id,
            msg.data_slice()
        );

        if let Err(e) = serial_tx.write_frame(&frame) {
            error!("bus->serial thread: serial write error: {}", e);
            if e.is_fatal() {
                ctx.fail();
                break;
            }
            ctx.stats.dropped_frames.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        ctx.stats.serial_tx_frames.fetch_add(1, Ordering::Relaxed);
    }

    trace!("bus->serial thread: loop exited");
}

/// 桥接引擎
///
/// 持有两个方向循环的线程句柄、共享上下文和回声抑制存储。
/// 构造即启动（[`BridgeEngine::start`]），显式等待
/// （[`BridgeEngine::wait`]）或 Drop 时停机并 join。
///
/// # 示例
///
/// ```no_run
/// use canusb_bridge::{BridgeConfig, BridgeEngine};
/// use canusb_transport::{SerialTransport, SocketCanAdapter};
/// use std::time::Duration;
///
/// let config = BridgeConfig::default();
/// let serial = SerialTransport::open("/dev/ttyUSB0", 2_000_000, Duration::from_millis(5)).unwrap();
/// let (serial_rx, serial_tx) = serial.split().unwrap();
/// let can_rx = SocketCanAdapter::open("slcan0", Duration::from_millis(100)).unwrap();
/// let can_tx = SocketCanAdapter::open("slcan0", Duration::from_millis(100)).unwrap();
///
/// let engine = BridgeEngine::start(config, serial_rx, serial_tx, can_rx, can_tx).unwrap();
/// let outcome = engine.wait();
/// ```
pub struct BridgeEngine {
    ctx: Arc<BridgeContext>,
    serial_thread: Option<JoinHandle<()>>,
    bus_thread: Option<JoinHandle<()>>,
}

impl BridgeEngine {
    /// 配置适配器并启动两个方向循环
    ///
    /// 先把配置命令帧写入串口（波特率/模式/帧类型），成功后才进入
    /// `Running` 并派生工作线程。静默模式下总线→串行方向不启动。
    ///
    /// # 错误
    /// - `BridgeError::Configure`: 配置命令帧写入失败
    pub fn start<SR, ST, CR, CT>(
        config: BridgeConfig,
        serial_rx: SR,
        mut serial_tx: ST,
        can_rx: CR,
        can_tx: CT,
    ) -> Result<Self, BridgeError>
    where
        SR: SerialByteRx + Send + 'static,
        ST: SerialFrameTx + Send + 'static,
        CR: CanRxAdapter + Send + 'static,
        CT: CanTxAdapter + Send + 'static,
    {
        // 配置适配器（波特率/工作模式/帧类型）
        let cmd = encode_command(config.can_speed, config.mode, config.frame_type);
        serial_tx.write_frame(&cmd).map_err(BridgeError::Configure)?;
        info!(
            "Adapter configured: {} bps, {:?}, {:?}",
            config.can_speed.bps(),
            config.frame_type,
            config.mode
        );

        let store = Arc::new(EchoStore::new(config.echo_capacity));
        let ctx = Arc::new(BridgeContext::new());

        let serial_thread = {
            let store = store.clone();
            let ctx = ctx.clone();
            spawn(move || serial_to_bus_loop(serial_rx, can_tx, store, ctx))
        };

        let bus_thread = if config.mode.is_silent() {
            // 静默模式：只听不发，发送方向整个不启动
            info!("Silent mode: bus->serial direction disabled");
            drop(can_rx);
            drop(serial_tx);
            None
        } else {
            let ctx = ctx.clone();
            Some(spawn(move || {
                bus_to_serial_loop(can_rx, serial_tx, store, ctx, config)
            }))
        };

        Ok(Self {
            ctx,
            serial_thread: Some(serial_thread),
            bus_thread,
        })
    }

    /// 获取停止句柄（可克隆进信号处理闭包）
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            ctx: self.ctx.clone(),
        }
    }

    /// 当前引擎状态
    pub fn state(&self) -> BridgeState {
        let threads_done = self
            .serial_thread
            .as_ref()
            .map(|h| h.is_finished())
            .unwrap_or(true)
            && self
                .bus_thread
                .as_ref()
                .map(|h| h.is_finished())
                .unwrap_or(true);

        if threads_done {
            BridgeState::Stopped
        } else if self.ctx.is_running() {
            BridgeState::Running
        } else {
            BridgeState::Stopping
        }
    }

    /// 共享上下文（计数器观测用）
    pub fn context(&self) -> &Arc<BridgeContext> {
        &self.ctx
    }

    /// 等待两个循环退出并报告结果
    ///
    /// 阻塞直到停止信号或致命错误使两个循环都退出。
    pub fn wait(mut self) -> BridgeOutcome {
        if let Some(handle) = self.serial_thread.take()
            && handle.join().is_err()
        {
            error!("serial->bus thread panicked");
            self.ctx.fail();
        }
        if let Some(handle) = self.bus_thread.take()
            && handle.join().is_err()
        {
            error!("bus->serial thread panicked");
            self.ctx.fail();
        }

        let stats = &self.ctx.stats;
        info!(
            "Bridge stopped: serial->bus {} frame(s), bus->serial {} frame(s), \
             {} echo(es) suppressed, {} resync(s), {} checksum error(s), {} dropped",
            stats.bus_tx_frames.load(Ordering::Relaxed),
            stats.serial_tx_frames.load(Ordering::Relaxed),
            stats.suppressed_echoes.load(Ordering::Relaxed),
            stats.resyncs.load(Ordering::Relaxed),
            stats.checksum_errors.load(Ordering::Relaxed),
            stats.dropped_frames.load(Ordering::Relaxed),
        );

        if self.ctx.is_fatal() {
            BridgeOutcome::Fatal
        } else {
            BridgeOutcome::Clean
        }
    }
}

impl Drop for BridgeEngine {
    fn drop(&mut self) {
        // 先清停止标志再 join，两个循环会在下一个轮询点退出
        self.ctx.request_stop();

        if let Some(handle) = self.serial_thread.take()
            && handle.join().is_err()
        {
            error!("serial->bus thread panicked during shutdown");
        }
        if let Some(handle) = self.bus_thread.take()
            && handle.join().is_err()
        {
            error!("bus->serial thread panicked during shutdown");
        }
    }
}
