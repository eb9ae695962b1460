//! canusbd 主入口
//!
//! USB-CAN-A 串口适配器 ↔ SocketCAN 桥接守护进程。
//! 前台运行，Ctrl+C 干净停机；配合 systemd 等监督器使用。

mod netcfg;

use canusb_bridge::{BridgeConfig, BridgeEngine, BridgeOutcome};
use canusb_protocol::{CanSpeed, FrameType, OperatingMode, SERIAL_BAUDRATE};
use canusb_transport::{SerialTransport, SocketCanAdapter};
use clap::Parser;
use netcfg::InterfaceGuard;
use std::process;
use std::time::Duration;
use tracing::{error, info};

/// USB-CAN-A 桥接守护进程
///
/// 把串口 CAN 适配器的私有字节协议桥接到内核 CAN 接口，
/// 让 candump/cansend 等通用工具可以直接使用该适配器。
#[derive(Parser, Debug)]
#[command(name = "canusbd")]
#[command(about = "USB-CAN-A serial adapter to SocketCAN bridge", long_about = None)]
struct Args {
    /// TTY 设备路径（如 /dev/ttyUSB0）
    #[arg(short = 'd', long)]
    device: String,

    /// CAN 总线波特率（bps）
    ///
    /// 允许值: 5000, 10000, 20000, 50000, 100000, 125000,
    /// 200000, 250000, 400000, 500000, 800000, 1000000
    #[arg(short = 's', long)]
    speed: u32,

    /// 串口波特率（bps）
    ///
    /// 适配器固件固定 2 Mbaud，一般无需修改
    #[arg(short = 'b', long, default_value_t = SERIAL_BAUDRATE)]
    baudrate: u32,

    /// CAN 接口名称
    #[arg(short = 'n', long, default_value = "slcan0")]
    name: String,

    /// 扩展帧模式（29-bit 标识符）
    #[arg(short = 'e', long)]
    extended: bool,

    /// 只听模式（适配器静默，桥接器不向总线方向回写串口）
    #[arg(short = 'l', long)]
    listen_only: bool,

    /// 不自动创建/删除 CAN 接口（接口必须已就绪）
    #[arg(long)]
    no_setup: bool,
}

fn main() {
    // 初始化日志（RUST_LOG 控制级别；串口字节流在 trace，桥接帧在 debug）
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("canusbd=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    process::exit(run(args));
}

fn run(args: Args) -> i32 {
    // 1. 校验 CAN 波特率（只允许适配器支持的 12 档）
    let Some(speed) = CanSpeed::from_bps(args.speed) else {
        eprintln!("Unsupported CAN speed: {} bps", args.speed);
        eprintln!(
            "Allowed speeds: 5000 10000 20000 50000 100000 125000 \
             200000 250000 400000 500000 800000 1000000"
        );
        return 1;
    };

    let config = BridgeConfig {
        can_speed: speed,
        frame_type: if args.extended {
            FrameType::Extended
        } else {
            FrameType::Standard
        },
        mode: if args.listen_only {
            OperatingMode::Silent
        } else {
            OperatingMode::Normal
        },
        ..BridgeConfig::default()
    };

    // 2. 准备 CAN 接口（必要时创建 vcan；退出时只删除我们创建的）
    let iface = match InterfaceGuard::ensure(&args.name, args.no_setup) {
        Ok(guard) => guard,
        Err(e) => {
            error!("Failed to set up CAN interface '{}': {}", args.name, e);
            return 1;
        },
    };

    // 3. 打开串口并分离读写端
    let serial = match SerialTransport::open(
        &args.device,
        args.baudrate,
        Duration::from_millis(config.serial_read_timeout_ms),
    ) {
        Ok(serial) => serial,
        Err(e) => {
            error!("Failed to open serial device '{}': {}", args.device, e);
            return 1;
        },
    };
    let (serial_rx, serial_tx) = match serial.split() {
        Ok(split) => split,
        Err(e) => {
            error!("Failed to split serial device: {}", e);
            return 1;
        },
    };

    // 4. 打开 CAN 收/发 socket（独立两个，回环把我们发出的帧送回
    //    接收端，由回声抑制存储处理）
    let can_timeout = Duration::from_millis(config.can_receive_timeout_ms);
    let can_rx = match SocketCanAdapter::open(iface.name(), can_timeout) {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to open CAN interface '{}': {}", iface.name(), e);
            return 1;
        },
    };
    let can_tx = match SocketCanAdapter::open(iface.name(), can_timeout) {
        Ok(adapter) => adapter,
        Err(e) => {
            error!("Failed to open CAN interface '{}': {}", iface.name(), e);
            return 1;
        },
    };

    info!(
        "Bridging '{}' <-> '{}' at {} bps ({:?}, {:?})",
        args.device,
        iface.name(),
        args.speed,
        config.frame_type,
        config.mode
    );

    // 5. 启动桥接引擎（写入配置命令帧后进入 Running）
    let engine = match BridgeEngine::start(config, serial_rx, serial_tx, can_rx, can_tx) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to start bridge: {}", e);
            return 1;
        },
    };

    // 6. Ctrl+C → 停止标志（信号处理里只置位，不做任何清理）
    let stop = engine.stop_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal. Shutting down...");
        stop.stop();
    }) {
        error!("Failed to set signal handler: {}", e);
        return 1;
    }

    info!("canusbd started. Press Ctrl+C to stop.");

    // 7. 等待引擎退出；接口守卫随后清理
    match engine.wait() {
        BridgeOutcome::Clean => 0,
        BridgeOutcome::Fatal => {
            error!("Bridge stopped due to fatal transport error");
            1
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["canusbd", "-d", "/dev/ttyUSB0", "-s", "500000"]);
        assert_eq!(args.device, "/dev/ttyUSB0");
        assert_eq!(args.speed, 500_000);
        assert_eq!(args.baudrate, 2_000_000);
        assert_eq!(args.name, "slcan0");
        assert!(!args.extended);
        assert!(!args.listen_only);
        assert!(!args.no_setup);
    }

    #[test]
    fn test_args_flags() {
        let args = Args::parse_from([
            "canusbd", "-d", "/dev/ttyUSB0", "-s", "250000", "-e", "-l", "-n", "can1",
        ]);
        assert_eq!(args.speed, 250_000);
        assert_eq!(args.name, "can1");
        assert!(args.extended);
        assert!(args.listen_only);
    }
}
