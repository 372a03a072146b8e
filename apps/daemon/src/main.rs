//! sdgyrodsu 守护进程主入口
//!
//! 读取 Steam Deck 内置 IMU，通过 DSU（Cemuhook）协议在 UDP 上提供运动数据。
//!
//! ```bash
//! # hiddev 字符设备
//! sdgyrodsu --device-file /dev/usb/hiddev0
//!
//! # hidraw，仅本机可访问
//! sdgyrodsu --hidraw /dev/hidraw2 --interface local
//!
//! # 不启动服务端，打印几秒样本
//! sdgyrodsu --device-file /dev/usb/hiddev0 --test-run
//! ```

mod daemon;

use clap::Parser;
use daemon::{Daemon, DaemonConfig, Mode};
use sdgyro_sdk::driver::Signal;
use sdgyro_sdk::hid::{STEAM_DECK_INTERFACE, STEAM_DECK_PID, STEAM_DECK_VID};
use sdgyro_sdk::{AdapterConfig, BindInterface, DeviceSpec, PipelineConfig, ServerConfig};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

/// Steam Deck 陀螺仪 DSU 服务端
#[derive(Parser, Debug)]
#[command(name = "sdgyrodsu")]
#[command(about = "Steam Deck gyro DSU (Cemuhook) server", long_about = None)]
#[command(version)]
struct Args {
    /// hiddev 字符设备路径（例如 /dev/usb/hiddev0）
    #[arg(long, conflicts_with = "hidraw")]
    device_file: Option<PathBuf>,

    /// hidraw 设备路径（例如 /dev/hidraw2）
    #[arg(long)]
    hidraw: Option<PathBuf>,

    /// 设备 VID（十六进制），未指定设备路径时通过 hidapi 打开
    #[arg(long, value_parser = parse_hex_u16, default_value = "0x28de")]
    vid: u16,

    /// 设备 PID（十六进制）
    #[arg(long, value_parser = parse_hex_u16, default_value = "0x1205")]
    pid: u16,

    /// USB 接口号
    #[arg(long = "usb-interface", default_value_t = STEAM_DECK_INTERFACE)]
    usb_interface: i32,

    /// UDP 端口（默认读取 SDGYRO_SERVER_PORT，否则 26760）
    #[arg(long)]
    port: Option<u16>,

    /// 监听地址：local（127.0.0.1）或 all（0.0.0.0）
    #[arg(long, default_value = "all")]
    interface: BindInterface,

    /// 控制器槽位
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..4))]
    slot: u8,

    /// 初始扫描周期（微秒）
    #[arg(long)]
    scan_period_us: Option<u64>,

    /// 报告起始标记（十六进制，例如 0100093f）
    #[arg(long, value_parser = parse_hex_bytes)]
    start_marker: Option<::std::vec::Vec<u8>>,

    /// 默认日志级别（RUST_LOG 优先）
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 陀螺仪标定：录制指定秒数后输出估计值
    #[arg(long, value_name = "SECONDS", conflicts_with = "test_run")]
    calibrate: Option<u64>,

    /// 只运行采集与换算，打印样本若干秒（默认 5 秒）
    #[arg(long, value_name = "SECONDS", num_args = 0..=1, default_missing_value = "5")]
    test_run: Option<u64>,
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value '{}': {}", s, e))
}

fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    hex::decode(digits).map_err(|e| format!("invalid hex bytes '{}': {}", s, e))
}

impl Args {
    fn device(&self) -> DeviceSpec {
        if let Some(path) = &self.device_file {
            DeviceSpec::HiddevFile { path: path.clone() }
        } else if let Some(path) = &self.hidraw {
            DeviceSpec::Hidraw { path: path.clone() }
        } else {
            DeviceSpec::HidApi {
                vendor_id: self.vid,
                product_id: self.pid,
                interface: self.usb_interface,
            }
        }
    }

    fn pipeline(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        if let Some(us) = self.scan_period_us {
            let period = Duration::from_micros(us);
            // 初始值超出默认范围时扩展范围
            let low = *config.scan_period_band.start();
            let high = *config.scan_period_band.end();
            config.scan_period_band = low.min(period)..=high.max(period);
            config.scan_period = period;
        }
        if let Some(marker) = &self.start_marker {
            config.start_marker = marker.clone();
        }
        config
    }

    fn server(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(port) = self.port {
            config.port = port;
        }
        config.interface = self.interface;
        config.slot = self.slot;
        config
    }

    fn mode(&self) -> Mode {
        match (self.calibrate, self.test_run) {
            (Some(seconds), _) => Mode::Calibrate(Duration::from_secs(seconds)),
            (None, Some(seconds)) => Mode::TestRun(Duration::from_secs(seconds)),
            (None, None) => Mode::Serve,
        }
    }
}

fn main() {
    let args = Args::parse();
    sdgyro_sdk::init_logger!(args.log_level.as_str());

    let shutdown = Arc::new(Signal::new());
    {
        let shutdown = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            eprintln!("\nReceived interrupt signal. Shutting down...");
            shutdown.send();
        }) {
            eprintln!("Failed to set signal handler: {}", e);
            process::exit(1);
        }
    }

    let config = DaemonConfig {
        device: args.device(),
        pipeline: args.pipeline(),
        adapter: AdapterConfig::default(),
        server: args.server(),
        mode: args.mode(),
    };

    eprintln!("sdgyrodsu starting...");
    eprintln!("  Device: {}", config.device);
    if config.mode == Mode::Serve {
        eprintln!("  UDP: {:?}:{}", config.server.interface, config.server.port);
        eprintln!("  Slot: {}", config.server.slot);
    }
    if args.device_file.is_none() && args.hidraw.is_none() && cfg!(not(feature = "hidapi")) {
        eprintln!(
            "  Note: built without hidapi; pass --device-file or --hidraw (default VID/PID {:04x}:{:04x})",
            STEAM_DECK_VID, STEAM_DECK_PID
        );
    }

    let mut daemon = match Daemon::new(config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to create daemon: {}", e);
            process::exit(1);
        },
    };

    if let Err(e) = daemon.run(&shutdown) {
        eprintln!("Daemon error: {}", e);
        process::exit(1);
    }
}
