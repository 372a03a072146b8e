//! # sdgyro-dsu
//!
//! DSU（Cemuhook）协议服务端：把 [`sdgyro_driver::FrameSource`] 产出的 Steam Deck
//! 报告换算成运动样本，通过 UDP 推送给订阅的模拟器。
//!
//! - [`DeckReport`]：报告字段解析
//! - [`MotionFilter`] / [`MotionAdapter`]：判重、补帧、平滑与单位换算
//! - [`DsuServer`]：请求应答、订阅登记、超时剔除与广播
//! - [`GyroCalibrator`]：陀螺仪刻度估计

pub mod calibration;
pub mod config;
pub mod deck;
pub mod error;
pub mod motion;
pub mod registry;
pub mod server;
pub mod state;

pub use calibration::{CALIBRATION_ACCEL_1G, GyroCalibrator};
pub use config::{AdapterConfig, BindInterface, PORT_ENV, ServerConfig};
pub use deck::{Axes, DECK_REPORT_MIN_LEN, DeckReport};
pub use error::DsuError;
pub use motion::{MotionAdapter, MotionFilter, MotionSource};
pub use registry::{Client, ClientRegistry, Subscribe};
pub use server::DsuServer;
pub use state::{AtomicBroadcastState, BroadcastState};
