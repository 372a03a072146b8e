//! 请求解析与应答构建
//!
//! 服务端方向：[`decode_request`] 解析客户端请求，`encode_*_answer` / [`DataAnswer`] 构建应答。
//! 客户端方向：`encode_*_request` 与 `decode_*_answer`，用于测试和调试工具。

use crate::crc::seal;
use crate::header::{EventType, Header, set_id};
use crate::motion::MotionData;
use crate::{
    MAX_SLOTS, PROTOCOL_VERSION, ProtocolError, ensure_len, read_u16_le, read_u32_le,
    write_u16_le, write_u32_le,
};
use num_enum::{FromPrimitive, IntoPrimitive};

// ============================================================================
// 包长度
// ============================================================================

pub const VERSION_REQUEST_LEN: usize = Header::SIZE;
pub const VERSION_ANSWER_LEN: usize = Header::SIZE + 2;
pub const INFO_ANSWER_LEN: usize = Header::SIZE + SharedResponse::SIZE;
pub const DATA_REQUEST_LEN: usize = Header::SIZE + 8;
pub const DATA_ANSWER_LEN: usize = 100;

const PACKET_NUMBER_OFFSET: usize = 32;
const CONTROLS_OFFSET: usize = 36;
const CONTROLS_LEN: usize = 32;
const MOTION_OFFSET: usize = 68;

// ============================================================================
// 槽位描述
// ============================================================================

/// 槽位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SlotState {
    #[default]
    NotConnected = 0,
    Reserved = 1,
    Connected = 2,
}

/// 设备型号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DeviceModel {
    #[default]
    NotApplicable = 0,
    /// 无陀螺仪或部分陀螺仪
    PartialGyro = 1,
    /// 完整陀螺仪
    FullGyro = 2,
    DoNotUse = 3,
}

/// 连接方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum ConnectionType {
    #[default]
    NotApplicable = 0,
    Usb = 1,
    Bluetooth = 2,
}

/// 应答共享部分（12 字节，紧随包头）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SharedResponse {
    pub slot: u8,
    pub slot_state: SlotState,
    pub device_model: DeviceModel,
    pub connection: ConnectionType,
    pub mac: [u8; 6],
    pub battery: u8,
    pub connected: bool,
}

impl SharedResponse {
    pub const SIZE: usize = 12;

    /// 本机控制器（完整陀螺仪，USB 连接）
    pub fn controller(slot: u8, connected: bool) -> Self {
        Self {
            slot,
            slot_state: if connected {
                SlotState::Connected
            } else {
                SlotState::NotConnected
            },
            device_model: DeviceModel::FullGyro,
            connection: ConnectionType::Usb,
            ..Default::default()
        }
    }

    /// 未占用的槽位
    pub fn empty(slot: u8) -> Self {
        Self {
            slot,
            ..Default::default()
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0] = self.slot;
        buf[1] = self.slot_state.into();
        buf[2] = self.device_model.into();
        buf[3] = self.connection.into();
        buf[4..10].copy_from_slice(&self.mac);
        buf[10] = self.battery;
        buf[11] = u8::from(self.connected);
    }

    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(buf, Self::SIZE)?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buf[4..10]);
        Ok(Self {
            slot: buf[0],
            slot_state: SlotState::from(buf[1]),
            device_model: DeviceModel::from(buf[2]),
            connection: ConnectionType::from(buf[3]),
            mac,
            battery: buf[10],
            connected: buf[11] != 0,
        })
    }
}

// ============================================================================
// 请求（client → server）
// ============================================================================

/// 数据订阅参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Subscription {
    /// 0 全部控制器，1 按槽位，2 按 MAC，3 两者
    pub mask: u8,
    pub slot: u8,
    pub mac: [u8; 6],
}

/// 客户端请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Version { id: u32 },
    Info { id: u32, slots: Vec<u8> },
    Data { id: u32, subscription: Subscription },
}

impl Request {
    pub fn id(&self) -> u32 {
        match self {
            Request::Version { id } | Request::Info { id, .. } | Request::Data { id, .. } => *id,
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Request::Version { .. } => EventType::Version,
            Request::Info { .. } => EventType::Info,
            Request::Data { .. } => EventType::Data,
        }
    }
}

/// 解析客户端请求
///
/// 不校验 CRC。Info 请求的槽位数被限制在 [`MAX_SLOTS`] 以内，且不超过包内实际字节数。
pub fn decode_request(buf: &[u8]) -> Result<Request, ProtocolError> {
    let header = Header::decode(buf)?;
    let payload = &buf[Header::SIZE..];

    match header.event_type {
        EventType::Version => Ok(Request::Version { id: header.id }),
        EventType::Info => {
            ensure_len(buf, Header::SIZE + 4)?;
            let count = i32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
            let available = payload.len() - 4;
            let count = (count.max(0) as usize).min(MAX_SLOTS).min(available);
            Ok(Request::Info {
                id: header.id,
                slots: payload[4..4 + count].to_vec(),
            })
        },
        EventType::Data => {
            // 部分客户端只发送 mask/slot，缺失部分按 0 处理
            let mut subscription = Subscription::default();
            if let Some(&mask) = payload.first() {
                subscription.mask = mask;
            }
            if let Some(&slot) = payload.get(1) {
                subscription.slot = slot;
            }
            if payload.len() >= 8 {
                subscription.mac.copy_from_slice(&payload[2..8]);
            }
            Ok(Request::Data {
                id: header.id,
                subscription,
            })
        },
    }
}

pub fn encode_version_request(id: u32) -> Vec<u8> {
    let mut packet = vec![0u8; VERSION_REQUEST_LEN];
    write_header(&mut packet, Header::client(EventType::Version, id, VERSION_REQUEST_LEN));
    packet
}

pub fn encode_info_request(id: u32, slots: &[u8]) -> Vec<u8> {
    let len = Header::SIZE + 4 + slots.len();
    let mut packet = vec![0u8; len];
    write_header(&mut packet, Header::client(EventType::Info, id, len));
    packet[20..24].copy_from_slice(&(slots.len() as i32).to_le_bytes());
    packet[24..].copy_from_slice(slots);
    seal(&mut packet);
    packet
}

pub fn encode_data_request(id: u32, subscription: &Subscription) -> Vec<u8> {
    let mut packet = vec![0u8; DATA_REQUEST_LEN];
    write_header(&mut packet, Header::client(EventType::Data, id, DATA_REQUEST_LEN));
    packet[20] = subscription.mask;
    packet[21] = subscription.slot;
    packet[22..28].copy_from_slice(&subscription.mac);
    seal(&mut packet);
    packet
}

fn write_header(packet: &mut [u8], header: Header) {
    // 调用方保证 packet 长度 >= Header::SIZE
    if header.encode(packet).is_ok() {
        seal(packet);
    }
}

// ============================================================================
// 应答（server → client）
// ============================================================================

/// 构建版本应答（22 字节）
pub fn encode_version_answer(id: u32, buf: &mut [u8]) -> Result<usize, ProtocolError> {
    check_capacity(buf, VERSION_ANSWER_LEN)?;
    Header::server(EventType::Version, id, VERSION_ANSWER_LEN).encode(buf)?;
    write_u16_le(buf, 20, PROTOCOL_VERSION);
    seal(&mut buf[..VERSION_ANSWER_LEN]);
    Ok(VERSION_ANSWER_LEN)
}

/// 构建槽位信息应答（32 字节）
pub fn encode_info_answer(
    id: u32,
    response: &SharedResponse,
    buf: &mut [u8],
) -> Result<usize, ProtocolError> {
    check_capacity(buf, INFO_ANSWER_LEN)?;
    Header::server(EventType::Info, id, INFO_ANSWER_LEN).encode(buf)?;
    response.encode(&mut buf[Header::SIZE..INFO_ANSWER_LEN]);
    seal(&mut buf[..INFO_ANSWER_LEN]);
    Ok(INFO_ANSWER_LEN)
}

fn check_capacity(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        return Err(ProtocolError::BufferTooSmall {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

/// 数据应答模板（100 字节）
///
/// 按钮 / 摇杆 / 扳机 / 触摸字段保持为 0。广播循环每轮写入一次运动数据，
/// 然后对每个目标客户端调用 [`DataAnswer::stamp`] 写入其 id 并重算 CRC。
#[derive(Debug, Clone)]
pub struct DataAnswer {
    buf: [u8; DATA_ANSWER_LEN],
}

impl DataAnswer {
    pub fn new(response: &SharedResponse) -> Self {
        let mut buf = [0u8; DATA_ANSWER_LEN];
        let header = Header::server(EventType::Data, 0, DATA_ANSWER_LEN);
        // 长度固定，编码不会失败
        let _ = header.encode(&mut buf);
        let mut response = *response;
        response.connected = true;
        response.encode(&mut buf[Header::SIZE..Header::SIZE + SharedResponse::SIZE]);
        Self { buf }
    }

    /// 写入包序号与运动数据（不计算 CRC）
    pub fn set_frame(&mut self, packet_number: u32, motion: &MotionData) {
        write_u32_le(&mut self.buf, PACKET_NUMBER_OFFSET, packet_number);
        motion.encode(&mut self.buf[MOTION_OFFSET..MOTION_OFFSET + MotionData::SIZE]);
    }

    /// 写入目标客户端 id 并重算 CRC，返回可直接发送的字节
    pub fn stamp(&mut self, id: u32) -> &[u8] {
        set_id(&mut self.buf, id);
        seal(&mut self.buf);
        &self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// 解析后的数据应答
#[derive(Debug, Clone, PartialEq)]
pub struct DataAnswerView {
    pub id: u32,
    pub response: SharedResponse,
    pub packet_number: u32,
    pub motion: MotionData,
}

pub fn decode_version_answer(buf: &[u8]) -> Result<(u32, u16), ProtocolError> {
    let header = expect_event(buf, EventType::Version, VERSION_ANSWER_LEN)?;
    Ok((header.id, read_u16_le(buf, 20)))
}

pub fn decode_info_answer(buf: &[u8]) -> Result<(u32, SharedResponse), ProtocolError> {
    let header = expect_event(buf, EventType::Info, INFO_ANSWER_LEN)?;
    Ok((header.id, SharedResponse::decode(&buf[Header::SIZE..])?))
}

pub fn decode_data_answer(buf: &[u8]) -> Result<DataAnswerView, ProtocolError> {
    let header = expect_event(buf, EventType::Data, DATA_ANSWER_LEN)?;
    Ok(DataAnswerView {
        id: header.id,
        response: SharedResponse::decode(&buf[Header::SIZE..])?,
        packet_number: read_u32_le(buf, PACKET_NUMBER_OFFSET),
        motion: MotionData::decode(&buf[MOTION_OFFSET..])?,
    })
}

fn expect_event(buf: &[u8], expected: EventType, len: usize) -> Result<Header, ProtocolError> {
    ensure_len(buf, len)?;
    let header = Header::decode(buf)?;
    if header.event_type != expected {
        return Err(ProtocolError::UnexpectedEvent {
            expected,
            actual: header.event_type,
        });
    }
    Ok(header)
}

/// 控制区（按钮/摇杆/扳机/触摸）是否全为 0
pub fn controls_are_zero(packet: &[u8]) -> bool {
    packet.len() >= CONTROLS_OFFSET + CONTROLS_LEN
        && packet[CONTROLS_OFFSET..CONTROLS_OFFSET + CONTROLS_LEN]
            .iter()
            .all(|&b| b == 0)
}
