//! DSU UDP 服务端
//!
//! 两个线程：
//! - 接收线程：应答 Version / Info 请求，登记 Data 订阅，负责客户端超时剔除，
//!   并独自驱动广播状态切换；
//! - 广播线程：仅在有客户端时存在，每轮从 [`MotionSource`] 取一个样本，
//!   按客户端写入 id、重算 CRC 后发送。
//!
//! 两个线程共用一个 socket，发送经由同一把互斥锁串行化。

use crate::config::ServerConfig;
use crate::motion::MotionSource;
use crate::registry::{Client, ClientRegistry, Subscribe};
use crate::state::{AtomicBroadcastState, BroadcastState};
use crate::DsuError;
use parking_lot::Mutex;
use sdgyro_protocol::{
    DataAnswer, Header, INFO_ANSWER_LEN, Request, SharedResponse, decode_request,
    encode_info_answer, encode_version_answer,
};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 接收缓冲大小（请求包都远小于此值）
const RECV_BUF_LEN: usize = 1024;

struct ServerShared {
    socket: UdpSocket,
    send_lock: Mutex<()>,
    clients: ClientRegistry,
    source: Arc<dyn MotionSource>,
    config: ServerConfig,
    shutdown: AtomicBool,
    /// 广播线程完成一轮超时计数后置位，接收线程据此剔除
    check_timeout: AtomicBool,
    state: AtomicBroadcastState,
    packets_sent: AtomicU64,
}

impl ServerShared {
    fn send(&self, packet: &[u8], to: SocketAddr) {
        let _guard = self.send_lock.lock();
        match self.socket.send_to(packet, to) {
            Ok(_) => trace!("DsuServer: sent {} bytes to {}", packet.len(), to),
            Err(e) => trace!("DsuServer: send to {} failed: {}", to, e),
        }
    }
}

/// DSU 服务端
///
/// # 示例
///
/// ```rust,no_run
/// use sdgyro_dsu::{DsuServer, MotionAdapter, ServerConfig, AdapterConfig};
/// use sdgyro_driver::{FrameSource, PipelineConfig};
/// use sdgyro_hid::DeviceSpec;
/// use std::sync::Arc;
///
/// let source = Arc::new(FrameSource::new(
///     Arc::new(DeviceSpec::steam_deck()),
///     PipelineConfig::default(),
/// )?);
/// let adapter = Arc::new(MotionAdapter::new(source, AdapterConfig::default()));
/// let server = DsuServer::bind(ServerConfig::from_env(), adapter)?;
/// println!("listening on {}", server.local_addr());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct DsuServer {
    shared: Arc<ServerShared>,
    receiver: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl DsuServer {
    /// 绑定端口并启动接收线程
    ///
    /// 端口绑定失败返回 [`DsuError::Bind`]。帧源在首个数据订阅到达时才启动。
    pub fn bind(config: ServerConfig, source: Arc<dyn MotionSource>) -> Result<Self, DsuError> {
        let addr = SocketAddr::new(config.interface.ip(), config.port);
        let socket = UdpSocket::bind(addr).map_err(|source| DsuError::Bind { addr, source })?;
        socket.set_read_timeout(Some(config.receive_timeout))?;
        let local_addr = socket.local_addr()?;
        info!("DsuServer: listening on {}", local_addr);

        let shared = Arc::new(ServerShared {
            socket,
            send_lock: Mutex::new(()),
            clients: ClientRegistry::new(config.client_timeout_limit),
            source,
            config,
            shutdown: AtomicBool::new(false),
            check_timeout: AtomicBool::new(false),
            state: AtomicBroadcastState::new(BroadcastState::Idle),
            packets_sent: AtomicU64::new(0),
        });

        let receiver = {
            let mut receiver = Receiver::new(shared.clone());
            thread::Builder::new()
                .name("sdgyro-dsu-recv".into())
                .spawn(move || receiver.run())?
        };

        Ok(Self {
            shared,
            receiver: Some(receiver),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn state(&self) -> BroadcastState {
        self.shared.state.get(Ordering::Acquire)
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.len()
    }

    pub fn clients(&self) -> Vec<Client> {
        let mut clients = Vec::new();
        self.shared.clients.for_each(|c| clients.push(c.clone()));
        clients
    }

    /// 已发出的数据包总数
    pub fn packets_sent(&self) -> u64 {
        self.shared.packets_sent.load(Ordering::Relaxed)
    }

    /// 停止接收与广播，停止帧源（幂等）
    pub fn shutdown(&mut self) {
        let Some(receiver) = self.receiver.take() else {
            return;
        };
        self.shared.shutdown.store(true, Ordering::Release);

        // 发一个空包唤醒阻塞中的接收
        let wake = match self.local_addr.ip() {
            ip if ip.is_unspecified() => {
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.local_addr.port())
            },
            _ => self.local_addr,
        };
        self.shared.send(&[], wake);

        if receiver.join().is_err() {
            error!("DsuServer: receive thread panicked");
        }
        self.shared.clients.clear();
        info!("DsuServer: stopped");
    }
}

impl Drop for DsuServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// 接收线程
// ============================================================================

struct Broadcast {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

struct Receiver {
    shared: Arc<ServerShared>,
    broadcast: Option<Broadcast>,
    buf: [u8; RECV_BUF_LEN],
    answer: [u8; INFO_ANSWER_LEN],
}

impl Receiver {
    fn new(shared: Arc<ServerShared>) -> Self {
        Self {
            shared,
            broadcast: None,
            buf: [0; RECV_BUF_LEN],
            answer: [0; INFO_ANSWER_LEN],
        }
    }

    fn run(&mut self) {
        debug!("DsuServer: receive loop started");
        while !self.shared.shutdown.load(Ordering::Acquire) {
            match self.shared.socket.recv_from(&mut self.buf) {
                Ok((len, from)) => {
                    if self.shared.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(e) = self.handle_packet(len, from) {
                        trace!("DsuServer: dropping packet from {}: {}", from, e);
                    }
                    if self.shared.check_timeout.load(Ordering::Acquire) {
                        self.check_clients(false);
                    }
                },
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    self.check_clients(true);
                },
                Err(e) => {
                    debug!("DsuServer: receive failed: {}", e);
                    thread::sleep(Duration::from_millis(1));
                },
            }
        }
        self.stop_broadcast();
        debug!("DsuServer: receive loop exited");
    }

    fn handle_packet(&mut self, len: usize, from: SocketAddr) -> Result<(), DsuError> {
        let packet = &self.buf[..len];
        if !Header::decode(packet)?.is_client() {
            trace!("DsuServer: ignoring server packet from {}", from);
            return Ok(());
        }

        let request = decode_request(packet)?;
        trace!("DsuServer: {:?} request from {}", request.event_type(), from);

        match request {
            Request::Version { id } => {
                let len = encode_version_answer(id, &mut self.answer)?;
                self.shared.send(&self.answer[..len], from);
            },
            Request::Info { id, slots } => {
                for slot in slots {
                    let response = self.slot_response(slot);
                    let len = encode_info_answer(id, &response, &mut self.answer)?;
                    self.shared.send(&self.answer[..len], from);
                }
            },
            Request::Data { id, .. } => self.subscribe(from, id),
        }
        Ok(())
    }

    fn slot_response(&self, slot: u8) -> SharedResponse {
        if slot == self.shared.config.slot {
            SharedResponse::controller(slot, self.shared.source.is_connected())
        } else {
            SharedResponse::empty(slot)
        }
    }

    fn subscribe(&mut self, from: SocketAddr, id: u32) {
        match self.shared.clients.subscribe(from, id) {
            Subscribe::Added => info!("DsuServer: new client subscribed from {}", from),
            Subscribe::Refreshed => trace!("DsuServer: client {} refreshed", from),
        }
        if self.broadcast.is_none() {
            self.start_broadcast();
        }
    }

    /// 超时剔除；`age` 为真表示本轮接收超时，先计一次超时
    fn check_clients(&mut self, age: bool) {
        self.shared.check_timeout.store(false, Ordering::Release);
        for address in self.shared.clients.sweep(age) {
            info!("DsuServer: client {} timed out, removed", address);
        }
        if self.broadcast.is_some() && self.shared.clients.is_empty() {
            info!("DsuServer: no clients left, stop sending data");
            self.stop_broadcast();
        }
    }

    fn start_broadcast(&mut self) {
        let shared = &self.shared;
        shared.state.set(BroadcastState::Starting, Ordering::Release);

        if let Err(e) = shared.source.start() {
            // 客户端保留，下一个订阅包会重试
            warn!("DsuServer: motion source failed to start: {}", e);
            shared.state.set(BroadcastState::Idle, Ordering::Release);
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let spawned = {
            let shared = shared.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("sdgyro-dsu-send".into())
                .spawn(move || broadcast_loop(&shared, &stop))
        };

        match spawned {
            Ok(handle) => {
                self.broadcast = Some(Broadcast { stop, handle });
                shared.state.set(BroadcastState::Broadcasting, Ordering::Release);
                info!("DsuServer: start sending data");
            },
            Err(e) => {
                error!("DsuServer: failed to spawn broadcast thread: {}", e);
                shared.source.stop();
                shared.state.set(BroadcastState::Idle, Ordering::Release);
            },
        }
    }

    fn stop_broadcast(&mut self) {
        let Some(broadcast) = self.broadcast.take() else {
            return;
        };
        self.shared.state.set(BroadcastState::Stopping, Ordering::Release);

        broadcast.stop.store(true, Ordering::Release);
        if broadcast.handle.join().is_err() {
            error!("DsuServer: broadcast thread panicked");
        }
        self.shared.source.stop();

        self.shared.state.set(BroadcastState::Idle, Ordering::Release);
        debug!("DsuServer: broadcast stopped");
    }
}

// ============================================================================
// 广播线程
// ============================================================================

fn broadcast_loop(shared: &ServerShared, stop: &AtomicBool) {
    let config = &shared.config;
    let mut answer = DataAnswer::new(&SharedResponse::controller(config.slot, true));
    let mut packet_number: u32 = 0;
    let check_period = config.timeout_check_period.max(1);

    while !stop.load(Ordering::Acquire) {
        let sample = shared.source.next_sample();
        if stop.load(Ordering::Acquire) {
            break;
        }

        packet_number = packet_number.wrapping_add(1);
        answer.set_frame(packet_number, &sample);

        shared.clients.for_each(|client| {
            let packet = answer.stamp(client.id);
            let _guard = shared.send_lock.lock();
            match shared.socket.send_to(packet, client.address) {
                Ok(_) => {
                    shared.packets_sent.fetch_add(1, Ordering::Relaxed);
                },
                Err(e) => trace!("DsuServer: send to {} failed: {}", client.address, e),
            }
        });

        if packet_number % check_period == 0 {
            shared.clients.age_all();
            shared.check_timeout.store(true, Ordering::Release);
        }

        spin_sleep::sleep(config.send_pause);
    }
}
