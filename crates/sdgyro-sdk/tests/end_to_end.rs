//! 全链路测试：Mock 设备 → FrameSource → MotionAdapter → DsuServer → UDP 客户端

use proptest::prelude::*;
use sdgyro_sdk::dsu::BroadcastState;
use sdgyro_sdk::hid::mock::{MockOpener, MockScript};
use sdgyro_sdk::prelude::*;
use sdgyro_sdk::protocol::{
    SlotState, Subscription, decode_data_answer, decode_info_answer, decode_version_answer,
    encode_data_request, encode_info_request, encode_version_request, verify,
};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct Stack {
    opener: MockOpener,
    source: Arc<FrameSource>,
    server: DsuServer,
}

fn stack(receive_timeout: Duration) -> Stack {
    sdgyro_sdk::init_logger!("warn");

    let opener = MockOpener::new(MockScript::default());
    let pipeline = PipelineConfig {
        stuck_timeout: Duration::from_millis(50),
        stop_timeout: Duration::from_secs(2),
        ..Default::default()
    };
    let source = Arc::new(FrameSource::new(Arc::new(opener.clone()), pipeline).unwrap());
    let adapter = Arc::new(MotionAdapter::new(source.clone(), AdapterConfig::default()));
    let server = DsuServer::bind(
        ServerConfig {
            interface: BindInterface::Local,
            port: 0,
            receive_timeout,
            ..Default::default()
        },
        adapter,
    )
    .unwrap();

    Stack {
        opener,
        source,
        server,
    }
}

fn client() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    socket
}

fn request(socket: &UdpSocket, to: SocketAddr, packet: &[u8]) -> Vec<u8> {
    socket.send_to(packet, to).unwrap();
    let mut buf = [0u8; 256];
    let (len, _) = socket.recv_from(&mut buf).unwrap();
    buf[..len].to_vec()
}

fn wait_for(mut condition: impl FnMut() -> bool, deadline: Duration) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_version_request_echoes_id() {
    let stack = stack(Duration::from_secs(2));
    let socket = client();

    let answer = request(&socket, stack.server.local_addr(), &encode_version_request(0x5EED));
    assert!(verify(&answer));
    assert_eq!(decode_version_answer(&answer).unwrap(), (0x5EED, 1001));
    // 没有订阅时不启动设备
    assert!(!stack.source.is_started());
    assert_eq!(stack.opener.opens(), 0);
}

#[test]
fn test_subscription_streams_device_motion() {
    let stack = stack(Duration::from_secs(2));
    let socket = client();
    let server = stack.server.local_addr();

    let (_, info) = decode_info_answer(&request(&socket, server, &encode_info_request(1, &[0]))).unwrap();
    assert_eq!(info.slot_state, SlotState::NotConnected);

    socket
        .send_to(&encode_data_request(9, &Subscription::default()), server)
        .unwrap();

    let mut buf = [0u8; 256];
    let mut previous: Option<(u32, u64)> = None;
    for _ in 0..30 {
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        assert!(verify(&buf[..len]));
        let view = decode_data_answer(&buf[..len]).unwrap();
        assert_eq!(view.id, 9);
        assert_eq!(view.motion.accel_z, 1.0);
        if let Some((packet, timestamp)) = previous {
            assert_eq!(view.packet_number, packet + 1);
            assert_eq!(view.motion.timestamp, timestamp + 4000);
        }
        previous = Some((view.packet_number, view.motion.timestamp));
    }
    assert!(stack.source.is_started());
    assert_eq!(stack.server.state(), BroadcastState::Broadcasting);

    // 设备已启动后，本机槽位报告已连接；先清空缓冲中的数据包
    socket.send_to(&encode_info_request(2, &[0]), server).unwrap();
    let info = loop {
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        if let Ok((2, info)) = decode_info_answer(&buf[..len]) {
            break info;
        }
    };
    assert_eq!(info.slot_state, SlotState::Connected);
}

#[test]
fn test_eviction_stops_device() {
    let stack = stack(Duration::from_millis(50));
    let socket = client();
    socket
        .send_to(
            &encode_data_request(3, &Subscription::default()),
            stack.server.local_addr(),
        )
        .unwrap();

    assert!(wait_for(|| stack.source.is_started(), Duration::from_secs(2)));
    assert!(wait_for(
        || stack.server.client_count() == 0 && !stack.source.is_started(),
        Duration::from_secs(5)
    ));
    assert_eq!(stack.server.state(), BroadcastState::Idle);
    assert!(stack.source.metrics().frames_published > 0);
}

#[test]
fn test_shutdown_stops_device() {
    let mut stack = stack(Duration::from_secs(2));
    let socket = client();
    socket
        .send_to(
            &encode_data_request(4, &Subscription::default()),
            stack.server.local_addr(),
        )
        .unwrap();
    assert!(wait_for(|| stack.source.is_started(), Duration::from_secs(2)));

    stack.server.shutdown();
    assert!(!stack.source.is_started());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_server_survives_arbitrary_datagrams(
        datagrams in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..120), 1..8)
    ) {
        let stack = stack(Duration::from_secs(2));
        let socket = client();
        let server = stack.server.local_addr();
        for datagram in &datagrams {
            socket.send_to(datagram, server).unwrap();
        }

        // 随机包可能恰好是合法请求，只认版本应答
        socket.send_to(&encode_version_request(0xFEED), server).unwrap();
        let mut buf = [0u8; 256];
        loop {
            let (len, _) = socket.recv_from(&mut buf).unwrap();
            if let Ok((0xFEED, version)) = decode_version_answer(&buf[..len]) {
                prop_assert_eq!(version, 1001);
                break;
            }
        }
    }
}
