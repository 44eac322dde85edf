use std::{io, time::Duration};

use xvc_client::{
    Builder, ClientError, Config, XvcClient,
    jtag::{ChainDevice, IdCode},
};
use xvc_protocol::{Message, error::ReadError};
use xvc_tests::{FakeServer, Script, tdo_stream, unused_addr};

const XC7A35T: u32 = 0x0362_D093;
const CORTEX_DAP: u32 = 0x4BA0_0477;

fn quick_config() -> Config {
    Builder::new()
        .connect_timeout(Duration::from_secs(2))
        .rw_timeout(Duration::from_secs(2))
        .build()
}

#[test]
fn idcode_flow_sends_the_expected_frames() {
    let server = FakeServer::start(
        Script::new()
            .tdo([0x00u8])
            .tdo([0x00u8])
            .tdo(XC7A35T.to_le_bytes()),
    )
    .unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    let info = client.get_info().unwrap();
    assert_eq!(info.to_string(), "xvcServer_v1.0:2048");
    client.reset_tap().unwrap();
    client.enter_shift_dr().unwrap();
    assert_eq!(client.read_dr32().unwrap(), XC7A35T);
    drop(client);

    let frames: Vec<Vec<u8>> = server.join().iter().map(Message::to_bytes).collect();
    assert_eq!(
        frames,
        vec![
            b"getinfo:".to_vec(),
            b"shift:\x06\x00\x00\x00\x1F\x3F".to_vec(),
            b"shift:\x04\x00\x00\x00\x02\x0F".to_vec(),
            b"shift:\x20\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00".to_vec(),
        ]
    );
}

#[test]
fn read_idcode_decodes_the_device() {
    let server = FakeServer::start(
        Script::new()
            .tdo([0x00u8])
            .tdo([0x00u8])
            .tdo(XC7A35T.to_le_bytes()),
    )
    .unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    let id = client.read_idcode().unwrap();
    assert_eq!(id, IdCode::new(XC7A35T));
    assert_eq!(id.manufacturer_name(), Some("Xilinx/AMD"));
}

#[test]
fn settck_returns_the_applied_period() {
    let server = FakeServer::start(Script::new().min_tck_period(40)).unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    assert_eq!(client.set_tck(10).unwrap(), 40);
    assert_eq!(client.set_tck(100).unwrap(), 100);
}

#[test]
fn oversized_shift_is_split() {
    let server = FakeServer::start(
        Script::new()
            .max_vector_len(2)
            .tdo([0xA1u8, 0xA2])
            .tdo([0xA3u8]),
    )
    .unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    client.get_info().unwrap();
    let tdo = client
        .shift(20, &[0x01, 0x02, 0x03], &[0x0A, 0x0B, 0x0C])
        .unwrap();
    assert_eq!(&tdo[..], &[0xA1, 0xA2, 0xA3]);
    drop(client);

    assert_eq!(
        server.join(),
        vec![
            Message::GetInfo,
            Message::shift(16, [0x01u8, 0x02], [0x0Au8, 0x0B]).unwrap(),
            Message::shift(4, [0x03u8], [0x0Cu8]).unwrap(),
        ]
    );
}

#[test]
fn shift_without_info_is_sent_whole() {
    // The client only knows the limit after getinfo, so the server drops the request
    let server = FakeServer::start(Script::new().max_vector_len(2)).unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    match client.shift(24, &[0; 3], &[0; 3]) {
        Err(ClientError::Io(err)) => assert!(matches!(
            err.kind(),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset
        )),
        other => panic!("expected a closed connection, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn unscripted_shifts_return_fill() {
    let server = FakeServer::start(Script::new().fill(0x5A)).unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    let tdo = client.shift(24, &[0; 3], &[0; 3]).unwrap();
    assert_eq!(&tdo[..], &[0x5A; 3]);
}

#[test]
fn scan_finds_identified_and_bypass_devices() {
    let chain = tdo_stream(&[(XC7A35T, 32), (0, 1), (CORTEX_DAP, 32)], 5 * 32);
    let server = FakeServer::start(
        Script::new()
            .tdo([0x00u8])
            .tdo([0x00u8])
            .tdo(chain),
    )
    .unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    let scan = client.scan_chain(4).unwrap();
    assert!(scan.complete);
    assert_eq!(
        scan.devices,
        vec![
            ChainDevice::Identified(IdCode::new(XC7A35T)),
            ChainDevice::Bypass,
            ChainDevice::Identified(IdCode::new(CORTEX_DAP)),
        ]
    );
    drop(client);

    let received = server.join();
    assert_eq!(received.len(), 4);
    match &received[2] {
        Message::Shift { num_bits, tdi, .. } => {
            assert_eq!(*num_bits, 160);
            assert!(tdi.iter().all(|b| *b == 0xFF));
        }
        other => panic!("expected the scan shift, got {:?}", other),
    }
}

#[test]
fn mismatched_vectors_are_not_sent() {
    let server = FakeServer::start(Script::new()).unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    match client.shift(9, &[0x00], &[0x00]) {
        Err(ClientError::Protocol(ReadError::VectorLength { expected, .. })) => {
            assert_eq!(expected, 2)
        }
        other => panic!("expected VectorLength, got {:?}", other.map(|_| ())),
    }
    drop(client);
    assert!(server.join().is_empty());
}

#[test]
fn server_closing_mid_session() {
    let server = FakeServer::start(Script::new().close_after(1)).unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    match client.get_info() {
        Err(ClientError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
        other => panic!("expected UnexpectedEof, got {:?}", other),
    }
}

#[test]
fn silent_server_times_out() {
    let server = FakeServer::start(Script::new().silent()).unwrap();
    let config = Builder::new()
        .rw_timeout(Duration::from_millis(100))
        .build();
    let mut client = XvcClient::connect_with(server.addr(), config).unwrap();

    assert!(matches!(client.read_dr32(), Err(ClientError::Timeout)));
}

#[test]
fn refused_connection_is_retried_then_reported() {
    let addr = unused_addr().unwrap();
    let config = Builder::new()
        .connect_timeout(Duration::from_millis(200))
        .retries(2, Duration::from_millis(10))
        .build();

    match XvcClient::connect_with(addr, config) {
        Err(ClientError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused),
        Err(other) => panic!("expected ConnectionRefused, got {}", other),
        Ok(_) => panic!("nothing listens on {}", addr),
    }
}

#[test]
fn connect_retries_until_the_server_listens() {
    let addr = unused_addr().unwrap();
    let server = FakeServer::start_after(addr, Duration::from_millis(300), Script::new());
    let config = Builder::new()
        .connect_timeout(Duration::from_secs(1))
        .rw_timeout(Duration::from_secs(2))
        .retries(100, Duration::from_millis(20))
        .build();

    let mut client = XvcClient::connect_with(addr, config).unwrap();
    assert_eq!(client.get_info().unwrap().max_vector_len(), 2048);
    drop(client);

    assert_eq!(server.join(), vec![Message::GetInfo]);
}

#[test]
fn connect_falls_back_to_the_next_address() {
    let dead = unused_addr().unwrap();
    let server = FakeServer::start(Script::new()).unwrap();
    let addrs = [dead, server.addr()];

    let mut client = XvcClient::connect_with(&addrs[..], quick_config()).unwrap();
    assert_eq!(client.get_info().unwrap().max_vector_len(), 2048);
}

#[test]
fn info_line_is_returned_as_received() {
    let server = FakeServer::start(Script::new().max_vector_len(512)).unwrap();
    let mut client = XvcClient::connect_with(server.addr(), quick_config()).unwrap();

    let (info, line) = client.get_info_line().unwrap();
    assert_eq!(line, b"xvcServer_v1.0:512\n".to_vec());
    assert_eq!(client.info(), Some(&info));
}
