//! Integration tests for knx-tunnel.
//!
//! Wire-level vectors through the public API, and a full tunnelling
//! conversation against an in-process gateway on the loopback interface.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test integration_test
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use knx_tunnel::addressing::{Address, GroupAddress, GroupAddressType, IndividualAddress};
use knx_tunnel::dpt::{DptCodec, DptTemperature, Payload};
use knx_tunnel::net::udp::UdpTransport;
use knx_tunnel::protocol::constants::{CemiMessageCode, ErrorCode, ServiceType};
use knx_tunnel::protocol::frame::{Hpai, KnxIpBody, KnxIpFrame};
use knx_tunnel::protocol::services::{
    ConnectResponse, DisconnectRequest, DisconnectResponse, TunnellingAck, TunnellingRequest,
};
use knx_tunnel::{
    ga, ia, Apci, CemiFrame, ConnectionConfig, DestinationAddress, IpEndpoint, Ipv4Addr, SessionEvent,
    Telegram, TunnelState, TunnellingSession,
};
use tokio::net::UdpSocket;

const DISCONNECT_REQUEST: [u8; 16] = [
    0x06, 0x10, 0x02, 0x09, 0x00, 0x10, 0x15, 0x00, 0x08, 0x01, 0xC0, 0xA8, 0xC8, 0x0C, 0xC3, 0xB4,
];

#[test]
fn test_disconnect_request_vector() {
    let (frame, len) = KnxIpFrame::from_knx(&DISCONNECT_REQUEST).unwrap();
    assert_eq!(len, 16);
    assert_eq!(frame.service_type(), ServiceType::DisconnectRequest);
    let KnxIpBody::DisconnectRequest(request) = &frame.body else {
        panic!("expected disconnect request, got {:?}", frame.body);
    };
    assert_eq!(request.communication_channel_id, 21);
    assert_eq!(request.control_endpoint.ip_addr(), Ipv4Addr::new(192, 168, 200, 12));
    assert_eq!(request.control_endpoint.port(), 50100);
    assert_eq!(frame.to_bytes().unwrap().as_slice(), &DISCONNECT_REQUEST);

    let rebuilt = KnxIpFrame::new(DisconnectRequest::new(
        21,
        Hpai::new("192.168.200.12:50100".parse().unwrap()),
    ));
    assert_eq!(rebuilt.to_bytes().unwrap().as_slice(), &DISCONNECT_REQUEST);
}

#[test]
fn test_frame_errors() {
    assert!(KnxIpFrame::from_knx(&DISCONNECT_REQUEST[..6]).unwrap_err().is_incomplete_frame());
    assert!(KnxIpFrame::from_knx(&[0x06, 0x10, 0x02]).unwrap_err().is_incomplete_frame());
    // Unknown service type
    assert!(KnxIpFrame::from_knx(&[0x06, 0x10, 0x7F, 0x7F, 0x00, 0x06])
        .unwrap_err()
        .is_unhandleable_message());
    // Known service without a body implementation
    assert!(KnxIpFrame::from_knx(&[0x06, 0x10, 0x03, 0x10, 0x00, 0x06])
        .unwrap_err()
        .is_unsupported_message());

    // Trailing bytes after total_length are ignored
    let mut padded = DISCONNECT_REQUEST.to_vec();
    padded.extend_from_slice(&[0xAA, 0xBB]);
    assert_eq!(KnxIpFrame::from_knx(&padded).unwrap().1, 16);
}

#[test]
fn test_cemi_group_write_vector() {
    let raw = [0x29, 0x00, 0xBC, 0xD0, 0x11, 0x05, 0x0A, 0x03, 0x01, 0x00, 0x81];
    let (cemi, len) = CemiFrame::from_knx(&raw).unwrap();
    assert_eq!(len, raw.len());
    assert_eq!(cemi.code, CemiMessageCode::LDataInd);
    let telegram = cemi.telegram().unwrap();
    assert_eq!(telegram.source, ia!(1.1.5));
    assert_eq!(telegram.destination, DestinationAddress::Group(ga!(1 / 2 / 3)));
    assert_eq!(telegram.payload, Apci::GroupValueWrite(Payload::binary(1).unwrap()));

    let mut buf = [0u8; 32];
    let written = cemi.to_knx(&mut buf).unwrap();
    assert_eq!(&buf[..written], &raw);
}

#[test]
fn test_cemi_rejects_bad_mpdu_length() {
    let raw = [0x29, 0x00, 0xBC, 0xD0, 0x11, 0x05, 0x0A, 0x03, 0x02, 0x00, 0x81];
    assert!(CemiFrame::from_knx(&raw).unwrap_err().is_malformed_frame());
}

#[test]
fn test_address_text_forms() {
    assert_eq!("1.1.5".parse::<IndividualAddress>().unwrap(), ia!(1.1.5));
    assert_eq!("1/2/3".parse::<GroupAddress>().unwrap(), ga!(1 / 2 / 3));
    let short: GroupAddress = "1/515".parse().unwrap();
    assert_eq!(short.address_type(), GroupAddressType::Short);
    assert_eq!(short, ga!(1 / 2 / 3));

    assert!(matches!(Address::parse("1.1.5").unwrap(), Address::Individual(_)));
    assert!(matches!(Address::parse("1/2/3").unwrap(), Address::Group(_)));
    assert!(matches!(Address::parse("i-light").unwrap(), Address::Internal(_)));
    assert!("16.1.1".parse::<IndividualAddress>().is_err());
    assert!("32/0/0".parse::<GroupAddress>().is_err());
}

#[test]
fn test_temperature_vectors() {
    assert_eq!(DptTemperature::to_knx(&21.0).unwrap(), [0x0C, 0x1A]);
    assert_eq!(DptTemperature::to_knx(&-30.0).unwrap(), [0x8A, 0x24]);
    assert!((DptTemperature::from_knx(&[0x06, 0xA0]).unwrap() - 16.96).abs() < 1e-3);
    assert!(DptTemperature::to_knx(&-274.0).is_err());
}

fn encode(body: impl Into<KnxIpBody>) -> Vec<u8> {
    KnxIpFrame::new(body).to_bytes().unwrap().to_vec()
}

async fn receive(socket: &UdpSocket) -> (KnxIpBody, SocketAddr) {
    let mut buf = [0u8; 256];
    let (n, from) = socket.recv_from(&mut buf).await.unwrap();
    (KnxIpFrame::from_knx(&buf[..n]).unwrap().0.body, from)
}

/// Plays the gateway side of one tunnel connection.
async fn fake_gateway(socket: UdpSocket) {
    let gateway = IpEndpoint::try_from(socket.local_addr().unwrap()).unwrap();

    let (request, client) = receive(&socket).await;
    assert_eq!(request.service_type(), ServiceType::ConnectRequest);
    let response = ConnectResponse::accepted(1, Hpai::new(gateway), ia!(1.1.250));
    socket.send_to(&encode(response), client).await.unwrap();

    let (request, _) = receive(&socket).await;
    let KnxIpBody::TunnellingRequest(request) = request else {
        panic!("expected tunnelling request, got {request:?}");
    };
    assert_eq!(request.sequence_counter(), 0);
    let telegram = request.cemi().unwrap().telegram().unwrap();
    assert_eq!(telegram.destination, DestinationAddress::Group(ga!(1 / 2 / 3)));
    socket
        .send_to(&encode(TunnellingAck::new(1, 0, ErrorCode::NoError)), client)
        .await
        .unwrap();

    let from_bus = Telegram::new(ga!(1 / 2 / 4), Apci::GroupValueResponse(Payload::array(&[0x0C, 0x1A]).unwrap()))
        .with_source(ia!(1.1.5));
    let cemi = CemiFrame::from_telegram(&from_bus, CemiMessageCode::LDataInd);
    let indication = TunnellingRequest::from_cemi(1, 0, &cemi).unwrap();
    socket.send_to(&encode(indication), client).await.unwrap();

    let (ack, _) = receive(&socket).await;
    let KnxIpBody::TunnellingAck(ack) = ack else {
        panic!("expected tunnelling ack, got {ack:?}");
    };
    assert_eq!(ack.sequence_counter(), 0);

    let (request, _) = receive(&socket).await;
    assert_eq!(request.service_type(), ServiceType::DisconnectRequest);
    socket
        .send_to(&encode(DisconnectResponse::new(1, ErrorCode::NoError)), client)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_tunnel_conversation_over_udp() {
    let gateway_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let gateway_port = gateway_socket.local_addr().unwrap().port();

    let config = ConnectionConfig {
        gateway_port,
        ..ConnectionConfig::tunneling(Ipv4Addr::LOCALHOST)
    };
    let transport = UdpTransport::bind(IpEndpoint::new(Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let session = TunnellingSession::new(config, transport).unwrap();

    let app = async {
        session.connect().await.unwrap();
        assert_eq!(session.state(), TunnelState::Connected);
        assert_eq!(session.individual_address(), Some(ia!(1.1.250)));

        let write = Telegram::new(ga!(1 / 2 / 3), Apci::GroupValueWrite(Payload::binary(1).unwrap()));
        session.send_telegram(&write).await.unwrap();
        assert_eq!(session.send_sequence(), 1);

        let SessionEvent::Telegram(received) = session.next_event().await else {
            panic!("expected telegram");
        };
        assert_eq!(received.source, ia!(1.1.5));
        assert_eq!(received.destination, DestinationAddress::Group(ga!(1 / 2 / 4)));

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), TunnelState::Disconnected);
        session.close();
    };

    let conversation = async {
        let (pumped, (), ()) = tokio::join!(session.pump(), app, fake_gateway(gateway_socket));
        pumped.unwrap();
    };
    tokio::time::timeout(Duration::from_secs(10), conversation)
        .await
        .expect("tunnel conversation timed out");
}
