use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    thread,
    time::Duration,
};

use xchg_network::tcp::{PollEvent, SendBehavior, TcpConnector};

/// `TcpConnector`/`TcpStream` carry no framing of their own (that's the
/// codec's job, C1) — bytes handed to `write_or_enqueue` arrive verbatim in
/// the peer's `inbound()` buffer, so a roundtrip test just needs to send and
/// consume raw bytes both ways.
#[test]
fn tcp_roundtrip() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));

    let mut listener = TcpConnector::default();
    let listen_token = listener.listen_at(bind_addr).expect("failed to listen");

    let server = thread::spawn(move || {
        let mut accepted_stream = None;
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while accepted_stream.is_none() && std::time::Instant::now() < deadline {
            listener.poll_with(|event| match event {
                PollEvent::Accept { listener, stream, .. } if listener == listen_token => {
                    accepted_stream = Some(stream)
                }
                _ => {}
            });
            thread::sleep(Duration::from_millis(1));
        }
        let stream_token = accepted_stream.expect("server never accepted a connection");

        let mut recv = None;
        while recv.is_none() && std::time::Instant::now() < deadline {
            listener.poll_with(|event| {
                if let PollEvent::Readable { token } = event {
                    assert_eq!(token, stream_token);
                }
            });
            if let Some(bytes) = listener.inbound(stream_token) &&
                bytes.len() >= 4
            {
                recv = Some(bytes.to_vec());
                listener.consume(stream_token, 4);
            }
            thread::sleep(Duration::from_micros(50));
        }
        assert_eq!(recv.as_deref(), Some(222u32.to_le_bytes().as_slice()));

        listener.write_or_enqueue(SendBehavior::Single(stream_token), &111u32.to_le_bytes());
        while listener.poll_with(|_| {}) {}
    });

    let mut conn = TcpConnector::default();
    thread::sleep(Duration::from_millis(10));
    let token = conn.connect(bind_addr);
    conn.write_or_enqueue(SendBehavior::Single(token), &222u32.to_le_bytes());

    let mut recv = None;
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while recv.is_none() && std::time::Instant::now() < deadline {
        conn.poll_with(|_| {});
        if let Some(bytes) = conn.inbound(token) &&
            bytes.len() >= 4
        {
            recv = Some(bytes.to_vec());
            conn.consume(token, 4);
        }
        thread::sleep(Duration::from_micros(50));
    }
    assert_eq!(recv.as_deref(), Some(111u32.to_le_bytes().as_slice()));

    server.join().unwrap();
}
