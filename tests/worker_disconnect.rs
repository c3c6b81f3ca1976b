//! Transport-layer disconnect handling (spec §8 end-to-end scenario 4):
//! a worker that drops its socket mid-session surfaces as
//! `TransportRead` on the side still trying to read, not a panic or a
//! silent hang.

use std::net::TcpListener;
use std::thread;
use tensormesh_engine::transport::Network;
use tensormesh_engine::utils::error::EngineError;

#[test]
fn dropped_peer_surfaces_as_transport_read_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let worker = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        // Simulate the worker vanishing mid-session: drop the socket
        // without sending the root anything further.
        drop(stream);
    });

    let root = Network::connect(addr).unwrap();
    worker.join().unwrap();

    let mut buf = [0u8; 4];
    let err = root.read(0, &mut buf).unwrap_err();
    assert!(matches!(err, EngineError::TransportRead(_)));
}

#[test]
fn write_after_peer_closes_eventually_surfaces_as_transport_write_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let worker = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });

    let root = Network::connect(addr).unwrap();
    worker.join().unwrap();

    // A TCP peer that has closed its read side doesn't guarantee the
    // first write after close fails (the OS may still buffer it), so
    // this drives a few writes until the kernel reports the RST.
    let payload = vec![0u8; 4096];
    let mut saw_error = false;
    for _ in 0..20 {
        if root.write(0, &payload).is_err() {
            saw_error = true;
            break;
        }
    }
    assert!(saw_error, "expected a transport error after the peer closed its socket");
}
