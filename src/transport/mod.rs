//! Network transport (§4.7): TCP sockets between the root and every
//! worker, `TCP_NODELAY`/`TCP_QUICKACK` on by default, chunked 4096-byte
//! I/O, and an ACK handshake used to confirm a session before any
//! weight bytes move.

use crate::utils::error::{EngineError, Result};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Socket index `0` is always the link to the root, from a worker's
/// point of view (§4.7).
pub const ROOT_SOCKET_INDEX: usize = 0;

/// Magic value exchanged by `write_ack`/`read_ack` to confirm a
/// session handshake succeeded (§4.7, §6.2).
pub const ACK_MAGIC: u32 = 0x0167_1C72;

const CHUNK_SIZE: usize = 4096;

/// One `(socketIndex, data)` pair for a round-robin multiplexed
/// transfer (§4.7 `writeMany`/`readMany`).
pub struct SocketIo<'a> {
    pub socket_index: usize,
    pub data: &'a mut [u8],
}

/// A node's live connections to its peers. The root holds one socket
/// per worker; a worker holds exactly one socket, to the root, at
/// `ROOT_SOCKET_INDEX` (§4.7).
pub struct Network {
    sockets: Vec<TcpStream>,
    sent_bytes: std::sync::atomic::AtomicU64,
    recv_bytes: std::sync::atomic::AtomicU64,
}

impl Network {
    pub fn from_sockets(sockets: Vec<TcpStream>) -> Result<Self> {
        for s in &sockets {
            configure_socket(s)?;
        }
        Ok(Self {
            sockets,
            sent_bytes: std::sync::atomic::AtomicU64::new(0),
            recv_bytes: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Accept `n_workers` incoming connections in order. A worker uses
    /// this with `n_workers == 1` to accept the root's dial-in (§6.3 a
    /// worker listens on `--port` and waits for the root to connect).
    pub fn serve(port: u16, n_workers: usize) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).map_err(|e| EngineError::TransportRead(e.to_string()))?;
        let mut sockets = Vec::with_capacity(n_workers);
        for _ in 0..n_workers {
            let (stream, _) = listener.accept().map_err(|e| EngineError::TransportRead(e.to_string()))?;
            sockets.push(stream);
        }
        Self::from_sockets(sockets)
    }

    /// Dial a single peer. The root uses this once per address in
    /// `--workers host:port ...`, bundling the resulting streams into
    /// one `Network` via `from_sockets` (§6.3, §4.7 star topology).
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|e| EngineError::TransportWrite(e.to_string()))?;
        Self::from_sockets(vec![stream])
    }

    /// Enable turbo mode: set the socket non-blocking and spin on
    /// `EAGAIN`/`EWOULDBLOCK` instead of parking the thread. Trades CPU
    /// for lower tail latency on the hot synchronization path (§4.7).
    pub fn set_turbo(&mut self, enabled: bool) -> Result<()> {
        for s in &self.sockets {
            s.set_nonblocking(enabled).map_err(|e| EngineError::TransportWrite(e.to_string()))?;
        }
        Ok(())
    }

    pub fn write(&self, socket_index: usize, data: &[u8]) -> Result<()> {
        let mut stream = &self.sockets[socket_index];
        let mut written = 0;
        while written < data.len() {
            let end = (written + CHUNK_SIZE).min(data.len());
            match stream.write(&data[written..end]) {
                Ok(0) => return Err(EngineError::TransportWrite("peer closed the connection".to_string())),
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::hint::spin_loop();
                    continue;
                }
                Err(e) => return Err(EngineError::TransportWrite(e.to_string())),
            }
        }
        self.sent_bytes.fetch_add(data.len() as u64, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    pub fn read(&self, socket_index: usize, data: &mut [u8]) -> Result<()> {
        let mut stream = &self.sockets[socket_index];
        let mut read = 0;
        while read < data.len() {
            let end = (read + CHUNK_SIZE).min(data.len());
            match stream.read(&mut data[read..end]) {
                Ok(0) => return Err(EngineError::TransportRead("peer closed the connection".to_string())),
                Ok(n) => read += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::hint::spin_loop();
                    continue;
                }
                Err(e) => return Err(EngineError::TransportRead(e.to_string())),
            }
        }
        self.recv_bytes.fetch_add(data.len() as u64, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    pub fn write_ack(&self, socket_index: usize) -> Result<()> {
        self.write(socket_index, &ACK_MAGIC.to_le_bytes())
    }

    pub fn read_ack(&self, socket_index: usize) -> Result<()> {
        let mut buf = [0u8; 4];
        self.read(socket_index, &mut buf)?;
        if u32::from_le_bytes(buf) != ACK_MAGIC {
            return Err(EngineError::TransportRead("ack handshake magic mismatch".to_string()));
        }
        Ok(())
    }

    /// Round-robin a batch of writes across sockets so no single slow
    /// peer stalls the others' progress (§4.7 `writeMany`).
    pub fn write_many(&self, ios: &mut [SocketIo]) -> Result<()> {
        let mut offsets = vec![0usize; ios.len()];
        let mut remaining = ios.len();
        while remaining > 0 {
            for (i, io) in ios.iter().enumerate() {
                if offsets[i] >= io.data.len() {
                    continue;
                }
                let mut stream = &self.sockets[io.socket_index];
                let end = (offsets[i] + CHUNK_SIZE).min(io.data.len());
                match stream.write(&io.data[offsets[i]..end]) {
                    Ok(0) => return Err(EngineError::TransportWrite("peer closed the connection".to_string())),
                    Ok(n) => {
                        offsets[i] += n;
                        if offsets[i] >= io.data.len() {
                            remaining -= 1;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(EngineError::TransportWrite(e.to_string())),
                }
            }
        }
        Ok(())
    }

    /// Round-robin a batch of reads across sockets (§4.7 `readMany`).
    pub fn read_many(&self, ios: &mut [SocketIo]) -> Result<()> {
        let mut offsets = vec![0usize; ios.len()];
        let mut remaining = ios.len();
        while remaining > 0 {
            for (i, io) in ios.iter_mut().enumerate() {
                if offsets[i] >= io.data.len() {
                    continue;
                }
                let mut stream = &self.sockets[io.socket_index];
                let end = (offsets[i] + CHUNK_SIZE).min(io.data.len());
                match stream.read(&mut io.data[offsets[i]..end]) {
                    Ok(0) => return Err(EngineError::TransportRead("peer closed the connection".to_string())),
                    Ok(n) => {
                        offsets[i] += n;
                        if offsets[i] >= io.data.len() {
                            remaining -= 1;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(EngineError::TransportRead(e.to_string())),
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.sent_bytes.load(std::sync::atomic::Ordering::Relaxed),
            self.recv_bytes.load(std::sync::atomic::Ordering::Relaxed),
        )
    }

    /// For the root: the socket index connecting it to worker
    /// `node_index` (1-based node indices map to `node_index - 1`);
    /// for a worker this is always `ROOT_SOCKET_INDEX` since a worker
    /// only ever talks to the root (§4.7 star topology).
    pub fn peer_socket_index(&self, self_node_index: usize, peer_node_index: usize) -> usize {
        if self_node_index == 0 {
            peer_node_index - 1
        } else {
            ROOT_SOCKET_INDEX
        }
    }
}

fn configure_socket(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true).map_err(|e| EngineError::TransportWrite(e.to_string()))?;
    stream.set_read_timeout(Some(Duration::from_secs(120))).map_err(|e| EngineError::TransportWrite(e.to_string()))?;
    set_quickack(stream);
    Ok(())
}

#[cfg(target_os = "linux")]
fn set_quickack(stream: &TcpStream) {
    use std::os::unix::io::AsRawFd;
    let fd = stream.as_raw_fd();
    let enabled: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_QUICKACK,
            &enabled as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn set_quickack(_stream: &TcpStream) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn round_trips_a_payload_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let net = Network::from_sockets(vec![stream]).unwrap();
            let mut buf = vec![0u8; 13];
            net.read(0, &mut buf).unwrap();
            net.write(0, &buf).unwrap();
        });

        let client = Network::connect(addr).unwrap();
        client.write(0, b"hello, world!").unwrap();
        let mut buf = vec![0u8; 13];
        client.read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello, world!");
        server.join().unwrap();
    }

    #[test]
    fn ack_handshake_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let net = Network::from_sockets(vec![stream]).unwrap();
            net.write_ack(0).unwrap();
        });
        let client = Network::connect(addr).unwrap();
        client.read_ack(0).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn peer_socket_index_matches_star_topology() {
        let sockets = vec![]; // no real connections needed for index math
        let net = Network { sockets, sent_bytes: Default::default(), recv_bytes: Default::default() };
        assert_eq!(net.peer_socket_index(0, 1), 0);
        assert_eq!(net.peer_socket_index(0, 3), 2);
        assert_eq!(net.peer_socket_index(2, 0), ROOT_SOCKET_INDEX);
    }
}
