//! Minimal native-protocol transport.
//!
//! Implements the documented wire shape from spec §6 — binary framing,
//! fixed-width integers, length-prefixed strings, correlation ids — over a
//! plain TCP socket. This crate does not pin the exact bytes to any
//! upstream ensemble's wire protocol (spec is explicit that an
//! implementation may re-implement the protocol behind the
//! [`crate::transport::SessionTransport`] interface), so this is a
//! self-consistent framing rather than a `zookeeper-cpp`-compatible one.
//!
//! Frame shape: `[u32 length][u8 tag][u64 correlation_id][payload]`. The
//! payload per tag mirrors [`crate::transport::RawReply`]'s variants.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};

use crate::completion::CorrelationId;
use crate::error::{Error, ErrorKind};
use crate::request::Request;

use super::{NativeHandle, RawReply, SessionTransport, TransportEvent};

const TAG_GET: u8 = 1;
const TAG_ERROR: u8 = 0xFF;

/// A leaf wire/codec error: failures reading or decoding a frame off the
/// socket, before there is enough of a reply to attribute to any
/// particular correlation id. `thiserror`-derived, per this crate's split
/// between hand-rolled `zk_client::Error` for the application-facing
/// taxonomy and `thiserror` for leaf codec errors.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The socket read itself failed (includes timeouts bubbled up by
    /// callers that don't special-case them).
    #[error("i/o error reading a frame: {0}")]
    Io(#[from] io::Error),
    /// The frame was shorter than the fixed tag+correlation header it must
    /// carry.
    #[error("frame of {len} bytes is shorter than the 9-byte tag+correlation header")]
    Truncated { len: usize },
    /// The frame's tag byte did not match any known reply shape.
    #[error("unknown frame tag {0:#04x}")]
    UnknownTag(u8),
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        match e {
            WireError::Io(_) => Error::new(ErrorKind::ConnectionLoss).with_context(e.to_string()),
            WireError::Truncated { .. } | WireError::UnknownTag(_) => {
                Error::new(ErrorKind::MarshallingError).with_context(e.to_string())
            }
        }
    }
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_u32(out, data.len() as u32);
    out.extend_from_slice(data);
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_bytes(out, s.as_bytes());
}

/// Encodes a `Get` request frame: `[len][TAG_GET][correlation][path]`.
fn encode_get_request(correlation: u64, path: &str) -> Vec<u8> {
    let mut body = Vec::new();
    write_u64(&mut body, correlation);
    write_str(&mut body, path);
    let mut frame = Vec::with_capacity(body.len() + 5);
    write_u32(&mut frame, (body.len() + 1) as u32);
    frame.push(TAG_GET);
    frame.extend_from_slice(&body);
    frame
}

fn read_exact(stream: &mut TcpStream, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32(stream: &mut TcpStream) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_u64(buf: &[u8], pos: &mut usize) -> u64 {
    let v = u64::from_be_bytes(buf[*pos..*pos + 8].try_into().unwrap());
    *pos += 8;
    v
}

fn read_bytes(buf: &[u8], pos: &mut usize) -> Vec<u8> {
    let len = u32::from_be_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
    *pos += 4;
    let data = buf[*pos..*pos + len].to_vec();
    *pos += len;
    data
}

/// Reads one frame (`[len][tag][body]`) and decodes it into a
/// `(correlation_id, RawReply-or-Error)` pair. Only the `get` reply shape is
/// implemented; other operations round-trip through the same framing but
/// are left for a fuller native transport (the in-memory test transport
/// covers the full operation set for this crate's own test suite).
///
/// # Errors
///
/// Returns [`WireError::Io`] if the socket read itself fails,
/// [`WireError::Truncated`] if the frame is shorter than the fixed
/// tag+correlation header. A recognized-but-failing tag (e.g. `TAG_ERROR`)
/// or an unrecognized tag is *not* a [`WireError`] — enough of the frame
/// was readable to attribute the problem to its correlation id, so it is
/// reported as an `Err(Error)` paired with that id rather than aborting the
/// whole read.
fn read_frame(stream: &mut TcpStream) -> Result<(u64, Result<RawReply, Error>), WireError> {
    let len = read_u32(stream)? as usize;
    let body = read_exact(stream, len)?;
    if body.len() < 9 {
        return Err(WireError::Truncated { len: body.len() });
    }
    let tag = body[0];
    let mut pos = 1;
    let correlation = read_u64(&body, &mut pos);
    match tag {
        TAG_GET => {
            let data = read_bytes(&body, &mut pos);
            Ok((correlation, Ok(RawReply::Get { data, stat: crate::value::Stat::default() })))
        }
        TAG_ERROR => Ok((correlation, Err(Error::new(ErrorKind::ConnectionLoss)))),
        other => Ok((correlation, Err(WireError::UnknownTag(other).into()))),
    }
}

/// A `get`-capable TCP transport speaking the framing documented above.
///
/// This is intentionally the thin slice of the native wire protocol that
/// this crate can exercise without a real ensemble peer (spec's Non-goals
/// exclude building a server); the remaining operations are fully
/// implemented against [`crate::transport::TestTransport`] and share the
/// same [`SessionTransport`] trait, so the connection engine above this
/// layer does not know the difference.
pub struct NativeTransport {
    stream: Mutex<TcpStream>,
    queue: Arc<SegQueue<(CorrelationId, Request)>>,
    wake: Arc<(Mutex<bool>, Condvar)>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    shutdown: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
    writer: Option<thread::JoinHandle<()>>,
}

impl NativeTransport {
    /// Connects to `addr` and spawns the reader/writer worker threads.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::ConnectionLoss`] if the TCP connection cannot
    /// be established.
    pub fn connect(addr: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| Error::new(ErrorKind::ConnectionLoss).with_context(e.to_string()))?;
        let reader_stream = stream
            .try_clone()
            .map_err(|e| Error::new(ErrorKind::ConnectionLoss).with_context(e.to_string()))?;

        let (tx, rx) = mpsc::channel();
        let queue: Arc<SegQueue<(CorrelationId, Request)>> = Arc::new(SegQueue::new());
        let wake = Arc::new((Mutex::new(false), Condvar::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let _ = tx.send(TransportEvent::SessionTransition(crate::session::Transition::ConnectSuccess));

        let reader = {
            let shutdown = shutdown.clone();
            let tx = tx.clone();
            thread::Builder::new()
                .name("zk-client-native-reader".into())
                .spawn(move || Self::reader_loop(reader_stream, tx, shutdown))
                .expect("spawning native transport reader thread")
        };

        let writer = {
            let stream = stream
                .try_clone()
                .map_err(|e| Error::new(ErrorKind::ConnectionLoss).with_context(e.to_string()))?;
            let queue = queue.clone();
            let wake = wake.clone();
            let shutdown = shutdown.clone();
            let tx = tx.clone();
            thread::Builder::new()
                .name("zk-client-native-writer".into())
                .spawn(move || Self::writer_loop(stream, queue, wake, shutdown, tx))
                .expect("spawning native transport writer thread")
        };

        Ok(Self {
            stream: Mutex::new(stream),
            queue,
            wake,
            events: Mutex::new(rx),
            shutdown,
            reader: Some(reader),
            writer: Some(writer),
        })
    }

    fn reader_loop(mut stream: TcpStream, tx: mpsc::Sender<TransportEvent>, shutdown: Arc<AtomicBool>) {
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .expect("setting read timeout on native transport socket");
        while !shutdown.load(Ordering::Acquire) {
            match read_frame(&mut stream) {
                Ok((correlation, result)) => {
                    let _ = tx.send(TransportEvent::Reply {
                        correlation: correlation_from_raw(correlation),
                        result,
                    });
                }
                Err(WireError::Io(e))
                    if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(_) => {
                    let _ = tx.send(TransportEvent::SessionTransition(crate::session::Transition::Disconnect));
                    return;
                }
            }
        }
    }

    fn writer_loop(
        mut stream: TcpStream,
        queue: Arc<SegQueue<(CorrelationId, Request)>>,
        wake: Arc<(Mutex<bool>, Condvar)>,
        shutdown: Arc<AtomicBool>,
        tx: mpsc::Sender<TransportEvent>,
    ) {
        loop {
            if let Some((correlation, request)) = queue.pop() {
                if let Request::Get { path } = &request {
                    let frame = encode_get_request(raw_from_correlation(correlation), path);
                    if stream.write_all(&frame).is_err() {
                        let _ = tx.send(TransportEvent::SessionTransition(crate::session::Transition::Disconnect));
                    }
                }
                continue;
            }
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            let (lock, cv) = &*wake;
            let mut signalled = lock.lock();
            if !*signalled {
                cv.wait_for(&mut signalled, Duration::from_millis(50));
            }
            *signalled = false;
        }
    }
}

/// `CorrelationId`'s internal representation is crate-private; these two
/// helpers round-trip it through the `u64` the wire format carries.
fn raw_from_correlation(id: CorrelationId) -> u64 {
    id.as_u64()
}

fn correlation_from_raw(raw: u64) -> CorrelationId {
    CorrelationId::from_u64(raw)
}

impl SessionTransport for NativeTransport {
    fn submit(&self, correlation: CorrelationId, request: Request) {
        self.queue.push((correlation, request));
        let (lock, cv) = &*self.wake;
        *lock.lock() = true;
        cv.notify_one();
    }

    fn recv_event(&self, timeout: Duration) -> Option<TransportEvent> {
        self.events.lock().recv_timeout(timeout).ok()
    }

    fn native_handle(&self) -> NativeHandle {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            NativeHandle::Fd(self.stream.lock().as_raw_fd())
        }
        #[cfg(not(unix))]
        {
            NativeHandle::None
        }
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let (lock, cv) = &*self.wake;
        *lock.lock() = true;
        cv.notify_one();
        let _ = self.stream.lock().shutdown(std::net::Shutdown::Both);
    }
}

impl Drop for NativeTransport {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.reader.take() {
            let _ = h.join();
        }
        if let Some(h) = self.writer.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn get_request_round_trips_over_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let len = read_u32(&mut socket).unwrap() as usize;
            let body = read_exact(&mut socket, len).unwrap();
            assert_eq!(body[0], TAG_GET);
            let mut pos = 1;
            let correlation = read_u64(&body, &mut pos);
            let path = read_bytes(&body, &mut pos);
            assert_eq!(path, b"/t");

            let mut reply_body = Vec::new();
            write_u64(&mut reply_body, correlation);
            write_bytes(&mut reply_body, b"hello");
            let mut frame = Vec::new();
            write_u32(&mut frame, (reply_body.len() + 1) as u32);
            frame.push(TAG_GET);
            frame.extend_from_slice(&reply_body);
            socket.write_all(&frame).unwrap();
        });

        let transport = NativeTransport::connect(&addr.to_string()).unwrap();
        // Drain the synthetic connect-success transition.
        let _ = transport.recv_event(Duration::from_secs(1));

        transport.submit(CorrelationId::from_u64(42), Request::Get { path: "/t".into() });
        let event = transport.recv_event(Duration::from_secs(2)).expect("expected a reply event");
        match event {
            TransportEvent::Reply { correlation, result } => {
                assert_eq!(raw_from_correlation(correlation), 42);
                let RawReply::Get { data, .. } = result.unwrap() else {
                    panic!("expected a Get reply");
                };
                assert_eq!(data, b"hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn read_frame_rejects_a_frame_shorter_than_the_header() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            // A 3-byte body is shorter than the 9-byte tag+correlation header.
            let mut frame = Vec::new();
            write_u32(&mut frame, 3);
            frame.extend_from_slice(&[TAG_GET, 0, 0]);
            socket.write_all(&frame).unwrap();
        });
        let mut client = TcpStream::connect(addr).unwrap();
        let err = read_frame(&mut client).unwrap_err();
        assert!(matches!(err, WireError::Truncated { len: 3 }));
        server.join().unwrap();
    }

    #[test]
    fn read_frame_reports_an_unknown_tag_as_marshalling_error_for_its_correlation_id() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut body = Vec::new();
            write_u64(&mut body, 7);
            let mut frame = Vec::new();
            write_u32(&mut frame, (body.len() + 1) as u32);
            frame.push(0xAB);
            frame.extend_from_slice(&body);
            socket.write_all(&frame).unwrap();
        });
        let mut client = TcpStream::connect(addr).unwrap();
        let (correlation, result) = read_frame(&mut client).unwrap();
        assert_eq!(correlation, 7);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::MarshallingError);
        server.join().unwrap();
    }

    #[test]
    fn wire_error_io_maps_to_connection_loss() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err: Error = WireError::Io(io_err).into();
        assert_eq!(err.kind(), ErrorKind::ConnectionLoss);
    }

    #[test]
    fn wire_error_unknown_tag_maps_to_marshalling_error() {
        let err: Error = WireError::UnknownTag(0x42).into();
        assert_eq!(err.kind(), ErrorKind::MarshallingError);
        assert!(err.to_string().contains("0x42"));
    }
}
