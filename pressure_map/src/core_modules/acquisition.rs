// THEORY:
// The `acquisition` module replaces the synthetic source with a live stream. A
// sensor bridge publishes fixed-length readings as UDP datagrams tagged with a
// stream name; the dashboard binds a socket, waits until the named stream shows
// up, and from then on pulls one reading per tick.
//
// Two failure classes are kept strictly apart:
// - Not finding the stream at startup is an `AcquisitionError`. The caller is
//   expected to abort, since the dashboard has nothing to show.
// - Missing a reading during a tick is a `SourceError`. The tick is skipped and
//   the next one tries again.
//
// Datagram wire format: `{"stream": "<name>", "values": [f64, ...]}`.

use crate::core_modules::grid::{GridSample, GridShape};
use crate::core_modules::sample_source::{SampleSource, SourceError};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

const MAX_DATAGRAM_BYTES: usize = 64 * 1024;

/// Startup failures of the acquisition stream.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("could not bind acquisition socket on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("stream `{stream}` was not found on {addr} within {waited:?}")]
    StreamNotFound {
        stream: String,
        addr: SocketAddr,
        waited: Duration,
    },
    #[error("acquisition socket error: {0}")]
    Io(#[from] io::Error),
}

/// One reading as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDatagram {
    pub stream: String,
    pub values: Vec<f64>,
}

/// Where and how to look for the sensor streams.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Address of the first channel. Channel `i` listens on `port + i`.
    pub bind_addr: SocketAddr,
    /// Channel `i` resolves the stream named `{stream_prefix}_{i + 1}`.
    pub stream_prefix: String,
    pub resolve_timeout: Duration,
    pub poll_timeout: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5005)),
            stream_prefix: "PressureSensor".to_string(),
            resolve_timeout: Duration::from_secs(5),
            poll_timeout: Duration::from_millis(100),
        }
    }
}

impl AcquisitionConfig {
    /// The socket address and stream name used by a channel.
    pub fn channel_endpoint(&self, index: usize) -> (SocketAddr, String) {
        let mut addr = self.bind_addr;
        if addr.port() != 0 {
            let offset = u16::try_from(index).unwrap_or(u16::MAX);
            addr.set_port(addr.port().saturating_add(offset));
        }
        (addr, format!("{}_{}", self.stream_prefix, index + 1))
    }
}

/// A sample source backed by a named UDP stream.
pub struct UdpStreamSource {
    socket: UdpSocket,
    stream: String,
    shape: GridShape,
    poll_timeout: Duration,
    /// The reading that proved the stream exists. Served on the first tick.
    pending: Option<Vec<f64>>,
    buf: Vec<u8>,
}

impl UdpStreamSource {
    /// Binds `addr` and blocks until a datagram for `stream` arrives.
    pub fn resolve(
        addr: SocketAddr,
        stream: impl Into<String>,
        shape: GridShape,
        resolve_timeout: Duration,
        poll_timeout: Duration,
    ) -> Result<Self, AcquisitionError> {
        let stream = stream.into();
        let socket = UdpSocket::bind(addr).map_err(|source| AcquisitionError::Bind { addr, source })?;
        let local = socket.local_addr()?;
        info!(stream = %stream, addr = %local, "looking for acquisition stream");

        let mut source = Self {
            socket,
            stream,
            shape,
            poll_timeout,
            pending: None,
            buf: vec![0u8; MAX_DATAGRAM_BYTES],
        };

        match source.recv_matching(resolve_timeout)? {
            Some(values) => {
                info!(stream = %source.stream, len = values.len(), "acquisition stream resolved");
                source.pending = Some(values);
                Ok(source)
            }
            None => Err(AcquisitionError::StreamNotFound {
                stream: source.stream,
                addr: local,
                waited: resolve_timeout,
            }),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Reads datagrams until one for our stream arrives or `timeout` elapses.
    /// Datagrams for other streams, and ones that fail to parse, are skipped.
    fn recv_matching(&mut self, timeout: Duration) -> io::Result<Option<Vec<f64>>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.socket.set_read_timeout(Some(remaining))?;

            let len = match self.socket.recv(&mut self.buf) {
                Ok(len) => len,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            match serde_json::from_slice::<StreamDatagram>(&self.buf[..len]) {
                Ok(datagram) if datagram.stream == self.stream => return Ok(Some(datagram.values)),
                Ok(datagram) => debug!(stream = %datagram.stream, "ignoring datagram for another stream"),
                Err(e) => debug!(error = %e, "ignoring malformed datagram"),
            }
        }
    }
}

impl SampleSource for UdpStreamSource {
    fn produce(&mut self, _previous: Option<&GridSample>) -> Result<GridSample, SourceError> {
        let values = match self.pending.take() {
            Some(values) => values,
            None => self
                .recv_matching(self.poll_timeout)?
                .ok_or_else(|| SourceError::Timeout {
                    stream: self.stream.clone(),
                    waited: self.poll_timeout,
                })?,
        };
        Ok(GridSample::from_cells(self.shape, values)?)
    }

    fn name(&self) -> &str {
        &self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn free_local_addr() -> SocketAddr {
        let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    }

    fn datagram(stream: &str, values: Vec<f64>) -> Vec<u8> {
        serde_json::to_vec(&StreamDatagram {
            stream: stream.to_string(),
            values,
        })
        .unwrap()
    }

    #[test]
    fn channel_endpoints_are_offset_per_channel() {
        let config = AcquisitionConfig::default();
        let (addr, name) = config.channel_endpoint(1);
        assert_eq!(addr.port(), 5006);
        assert_eq!(name, "PressureSensor_2");
    }

    #[test]
    fn channel_endpoint_saturates_at_top_port() {
        let config = AcquisitionConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 65_530)),
            ..AcquisitionConfig::default()
        };
        assert_eq!(config.channel_endpoint(3).0.port(), 65_533);
        // 65_536 would wrap to 0 if the index were cast straight to u16.
        assert_eq!(config.channel_endpoint(65_536).0.port(), u16::MAX);
        assert_eq!(config.channel_endpoint(usize::MAX).0.port(), u16::MAX);
    }

    #[test]
    fn missing_stream_is_a_startup_error() {
        let err = UdpStreamSource::resolve(
            "127.0.0.1:0".parse().unwrap(),
            "PressureSensor_1",
            GridShape::new(16, 6),
            Duration::from_millis(50),
            Duration::from_millis(10),
        )
        .err()
        .unwrap();
        assert!(matches!(err, AcquisitionError::StreamNotFound { .. }));
        assert!(err.to_string().contains("PressureSensor_1"));
    }

    #[test]
    fn resolves_named_stream_and_reshapes_samples() {
        let target = free_local_addr();
        let running = Arc::new(AtomicBool::new(true));

        let sender = {
            let running = running.clone();
            thread::spawn(move || {
                let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
                while running.load(Ordering::Relaxed) {
                    let _ = socket.send_to(&datagram("SomethingElse", vec![-1.0; 3]), target);
                    let _ = socket.send_to(b"not json", target);
                    let _ = socket.send_to(&datagram("PressureSensor_1", vec![1.0; 96]), target);
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let mut source = UdpStreamSource::resolve(
            target,
            "PressureSensor_1",
            GridShape::new(16, 6),
            Duration::from_secs(2),
            Duration::from_millis(500),
        )
        .unwrap();

        let first = source.produce(None).unwrap();
        let second = source.produce(None).unwrap();
        running.store(false, Ordering::Relaxed);
        sender.join().unwrap();

        assert_eq!(first.shape(), GridShape::new(16, 6));
        assert_eq!(second.active_cells(), 96);
    }

    #[test]
    fn wrong_length_is_a_tick_failure() {
        let target = free_local_addr();
        let sender = thread::spawn(move || {
            let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            for _ in 0..200 {
                let _ = socket.send_to(&datagram("mat", vec![0.5; 10]), target);
                thread::sleep(Duration::from_millis(5));
            }
        });

        let mut source = UdpStreamSource::resolve(
            target,
            "mat",
            GridShape::new(8, 6),
            Duration::from_secs(2),
            Duration::from_millis(10),
        )
        .unwrap();
        let err = source.produce(None).unwrap_err();
        assert!(matches!(err, SourceError::Reshape(_)));
        sender.join().unwrap();
    }
}
