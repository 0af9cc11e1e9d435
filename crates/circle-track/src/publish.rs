//! Publishing of per-frame positions.

use circle_track_core::WorldPosition;
use redis::Commands;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::Duration;

/// Connect and command timeout of store clients unless set otherwise.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(1);

// Socket timeouts of zero are rejected by the OS layer.
const MIN_STORE_TIMEOUT: Duration = Duration::from_millis(1);

/// Connect to the store with `timeout` bounding the connect and every
/// later read or write.
pub(crate) fn connect_with_timeout(
    client: &redis::Client,
    timeout: Duration,
) -> redis::RedisResult<redis::Connection> {
    let con = client.get_connection_with_timeout(timeout)?;
    con.set_read_timeout(Some(timeout))?;
    con.set_write_timeout(Some(timeout))?;
    Ok(con)
}

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Everything published for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FramePositions {
    pub camera_id: u32,
    pub timestamp_ms: u64,
    pub positions: Vec<WorldPosition>,
}

/// Store key for a camera: `camera<id>`.
pub fn camera_key(camera_id: u32) -> String {
    format!("camera{camera_id}")
}

/// Space separated `x0 y0 x1 y1 ...`; empty for no positions.
pub fn format_positions(positions: &[WorldPosition]) -> String {
    let mut out = String::new();
    for (i, p) in positions.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{} {}", p.x, p.y);
    }
    out
}

/// Parse the value written by [`format_positions`]. Returns `None` on
/// malformed input (odd token count or a non-numeric token).
pub fn parse_positions(value: &str) -> Option<Vec<WorldPosition>> {
    let nums: Vec<f64> = value
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if nums.len() % 2 != 0 {
        return None;
    }
    Some(
        nums.chunks_exact(2)
            .map(|xy| WorldPosition::new(xy[0], xy[1]))
            .collect(),
    )
}

/// Downstream transport for tracked positions.
///
/// Calls block the tracking loop; failures are reported back and the
/// loop logs them without retrying.
pub trait Publisher {
    fn publish(&mut self, frame: &FramePositions) -> Result<(), PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, frame: &FramePositions) -> Result<(), PublishError> {
        (**self).publish(frame)
    }
}

/// `SET camera<id> "x0 y0 ..."` on a key-value store.
///
/// Connects lazily; a failed command drops the connection so the next
/// frame reconnects. Connect, read and write are each bounded by the
/// timeout, so an unreachable store costs at most that much per frame.
pub struct RedisPublisher {
    url: String,
    client: redis::Client,
    timeout: Duration,
    connection: Option<redis::Connection>,
}

impl RedisPublisher {
    /// Parse the store URL (`redis://host:port/`); no connection is made yet.
    pub fn open(url: &str) -> Result<Self, PublishError> {
        Ok(Self {
            url: url.to_string(),
            client: redis::Client::open(url)?,
            timeout: DEFAULT_STORE_TIMEOUT,
            connection: None,
        })
    }

    /// Bound each store operation; takes effect on the next connect.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(MIN_STORE_TIMEOUT);
        self.connection = None;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn connection(&mut self) -> Result<&mut redis::Connection, PublishError> {
        if self.connection.is_none() {
            let con = connect_with_timeout(&self.client, self.timeout)?;
            log::info!("connected to {}", self.url);
            self.connection = Some(con);
        }
        match self.connection.as_mut() {
            Some(con) => Ok(con),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "no store connection").into()),
        }
    }
}

impl Publisher for RedisPublisher {
    fn publish(&mut self, frame: &FramePositions) -> Result<(), PublishError> {
        let key = camera_key(frame.camera_id);
        let value = format_positions(&frame.positions);
        let result: redis::RedisResult<()> = self.connection()?.set(&key, value);
        if let Err(err) = result {
            self.connection = None;
            return Err(err.into());
        }
        Ok(())
    }
}

/// Writes `<timestamp_ms> x0 y0 x1 y1 ...` lines.
pub struct LinePublisher<W: Write> {
    out: W,
}

impl<W: Write> LinePublisher<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Line publisher on standard output.
pub type StdoutPublisher = LinePublisher<io::Stdout>;

impl StdoutPublisher {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Publisher for LinePublisher<W> {
    fn publish(&mut self, frame: &FramePositions) -> Result<(), PublishError> {
        let positions = format_positions(&frame.positions);
        if positions.is_empty() {
            writeln!(self.out, "{}", frame.timestamp_ms)?;
        } else {
            writeln!(self.out, "{} {}", frame.timestamp_ms, positions)?;
        }
        self.out.flush()?;
        Ok(())
    }
}
