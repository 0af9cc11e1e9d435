//! Store watcher: the consumer side of the published positions.
//!
//! Polls `GET camera<id>` on a fixed interval and prints every value longer
//! than one byte. There is no coordination with the tracker beyond the
//! shared key, so a value can be up to one interval stale.

use crate::publish::{
    camera_key, connect_with_timeout, parse_positions, PublishError, DEFAULT_STORE_TIMEOUT,
};
use redis::Commands;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Read access to the key-value store.
pub trait StoreReader {
    fn get(&mut self, key: &str) -> Result<Option<String>, PublishError>;
}

/// `GET` over a store connection, reconnecting after failures.
pub struct RedisReader {
    client: redis::Client,
    connection: Option<redis::Connection>,
}

impl RedisReader {
    pub fn open(url: &str) -> Result<Self, PublishError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            connection: None,
        })
    }
}

impl StoreReader for RedisReader {
    fn get(&mut self, key: &str) -> Result<Option<String>, PublishError> {
        if self.connection.is_none() {
            self.connection = Some(connect_with_timeout(&self.client, DEFAULT_STORE_TIMEOUT)?);
        }
        let value: redis::RedisResult<Option<String>> = match self.connection.as_mut() {
            Some(con) => con.get(key),
            None => return Ok(None),
        };
        if value.is_err() {
            self.connection = None;
        }
        Ok(value?)
    }
}

/// Values of 0 or 1 bytes are treated as "nothing published".
#[inline]
pub fn is_printable(value: &str) -> bool {
    value.len() > 1
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub polls: u64,
    pub printed: u64,
    /// Printed values that are not `x y` pairs.
    pub malformed: u64,
    pub errors: u64,
}

pub struct StoreWatcher<R> {
    reader: R,
    key: String,
    interval: Duration,
    stop: Arc<AtomicBool>,
    max_polls: Option<u64>,
}

impl<R: StoreReader> StoreWatcher<R> {
    pub fn new(reader: R, camera_id: u32) -> Self {
        Self {
            reader,
            key: camera_key(camera_id),
            interval: DEFAULT_POLL_INTERVAL,
            stop: Arc::new(AtomicBool::new(false)),
            max_polls: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u64) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Poll until stopped. Store errors are logged and polling goes on;
    /// only a failing writer ends the run.
    pub fn run(&mut self, out: &mut impl Write) -> std::io::Result<WatchStats> {
        let mut stats = WatchStats::default();
        log::info!("watching {} every {:?}", self.key, self.interval);
        while !self.stop.load(Ordering::Relaxed)
            && self.max_polls.is_none_or(|max| stats.polls < max)
        {
            if stats.polls > 0 {
                thread::sleep(self.interval);
            }
            stats.polls += 1;
            match self.reader.get(&self.key) {
                Ok(Some(value)) if is_printable(&value) => {
                    if parse_positions(&value).is_none() {
                        log::warn!("{} holds malformed positions: {value:?}", self.key);
                        stats.malformed += 1;
                    }
                    writeln!(out, "{value}")?;
                    stats.printed += 1;
                }
                Ok(_) => {}
                Err(err) => {
                    log::warn!("GET {} failed: {err}", self.key);
                    stats.errors += 1;
                }
            }
        }
        Ok(stats)
    }
}
