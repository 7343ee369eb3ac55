//! Loop-detection registry (component 4.D).
//!
//! Records `(family, addr, port)` of sockets this process has recently
//! opened as a client, so the request processor can recognize when a
//! forwarded request is about to connect back to the proxy's own listener.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const LOOP_TTL: Duration = Duration::from_secs(15);

struct LoopRecord {
    addr: SocketAddr,
    at: Instant,
}

#[derive(Default)]
pub struct LoopRegistry {
    records: Mutex<Vec<LoopRecord>>,
}

impl LoopRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, addr: SocketAddr) {
        let mut records = self.records.lock().expect("loop registry poisoned");
        records.push(LoopRecord {
            addr,
            at: Instant::now(),
        });
    }

    /// Returns true if `addr` was recorded within the last 15 seconds.
    /// Purges expired entries as a side effect of every lookup.
    pub fn contains(&self, addr: SocketAddr) -> bool {
        let mut records = self.records.lock().expect("loop registry poisoned");
        let now = Instant::now();
        records.retain(|r| now.duration_since(r.at) <= LOOP_TTL);
        records.iter().any(|r| r.addr == addr)
    }
}
