//! Shared test fixtures for telemetry-node's `Supervisor`-level scenario
//! tests: a toggleable `LinkDriver`/`UploadTransport` pair and a
//! `TimeSource` stub, standing in for the Wi-Fi driver, HTTP transport, and
//! NTP client spec.md §1 places outside this crate's boundary.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use telemetry_node::link::LinkDriver;
use telemetry_node::storage::{Sample, UploadResult};
use telemetry_node::time::clock::TimeSource;
use telemetry_node::uploader::UploadTransport;

/// A link that reports `has_ip()` according to a shared flag the test
/// flips to simulate a reconnect edge.
#[derive(Clone)]
pub struct ToggleLink {
    pub has_ip: Arc<AtomicBool>,
}

impl ToggleLink {
    #[must_use]
    pub fn new(initial: bool) -> Self {
        Self {
            has_ip: Arc::new(AtomicBool::new(initial)),
        }
    }

    pub fn set(&self, up: bool) {
        self.has_ip.store(up, Ordering::SeqCst);
    }
}

impl LinkDriver for ToggleLink {
    fn has_ip(&mut self) -> bool {
        self.has_ip.load(Ordering::SeqCst)
    }

    fn begin_connect(&mut self) {}
}

/// An upload transport that accepts or rejects every delivery according to
/// a shared flag, and counts successful deliveries.
#[derive(Clone)]
pub struct ToggleUploader {
    pub online: Arc<AtomicBool>,
    pub sent: Arc<std::sync::atomic::AtomicU64>,
}

impl ToggleUploader {
    #[must_use]
    pub fn new(initial: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(initial)),
            sent: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

impl UploadTransport for ToggleUploader {
    fn upload(&mut self, _sample: &Sample) -> UploadResult {
        if self.online.load(Ordering::SeqCst) {
            self.sent.fetch_add(1, Ordering::SeqCst);
            UploadResult::Ok
        } else {
            UploadResult::TransportError
        }
    }
}

/// A time source that never resolves — kept deterministic for scenario
/// tests that drive simulated `Instant` offsets rather than wall time.
pub struct NeverTimeSource;

impl TimeSource for NeverTimeSource {
    fn fetch_unix_seconds(&mut self) -> Option<u32> {
        None
    }
}
