//! Latest-frame slot and background capture thread.
//!
//! The producer overwrites a single slot; readers get the newest frame or
//! nothing. Frames that were overwritten before anyone read them are dropped.
//! Frames are shared behind an [`Arc`], so a reader holding one never keeps
//! the producer waiting on the lock.
//!
//! # Example
//!
//! ```rust
//! use parley_hal::{CameraFrame, FrameEncoding, LatestFrame};
//!
//! let slot = LatestFrame::new();
//! assert!(slot.latest().is_none());
//!
//! slot.publish(CameraFrame::new(FrameEncoding::Jpeg, vec![1]));
//! slot.publish(CameraFrame::new(FrameEncoding::Jpeg, vec![2]));
//!
//! let frame = slot.latest().unwrap();
//! assert_eq!(frame.data, vec![2]);
//! assert_eq!(frame.sequence, 2);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::camera::{Camera, CameraFrame};

// ─────────────────────────────────────────────────────────────────────────────
// LatestFrame
// ─────────────────────────────────────────────────────────────────────────────

/// Shared single-frame slot. Clone it cheaply – all clones share the slot.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Arc<CameraFrame>>>>,
    published: Arc<AtomicU64>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever frame is in the slot, stamping it with the next
    /// sequence number.
    pub fn publish(&self, mut frame: CameraFrame) {
        let mut guard = self.lock();
        frame.sequence = self.published.fetch_add(1, Ordering::AcqRel) + 1;
        // Free the old buffer outside the lock.
        let previous = guard.replace(Arc::new(frame));
        drop(guard);
        drop(previous);
    }

    /// The newest frame, or `None` if nothing was captured yet.
    pub fn latest(&self) -> Option<Arc<CameraFrame>> {
        self.lock().clone()
    }

    /// Number of frames published so far (including overwritten ones).
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<CameraFrame>>> {
        // A panicking writer can only leave a fully written Option behind.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FrameProducer
// ─────────────────────────────────────────────────────────────────────────────

/// Background thread that captures from a [`Camera`] into a [`LatestFrame`].
///
/// The thread is stopped and joined on [`FrameProducer::stop`] or on drop.
pub struct FrameProducer {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameProducer {
    /// Start capturing from `camera` every `period` into `slot`.
    pub fn spawn(mut camera: Box<dyn Camera>, slot: LatestFrame, period: Duration) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = std::thread::spawn(move || {
            info!(camera = camera.id(), ?period, "frame producer started");
            let mut failing = false;
            while flag.load(Ordering::Acquire) {
                match camera.capture() {
                    Ok(frame) => {
                        if failing {
                            info!(camera = camera.id(), "camera recovered");
                            failing = false;
                        }
                        slot.publish(frame);
                        debug!(camera = camera.id(), seq = slot.published(), "frame published");
                    }
                    Err(e) => {
                        // Log the first failure of a streak only.
                        if !failing {
                            warn!(camera = camera.id(), error = %e, "frame capture failed");
                            failing = true;
                        }
                    }
                }
                std::thread::sleep(period);
            }
            info!(camera = camera.id(), "frame producer stopped");
        });
        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signal the capture thread to exit and wait for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("frame producer thread panicked");
            }
        }
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.stop();
    }
}
