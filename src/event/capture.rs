//! CaptureLoop: wait -> drain -> consumer
//!
//! Loop berjalan sampai `CancelToken` di-set. Tidak ada error per-packet yang
//! menghentikan loop; hanya `RingError::Closed` dan `WaitError::NoInterests`
//! (setup yang rusak) yang dikembalikan ke caller.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use super::{CancelToken, WaitReady};
use crate::config::LoopConfig;
use crate::core::{PacketView, RingBackend, RingHandle};
use crate::error::{CaptureError, RingError, WaitError};

/// Batas bawah backoff, harus > 0
const MIN_BACKOFF: Duration = Duration::from_millis(1);
/// Granularitas cek cancel selama backoff
const BACKOFF_SLICE: Duration = Duration::from_millis(10);

/// Counter dari satu `run`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    /// Wait yang selesai tanpa error
    pub wakeups: u64,
    /// Packet yang diserahkan ke consumer
    pub packets: u64,
    /// Wait yang terputus EINTR
    pub interrupts: u64,
    pub wait_errors: u64,
    pub drain_errors: u64,
}

/// Orkestrasi readiness wait dan drain ring
pub struct CaptureLoop<B: RingBackend, W: WaitReady> {
    ring: RingHandle<B>,
    waiter: W,
    cancel: CancelToken,
    config: LoopConfig,
    summary: LoopSummary,
}

impl<B: RingBackend, W: WaitReady> CaptureLoop<B, W> {
    /// Daftarkan descriptor ring ke waiter dan siapkan loop
    pub fn new(
        ring: RingHandle<B>,
        mut waiter: W,
        config: LoopConfig,
    ) -> Result<Self, CaptureError> {
        if !ring.is_open() {
            return Err(RingError::Closed.into());
        }
        waiter.register_readable(ring.fd())?;
        let cancel = waiter.cancel_token();

        Ok(Self {
            ring,
            waiter,
            cancel,
            config,
            summary: LoopSummary::default(),
        })
    }

    /// Token untuk menghentikan loop dari thread lain
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Akses ring di luar hot loop (inject, stats)
    pub fn ring_mut(&mut self) -> &mut RingHandle<B> {
        &mut self.ring
    }

    pub fn summary(&self) -> LoopSummary {
        self.summary
    }

    /// Lepas ring dari waiter dan kembalikan keduanya
    pub fn into_parts(mut self) -> (RingHandle<B>, W) {
        let fd = self.ring.fd();
        if let Err(e) = self.waiter.deregister_readable(fd) {
            debug!(fd, error = %e, "ring descriptor already gone from waiter");
        }
        (self.ring, self.waiter)
    }

    /// Jalankan loop sampai cancel
    ///
    /// Packet diserahkan ke `consumer` sesuai urutan ring.
    pub fn run<F>(&mut self, mut consumer: F) -> Result<LoopSummary, CaptureError>
    where
        F: FnMut(PacketView),
    {
        let (backoff_min, backoff_max) = backoff_bounds(&self.config);
        let mut backoff = backoff_min;
        // Ring bisa sudah berisi frame sebelum registrasi
        let mut pending_drain = true;
        let mut next_stats = self.config.stats_interval.map(|i| Instant::now() + i);

        while !self.cancel.is_cancelled() {
            if !pending_drain {
                let timeout = next_stats.map(|due| due.saturating_duration_since(Instant::now()));
                match self.waiter.wait_ready(self.config.max_events, timeout) {
                    Ok(ready) => {
                        self.summary.wakeups += 1;
                        backoff = backoff_min;
                        trace!(ready, "wait returned");
                    }
                    Err(WaitError::Interrupted) => {
                        self.summary.interrupts += 1;
                        continue;
                    }
                    Err(WaitError::NoInterests) => return Err(WaitError::NoInterests.into()),
                    Err(e) => {
                        self.summary.wait_errors += 1;
                        warn!(
                            error = %e,
                            backoff_ms = backoff.as_millis() as u64,
                            "wait failed, retrying"
                        );
                        sleep_unless_cancelled(&self.cancel, backoff);
                        backoff = next_backoff(backoff, backoff_max);
                        continue;
                    }
                }
            }

            pending_drain = self.drain(&mut consumer)?;

            if let (Some(due), Some(interval)) = (next_stats, self.config.stats_interval) {
                if Instant::now() >= due {
                    self.report_stats();
                    next_stats = Some(Instant::now() + interval);
                }
            }
        }

        self.report_stats();
        Ok(self.summary)
    }

    /// Drain ring sampai kosong.
    ///
    /// Returns `true` jika drain berhenti sebelum ring kosong (error atau
    /// cancel); iterasi berikutnya drain lagi tanpa wait karena edge untuk
    /// frame yang tersisa sudah terpakai.
    fn drain<F>(&mut self, consumer: &mut F) -> Result<bool, CaptureError>
    where
        F: FnMut(PacketView),
    {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(true);
            }
            match self.ring.next_packet() {
                Ok(pkt) => {
                    self.summary.packets += 1;
                    consumer(pkt);
                }
                Err(RingError::NoPacketAvailable) => return Ok(false),
                Err(RingError::Closed) => return Err(RingError::Closed.into()),
                Err(e) => {
                    self.summary.drain_errors += 1;
                    warn!(device = self.ring.device(), error = %e, "drain failed");
                    return Ok(true);
                }
            }
        }
    }

    fn report_stats(&mut self) {
        match self.ring.stats() {
            Ok(stats) => info!(
                device = self.ring.device(),
                received = stats.received,
                dropped = stats.dropped,
                if_dropped = stats.if_dropped,
                packets = self.summary.packets,
                "ring stats"
            ),
            Err(e) => warn!(device = self.ring.device(), error = %e, "failed to read ring stats"),
        }
    }
}

/// (min, max) dengan min > 0 dan max >= min
fn backoff_bounds(config: &LoopConfig) -> (Duration, Duration) {
    let min = config.backoff_min.max(MIN_BACKOFF);
    (min, config.backoff_max.max(min))
}

/// Sleep sampai `total` habis atau token di-cancel
fn sleep_unless_cancelled(cancel: &CancelToken, total: Duration) {
    let deadline = Instant::now() + total;
    while !cancel.is_cancelled() {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        thread::sleep(left.min(BACKOFF_SLICE));
    }
}

#[inline]
fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
