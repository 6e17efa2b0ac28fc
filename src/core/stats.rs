//! Ring counters

use std::fmt;

/// Snapshot counter ring pada saat `stats()` dipanggil
///
/// Semua counter non-decreasing selama satu sesi open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Frame yang diterima ring
    pub received: u64,
    /// Frame yang di-drop karena ring penuh
    pub dropped: u64,
    /// Frame yang di-drop oleh interface/driver
    pub if_dropped: u64,
}

impl StatsSnapshot {
    /// `true` jika tidak ada counter yang turun dibanding `earlier`
    pub fn is_monotonic_since(&self, earlier: &StatsSnapshot) -> bool {
        self.received >= earlier.received
            && self.dropped >= earlier.dropped
            && self.if_dropped >= earlier.if_dropped
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} dropped={} if_dropped={}",
            self.received, self.dropped, self.if_dropped
        )
    }
}

/// Akumulator untuk sumber counter yang reset setiap dibaca
///
/// Kernel mereset `PACKET_STATISTICS` pada setiap `getsockopt`, jadi delta
/// dijumlahkan di sini supaya snapshot tetap monotonic.
#[derive(Debug, Default)]
pub(crate) struct StatsAccumulator {
    totals: StatsSnapshot,
}

impl StatsAccumulator {
    #[inline]
    pub(crate) fn add_ring_delta(&mut self, received: u64, dropped: u64) {
        self.totals.received = self.totals.received.saturating_add(received);
        self.totals.dropped = self.totals.dropped.saturating_add(dropped);
    }

    /// Counter interface absolut; nilai yang lebih kecil diabaikan (counter wrap/reset)
    #[inline]
    pub(crate) fn set_if_dropped(&mut self, value: u64) {
        self.totals.if_dropped = self.totals.if_dropped.max(value);
    }

    #[inline(always)]
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_is_monotonic() {
        let mut acc = StatsAccumulator::default();
        acc.add_ring_delta(10, 1);
        let first = acc.snapshot();

        acc.add_ring_delta(0, 0);
        acc.add_ring_delta(5, 2);
        let second = acc.snapshot();

        assert_eq!(second.received, 15);
        assert_eq!(second.dropped, 3);
        assert!(second.is_monotonic_since(&first));
    }

    #[test]
    fn test_if_dropped_never_decreases() {
        let mut acc = StatsAccumulator::default();
        acc.set_if_dropped(7);
        acc.set_if_dropped(3);
        assert_eq!(acc.snapshot().if_dropped, 7);
    }

    #[test]
    fn test_display() {
        let s = StatsSnapshot {
            received: 3,
            dropped: 1,
            if_dropped: 0,
        };
        assert_eq!(s.to_string(), "received=3 dropped=1 if_dropped=0");
    }
}
