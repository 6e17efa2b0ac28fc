//! Captured frame
//!
//! `PacketView` selalu memegang copy dari bytes di ring: slot ring dikembalikan
//! ke kernel sebelum view diserahkan ke consumer, jadi view tetap valid setelah
//! `next_packet` berikutnya.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp capture dengan resolusi mikrodetik
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timestamp {
    pub secs: i64,
    pub micros: u32,
}

impl Timestamp {
    #[inline(always)]
    pub fn new(secs: i64, micros: u32) -> Self {
        Self {
            secs: secs + (micros / 1_000_000) as i64,
            micros: micros % 1_000_000,
        }
    }

    /// Dari pasangan (sec, nsec) seperti di header TPACKET_V2
    #[inline(always)]
    pub fn from_nanos_parts(secs: i64, nanos: u32) -> Self {
        Self::new(secs, nanos / 1_000)
    }

    pub fn now() -> Self {
        SystemTime::now().into()
    }

    pub fn to_system_time(self) -> SystemTime {
        let offset = Duration::from_micros(self.micros as u64);
        if self.secs >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.secs as u64) + offset
        } else {
            UNIX_EPOCH - Duration::from_secs(self.secs.unsigned_abs()) + offset
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Self::new(d.as_secs() as i64, d.subsec_micros()),
            Err(_) => Self::default(),
        }
    }
}

/// Satu frame yang sudah di-capture
///
/// Invariants: `captured_len <= wire_len` dan `data.len() == captured_len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketView {
    timestamp: Timestamp,
    captured_len: u32,
    wire_len: u32,
    data: Vec<u8>,
}

impl PacketView {
    /// Copy `bytes` keluar dari ring.
    ///
    /// `wire_len` yang lebih kecil dari jumlah bytes dinaikkan ke captured length.
    #[inline]
    pub fn copy_from(timestamp: Timestamp, wire_len: u32, bytes: &[u8]) -> Self {
        let captured_len = bytes.len() as u32;
        Self {
            timestamp,
            captured_len,
            wire_len: wire_len.max(captured_len),
            data: bytes.to_vec(),
        }
    }

    #[inline(always)]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Bytes yang benar-benar di-copy
    #[inline(always)]
    pub fn captured_len(&self) -> u32 {
        self.captured_len
    }

    /// Panjang frame di wire (bisa lebih besar jika truncated)
    #[inline(always)]
    pub fn wire_len(&self) -> u32 {
        self.wire_len
    }

    #[inline(always)]
    pub fn is_truncated(&self) -> bool {
        self.captured_len < self.wire_len
    }

    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
