//! Konfigurasi ring dan capture loop
//!
//! Plain structs dengan `Default`; CLI flags di-map langsung ke sini.

use std::io;
use std::time::Duration;

/// Ukuran header TPACKET_V2 setelah alignment (16 bytes)
pub const TPACKET2_HDR_ALIGNED: u32 = 32;
/// Alignment frame yang diminta kernel
pub const TPACKET_ALIGNMENT: u32 = 16;

/// Geometri packet ring (berlaku untuk RX dan TX ring)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    /// Ukuran satu frame slot dalam bytes
    pub frame_size: u32,
    /// Jumlah frame per ring
    pub frame_count: u32,
    /// Ukuran block kernel (kelipatan page size dan frame_size)
    pub block_size: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            frame_count: 512,
            block_size: 4096 * 8,
        }
    }
}

impl RingConfig {
    #[inline]
    fn frames_per_block(&self) -> u32 {
        (self.block_size / self.frame_size.max(1)).max(1)
    }

    /// Jumlah block yang dibutuhkan untuk menampung `frame_count` frames
    #[inline]
    pub fn block_count(&self) -> u32 {
        let per_block = self.frames_per_block();
        self.frame_count / per_block + u32::from(self.frame_count % per_block != 0)
    }

    /// Jumlah frame sebenarnya setelah dibulatkan ke block penuh.
    /// Saturate untuk geometri yang ditolak `validate`.
    #[inline]
    pub fn total_frames(&self) -> u32 {
        self.block_count().saturating_mul(self.frames_per_block())
    }

    /// Panjang mapping untuk satu ring
    #[inline]
    pub fn ring_len(&self) -> usize {
        (self.block_count() as usize).saturating_mul(self.block_size as usize)
    }

    /// Panjang mapping RX + TX, `None` jika overflow
    pub fn checked_mapping_len(&self) -> Option<usize> {
        self.block_count().checked_mul(self.frames_per_block())?;
        (self.block_count() as usize)
            .checked_mul(self.block_size as usize)?
            .checked_mul(2)
    }

    /// Payload maksimum per frame (frame dikurangi header)
    #[inline]
    pub fn max_payload(&self) -> usize {
        self.frame_size.saturating_sub(TPACKET2_HDR_ALIGNED) as usize
    }

    /// Validasi geometri sebelum diserahkan ke kernel
    pub fn validate(&self, page_size: u32) -> io::Result<()> {
        let invalid = |msg: &str| Err(io::Error::new(io::ErrorKind::InvalidInput, msg.to_string()));

        if self.frame_count == 0 {
            return invalid("frame_count must be non-zero");
        }
        if self.frame_size <= TPACKET2_HDR_ALIGNED {
            return invalid("frame_size must exceed the TPACKET_V2 header");
        }
        if self.frame_size % TPACKET_ALIGNMENT != 0 {
            return invalid("frame_size must be a multiple of 16");
        }
        if page_size == 0 || self.block_size == 0 || self.block_size % page_size != 0 {
            return invalid("block_size must be a multiple of the page size");
        }
        if self.block_size % self.frame_size != 0 {
            return invalid("block_size must be a multiple of frame_size");
        }
        // tpacket_req memakai u32; total mapping juga harus muat di address space
        let ring_bytes = u64::from(self.block_count()) * u64::from(self.block_size);
        if ring_bytes > u64::from(u32::MAX) || self.checked_mapping_len().is_none() {
            return invalid("ring geometry too large");
        }
        Ok(())
    }
}

/// Parameter untuk `CaptureLoop`
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Kapasitas event per wait
    pub max_events: usize,
    /// Backoff awal setelah wait error non-EINTR
    pub backoff_min: Duration,
    /// Batas atas backoff
    pub backoff_max: Duration,
    /// Interval log statistik; `None` = hanya saat shutdown
    pub stats_interval: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_events: 16,
            backoff_min: Duration::from_millis(1),
            backoff_max: Duration::from_secs(1),
            stats_interval: None,
        }
    }
}
