//! RingHandle: single-owner wrapper di atas native packet ring
//!
//! Lifecycle: `Open -> Closed`. Handle yang gagal dibuka tidak pernah ada,
//! jadi state `Unopened` tidak bisa direpresentasikan. Setelah `close`, semua
//! operasi gagal dengan `RingError::Closed`. `Drop` melepas ring jika caller
//! belum memanggil `close`.

use std::os::unix::io::RawFd;

use tracing::{debug, warn};

use super::{PacketView, StatsSnapshot};
use crate::error::RingError;

/// Native ring yang dibungkus oleh `RingHandle`
///
/// Semua method non-blocking. Implementasi tidak perlu `Sync`: ring hanya
/// diakses dari satu thread.
pub trait RingBackend {
    /// Descriptor untuk registrasi readiness; tidak pernah dibaca/ditulis oleh waiter
    fn raw_fd(&self) -> RawFd;

    /// Ambil frame berikutnya, `Ok(None)` jika ring kosong
    fn next_packet(&mut self) -> Result<Option<PacketView>, RingError>;

    /// Copy payload ke TX ring dan minta transmisi
    fn inject(&mut self, payload: &[u8]) -> Result<(), RingError>;

    /// Counter live, tidak di-cache
    fn stats(&mut self) -> Result<StatsSnapshot, RingError>;

    /// Lepas resource native. Dipanggil tepat satu kali.
    fn release(&mut self) -> std::io::Result<()>;
}

/// Handle untuk satu packet ring
pub struct RingHandle<B: RingBackend> {
    device: String,
    fd: RawFd,
    // None = Closed
    backend: Option<B>,
}

impl<B: RingBackend> RingHandle<B> {
    /// Bungkus backend yang sudah terbuka
    pub fn from_backend(device: impl Into<String>, backend: B) -> Self {
        let device = device.into();
        let fd = backend.raw_fd();
        debug!(device = %device, fd, "ring opened");
        Self {
            device,
            fd,
            backend: Some(backend),
        }
    }

    /// Nama device seperti yang diberikan saat open
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Descriptor ring untuk `ReadinessWaiter::register`
    #[inline(always)]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline(always)]
    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    #[inline(always)]
    fn backend_mut(&mut self) -> Result<&mut B, RingError> {
        self.backend.as_mut().ok_or(RingError::Closed)
    }

    /// Ambil frame berikutnya tanpa blocking
    ///
    /// `RingError::NoPacketAvailable` berarti ring kosong saat ini.
    #[inline]
    pub fn next_packet(&mut self) -> Result<PacketView, RingError> {
        self.backend_mut()?
            .next_packet()?
            .ok_or(RingError::NoPacketAvailable)
    }

    /// Enqueue frame untuk transmisi. Payload kosong ditolak.
    pub fn inject(&mut self, payload: &[u8]) -> Result<(), RingError> {
        let backend = self.backend_mut()?;
        if payload.is_empty() {
            return Err(RingError::inject_failed("empty payload"));
        }
        backend.inject(payload)
    }

    /// Counter saat ini; tidak mereset apa pun
    pub fn stats(&mut self) -> Result<StatsSnapshot, RingError> {
        self.backend_mut()?.stats()
    }

    /// Diterima untuk simetri interface. Tidak melakukan filtering apa pun.
    pub fn set_filter(&mut self, expr: &str) -> Result<(), RingError> {
        self.backend_mut()?;
        debug!(device = %self.device, expr, "set_filter is a no-op; frames are not filtered");
        Ok(())
    }

    /// Lepas ring. Error dari release hanya di-log.
    ///
    /// Memanggil `close` dua kali adalah kesalahan caller dan mengembalikan
    /// `RingError::Closed`.
    pub fn close(&mut self) -> Result<(), RingError> {
        let mut backend = self.backend.take().ok_or(RingError::Closed)?;
        Self::release(&self.device, &mut backend);
        Ok(())
    }

    fn release(device: &str, backend: &mut B) {
        match backend.release() {
            Ok(()) => debug!(device, "ring closed"),
            Err(e) => warn!(device, error = %e, "ring release reported an error"),
        }
    }
}

impl<B: RingBackend> Drop for RingHandle<B> {
    fn drop(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            Self::release(&self.device, &mut backend);
        }
    }
}

impl<B: RingBackend> std::fmt::Debug for RingHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingHandle")
            .field("device", &self.device)
            .field("fd", &self.fd)
            .field("open", &self.is_open())
            .finish()
    }
}
