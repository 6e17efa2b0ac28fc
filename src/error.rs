//! Error types untuk ring, waiter, dan capture loop
//!
//! Taxonomy:
//! - `NoPacketAvailable` dan `Interrupted` adalah sinyal retry, bukan kegagalan.
//! - `OpenFailed` fatal untuk handle.
//! - `InjectFailed` lokal ke satu operasi inject.

use std::io;

/// Errors dari `RingHandle` dan backend-nya
#[derive(Debug, thiserror::Error)]
pub enum RingError {
    /// Ring tidak bisa dibuka untuk device ini
    #[error("open ring failed for '{device}': {source}")]
    OpenFailed {
        device: String,
        #[source]
        source: io::Error,
    },

    /// Ring sedang kosong, coba lagi nanti
    #[error("no packet available")]
    NoPacketAvailable,

    /// Ring menolak frame untuk transmisi
    #[error("inject failed: {reason}")]
    InjectFailed { reason: String },

    /// Slot berisi header yang tidak konsisten; slot sudah dikembalikan ke kernel
    #[error("malformed frame in slot {slot}: {reason}")]
    MalformedFrame { slot: usize, reason: &'static str },

    #[error("failed to read ring statistics: {0}")]
    Stats(#[source] io::Error),

    /// Operasi pada handle yang sudah di-close
    #[error("ring handle is closed")]
    Closed,
}

impl RingError {
    pub(crate) fn open_failed(device: &str, source: io::Error) -> Self {
        Self::OpenFailed {
            device: device.to_string(),
            source,
        }
    }

    pub(crate) fn inject_failed(reason: impl Into<String>) -> Self {
        Self::InjectFailed {
            reason: reason.into(),
        }
    }

    /// `true` untuk kondisi "try again later"
    #[inline(always)]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NoPacketAvailable)
    }
}

/// Errors dari `ReadinessWaiter`
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// Wait terputus oleh signal (EINTR); panggil wait lagi
    #[error("wait interrupted")]
    Interrupted,

    /// Tidak ada descriptor terdaftar, wait akan block selamanya
    #[error("no descriptors registered")]
    NoInterests,

    #[error("event queue error: {0}")]
    Io(#[from] io::Error),
}

impl WaitError {
    #[inline(always)]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    pub(crate) fn from_poll(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::Interrupted {
            Self::Interrupted
        } else {
            Self::Io(err)
        }
    }
}

/// Errors yang menghentikan `CaptureLoop`
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Ring(#[from] RingError),

    #[error(transparent)]
    Wait(#[from] WaitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(RingError::NoPacketAvailable.is_retryable());
        assert!(!RingError::Closed.is_retryable());
        assert!(!RingError::inject_failed("full").is_retryable());

        assert!(WaitError::Interrupted.is_retryable());
        assert!(!WaitError::NoInterests.is_retryable());
    }

    #[test]
    fn test_poll_error_mapping() {
        let eintr = io::Error::from(io::ErrorKind::Interrupted);
        assert!(matches!(WaitError::from_poll(eintr), WaitError::Interrupted));

        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(WaitError::from_poll(other), WaitError::Io(_)));
    }

    #[test]
    fn test_open_failed_message() {
        let err = RingError::open_failed("eth9", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.to_string().contains("eth9"));
    }
}
