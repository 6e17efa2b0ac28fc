//! Cross-thread stop signal untuk capture loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::Waker;

/// Flag cancel + waker yang terdaftar di poll milik `ReadinessWaiter`
///
/// `cancel()` bisa dipanggil dari thread mana pun (termasuk handler Ctrl-C);
/// wait yang sedang block langsung bangun dan loop keluar di cek berikutnya.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    waker: Option<Arc<Waker>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Token tanpa waker; hanya dicek sebelum setiap wait
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker: None,
        }
    }

    pub(crate) fn with_waker(waker: Arc<Waker>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker: Some(waker),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        if let Some(waker) = &self.waker {
            if let Err(e) = waker.wake() {
                tracing::warn!(error = %e, "failed to wake event queue for cancellation");
            }
        }
    }

    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("wakes_poll", &self.waker.is_some())
            .finish()
    }
}
