//! Event Layer: readiness notification dan capture loop
//!
//! Menggunakan mio untuk readiness descriptor (epoll/kqueue, edge-triggered).
//!
//! Fitur:
//! - Satu event queue per waiter, tanpa global state
//! - Cancel lintas thread lewat waker yang terdaftar di poll
//! - Drain penuh setiap wakeup, sesuai semantik edge-triggered

mod cancel;
mod capture;
mod waiter;

pub use cancel::CancelToken;
pub use capture::{CaptureLoop, LoopSummary};
pub use waiter::{ReadinessWaiter, ReadyEvent, WaitReady};
