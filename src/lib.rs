//! ringcap - Zero-Copy Packet Ring Capture
//!
//! Arsitektur:
//! - Zero-Copy: RX/TX ring di-mmap langsung dari kernel (AF_PACKET TPACKET_V2)
//! - Event-Driven: edge-triggered readiness, tanpa busy-polling
//! - Single Owner: setiap ring dan waiter berdiri sendiri, tanpa global state
//!
//! ```no_run
//! use ringcap::config::LoopConfig;
//! use ringcap::core::RingHandle;
//! use ringcap::event::{CaptureLoop, ReadinessWaiter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ring = RingHandle::open("packet:eth0")?;
//! let waiter = ReadinessWaiter::create()?;
//! let mut capture = CaptureLoop::new(ring, waiter, LoopConfig::default())?;
//! capture.run(|pkt| println!("got pkt.. {}", pkt.captured_len()))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod logging;

pub use crate::core::{PacketView, RingBackend, RingHandle, StatsSnapshot, Timestamp};
pub use crate::error::{CaptureError, RingError, WaitError};
pub use crate::event::{CancelToken, CaptureLoop, ReadinessWaiter};
