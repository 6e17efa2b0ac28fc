//! Core module: packet ring handle dan backend-nya
//!
//! Prinsip desain:
//! - Single owner: `RingHandle` memiliki ring native dan melepasnya tepat sekali
//! - Copy-out: setiap `PacketView` memegang copy bytes, slot langsung kembali ke ring
//! - Non-blocking: semua operasi ring langsung return dengan status

mod packet;
#[cfg(target_os = "linux")]
mod packet_ring;
mod ring_handle;
mod sim_ring;
mod stats;

pub use packet::{PacketView, Timestamp};
#[cfg(target_os = "linux")]
pub use packet_ring::{parse_device, PacketRing};
pub use ring_handle::{RingBackend, RingHandle};
pub use sim_ring::{SimDevice, SimRing};
pub use stats::StatsSnapshot;
