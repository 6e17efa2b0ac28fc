//! Simulated packet ring (SPSC, fixed-size slots)
//!
//! Lamport queue dengan memory ordering yang sama seperti ring kernel:
//! producer (`SimDevice`) menulis slot lalu mem-publish `head` dengan Release,
//! consumer (`SimRing`) membaca `head` dengan Acquire, copy slot, lalu
//! mengembalikan slot lewat `tail`.
//!
//! Setiap enqueue menulis satu byte ke socket notifikasi sehingga descriptor
//! consumer menjadi readable (satu edge per frame). Dipakai oleh tests,
//! benches, dan demo tanpa butuh NIC atau privilege.

use std::cell::{Cell, UnsafeCell};
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{PacketView, RingBackend, StatsSnapshot, Timestamp};
use crate::error::RingError;

/// Satu frame slot - buffer pre-allocated sebesar snap length
struct Slot {
    frame: UnsafeCell<SlotFrame>,
}

struct SlotFrame {
    timestamp: Timestamp,
    wire_len: u32,
    captured_len: usize,
    bytes: Box<[u8]>,
}

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
struct CacheLinePadded<T> {
    value: T,
}

impl<T> CacheLinePadded<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

struct Shared {
    // Producer side
    head: CacheLinePadded<AtomicUsize>,
    // Consumer side
    tail: CacheLinePadded<AtomicUsize>,
    slots: Box<[Slot]>,
    mask: usize,
    snaplen: usize,

    received: AtomicU64,
    dropped: AtomicU64,
    if_dropped: AtomicU64,

    transmitted: Mutex<Vec<Vec<u8>>>,
    releases: AtomicUsize,
    fail_release: AtomicBool,
}

// SAFETY: slot hanya ditulis oleh satu producer sebelum `head` di-publish dan
// hanya dibaca oleh satu consumer sebelum `tail` di-advance. `SimDevice` tidak
// Sync dan tidak Clone, `SimRing` diakses lewat `&mut self`.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    #[inline(always)]
    fn len(&self) -> usize {
        let head = self.head.value.load(Ordering::Acquire);
        let tail = self.tail.value.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }
}

/// Consumer side: `RingBackend` di atas slot ring in-process
pub struct SimRing {
    shared: Arc<Shared>,
    notify_rx: UnixStream,
}

/// Producer side: "device" yang mengisi ring dan menerima frame hasil inject
///
/// Hanya boleh ada satu producer; tipe ini `Send` tapi tidak `Sync`.
pub struct SimDevice {
    shared: Arc<Shared>,
    notify_tx: UnixStream,
    _not_sync: PhantomData<Cell<()>>,
}

impl SimRing {
    /// Membuat ring dengan `slots` frame (harus power of 2) dan snap length `snaplen`
    pub fn with_capacity(slots: usize, snaplen: usize) -> io::Result<(SimRing, SimDevice)> {
        if slots == 0 || !slots.is_power_of_two() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "slot count must be a power of 2",
            ));
        }
        if snaplen == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "snap length must be non-zero",
            ));
        }

        let (notify_rx, notify_tx) = UnixStream::pair()?;
        notify_rx.set_nonblocking(true)?;
        notify_tx.set_nonblocking(true)?;

        // Alokasi sekali saat init, tidak ada alokasi di hot path producer
        let slots_vec: Vec<Slot> = (0..slots)
            .map(|_| Slot {
                frame: UnsafeCell::new(SlotFrame {
                    timestamp: Timestamp::default(),
                    wire_len: 0,
                    captured_len: 0,
                    bytes: vec![0u8; snaplen].into_boxed_slice(),
                }),
            })
            .collect();

        let shared = Arc::new(Shared {
            head: CacheLinePadded::new(AtomicUsize::new(0)),
            tail: CacheLinePadded::new(AtomicUsize::new(0)),
            slots: slots_vec.into_boxed_slice(),
            mask: slots - 1,
            snaplen,
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            if_dropped: AtomicU64::new(0),
            transmitted: Mutex::new(Vec::new()),
            releases: AtomicUsize::new(0),
            fail_release: AtomicBool::new(false),
        });

        let ring = SimRing {
            shared: Arc::clone(&shared),
            notify_rx,
        };
        let device = SimDevice {
            shared,
            notify_tx,
            _not_sync: PhantomData,
        };
        Ok((ring, device))
    }

    #[inline(always)]
    fn pop(&mut self) -> Option<PacketView> {
        let shared = &*self.shared;
        let tail = shared.tail.value.load(Ordering::Relaxed);
        let head = shared.head.value.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let slot = &shared.slots[tail & shared.mask];

        // SAFETY: slot sudah di-publish oleh producer dan belum dikembalikan
        let pkt = unsafe {
            let frame = &*slot.frame.get();
            PacketView::copy_from(
                frame.timestamp,
                frame.wire_len,
                &frame.bytes[..frame.captured_len],
            )
        };

        // Release: copy di atas selesai sebelum slot boleh ditulis ulang
        shared
            .tail
            .value
            .store(tail.wrapping_add(1), Ordering::Release);

        Some(pkt)
    }

    /// Kosongkan socket notifikasi supaya enqueue berikutnya menghasilkan edge baru
    fn drain_notifications(&mut self) -> io::Result<()> {
        let mut buf = [0u8; 256];
        loop {
            match self.notify_rx.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl RingBackend for SimRing {
    fn raw_fd(&self) -> RawFd {
        self.notify_rx.as_raw_fd()
    }

    fn next_packet(&mut self) -> Result<Option<PacketView>, RingError> {
        if let Some(pkt) = self.pop() {
            return Ok(Some(pkt));
        }

        // Ring kosong: drain notifikasi lalu cek ulang. Frame yang masuk setelah
        // drain selalu membawa byte (edge) baru.
        if let Err(e) = self.drain_notifications() {
            tracing::debug!(error = %e, "sim ring notification drain failed");
        }
        Ok(self.pop())
    }

    fn inject(&mut self, payload: &[u8]) -> Result<(), RingError> {
        let shared = &*self.shared;
        if payload.len() > shared.snaplen {
            return Err(RingError::inject_failed(format!(
                "payload of {} bytes exceeds frame size {}",
                payload.len(),
                shared.snaplen
            )));
        }

        let mut tx = shared
            .transmitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if tx.len() >= shared.slots.len() {
            return Err(RingError::inject_failed("tx ring full"));
        }
        tx.push(payload.to_vec());
        Ok(())
    }

    fn stats(&mut self) -> Result<StatsSnapshot, RingError> {
        let shared = &*self.shared;
        Ok(StatsSnapshot {
            received: shared.received.load(Ordering::Relaxed),
            dropped: shared.dropped.load(Ordering::Relaxed),
            if_dropped: shared.if_dropped.load(Ordering::Relaxed),
        })
    }

    fn release(&mut self) -> io::Result<()> {
        self.shared.releases.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_release.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "simulated release failure",
            ));
        }
        Ok(())
    }
}

impl SimDevice {
    /// Enqueue frame yang "diterima dari wire"
    ///
    /// Frame lebih panjang dari snap length di-truncate (captured < wire).
    /// Returns `false` jika ring penuh; frame dihitung sebagai ring drop.
    #[inline]
    pub fn enqueue(&self, frame: &[u8], timestamp: Timestamp) -> bool {
        let shared = &*self.shared;
        shared.received.fetch_add(1, Ordering::Relaxed);

        let head = shared.head.value.load(Ordering::Relaxed);
        let tail = shared.tail.value.load(Ordering::Acquire);

        if head.wrapping_sub(tail) > shared.mask {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let slot = &shared.slots[head & shared.mask];
        let captured = frame.len().min(shared.snaplen);

        // SAFETY: slot ini sudah dikembalikan consumer dan belum di-publish
        unsafe {
            let dst = &mut *slot.frame.get();
            dst.timestamp = timestamp;
            dst.wire_len = frame.len() as u32;
            dst.captured_len = captured;
            dst.bytes[..captured].copy_from_slice(&frame[..captured]);
        }

        shared
            .head
            .value
            .store(head.wrapping_add(1), Ordering::Release);

        self.notify();
        true
    }

    fn notify(&self) {
        // WouldBlock: socket masih punya byte yang belum dibaca, consumer akan
        // cek ulang ring setelah drain
        match (&self.notify_tx).write(&[1u8]) {
            Ok(_) => {}
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => tracing::debug!(error = %e, "sim ring notify failed"),
        }
    }

    /// Tambah counter drop di level interface
    pub fn drop_on_interface(&self, count: u64) {
        self.shared.if_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Ambil (dan kosongkan) frame yang sudah di-inject oleh consumer
    pub fn transmitted(&self) -> Vec<Vec<u8>> {
        let mut tx = self
            .shared
            .transmitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *tx)
    }

    /// Frame yang menunggu di ring
    pub fn pending(&self) -> usize {
        self.shared.len()
    }

    /// Buat `release` berikutnya gagal
    pub fn fail_release(&self) {
        self.shared.fail_release.store(true, Ordering::SeqCst);
    }

    /// Berapa kali `release` dipanggil
    pub fn release_count(&self) -> usize {
        self.shared.releases.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_capacity() {
        assert!(SimRing::with_capacity(3, 64).is_err());
        assert!(SimRing::with_capacity(0, 64).is_err());
        assert!(SimRing::with_capacity(4, 0).is_err());
    }

    #[test]
    fn test_full_ring_counts_drop() {
        let (mut ring, dev) = SimRing::with_capacity(4, 64).unwrap();

        for i in 0..4u8 {
            assert!(dev.enqueue(&[i; 10], Timestamp::now()));
        }
        assert_eq!(dev.pending(), 4);
        assert!(!dev.enqueue(&[9; 10], Timestamp::now()));

        let stats = ring.stats().unwrap();
        assert_eq!(stats.received, 5);
        assert_eq!(stats.dropped, 1);

        assert_eq!(ring.next_packet().unwrap().unwrap().data(), &[0u8; 10]);
        assert!(dev.enqueue(&[5; 10], Timestamp::now()));
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let (mut ring, dev) = SimRing::with_capacity(4, 64).unwrap();

        for round in 0..10u8 {
            for i in 0..4u8 {
                assert!(dev.enqueue(&[round * 4 + i; 8], Timestamp::now()));
            }
            for i in 0..4u8 {
                let pkt = ring.next_packet().unwrap().unwrap();
                assert_eq!(pkt.data()[0], round * 4 + i);
            }
        }
        assert!(ring.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_truncates_to_snaplen() {
        let (mut ring, dev) = SimRing::with_capacity(2, 128).unwrap();
        dev.enqueue(&[3u8; 1500], Timestamp::now());

        let pkt = ring.next_packet().unwrap().unwrap();
        assert_eq!(pkt.captured_len(), 128);
        assert_eq!(pkt.wire_len(), 1500);
        assert!(pkt.is_truncated());
    }

    #[test]
    fn test_enqueue_makes_fd_readable_and_drain_clears_it() {
        let (mut ring, dev) = SimRing::with_capacity(4, 64).unwrap();
        dev.enqueue(&[1u8; 4], Timestamp::now());

        let mut probe = [0u8; 1];
        let peeked = unsafe {
            libc::recv(
                ring.raw_fd(),
                probe.as_mut_ptr() as *mut libc::c_void,
                1,
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };
        assert_eq!(peeked, 1);

        assert!(ring.next_packet().unwrap().is_some());
        assert!(ring.next_packet().unwrap().is_none());

        let peeked = unsafe {
            libc::recv(
                ring.raw_fd(),
                probe.as_mut_ptr() as *mut libc::c_void,
                1,
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };
        assert_eq!(peeked, -1);
    }

    #[test]
    fn test_inject_limits() {
        let (mut ring, dev) = SimRing::with_capacity(2, 16).unwrap();

        assert!(matches!(
            ring.inject(&[0u8; 17]),
            Err(RingError::InjectFailed { .. })
        ));

        ring.inject(b"a").unwrap();
        ring.inject(b"b").unwrap();
        assert!(matches!(
            ring.inject(b"c"),
            Err(RingError::InjectFailed { .. })
        ));

        assert_eq!(dev.transmitted(), vec![b"a".to_vec(), b"b".to_vec()]);
        ring.inject(b"c").unwrap();
    }

    #[test]
    fn test_producer_thread() {
        let (mut ring, dev) = SimRing::with_capacity(64, 64).unwrap();

        let producer = std::thread::spawn(move || {
            let mut sent = 0u32;
            while sent < 1000 {
                if dev.enqueue(&sent.to_le_bytes(), Timestamp::now()) {
                    sent += 1;
                } else {
                    std::thread::yield_now();
                }
            }
            dev
        });

        let mut expected = 0u32;
        while expected < 1000 {
            if let Some(pkt) = ring.next_packet().unwrap() {
                let mut b = [0u8; 4];
                b.copy_from_slice(pkt.data());
                assert_eq!(u32::from_le_bytes(b), expected);
                expected += 1;
            }
        }

        let dev = producer.join().unwrap();
        assert_eq!(dev.pending(), 0);
    }
}
