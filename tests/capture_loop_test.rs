//! Capture loop end-to-end: SimRing + ReadinessWaiter (epoll) + producer thread
//!
//! Usage:
//!   cargo test --release --test capture_loop_test -- --nocapture

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ringcap::config::LoopConfig;
use ringcap::core::{SimDevice, SimRing, Timestamp};
use ringcap::{CancelToken, CaptureLoop, ReadinessWaiter, RingError, RingHandle};

const SNAPLEN: usize = 2048;

type SimLoop = CaptureLoop<SimRing, ReadinessWaiter>;

fn sim_loop(slots: usize, config: LoopConfig) -> (SimLoop, SimDevice) {
    let (ring, device) = SimRing::with_capacity(slots, SNAPLEN).unwrap();
    let handle = RingHandle::from_backend("sim0", ring);
    let waiter = ReadinessWaiter::create().unwrap();
    (CaptureLoop::new(handle, waiter, config).unwrap(), device)
}

/// Cancel setelah `limit` supaya test tidak pernah hang
fn watchdog(cancel: CancelToken, limit: Duration) -> Arc<AtomicBool> {
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    thread::spawn(move || {
        let start = Instant::now();
        while start.elapsed() < limit {
            if cancel.is_cancelled() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        flag.store(true, Ordering::SeqCst);
        cancel.cancel();
    });
    fired
}

#[test]
fn drains_queued_frames_in_ring_order() {
    let (mut capture, device) = sim_loop(8, LoopConfig::default());
    for len in [64usize, 128, 1500] {
        assert!(device.enqueue(&vec![0xEE; len], Timestamp::now()));
    }

    let cancel = capture.cancel_token();
    let fired = watchdog(cancel.clone(), Duration::from_secs(10));

    let mut lens = Vec::new();
    let summary = capture
        .run(|pkt| {
            assert!(pkt.captured_len() <= pkt.wire_len());
            assert_eq!(pkt.data().len(), pkt.captured_len() as usize);
            lens.push(pkt.captured_len());
            if lens.len() == 3 {
                cancel.cancel();
            }
        })
        .unwrap();

    assert!(!fired.load(Ordering::SeqCst));
    assert_eq!(lens, vec![64, 128, 1500]);
    assert_eq!(summary.packets, 3);

    let ring = capture.ring_mut();
    assert!(matches!(ring.next_packet(), Err(RingError::NoPacketAvailable)));
}

#[test]
fn producer_thread_burst_is_delivered_without_loss() {
    const TOTAL: u32 = 5_000;
    let (mut capture, device) = sim_loop(64, LoopConfig::default());
    let cancel = capture.cancel_token();
    let fired = watchdog(cancel.clone(), Duration::from_secs(30));

    let producer = thread::spawn(move || {
        let mut seq = 0u32;
        while seq < TOTAL {
            let mut frame = [0u8; 60];
            frame[..4].copy_from_slice(&seq.to_le_bytes());
            if device.enqueue(&frame, Timestamp::now()) {
                seq += 1;
                if seq % 256 == 0 {
                    // Beri jeda supaya consumer sempat kembali ke wait
                    thread::sleep(Duration::from_millis(1));
                }
            } else {
                thread::yield_now();
            }
        }
        device
    });

    let mut expected = 0u32;
    let summary = capture
        .run(|pkt| {
            let mut seq = [0u8; 4];
            seq.copy_from_slice(&pkt.data()[..4]);
            assert_eq!(u32::from_le_bytes(seq), expected);
            expected += 1;
            if expected == TOTAL {
                cancel.cancel();
            }
        })
        .unwrap();

    let device = producer.join().unwrap();
    assert!(!fired.load(Ordering::SeqCst), "watchdog fired, frames were stranded");
    assert_eq!(summary.packets, TOTAL as u64);
    assert_eq!(device.pending(), 0);
    assert!(summary.wakeups >= 1);

    let stats = capture.ring_mut().stats().unwrap();
    assert!(stats.received >= TOTAL as u64);
    assert_eq!(stats.received - stats.dropped, TOTAL as u64);
}

#[test]
fn cancel_wakes_idle_loop() {
    let (mut capture, _device) = sim_loop(4, LoopConfig::default());
    let cancel = capture.cancel_token();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });

    let start = Instant::now();
    let summary = capture.run(|_| panic!("no frames were queued")).unwrap();
    stopper.join().unwrap();

    assert_eq!(summary.packets, 0);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn stats_interval_wakes_loop_periodically() {
    let config = LoopConfig {
        stats_interval: Some(Duration::from_millis(10)),
        ..LoopConfig::default()
    };
    let (mut capture, _device) = sim_loop(4, config);
    let cancel = capture.cancel_token();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
    });

    let summary = capture.run(|_| {}).unwrap();
    stopper.join().unwrap();

    // Timeout wait dihitung sebagai wakeup
    assert!(summary.wakeups >= 2);
}

#[test]
fn inject_and_stats_outside_the_loop() {
    let (mut capture, device) = sim_loop(4, LoopConfig::default());
    device.drop_on_interface(2);

    let before = capture.ring_mut().stats().unwrap();
    capture.ring_mut().inject(b"\xff\xff\xff\xff\xff\xffhello").unwrap();
    assert!(matches!(
        capture.ring_mut().inject(&[]),
        Err(RingError::InjectFailed { .. })
    ));
    assert_eq!(device.transmitted().len(), 1);

    device.enqueue(&[1u8; 64], Timestamp::now());
    let after = capture.ring_mut().stats().unwrap();
    assert!(after.is_monotonic_since(&before));
    assert_eq!(after.if_dropped, 2);

    let (mut ring, _waiter) = capture.into_parts();
    ring.close().unwrap();
    assert!(matches!(ring.stats(), Err(RingError::Closed)));
    assert_eq!(device.release_count(), 1);
}

#[test]
fn waiter_is_reused_across_successive_rings() {
    let (first, first_dev) = SimRing::with_capacity(4, SNAPLEN).unwrap();
    let handle = RingHandle::from_backend("sim0", first);
    let waiter = ReadinessWaiter::create().unwrap();
    let capture = CaptureLoop::new(handle, waiter, LoopConfig::default()).unwrap();
    let (mut ring, waiter) = capture.into_parts();
    assert_eq!(waiter.registered(), 0);
    ring.close().unwrap();
    drop(first_dev);

    // Ring kedua boleh mendapat nomor fd yang sama dengan ring pertama
    let (second, second_dev) = SimRing::with_capacity(4, SNAPLEN).unwrap();
    assert!(second_dev.enqueue(&[7u8; 64], Timestamp::now()));
    let handle = RingHandle::from_backend("sim1", second);
    let mut capture = CaptureLoop::new(handle, waiter, LoopConfig::default()).unwrap();

    let cancel = capture.cancel_token();
    let fired = watchdog(cancel.clone(), Duration::from_secs(10));
    let summary = capture
        .run(|pkt| {
            assert_eq!(pkt.data(), &[7u8; 64][..]);
            cancel.cancel();
        })
        .unwrap();

    assert!(!fired.load(Ordering::SeqCst));
    assert_eq!(summary.packets, 1);
    assert_eq!(capture.into_parts().1.registered(), 0);
}
