//! ringcap - capture frames dari packet ring
//!
//! Usage:
//!   ringcap -i packet:eth0 [--stats-interval 10]
//!
//! Ctrl-C menghentikan loop; statistik terakhir di-log dan ring ditutup.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use crate::cli::Cli;

fn main() -> ExitCode {
    // Flag wajib yang hilang: clap print usage dan exit non-zero
    let cli = Cli::parse();

    if let Err(e) = ringcap::logging::init_tracing(&cli.log_level, cli.log_format) {
        eprintln!("error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("ringcap failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(target_os = "linux")]
fn run(cli: Cli) -> anyhow::Result<()> {
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::Context;
    use ringcap::{CaptureLoop, ReadinessWaiter, RingHandle};
    use tracing::info;

    let ring = RingHandle::open_with(&cli.interface, &cli.ring_config())?;
    info!(device = ring.device(), fd = ring.fd(), "ring opened");

    let waiter = ReadinessWaiter::with_capacity(cli.max_events)?;
    let cancel = waiter.cancel_token();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("failed to install Ctrl-C handler")?;

    // Beri waktu driver/NIC setelah ring dipasang
    let warmup_end = Instant::now() + Duration::from_secs(cli.warmup);
    while Instant::now() < warmup_end && !cancel.is_cancelled() {
        thread::sleep(Duration::from_millis(100));
    }

    let mut capture = CaptureLoop::new(ring, waiter, cli.loop_config())?;
    let summary = capture.run(|pkt| {
        info!(
            caplen = pkt.captured_len(),
            len = pkt.wire_len(),
            "got pkt"
        );
    })?;
    info!(
        packets = summary.packets,
        wakeups = summary.wakeups,
        interrupts = summary.interrupts,
        wait_errors = summary.wait_errors,
        drain_errors = summary.drain_errors,
        "capture stopped"
    );

    let (mut ring, _waiter) = capture.into_parts();
    ring.close()?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run(cli: Cli) -> anyhow::Result<()> {
    anyhow::bail!("cannot open '{}': packet rings require Linux", cli.interface)
}
