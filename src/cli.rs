//! CLI argument definitions untuk `ringcap`

use std::time::Duration;

use clap::Parser;

use ringcap::config::{LoopConfig, RingConfig};
use ringcap::logging::LogFormat;

/// Capture frames from a packet ring and log each one.
#[derive(Parser, Debug)]
#[command(name = "ringcap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Device to open, e.g. `eth0` or `packet:eth0`.
    #[arg(short = 'i', long = "interface")]
    pub interface: String,

    /// Seconds to sleep after opening the ring before capturing.
    #[arg(long, default_value_t = 4)]
    pub warmup: u64,

    /// Log ring statistics every N seconds (final stats are always logged).
    #[arg(long)]
    pub stats_interval: Option<u64>,

    /// Frames per ring.
    #[arg(long, default_value_t = RingConfig::default().frame_count)]
    pub frames: u32,

    /// Bytes per frame slot (multiple of 16).
    #[arg(long, default_value_t = RingConfig::default().frame_size)]
    pub frame_size: u32,

    /// Maximum readiness events per wait.
    #[arg(long, default_value_t = LoopConfig::default().max_events)]
    pub max_events: usize,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log format (pretty, compact, json).
    #[arg(long, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn ring_config(&self) -> RingConfig {
        let defaults = RingConfig::default();
        RingConfig {
            frame_size: self.frame_size,
            frame_count: self.frames,
            // Block harus muat minimal satu frame
            block_size: defaults.block_size.max(round_to_page(self.frame_size)),
        }
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_events: self.max_events,
            stats_interval: self.stats_interval.map(Duration::from_secs),
            ..LoopConfig::default()
        }
    }
}

fn round_to_page(bytes: u32) -> u32 {
    const PAGE: u32 = 4096;
    bytes.saturating_add(PAGE - 1) / PAGE * PAGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_is_required() {
        assert!(Cli::try_parse_from(["ringcap"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["ringcap", "-i", "packet:em1"]).unwrap();
        assert_eq!(cli.interface, "packet:em1");
        assert_eq!(cli.warmup, 4);
        assert_eq!(cli.ring_config(), RingConfig::default());
        assert!(cli.loop_config().stats_interval.is_none());
        assert_eq!(cli.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "ringcap",
            "--interface",
            "eth1",
            "--stats-interval",
            "5",
            "--frame-size",
            "65536",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.loop_config().stats_interval, Some(Duration::from_secs(5)));
        let ring = cli.ring_config();
        assert_eq!(ring.frame_size, 65536);
        assert_eq!(ring.block_size, 65536);
        assert_eq!(cli.log_format, LogFormat::Json);
    }
}
