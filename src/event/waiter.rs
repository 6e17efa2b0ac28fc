//! ReadinessWaiter: edge-triggered readiness di atas mio
//!
//! mio memakai epoll (Linux) / kqueue (BSD) dalam mode edge-triggered:
//! event muncul sekali per transisi ke "ada data". Caller WAJIB drain ring
//! sampai `NoPacketAvailable` sebelum wait lagi.
//!
//! Waiter hanya mengamati readiness descriptor, tidak pernah membaca atau
//! menulis datanya.

use std::collections::HashSet;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::debug;

use super::CancelToken;
use crate::error::WaitError;

const WAKER_TOKEN: Token = Token(usize::MAX);
const DEFAULT_EVENTS_CAPACITY: usize = 16;

/// Satu descriptor yang siap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyEvent {
    pub fd: RawFd,
    pub readable: bool,
    pub error: bool,
    pub hangup: bool,
}

/// Seam antara `CaptureLoop` dan mekanisme wait
pub trait WaitReady {
    /// Daftarkan descriptor dengan interest readable
    fn register_readable(&mut self, fd: RawFd) -> Result<(), WaitError>;

    /// Lepas descriptor; no-op jika belum terdaftar
    fn deregister_readable(&mut self, fd: RawFd) -> Result<(), WaitError>;

    /// Block sampai ada descriptor siap, timeout, atau wake.
    /// Returns jumlah descriptor yang siap (0 untuk timeout/wake).
    fn wait_ready(&mut self, max_events: usize, timeout: Option<Duration>)
        -> Result<usize, WaitError>;

    /// Token yang menghentikan loop (dan membangunkan wait jika didukung)
    fn cancel_token(&self) -> CancelToken;
}

/// Kernel event queue dengan nol atau lebih descriptor terdaftar
pub struct ReadinessWaiter {
    poll: Poll,
    events: Events,
    capacity: usize,
    interests: HashSet<RawFd>,
    // Pre-allocated, di-reuse setiap wait
    ready: Vec<ReadyEvent>,
    cancel: CancelToken,
}

impl ReadinessWaiter {
    /// Alokasi event queue baru
    pub fn create() -> Result<Self, WaitError> {
        Self::with_capacity(DEFAULT_EVENTS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, WaitError> {
        let capacity = capacity.max(1);
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        Ok(Self {
            poll,
            events: Events::with_capacity(capacity),
            capacity,
            interests: HashSet::new(),
            ready: Vec::with_capacity(capacity),
            cancel: CancelToken::with_waker(waker),
        })
    }

    /// Token cancel yang membangunkan wait milik waiter ini
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Tambah atau update interest readable (edge-triggered) untuk `fd`
    ///
    /// Registrasi ulang descriptor yang sama meng-update flags, tidak duplikat.
    /// Jika descriptor lama sudah ditutup (kernel membuang registrasinya) dan
    /// nomornya dipakai ulang, descriptor baru didaftarkan dari awal.
    pub fn register(&mut self, fd: RawFd) -> Result<Token, WaitError> {
        if fd < 0 {
            return Err(WaitError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "negative descriptor",
            )));
        }

        let token = Token(fd as usize);
        let registry = self.poll.registry();
        if self.interests.contains(&fd) {
            match registry.reregister(&mut SourceFd(&fd), token, Interest::READABLE) {
                Ok(()) => debug!(fd, "descriptor re-registered"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    registry.register(&mut SourceFd(&fd), token, Interest::READABLE)?;
                    debug!(fd, "stale descriptor registered again");
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            registry.register(&mut SourceFd(&fd), token, Interest::READABLE)?;
            self.interests.insert(fd);
            debug!(fd, "descriptor registered");
        }
        Ok(token)
    }

    /// Hapus interest untuk `fd`; no-op jika belum terdaftar
    ///
    /// Descriptor yang sudah ditutup tetap dihapus dari daftar interest
    /// (kernel sudah membuang registrasinya sendiri).
    pub fn deregister(&mut self, fd: RawFd) -> Result<(), WaitError> {
        if !self.interests.remove(&fd) {
            return Ok(());
        }
        match self.poll.registry().deregister(&mut SourceFd(&fd)) {
            Ok(()) => debug!(fd, "descriptor deregistered"),
            Err(e) if is_gone(&e) => debug!(fd, "descriptor already closed"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Jumlah descriptor terdaftar
    pub fn registered(&self) -> usize {
        self.interests.len()
    }

    /// Block sampai minimal satu descriptor siap
    ///
    /// `WaitError::Interrupted` berarti EINTR: panggil lagi. Tanpa descriptor
    /// terdaftar, langsung `WaitError::NoInterests`.
    pub fn wait(&mut self, max_events: usize) -> Result<&[ReadyEvent], WaitError> {
        self.wait_timeout(max_events, None)
    }

    /// Seperti `wait`, dengan timeout. Timeout atau cancel wake -> slice kosong.
    pub fn wait_timeout(
        &mut self,
        max_events: usize,
        timeout: Option<Duration>,
    ) -> Result<&[ReadyEvent], WaitError> {
        if self.interests.is_empty() {
            return Err(WaitError::NoInterests);
        }

        let max_events = max_events.max(1);
        if max_events != self.capacity {
            self.events = Events::with_capacity(max_events);
            self.capacity = max_events;
        }

        self.poll
            .poll(&mut self.events, timeout)
            .map_err(WaitError::from_poll)?;

        self.ready.clear();
        for event in self.events.iter() {
            if event.token() == WAKER_TOKEN {
                continue;
            }
            self.ready.push(ReadyEvent {
                fd: event.token().0 as RawFd,
                readable: event.is_readable(),
                error: event.is_error(),
                hangup: event.is_read_closed(),
            });
        }

        Ok(&self.ready)
    }
}

/// ENOENT / EBADF: descriptor sudah tidak ada di epoll set
fn is_gone(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::EBADF)
}

impl WaitReady for ReadinessWaiter {
    fn register_readable(&mut self, fd: RawFd) -> Result<(), WaitError> {
        self.register(fd).map(|_| ())
    }

    fn deregister_readable(&mut self, fd: RawFd) -> Result<(), WaitError> {
        self.deregister(fd)
    }

    fn wait_ready(
        &mut self,
        max_events: usize,
        timeout: Option<Duration>,
    ) -> Result<usize, WaitError> {
        self.wait_timeout(max_events, timeout).map(|ready| ready.len())
    }

    fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

impl std::fmt::Debug for ReadinessWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadinessWaiter")
            .field("capacity", &self.capacity)
            .field("interests", &self.interests)
            .finish()
    }
}
