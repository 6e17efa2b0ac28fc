//! AF_PACKET TPACKET_V2 ring (Linux)
//!
//! RX ring dan TX ring di-mmap langsung dari socket, memungkinkan:
//! - Zero-copy RX: kernel menulis frame ke slot, userspace membaca dari mapping
//! - Zero-copy TX: userspace menulis ke slot, kernel mengirim saat `send` kick
//! - Tidak ada syscall per-packet di sisi RX
//!
//! Layout mapping (satu region, offset 0):
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ RX ring (block_count blocks) │ TX ring (block_count blocks) │
//! └──────────────────────────────┴──────────────────────────────┘
//! Setiap frame diawali `Tpacket2Hdr`; `tp_status` adalah kepemilikan slot.

use std::ffi::CString;
use std::fs;
use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use super::stats::StatsAccumulator;
use super::{PacketView, RingBackend, RingHandle, StatsSnapshot, Timestamp};
use crate::config::{RingConfig, TPACKET2_HDR_ALIGNED};
use crate::error::RingError;

// linux/if_packet.h
const PACKET_RX_RING: libc::c_int = 5;
const PACKET_STATISTICS: libc::c_int = 6;
const PACKET_VERSION: libc::c_int = 10;
const PACKET_TX_RING: libc::c_int = 13;
const TPACKET_V2: libc::c_int = 1;

const TP_STATUS_KERNEL: u32 = 0;
const TP_STATUS_USER: u32 = 1;
const TP_STATUS_AVAILABLE: u32 = 0;
const TP_STATUS_SEND_REQUEST: u32 = 1;
const TP_STATUS_WRONG_FORMAT: u32 = 4;

const ETH_P_ALL: u16 = 0x0003;
const DEVICE_PREFIX: &str = "packet:";

#[repr(C)]
struct TpacketReq {
    tp_block_size: u32,
    tp_block_nr: u32,
    tp_frame_size: u32,
    tp_frame_nr: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)] // Layout harus persis sama dengan struct tpacket2_hdr
struct Tpacket2Hdr {
    tp_status: u32,
    tp_len: u32,
    tp_snaplen: u32,
    tp_mac: u16,
    tp_net: u16,
    tp_sec: u32,
    tp_nsec: u32,
    tp_vlan_tci: u16,
    tp_vlan_tpid: u16,
    tp_padding: [u8; 4],
}

#[repr(C)]
#[derive(Default)]
struct TpacketStats {
    tp_packets: u32,
    tp_drops: u32,
}

/// Nama interface dari nama device: `"eth0"` atau `"packet:eth0"`
pub fn parse_device(device: &str) -> io::Result<&str> {
    let name = device.strip_prefix(DEVICE_PREFIX).unwrap_or(device);
    let invalid = |msg: &str| Err(io::Error::new(io::ErrorKind::InvalidInput, msg.to_string()));

    if name.is_empty() {
        return invalid("empty interface name");
    }
    if name.len() >= libc::IFNAMSIZ {
        return invalid("interface name too long");
    }
    if name.contains(':') || name.contains('/') || name.contains('\0') {
        return invalid("unsupported device name");
    }
    Ok(name)
}

/// Packet ring untuk satu interface
pub struct PacketRing {
    // None setelah release; field order: mapping di-unmap sebelum socket ditutup
    mmap: Option<MmapMut>,
    socket: Option<OwnedFd>,
    fd: RawFd,
    base: *mut u8,
    ifname: String,
    config: RingConfig,
    frames: usize,
    rx_next: usize,
    tx_next: usize,
    stats: StatsAccumulator,
    if_drop_baseline: Option<u64>,
}

// SAFETY: `base` hanya alias ke mapping milik `self`; ring boleh pindah thread
// tapi tetap diakses oleh satu thread pada satu waktu (tidak Sync).
unsafe impl Send for PacketRing {}

impl PacketRing {
    /// Buka socket, bind ke interface, lalu pasang RX/TX ring dan mmap
    pub fn open(device: &str, config: &RingConfig) -> Result<Self, RingError> {
        Self::try_open(device, config).map_err(|e| RingError::open_failed(device, e))
    }

    fn try_open(device: &str, config: &RingConfig) -> io::Result<Self> {
        let ifname = parse_device(device)?;
        config.validate(page_size())?;

        let c_name = CString::new(ifname)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name"))?;
        let ifindex = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
        if ifindex == 0 {
            return Err(io::Error::last_os_error());
        }

        // Protocol 0: socket belum menerima apa pun sampai bind memasang
        // ETH_P_ALL pada interface ini
        let fd = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: fd baru saja dibuat dan belum dimiliki siapa pun
        let socket = unsafe { OwnedFd::from_raw_fd(fd) };

        set_opt(&socket, PACKET_VERSION, &TPACKET_V2)?;
        // Bind sebelum ring dipasang, supaya slot RX hanya berisi frame dari
        // interface ini
        bind(&socket, ifindex)?;

        let req = TpacketReq {
            tp_block_size: config.block_size,
            tp_block_nr: config.block_count(),
            tp_frame_size: config.frame_size,
            tp_frame_nr: config.total_frames(),
        };
        set_opt(&socket, PACKET_RX_RING, &req)?;
        set_opt(&socket, PACKET_TX_RING, &req)?;

        let map_len = config
            .checked_mapping_len()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "ring geometry too large"))?;
        // SAFETY: kernel menyediakan region RX + TX (2 * ring_len) untuk socket ini
        let mut mmap = unsafe {
            MmapOptions::new()
                .len(map_len)
                .map_mut(socket.as_raw_fd())?
        };

        let mut ring = Self {
            fd: socket.as_raw_fd(),
            base: mmap.as_mut_ptr(),
            mmap: Some(mmap),
            socket: Some(socket),
            ifname: ifname.to_string(),
            config: *config,
            frames: config.total_frames() as usize,
            rx_next: 0,
            tx_next: 0,
            stats: StatsAccumulator::default(),
            if_drop_baseline: None,
        };
        ring.if_drop_baseline = ring.read_if_dropped();

        debug!(
            ifname = %ring.ifname,
            frames = ring.frames,
            frame_size = config.frame_size,
            "packet ring mapped"
        );
        Ok(ring)
    }

    /// Pointer ke frame `index` pada ring (`tx = false` untuk RX)
    #[inline(always)]
    fn frame_ptr(&self, tx: bool, index: usize) -> *mut u8 {
        let base = if tx { self.config.ring_len() } else { 0 };
        let frame_size = self.config.frame_size as usize;
        let per_block = self.config.block_size as usize / frame_size;
        let offset = base
            + (index / per_block) * self.config.block_size as usize
            + (index % per_block) * frame_size;
        // SAFETY: offset < 2 * ring_len karena index < frames
        unsafe { self.base.add(offset) }
    }

    /// `tp_status` sebagai atomic: field ini yang menentukan pemilik slot
    ///
    /// # Safety
    /// `frame` harus menunjuk ke frame di mapping yang masih hidup, dan
    /// referensi tidak boleh dipakai setelah mapping dilepas.
    #[inline(always)]
    unsafe fn status<'a>(frame: *mut u8) -> &'a AtomicU32 {
        &*(frame as *const AtomicU32)
    }

    #[inline(always)]
    fn ensure_mapped(&self) -> Result<(), RingError> {
        if self.mmap.is_none() {
            return Err(RingError::Closed);
        }
        Ok(())
    }

    fn read_if_dropped(&self) -> Option<u64> {
        let path = format!("/sys/class/net/{}/statistics/rx_dropped", self.ifname);
        fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}

impl RingBackend for PacketRing {
    fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn next_packet(&mut self) -> Result<Option<PacketView>, RingError> {
        self.ensure_mapped()?;
        let slot = self.rx_next;
        let frame = self.frame_ptr(false, slot);
        let status = unsafe { Self::status(frame) };

        // Acquire: isi frame visible setelah status USER terlihat
        if status.load(Ordering::Acquire) & TP_STATUS_USER == 0 {
            return Ok(None);
        }

        // SAFETY: slot milik userspace sampai status dikembalikan ke KERNEL
        let hdr = unsafe { ptr::read_volatile(frame as *const Tpacket2Hdr) };
        let frame_size = self.config.frame_size as usize;
        let start = hdr.tp_mac as usize;
        let end = start + hdr.tp_snaplen as usize;

        let result = if start < mem::size_of::<Tpacket2Hdr>() || end > frame_size {
            Err(RingError::MalformedFrame {
                slot,
                reason: "frame data outside slot",
            })
        } else {
            // Copy keluar sebelum slot dikembalikan ke kernel
            let bytes = unsafe { std::slice::from_raw_parts(frame.add(start), end - start) };
            let ts = Timestamp::from_nanos_parts(hdr.tp_sec as i64, hdr.tp_nsec);
            Ok(Some(PacketView::copy_from(ts, hdr.tp_len, bytes)))
        };

        status.store(TP_STATUS_KERNEL, Ordering::Release);
        self.rx_next = (slot + 1) % self.frames;
        result
    }

    fn inject(&mut self, payload: &[u8]) -> Result<(), RingError> {
        self.ensure_mapped()?;
        if payload.len() > self.config.max_payload() {
            return Err(RingError::inject_failed(format!(
                "payload of {} bytes exceeds frame capacity {}",
                payload.len(),
                self.config.max_payload()
            )));
        }

        let slot = self.tx_next;
        let frame = self.frame_ptr(true, slot);
        let status = unsafe { Self::status(frame) };

        match status.load(Ordering::Acquire) {
            TP_STATUS_AVAILABLE => {}
            TP_STATUS_WRONG_FORMAT => {
                // Kernel menolak frame sebelumnya di slot ini; reclaim slot
                status.store(TP_STATUS_AVAILABLE, Ordering::Release);
                return Err(RingError::inject_failed("previous frame had wrong format"));
            }
            _ => return Err(RingError::inject_failed("tx ring full")),
        }

        // SAFETY: slot AVAILABLE milik userspace; payload muat di frame
        unsafe {
            let hdr = frame as *mut Tpacket2Hdr;
            (*hdr).tp_len = payload.len() as u32;
            (*hdr).tp_snaplen = payload.len() as u32;
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                frame.add(TPACKET2_HDR_ALIGNED as usize),
                payload.len(),
            );
        }
        status.store(TP_STATUS_SEND_REQUEST, Ordering::Release);
        self.tx_next = (slot + 1) % self.frames;

        // Kick kernel untuk mengirim frame yang SEND_REQUEST
        let rc = unsafe {
            libc::sendto(
                self.fd,
                ptr::null(),
                0,
                libc::MSG_DONTWAIT,
                ptr::null(),
                0,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(RingError::inject_failed(err.to_string()));
            }
        }
        Ok(())
    }

    fn stats(&mut self) -> Result<StatsSnapshot, RingError> {
        self.ensure_mapped()?;
        let mut raw = TpacketStats::default();
        let mut len = mem::size_of::<TpacketStats>() as libc::socklen_t;
        let rc = unsafe {
            libc::getsockopt(
                self.fd,
                libc::SOL_PACKET,
                PACKET_STATISTICS,
                ptr::addr_of_mut!(raw) as *mut libc::c_void,
                &mut len,
            )
        };
        if rc != 0 {
            return Err(RingError::Stats(io::Error::last_os_error()));
        }

        // Kernel mereset counter setiap dibaca; tp_packets sudah termasuk drops
        self.stats
            .add_ring_delta(raw.tp_packets as u64, raw.tp_drops as u64);

        if let (Some(base), Some(now)) = (self.if_drop_baseline, self.read_if_dropped()) {
            self.stats.set_if_dropped(now.saturating_sub(base));
        }

        Ok(self.stats.snapshot())
    }

    fn release(&mut self) -> io::Result<()> {
        // Unmap dulu, baru close socket supaya kernel melepas ring
        drop(self.mmap.take());
        self.base = ptr::null_mut();

        if let Some(socket) = self.socket.take() {
            let fd = socket.into_raw_fd();
            if unsafe { libc::close(fd) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }
}

impl RingHandle<PacketRing> {
    /// Buka packet ring untuk device dengan geometri default
    pub fn open(device: &str) -> Result<Self, RingError> {
        Self::open_with(device, &RingConfig::default())
    }

    pub fn open_with(device: &str, config: &RingConfig) -> Result<Self, RingError> {
        let ring = PacketRing::open(device, config)?;
        Ok(RingHandle::from_backend(device, ring))
    }
}

fn set_opt<T>(socket: &OwnedFd, name: libc::c_int, value: &T) -> io::Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_PACKET,
            name,
            value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn bind(socket: &OwnedFd, ifindex: libc::c_uint) -> io::Result<()> {
    // SAFETY: sockaddr_ll adalah plain-old-data, zero valid
    let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
    addr.sll_family = libc::AF_PACKET as u16;
    addr.sll_protocol = ETH_P_ALL.to_be();
    addr.sll_ifindex = ifindex as i32;

    let rc = unsafe {
        libc::bind(
            socket.as_raw_fd(),
            ptr::addr_of!(addr) as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn page_size() -> u32 {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as u32
    }
}
