// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local fast path: mapping the service's backing file.
//!
//! When the server is co-resident, the client can read event data straight
//! out of the server's file-backed store instead of round-tripping over the
//! socket. The file opens with a fixed 64-byte header (geometry + byte
//! order); the data region is mapped separately once the header says where
//! it is.
//!
//! Every failure here is recoverable: the caller logs and falls back to
//! socket-only access. Nothing in this module is required for correctness.
//!
//! # Layout of the initial header block
//!
//! ```text
//! u32 byteOrderMarker | u32 systemType | u32 majorVersion | u32 minorVersion
//! | u32 selectInts | u32 headerSize | u64 eventByteSize | u64 headerPosition
//! | u64 dataPosition | u64 totalFileSize | u64 usedFileSize
//! ```

use crate::config::{ENDIAN_BIG, ENDIAN_LITTLE, INITIAL_HEADER_BYTES};
use parking_lot::Mutex;
use std::ffi::CString;
use std::io;

/// Fast-path errors. Never surfaced past the session layer.
#[derive(Debug)]
pub enum ShmError {
    /// Backing file could not be opened.
    Open(io::Error),
    /// Mapping the file failed.
    Mmap(io::Error),
    /// Unrecognized byte-order marker.
    BadMarker(u32),
    /// File smaller than its header block or than the geometry it claims.
    Truncated,
}

impl std::fmt::Display for ShmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(e) => write!(f, "cannot open backing file: {}", e),
            Self::Mmap(e) => write!(f, "cannot map backing file: {}", e),
            Self::BadMarker(m) => write!(f, "bad byte-order marker {:#010x}", m),
            Self::Truncated => write!(f, "backing file shorter than its header claims"),
        }
    }
}

impl std::error::Error for ShmError {}

/// Byte order of the backing file, from its marker word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrder {
    Big,
    Little,
}

impl FileOrder {
    fn read_u32(self, buf: &[u8; 4]) -> u32 {
        match self {
            Self::Big => u32::from_be_bytes(*buf),
            Self::Little => u32::from_le_bytes(*buf),
        }
    }

    fn read_u64(self, buf: &[u8; 8]) -> u64 {
        match self {
            Self::Big => u64::from_be_bytes(*buf),
            Self::Little => u64::from_le_bytes(*buf),
        }
    }
}

/// Parsed initial header block.
#[derive(Debug, Clone, Copy)]
pub struct SystemHeader {
    pub order: FileOrder,
    pub system_type: u32,
    pub major_version: u32,
    pub minor_version: u32,
    pub select_ints: u32,
    pub header_size: u32,
    pub event_byte_size: u64,
    pub header_position: u64,
    pub data_position: u64,
    pub total_file_size: u64,
    pub used_file_size: u64,
}

/// Parse the fixed header block, detecting byte order from the marker.
pub fn parse_header(block: &[u8; INITIAL_HEADER_BYTES]) -> Result<SystemHeader, ShmError> {
    let marker = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
    let order = match marker {
        ENDIAN_BIG => FileOrder::Big,
        ENDIAN_LITTLE => FileOrder::Little,
        other => return Err(ShmError::BadMarker(other)),
    };

    let u32_at = |off: usize| {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&block[off..off + 4]);
        order.read_u32(&raw)
    };
    let u64_at = |off: usize| {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&block[off..off + 8]);
        order.read_u64(&raw)
    };

    Ok(SystemHeader {
        order,
        system_type: u32_at(4),
        major_version: u32_at(8),
        minor_version: u32_at(12),
        select_ints: u32_at(16),
        header_size: u32_at(20),
        event_byte_size: u64_at(24),
        header_position: u64_at(32),
        data_position: u64_at(40),
        total_file_size: u64_at(48),
        used_file_size: u64_at(56),
    })
}

/// A mapped view of the data region of the backing file.
///
/// Unmapped on drop. The mapping start is page-aligned; `ptr()` points at
/// the requested data offset inside it.
pub struct SharedRegion {
    map_ptr: *mut u8,
    map_len: usize,
    delta: usize,
    len: usize,
}

// SAFETY: the region is plain shared memory owned by the server process;
// this handle only carries the pointer and is consumed by one session.
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    /// Start of the data region.
    pub fn ptr(&self) -> *mut u8 {
        // SAFETY: delta is within the mapping by construction.
        unsafe { self.map_ptr.add(self.delta) }
    }

    /// Length of the data region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: map_ptr/map_len came from a successful mmap and are
        // unmapped exactly once.
        unsafe {
            libc::munmap(self.map_ptr.cast::<libc::c_void>(), self.map_len);
        }
    }
}

/// Successful fast-path attachment.
pub struct FastPath {
    pub header: SystemHeader,
    pub region: SharedRegion,
    pub accessor: Option<Box<dyn LocalAccessor>>,
}

impl std::fmt::Debug for FastPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastPath")
            .field("header", &self.header)
            .field("accessor", &self.accessor.is_some())
            .finish_non_exhaustive()
    }
}

/// Attach to the backing file at `path` (the system name is its path).
pub fn attach(path: &str) -> Result<FastPath, ShmError> {
    let fd = open_file(path)?;
    let result = attach_fd(fd, path);
    // SAFETY: fd is valid from open_file; mappings keep their own reference.
    unsafe { libc::close(fd) };
    result
}

fn open_file(path: &str) -> Result<libc::c_int, ShmError> {
    let c_path =
        CString::new(path).map_err(|_| ShmError::Open(io::ErrorKind::InvalidInput.into()))?;
    // SAFETY: c_path is a valid NUL-terminated string; open returns -1 on
    // error (checked below).
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR) };
    if fd < 0 {
        return Err(ShmError::Open(io::Error::last_os_error()));
    }
    Ok(fd)
}

fn attach_fd(fd: libc::c_int, path: &str) -> Result<FastPath, ShmError> {
    let file_size = file_size(fd)?;
    if file_size < INITIAL_HEADER_BYTES as u64 {
        return Err(ShmError::Truncated);
    }

    // Map just the header block first; the real geometry is inside it.
    let mut block = [0u8; INITIAL_HEADER_BYTES];
    {
        // SAFETY: fd is valid, the file is at least INITIAL_HEADER_BYTES
        // long (checked above), offset 0 is page-aligned.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                INITIAL_HEADER_BYTES,
                libc::PROT_READ,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ShmError::Mmap(io::Error::last_os_error()));
        }
        // SAFETY: ptr maps exactly INITIAL_HEADER_BYTES readable bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(
                ptr.cast::<u8>(),
                block.as_mut_ptr(),
                INITIAL_HEADER_BYTES,
            );
            libc::munmap(ptr, INITIAL_HEADER_BYTES);
        }
    }

    let header = parse_header(&block)?;

    // The data mapping covers dataPosition .. dataPosition + used + header
    // block, as the server lays it out. Refuse geometry the file cannot
    // hold; touching pages past EOF is a bus error, not an io::Error.
    let data_len = header
        .used_file_size
        .checked_add(INITIAL_HEADER_BYTES as u64)
        .ok_or(ShmError::Truncated)?;
    let data_end = header
        .data_position
        .checked_add(data_len)
        .ok_or(ShmError::Truncated)?;
    if data_end > file_size {
        return Err(ShmError::Truncated);
    }

    // SAFETY: sysconf on _SC_PAGESIZE has no preconditions.
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
    let map_off = header.data_position & !(page - 1);
    let delta = (header.data_position - map_off) as usize;
    let map_len = data_len as usize + delta;

    // SAFETY: map_off is page-aligned, map_off + map_len <= file size
    // (checked above), fd is valid.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            map_len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            map_off as libc::off_t,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(ShmError::Mmap(io::Error::last_os_error()));
    }

    let region = SharedRegion {
        map_ptr: ptr.cast::<u8>(),
        map_len,
        delta,
        len: data_len as usize,
    };

    let accessor = open_accessor(path);
    log::debug!(
        "[SHM] attached {} data region {} bytes at offset {} (accessor: {})",
        path,
        region.len(),
        header.data_position,
        accessor.is_some()
    );

    Ok(FastPath {
        header,
        region,
        accessor,
    })
}

fn file_size(fd: libc::c_int) -> Result<u64, ShmError> {
    // SAFETY: stat is zero-initializable; fstat fills it for a valid fd.
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: fd is valid, stat points to a properly sized buffer.
    let ret = unsafe { libc::fstat(fd, &mut stat) };
    if ret != 0 {
        return Err(ShmError::Open(io::Error::last_os_error()));
    }
    Ok(stat.st_size as u64)
}

// ============================================================================
// Native accessor capability
// ============================================================================

/// Native event accessor for a co-resident server.
///
/// Registered by platform integrations; absence is never an error, only a
/// missing optimization.
pub trait LocalAccessor: Send {
    /// System name this accessor is attached to.
    fn system(&self) -> &str;
}

/// Factory producing an accessor for a system name.
pub type AccessorFactory = fn(&str) -> io::Result<Box<dyn LocalAccessor>>;

static ACCESSOR_FACTORY: Mutex<Option<AccessorFactory>> = Mutex::new(None);

/// Install the process-wide accessor factory. Later registrations replace
/// earlier ones.
pub fn register_accessor_factory(factory: AccessorFactory) {
    *ACCESSOR_FACTORY.lock() = Some(factory);
}

fn open_accessor(name: &str) -> Option<Box<dyn LocalAccessor>> {
    let factory = (*ACCESSOR_FACTORY.lock())?;
    match factory(name) {
        Ok(accessor) => Some(accessor),
        Err(e) => {
            log::debug!("[SHM] native accessor unavailable for {}: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_backing_file(used: u64) -> tempfile::NamedTempFile {
        let data_position = INITIAL_HEADER_BYTES as u64;
        let total = data_position + used + INITIAL_HEADER_BYTES as u64;

        let mut buf = Vec::new();
        buf.extend_from_slice(&ENDIAN_BIG.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes()); // system type
        buf.extend_from_slice(&1u32.to_be_bytes()); // major
        buf.extend_from_slice(&0u32.to_be_bytes()); // minor
        buf.extend_from_slice(&6u32.to_be_bytes()); // select ints
        buf.extend_from_slice(&64u32.to_be_bytes()); // header size
        buf.extend_from_slice(&4096u64.to_be_bytes()); // event byte size
        buf.extend_from_slice(&0u64.to_be_bytes()); // header position
        buf.extend_from_slice(&data_position.to_be_bytes());
        buf.extend_from_slice(&total.to_be_bytes());
        buf.extend_from_slice(&used.to_be_bytes());
        buf.resize(total as usize, 0xAB);

        let mut file = tempfile::NamedTempFile::new().expect("temp file should create");
        file.write_all(&buf).expect("write should succeed");
        file.flush().expect("flush should succeed");
        file
    }

    #[test]
    fn attach_parses_header_and_maps_data() {
        let file = write_backing_file(128);
        let path = file.path().to_str().unwrap();

        let fast = attach(path).expect("attach should succeed");
        assert_eq!(fast.header.order, FileOrder::Big);
        assert_eq!(fast.header.select_ints, 6);
        assert_eq!(fast.header.event_byte_size, 4096);
        assert_eq!(fast.header.used_file_size, 128);
        assert_eq!(fast.region.len(), 128 + INITIAL_HEADER_BYTES);
        assert!(!fast.region.is_empty());

        // Data region starts right past the header block: filler bytes.
        // SAFETY: region is mapped and at least 1 byte long.
        let first = unsafe { *fast.region.ptr() };
        assert_eq!(first, 0xAB);
    }

    #[test]
    fn little_endian_marker_is_detected() {
        let mut block = [0u8; INITIAL_HEADER_BYTES];
        block[0..4].copy_from_slice(&ENDIAN_BIG.to_le_bytes());
        block[16..20].copy_from_slice(&6u32.to_le_bytes());
        let header = parse_header(&block).expect("header should parse");
        assert_eq!(header.order, FileOrder::Little);
        assert_eq!(header.select_ints, 6);
    }

    #[test]
    fn bad_marker_is_rejected() {
        let mut block = [0u8; INITIAL_HEADER_BYTES];
        block[0..4].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        assert!(matches!(
            parse_header(&block),
            Err(ShmError::BadMarker(0x1234_5678))
        ));
    }

    #[test]
    fn truncated_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file should create");
        file.write_all(&[0u8; 10]).expect("write should succeed");
        file.flush().expect("flush should succeed");

        let err = attach(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ShmError::Truncated));
    }

    #[test]
    fn file_shorter_than_claimed_geometry_is_rejected() {
        let file = write_backing_file(128);
        let path = file.path().to_str().unwrap().to_string();
        // Chop the data region off the end.
        let file_std = std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .expect("reopen should succeed");
        file_std
            .set_len(INITIAL_HEADER_BYTES as u64 + 16)
            .expect("truncate should succeed");

        let err = attach(&path).unwrap_err();
        assert!(matches!(err, ShmError::Truncated));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = attach("/no/such/backing/file").unwrap_err();
        assert!(matches!(err, ShmError::Open(_)));
    }

    struct FakeAccessor(String);
    impl LocalAccessor for FakeAccessor {
        fn system(&self) -> &str {
            &self.0
        }
    }

    #[test]
    fn accessor_factory_round_trip() {
        register_accessor_factory(|name| Ok(Box::new(FakeAccessor(name.to_string()))));
        let accessor = open_accessor("ring0").expect("factory should produce");
        assert_eq!(accessor.system(), "ring0");
        *ACCESSOR_FACTORY.lock() = None;
    }
}
