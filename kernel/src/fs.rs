//! Filesystem interface
//!
//! The contract a filesystem implements to plug into the kernel. The core
//! does not ship a filesystem; it guarantees that calls arrive serialized
//! per file handle unless the handle's documentation says otherwise, and
//! that every operation reports the canonical error codes.

use alloc::string::String;

use crate::devices::DeviceId;
use crate::errno::KResult;

/// Opaque handle to an open file
pub type FileHandle = u32;

/// Opaque handle to an open directory
pub type DirHandle = u32;

/// Seek origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(u64),
    Current(i64),
    End(i64),
}

/// File metadata
#[derive(Debug, Clone, Default)]
pub struct FileStat {
    pub size: u64,
    pub is_directory: bool,
    pub read_only: bool,
    pub created_ns: u64,
    pub modified_ns: u64,
}

/// One directory entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Filesystem-wide statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStat {
    pub block_size: u32,
    pub total_blocks: u64,
    pub free_blocks: u64,
}

/// A mountable filesystem
pub trait FileSystem: Send + Sync {
    /// Attach to a backing device
    fn mount(&self, device: DeviceId) -> KResult<()>;

    /// Flush and detach
    fn unmount(&self) -> KResult<()>;

    fn open(&self, path: &str) -> KResult<FileHandle>;
    fn close(&self, file: FileHandle) -> KResult<()>;
    fn read(&self, file: FileHandle, buf: &mut [u8]) -> KResult<usize>;
    fn write(&self, file: FileHandle, buf: &[u8]) -> KResult<usize>;
    fn seek(&self, file: FileHandle, from: SeekFrom) -> KResult<u64>;
    fn tell(&self, file: FileHandle) -> KResult<u64>;
    fn flush(&self, file: FileHandle) -> KResult<()>;
    fn stat(&self, path: &str) -> KResult<FileStat>;

    fn opendir(&self, path: &str) -> KResult<DirHandle>;
    /// `Ok(None)` marks the end of the directory
    fn readdir(&self, dir: DirHandle) -> KResult<Option<DirEntry>>;
    fn closedir(&self, dir: DirHandle) -> KResult<()>;

    fn mkdir(&self, path: &str) -> KResult<()>;
    fn rmdir(&self, path: &str) -> KResult<()>;
    fn unlink(&self, path: &str) -> KResult<()>;
    fn rename(&self, from: &str, to: &str) -> KResult<()>;

    fn statfs(&self) -> KResult<FsStat>;
}
