//! Kernel error codes
//!
//! The canonical error table shared by the device manager, the thread and
//! task APIs and every driver. Functions return `Ok(value)` (zero or a
//! positive count at the FFI boundary) or one of these negative codes.

/// Canonical kernel error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    /// Unspecified failure
    General = -1,
    /// Null pointer, out-of-range id, malformed input
    Invalid = -2,
    /// Resource is in use
    Busy = -3,
    /// Operation timed out
    Timeout = -4,
    /// Operation not supported by this object
    Unsupported = -5,
    /// No medium present
    NoMedia = -6,
    /// I/O failure reported by a device
    Io = -7,
    /// No such device
    NoDevice = -8,
    /// Permission denied
    Access = -9,
    /// Out of slots, memory or other finite resource
    Resource = -10,
    /// Name already taken
    Exists = -11,
    /// Unknown id or name
    NotFound = -12,
    /// Non-blocking variant would have to block
    WouldBlock = -13,
    /// Caller does not own the object
    NotOwner = -14,
}

/// Result type used throughout the kernel
pub type KResult<T> = Result<T, Errno>;

impl Errno {
    /// Stable integer value of this error
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Short name for logging
    pub fn as_str(self) -> &'static str {
        match self {
            Errno::General => "general",
            Errno::Invalid => "invalid",
            Errno::Busy => "busy",
            Errno::Timeout => "timeout",
            Errno::Unsupported => "unsupported",
            Errno::NoMedia => "no-media",
            Errno::Io => "io",
            Errno::NoDevice => "no-device",
            Errno::Access => "access",
            Errno::Resource => "resource",
            Errno::Exists => "exists",
            Errno::NotFound => "not-found",
            Errno::WouldBlock => "would-block",
            Errno::NotOwner => "not-owner",
        }
    }
}

impl From<Errno> for i32 {
    fn from(e: Errno) -> i32 {
        e.as_i32()
    }
}

/// Collapse a `KResult<usize>` into the C-style convention: byte count on
/// success, negative code on failure.
pub fn as_return_code(res: KResult<usize>) -> i64 {
    match res {
        Ok(n) => n as i64,
        Err(e) => e.as_i32() as i64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_negative_and_distinct() {
        let all = [
            Errno::General,
            Errno::Invalid,
            Errno::Busy,
            Errno::Timeout,
            Errno::Unsupported,
            Errno::NoMedia,
            Errno::Io,
            Errno::NoDevice,
            Errno::Access,
            Errno::Resource,
            Errno::Exists,
            Errno::NotFound,
            Errno::WouldBlock,
            Errno::NotOwner,
        ];
        for (i, e) in all.iter().enumerate() {
            assert!(e.as_i32() < 0);
            for other in &all[i + 1..] {
                assert_ne!(e.as_i32(), other.as_i32());
            }
        }
    }

    #[test]
    fn return_code_convention() {
        assert_eq!(as_return_code(Ok(512)), 512);
        assert_eq!(as_return_code(Err(Errno::Io)), -7);
    }
}
