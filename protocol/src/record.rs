//! Per-call invocation records.
//!
//! A record is assembled on the calling thread's stack for every intercepted
//! call and handed to the record sink. Nothing in here allocates.

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Size of a task display name buffer, including the NUL terminator.
pub const COMM_LEN: usize = 16;

/// Inode number of the initial pid namespace.
///
/// Callers whose pid namespace resolves to this inode run at host level.
pub const HOST_PID_NS: u32 = 0xEFFF_FFFC;

/// Fixed-size process display name.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Comm {
    bytes: [u8; COMM_LEN],
    len: u8,
}

impl Comm {
    /// Build a name from raw bytes, stopping at the first NUL and keeping at
    /// most `COMM_LEN - 1` bytes.
    pub fn new(raw: &[u8]) -> Self {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let len = end.min(COMM_LEN - 1);
        let mut bytes = [0u8; COMM_LEN];
        bytes[..len].copy_from_slice(&raw[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// The longest valid UTF-8 prefix of the name.
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for Comm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Comm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Comm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Comm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Comm::new(s.as_bytes()))
    }
}

/// Context captured for one intercepted call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Process identifier of the caller.
    pub pid: i32,
    /// Display name of the caller.
    pub comm: Comm,
    /// Pid namespace identifier, 0 when the caller has no namespace association.
    pub ns: u32,
    /// Call-specific argument (the destination descriptor for write).
    pub arg: u64,
    /// CPU the call executed on.
    pub cpu: u32,
}

impl InvocationRecord {
    /// Whether the caller runs inside a child pid namespace.
    pub fn in_container(&self) -> bool {
        self.ns != 0 && self.ns != HOST_PID_NS
    }

    /// Text rendering with `label` naming the argument field.
    pub fn line<'a>(&'a self, label: &'a str) -> RecordLine<'a> {
        RecordLine {
            record: self,
            label,
        }
    }
}

impl fmt::Display for InvocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.line("arg").fmt(f)
    }
}

/// Lazily formatted single-line view of a record.
pub struct RecordLine<'a> {
    record: &'a InvocationRecord,
    label: &'a str,
}

impl fmt::Display for RecordLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.record;
        write!(
            f,
            "pid={} comm={} ns={} {}={} cpu={}",
            r.pid, r.comm, r.ns, self.label, r.arg, r.cpu
        )
    }
}
