#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use hookwatch_agent::{CurrentTask, RecordSink};
use hookwatch_intercept::{EntryTable, PtRegs};
use hookwatch_protocol::{Comm, InvocationRecord, WatchConfig, HOST_PID_NS};

static INIT: Once = Once::new();

/// Route log output through the test harness.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Number of the write syscall on x86-64.
pub const NR_WRITE: u64 = 1;

unsafe extern "C" fn name_b(regs: *const PtRegs) -> i64 {
    // write(fd, buf, count) -> count
    (*regs).dx as i64
}

unsafe extern "C" fn sys_getpid(_regs: *const PtRegs) -> i64 {
    4242
}

unsafe extern "C" fn do_syscall_64(regs: *const PtRegs) -> i64 {
    -((*regs).orig_ax as i64)
}

/// A host exposing `name_b` (a write-like entry), `sys_getpid` and a
/// non-redirectable `do_syscall_64`. `name_a` does not exist.
pub fn host() -> Arc<EntryTable> {
    Arc::new(
        EntryTable::builder()
            .entry("name_b", name_b)
            .entry("sys_getpid", sys_getpid)
            .notrace_entry("do_syscall_64", do_syscall_64)
            .build(),
    )
}

pub fn config() -> WatchConfig {
    WatchConfig::default().with_candidates(["name_a", "name_b"])
}

pub fn write_regs(fd: u64, count: u64) -> PtRegs {
    PtRegs::for_syscall(NR_WRITE, &[fd, 0x7fff_0000, count])
}

/// A calling task with fixed identity.
pub struct FakeTask {
    pub pid: i32,
    pub comm: &'static str,
    pub ns: Option<u32>,
    pub cpu: u32,
}

impl FakeTask {
    pub fn host_level() -> Self {
        Self {
            pid: 1234,
            comm: "bash",
            ns: Some(HOST_PID_NS),
            cpu: 2,
        }
    }

    pub fn containerized() -> Self {
        Self {
            ns: Some(0xF000_0042),
            comm: "nginx",
            ..Self::host_level()
        }
    }

    pub fn without_namespace() -> Self {
        Self {
            ns: None,
            ..Self::host_level()
        }
    }
}

impl CurrentTask for FakeTask {
    fn pid(&self) -> i32 {
        self.pid
    }

    fn comm(&self) -> Option<Comm> {
        Some(Comm::new(self.comm.as_bytes()))
    }

    fn pid_namespace(&self) -> Option<u32> {
        self.ns
    }

    fn cpu(&self) -> Option<u32> {
        Some(self.cpu)
    }
}

/// Collects every emitted record.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<InvocationRecord>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<InvocationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: &InvocationRecord) {
        self.records.lock().unwrap().push(*record);
    }
}
