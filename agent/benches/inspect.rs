use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hookwatch_agent::{InvocationInspector, ProcSelf, RecordSink, StatsCounter, WatcherBuilder};
use hookwatch_intercept::{EntryTable, PtRegs};
use hookwatch_protocol::{FieldSet, InvocationRecord, WatchConfig};

struct NullSink;

impl RecordSink for NullSink {
    fn emit(&self, record: &InvocationRecord) {
        black_box(record);
    }
}

unsafe extern "C" fn sys_write(regs: *const PtRegs) -> i64 {
    (*regs).dx as i64
}

fn bench_inspect(c: &mut Criterion) {
    let regs = PtRegs::for_syscall(1, &[1, 0x7fff_0000, 64]);

    // All fields, real task reads.
    {
        let inspector = InvocationInspector::new(
            Arc::new(ProcSelf),
            FieldSet::default(),
            0,
            Arc::new(StatsCounter::new()),
        );
        c.bench_function("inspect_all_fields", |b| b.iter(|| inspector.inspect(black_box(&regs))));
    }

    // Identity only.
    {
        let fields = FieldSet {
            namespace: false,
            argument: false,
            cpu: false,
        };
        let inspector = InvocationInspector::new(Arc::new(ProcSelf), fields, 0, Arc::new(StatsCounter::new()));
        c.bench_function("inspect_identity_only", |b| b.iter(|| inspector.inspect(black_box(&regs))));
    }
}

fn bench_dispatch(c: &mut Criterion) {
    let regs = PtRegs::for_syscall(1, &[1, 0x7fff_0000, 64]);
    let table = Arc::new(EntryTable::builder().entry("sys_write", sys_write).build());

    c.bench_function("dispatch_unhooked", |b| {
        b.iter(|| table.call("sys_write", black_box(&regs)))
    });

    let watcher = WatcherBuilder::new(WatchConfig::default().with_candidates(["sys_write"]))
        .sink(Arc::new(NullSink))
        .load(&*table, table.clone())
        .unwrap();
    c.bench_function("dispatch_hooked", |b| {
        b.iter(|| table.call("sys_write", black_box(&regs)))
    });
    watcher.unload();
}

criterion_group!(benches, bench_inspect, bench_dispatch);
criterion_main!(benches);
