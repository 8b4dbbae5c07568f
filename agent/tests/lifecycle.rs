mod common;

use std::sync::{mpsc, Arc, Mutex};

use anyhow::Result;
use hookwatch_agent::{LoadError, WatcherBuilder};
use hookwatch_intercept::{AddressResolver, Drain, HookError};
use hookwatch_agent::RecordSink;
use hookwatch_protocol::{ConfigError, Counter, InvocationRecord, HOST_PID_NS};

use common::{config, host, init_logging, write_regs, FakeTask, MemorySink};

#[test]
fn second_candidate_is_watched_end_to_end() -> Result<()> {
    init_logging();
    let table = host();
    let sink = Arc::new(MemorySink::default());

    let watcher = WatcherBuilder::new(config())
        .task(Arc::new(FakeTask::host_level()))
        .sink(sink.clone())
        .load(&*table, table.clone())?;
    assert_eq!(watcher.symbol(), "name_b");
    assert!(table.is_redirected("name_b"));
    assert_eq!(table.active_probes(), 0);

    std::thread::scope(|s| {
        for i in 0..5u64 {
            let table = &table;
            s.spawn(move || {
                assert_eq!(table.call("name_b", &write_regs(1, 10 + i)), Some(10 + i as i64));
            });
        }
    });

    let records = sink.records();
    assert_eq!(records.len(), 5);
    for record in &records {
        assert_eq!(record.pid, 1234);
        assert_eq!(record.comm.as_str(), "bash");
        assert_eq!(record.ns, HOST_PID_NS);
        assert_eq!(record.arg, 1);
        assert_eq!(record.cpu, 2);
    }

    let unloaded = watcher.unload();
    assert_eq!(unloaded.uninstall, Ok(Drain::Complete));
    assert_eq!(unloaded.report.get(Counter::Total), 5);
    assert_eq!(unloaded.report.get(Counter::Recorded), 5);
    assert_eq!(unloaded.report.get(Counter::Containerized), 0);

    // No longer intercepted.
    assert!(!table.is_redirected("name_b"));
    assert_eq!(table.call("name_b", &write_regs(1, 3)), Some(3));
    assert_eq!(sink.len(), 5);
    Ok(())
}

#[test]
fn thousands_of_concurrent_calls_are_all_counted() -> Result<()> {
    init_logging();
    let table = host();
    let sink = Arc::new(MemorySink::default());
    let watcher = WatcherBuilder::new(config())
        .task(Arc::new(FakeTask::host_level()))
        .sink(sink.clone())
        .load(&*table, table.clone())?;

    const THREADS: u64 = 8;
    const CALLS: u64 = 250;
    std::thread::scope(|s| {
        for t in 0..THREADS {
            let table = &table;
            s.spawn(move || {
                for i in 0..CALLS {
                    table.call("name_b", &write_regs(t, i));
                }
            });
        }
    });

    let unloaded = watcher.unload();
    assert_eq!(unloaded.uninstall, Ok(Drain::Complete));
    assert_eq!(unloaded.report.get(Counter::Total), THREADS * CALLS);
    assert_eq!(unloaded.report.get(Counter::Recorded), THREADS * CALLS);
    assert_eq!(sink.len() as u64, THREADS * CALLS);
    assert_eq!(table.in_flight(), 0);
    Ok(())
}

#[test]
fn missing_namespace_still_records_the_call() -> Result<()> {
    let table = host();
    let sink = Arc::new(MemorySink::default());
    let watcher = WatcherBuilder::new(config())
        .task(Arc::new(FakeTask::without_namespace()))
        .sink(sink.clone())
        .load(&*table, table.clone())?;

    assert_eq!(table.call("name_b", &write_regs(2, 8)), Some(8));

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].ns, 0);
    assert_eq!(records[0].pid, 1234);
    assert_eq!(records[0].arg, 2);

    let report = watcher.unload().report;
    assert_eq!(report.get(Counter::Degraded), 1);
    assert_eq!(report.get(Counter::Recorded), 1);
    Ok(())
}

#[test]
fn containerized_callers_are_counted() -> Result<()> {
    let table = host();
    let watcher = WatcherBuilder::new(config())
        .task(Arc::new(FakeTask::containerized()))
        .sink(Arc::new(MemorySink::default()))
        .load(&*table, table.clone())?;

    table.call("name_b", &write_regs(1, 1));
    table.call("name_b", &write_regs(1, 1));
    assert_eq!(watcher.snapshot().get(Counter::Containerized), 2);
    Ok(())
}

#[test]
fn unresolvable_candidates_fail_load() {
    let table = host();
    let err = WatcherBuilder::new(config().with_candidates(["name_a", "name_c"]))
        .sink(Arc::new(MemorySink::default()))
        .load(&*table, table.clone())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        LoadError::Hook(HookError::SymbolNotFound { ref candidates }) if candidates == &["name_a", "name_c"]
    ));
    assert_eq!(table.active_probes(), 0);
    assert!(!table.is_redirected("name_b"));
}

#[test]
fn rejected_redirect_fails_load_closed() {
    let table = host();
    let err = WatcherBuilder::new(config().with_candidates(["do_syscall_64", "name_b"]))
        .sink(Arc::new(MemorySink::default()))
        .load(&*table, table.clone())
        .err()
        .unwrap();
    assert!(matches!(err, LoadError::Hook(HookError::InstallRejected { .. })));
    assert!(!table.is_redirected("do_syscall_64"));
    assert!(!table.is_redirected("name_b"));
}

#[test]
fn invalid_config_fails_before_probing() {
    let table = host();
    let mut bad = config();
    bad.argument.index = 6;
    let err = WatcherBuilder::new(bad)
        .load(&*table, table.clone())
        .err()
        .unwrap();
    assert!(matches!(err, LoadError::Config(ConfigError::ArgumentIndex(6))));
    assert!(!table.is_redirected("name_b"));
}

#[test]
fn dropping_a_watcher_restores_the_entry() -> Result<()> {
    let table = host();
    let address = table.address_of("name_b");
    {
        let _watcher = WatcherBuilder::new(config())
            .task(Arc::new(FakeTask::host_level()))
            .sink(Arc::new(MemorySink::default()))
            .load(&*table, table.clone())?;
        assert!(table.is_redirected("name_b"));
    }
    assert!(!table.is_redirected("name_b"));

    let resolved = AddressResolver::new(&*table).resolve(&["name_b"])?;
    assert_eq!(Some(resolved.address()), address);
    Ok(())
}

#[test]
fn two_watchers_cannot_share_an_entry() -> Result<()> {
    let table = host();
    let _first = WatcherBuilder::new(config())
        .task(Arc::new(FakeTask::host_level()))
        .sink(Arc::new(MemorySink::default()))
        .load(&*table, table.clone())?;
    let err = WatcherBuilder::new(config())
        .task(Arc::new(FakeTask::host_level()))
        .sink(Arc::new(MemorySink::default()))
        .load(&*table, table.clone())
        .err()
        .unwrap();
    assert!(matches!(err, LoadError::Hook(HookError::InstallRejected { .. })));
    Ok(())
}

/// Holds the emitting call until released.
struct ParkedSink {
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl RecordSink for ParkedSink {
    fn emit(&self, _record: &InvocationRecord) {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
    }
}

#[test]
fn unload_with_call_in_flight_reports_timed_out_drain() -> Result<()> {
    init_logging();
    let table = host();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let mut config = config();
    config.drain_timeout_ms = 20;
    let watcher = WatcherBuilder::new(config)
        .task(Arc::new(FakeTask::host_level()))
        .sink(Arc::new(ParkedSink {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        }))
        .load(&*table, table.clone())?;

    let straggler = {
        let table = table.clone();
        std::thread::spawn(move || table.call("name_b", &write_regs(1, 7)))
    };
    entered_rx.recv()?;

    let unloaded = watcher.unload();
    assert_eq!(unloaded.uninstall, Ok(Drain::TimedOut));
    assert_eq!(unloaded.report.get(Counter::Total), 1);
    assert_eq!(unloaded.report.get(Counter::Recorded), 0);
    assert!(!table.is_redirected("name_b"));

    release_tx.send(())?;
    assert_eq!(straggler.join().unwrap(), Some(7));
    Ok(())
}
