//! hookwatch-agent: per-call inspection, counters and the load/unload
//! lifecycle of a syscall entry-point watcher.
//!
//! A [`Watcher`] resolves one entry point from a list of candidate symbols,
//! redirects it to a handler that records the calling task, and restores it
//! on unload:
//!
//! ```no_run
//! use hookwatch_agent::WatcherBuilder;
//! use hookwatch_intercept::EntryTable;
//! use hookwatch_protocol::WatchConfig;
//!
//! # fn host() -> EntryTable { EntryTable::builder().build() }
//! let table = host();
//! let watcher = WatcherBuilder::new(WatchConfig::default()).load(&table, &table)?;
//! // ... calls through `table` are now recorded ...
//! let unloaded = watcher.unload();
//! println!("{}", unloaded.report);
//! # Ok::<(), hookwatch_agent::LoadError>(())
//! ```

pub mod filter;
pub mod hooks;
pub mod inspector;
pub mod sink;
pub mod stats;
pub mod task;
pub mod watcher;

pub use filter::{CallFilter, ContainerArgumentFilter, Verdict};
pub use hooks::{is_in_hook, ReentryGuard};
pub use inspector::InvocationInspector;
pub use sink::{LogSink, RecordSink, RECORD_TARGET};
pub use stats::StatsCounter;
pub use task::{CurrentTask, ProcSelf};
pub use watcher::{LoadError, Unloaded, Watcher, WatcherBuilder};
