//! Types shared between the hookwatch intercept layer and the agent.

pub mod config;
pub mod record;
pub mod stats;

pub use config::{ArgumentSpec, ConfigError, FieldSet, RecordFormat, WatchConfig};
pub use record::{Comm, InvocationRecord, COMM_LEN, HOST_PID_NS};
pub use stats::{Counter, StatsReport};
