//! Load/unload lifecycle: resolve the entry point, install the handler, and
//! report the counters once the hook is gone.

use std::sync::Arc;

use hookwatch_intercept::{AddressResolver, Drain, HookController, HookError, Redirector, SymbolProbe};
use hookwatch_protocol::{ConfigError, StatsReport, WatchConfig};
use log::{error, info, warn};
use thiserror::Error;

use crate::filter::CallFilter;
use crate::hooks::WatchHandler;
use crate::inspector::InvocationInspector;
use crate::sink::{LogSink, RecordSink};
use crate::stats::StatsCounter;
use crate::task::{CurrentTask, ProcSelf};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hook(#[from] HookError),
}

/// Collaborators for a [`Watcher`]; anything left unset uses the default.
pub struct WatcherBuilder {
    config: WatchConfig,
    task: Option<Arc<dyn CurrentTask>>,
    sink: Option<Arc<dyn RecordSink>>,
    filter: Option<Arc<dyn CallFilter>>,
}

impl WatcherBuilder {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            task: None,
            sink: None,
            filter: None,
        }
    }

    pub fn task(mut self, task: Arc<dyn CurrentTask>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn CallFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Validate the configuration, resolve the entry point through `probe`
    /// and redirect it through `redirector`.
    ///
    /// Nothing stays installed when this fails.
    pub fn load<P, R>(self, probe: &P, redirector: R) -> Result<Watcher<R>, LoadError>
    where
        P: SymbolProbe + ?Sized,
        R: Redirector,
    {
        let result = self.try_load(probe, redirector);
        if let Err(e) = &result {
            error!("hookwatch load failed: {}", e);
        }
        result
    }

    fn try_load<P, R>(self, probe: &P, redirector: R) -> Result<Watcher<R>, LoadError>
    where
        P: SymbolProbe + ?Sized,
        R: Redirector,
    {
        let config = self.config;
        config.validate()?;
        info!("hookwatch loading, scanning {} candidate(s)", config.candidates.len());

        let target = AddressResolver::new(probe).resolve(&config.candidates)?;
        let symbol = target.symbol().to_string();

        let stats = Arc::new(StatsCounter::new());
        let task = self
            .task
            .unwrap_or_else(|| Arc::new(ProcSelf) as Arc<dyn CurrentTask>);
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(LogSink::from_config(&config)) as Arc<dyn RecordSink>);
        let mode = if self.filter.is_some() { "filtering" } else { "observing" };
        let handler = WatchHandler {
            inspector: InvocationInspector::from_config(&config, task, stats.clone()),
            sink,
            filter: self.filter,
            stats: stats.clone(),
        };

        let controller = HookController::new(redirector).with_drain_timeout(config.drain_timeout());
        controller.install(target, Arc::new(handler))?;
        info!(
            "hookwatch loaded: {} {} ({} = argument {}, {:?} records)",
            mode, symbol, config.argument.label, config.argument.index, config.format
        );

        Ok(Watcher {
            controller,
            stats,
            symbol,
        })
    }
}

/// Outcome of [`Watcher::unload`].
#[derive(Debug)]
pub struct Unloaded {
    /// Counters read after the uninstall attempt. Final only when
    /// `uninstall` is `Ok(Drain::Complete)`; after a drain timeout, calls
    /// still running may bump counters past this snapshot.
    pub report: StatsReport,
    /// Whether the original entry point was restored, and whether in-flight
    /// calls drained before the report was taken.
    pub uninstall: Result<Drain, HookError>,
}

/// A loaded hook on one entry point, plus its counters.
///
/// Dropping a watcher without calling [`unload`](Watcher::unload) still
/// uninstalls the hook, but the report is lost.
pub struct Watcher<R: Redirector> {
    controller: HookController<R>,
    stats: Arc<StatsCounter>,
    symbol: String,
}

impl<R: Redirector> Watcher<R> {
    /// Symbol the hook was installed on.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_installed(&self) -> bool {
        self.controller.is_installed()
    }

    /// Live counter snapshot; may race with calls in flight.
    pub fn snapshot(&self) -> StatsReport {
        self.stats.report()
    }

    pub fn redirector(&self) -> &R {
        self.controller.redirector()
    }

    /// Uninstall the hook, then report the counters.
    pub fn unload(self) -> Unloaded {
        let uninstall = self.controller.uninstall();
        match &uninstall {
            Ok(Drain::Complete) => {}
            Ok(Drain::TimedOut) => warn!(
                "hookwatch stats for {} may be incomplete: calls still in flight",
                self.symbol
            ),
            Err(e) => error!("hookwatch could not restore {}: {}", self.symbol, e),
        }
        let report = self.stats.report();
        info!("hookwatch stats: {}", report);
        info!("hookwatch unloaded from {}", self.symbol);
        Unloaded { report, uninstall }
    }
}
