//! Report generators and the machinery to run them. Each report walks one kernel
//! structure and writes a plain text table; reports share a read-only `Session` and can
//! run on worker threads.
mod devices;
mod modules;
mod pagecache;
mod pids;
mod session;
mod sink;
pub mod tables;
mod tasks;
mod vmalloc;

pub use devices::Devices;
pub use modules::Modules;
pub use pagecache::PageCache;
pub use pids::Pids;
pub use session::{LAYOUT, Session};
pub use sink::{DirSink, MemorySink, ReportSink};
pub use tasks::Tasks;
pub use vmalloc::Vmalloc;

use crate::debug::VersionRange;
use crate::error::{Error, Result};
use crate::walk::{Walk, WalkEnd};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tracing::{debug, error, info, warn};

pub trait Report: Sync {
    /// Also the name of the output file, minus the `.txt`.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Kernels this report understands. Others are skipped.
    fn supported(&self) -> VersionRange {
        VersionRange::any()
    }

    fn generate(&self, session: &Session, out: &mut dyn Write) -> Result<()>;
}

#[derive(Debug)]
pub enum Outcome {
    Written,
    Skipped(String),
    Failed(Error),
}

#[derive(Debug)]
pub struct ReportResult {
    pub name: &'static str,
    pub outcome: Outcome,
}

impl ReportResult {
    pub fn is_written(&self) -> bool {
        matches!(self.outcome, Outcome::Written)
    }
}

static ALL: &[&dyn Report] = &[&Modules, &Vmalloc, &Devices, &PageCache, &Tasks, &Pids];

pub fn all_reports() -> &'static [&'static dyn Report] {
    ALL
}

pub fn find_report(name: &str) -> Option<&'static dyn Report> {
    ALL.iter().copied().find(|r| r.name() == name)
}

/// Generates one report into memory and only hands it to the sink if it succeeded, so
/// a failed report never leaves a half written file behind.
pub fn run_report(session: &Session, report: &dyn Report, sink: &dyn ReportSink) -> ReportResult {
    let name = report.name();
    let outcome = if session.is_aborted() {
        Outcome::Skipped("aborted".to_string())
    } else if let Err(err) = report.supported().check(session.version) {
        info!("skipping {name}: {err}");
        Outcome::Skipped(err.to_string())
    } else {
        let mut buffer = Vec::new();
        match report.generate(session, &mut buffer).and_then(|_| write_to(sink, name, &buffer)) {
            Ok(()) => {
                debug!("wrote {name} ({} bytes)", buffer.len());
                Outcome::Written
            }
            Err(err) if err.is_recoverable() => {
                warn!("{name} failed: {err}");
                Outcome::Failed(err)
            }
            Err(err) => {
                error!("{name} failed: {err}");
                Outcome::Failed(err)
            }
        }
    };
    ReportResult { name, outcome }
}

fn write_to(sink: &dyn ReportSink, name: &str, bytes: &[u8]) -> Result<()> {
    let mut out = sink.open(name)?;
    out.write_all(bytes)?;
    out.flush()?;
    Ok(())
}

/// Runs each report, on its own thread if `parallel`. Results come back in the same
/// order as `reports` whatever happens to the individual reports.
pub fn run_reports(
    session: &Session,
    reports: &[&dyn Report],
    sink: &dyn ReportSink,
    parallel: bool,
) -> Vec<ReportResult> {
    if !parallel {
        return reports.iter().map(|r| run_guarded(session, *r, sink)).collect();
    }

    thread::scope(|scope| {
        let handles: Vec<_> = reports
            .iter()
            .map(|report| {
                let report = *report;
                let handle = thread::Builder::new()
                    .name(report.name().to_string())
                    .spawn_scoped(scope, move || run_guarded(session, report, sink));
                (report.name(), handle)
            })
            .collect();

        // Joining every handle here keeps a panicking report from taking down the scope.
        handles
            .into_iter()
            .map(|(name, handle)| {
                let outcome = match handle {
                    Ok(handle) => match handle.join() {
                        Ok(result) => return result,
                        Err(_) => Outcome::Failed(Error::Panicked(name.to_string())),
                    },
                    Err(err) => Outcome::Failed(Error::Io(err)),
                };
                warn!("{name}: {outcome:?}");
                ReportResult { name, outcome }
            })
            .collect()
    })
}

/// A report that panics fails on its own instead of taking the rest down with it.
fn run_guarded(session: &Session, report: &dyn Report, sink: &dyn ReportSink) -> ReportResult {
    let name = report.name();
    panic::catch_unwind(AssertUnwindSafe(|| run_report(session, report, sink))).unwrap_or_else(|_| {
        warn!("{name} panicked");
        ReportResult {
            name,
            outcome: Outcome::Failed(Error::Panicked(name.to_string())),
        }
    })
}

/// Lists whatever went wrong under a report's table. Aborted walks fail the report.
fn write_problems(out: &mut dyn Write, what: &str, walk: &Walk, skipped: &[Error]) -> Result<()> {
    if walk.end == WalkEnd::Aborted {
        return Err(Error::Aborted);
    }
    if walk.end == WalkEnd::Truncated {
        writeln!(out)?;
        writeln!(out, "warning: {what} walk stopped early after {} entries", walk.visited)?;
    }
    if !walk.diagnostics.is_empty() || !skipped.is_empty() {
        writeln!(out)?;
        for err in walk.diagnostics.iter().chain(skipped) {
            writeln!(out, "! {err}")?;
        }
    }
    Ok(())
}
