use super::open_session;
use crate::cli::{ExplainArgs, RunArgs};
use anyhow::bail;
use ramscope::reports::tables::{SimpleTableBuilder, TableBuilder};
use ramscope::reports::{DirSink, Outcome, Report, all_reports, find_report, run_reports};
use std::io::{self, Write};
use tracing::info;

pub fn list_reports(args: &ExplainArgs) -> anyhow::Result<()> {
    let mut b = SimpleTableBuilder::new();
    for report in all_reports() {
        let supported = report.supported().to_string();
        b.add_str_row(report.name(), report.description().to_string(), &format!("kernels {supported}"));
    }
    b.write(&mut io::stdout().lock(), args.explain)?;
    Ok(())
}

pub fn run(args: &RunArgs) -> anyhow::Result<()> {
    let reports: Vec<&dyn Report> = if args.reports.is_empty() {
        all_reports().to_vec()
    } else {
        let mut reports = Vec::new();
        for name in &args.reports {
            match find_report(name) {
                Some(report) => reports.push(report),
                None => {
                    let known: Vec<_> = all_reports().iter().map(|r| r.name()).collect();
                    bail!("no report named {name}, try one of {}", known.join(", "));
                }
            }
        }
        reports
    };

    let mut session = open_session(&args.session)?;
    session.explain = args.explain;
    session.max_steps = args.max_steps;

    let sink = DirSink::new(&args.output)?;
    info!("writing reports to {}", args.output.display());
    let results = run_reports(&session, &reports, &sink, !args.serial);

    let mut builder = TableBuilder::new();
    builder.add_col_l("report", "report name");
    builder.add_col_l("outcome", "written, skipped or failed");
    builder.add_col_l("detail", "why the report was skipped or failed");
    let mut failed = 0;
    for result in &results {
        let (outcome, detail) = match &result.outcome {
            Outcome::Written => ("written", sink.path(result.name).display().to_string()),
            Outcome::Skipped(why) => ("skipped", why.clone()),
            Outcome::Failed(err) => {
                failed += 1;
                ("failed", err.to_string())
            }
        };
        builder.add_str_field("report", result.name.to_string());
        builder.add_str_field("outcome", outcome.to_string());
        builder.add_str_field("detail", detail);
    }
    let mut out = io::stdout().lock();
    builder.write(&mut out, true, args.explain)?;

    if failed > 0 {
        writeln!(out)?;
        bail!("{failed} of {} reports failed", results.len());
    }
    Ok(())
}
