use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use migraviz::render::{RenderBackend, SvgBackend};
use migraviz::scheduler::TickScheduler;
use migraviz::session::simulation_loop;
use migraviz::source::{SnapshotSource, SourceError};
use migraviz::topology::{RawSnapshot, SnapshotError};
use migraviz::{Visualization, VizConfig};
use tracing::{info, warn};

pub(crate) struct HeadlessOptions {
    pub(crate) ticks: usize,
    pub(crate) steps: usize,
    pub(crate) svg_out: PathBuf,
}

/// Applies the initial snapshot and `steps` more, ticking each one under a
/// fresh scoped loop, then writes the final frame as SVG.
pub(crate) fn run(
    config: VizConfig,
    mut source: Box<dyn SnapshotSource>,
    options: HeadlessOptions,
) -> Result<()> {
    let mut scheduler =
        TickScheduler::new(config.schedule.tick_rate_hz, config.schedule.max_catch_up_ticks);
    let mut session = Visualization::new(config).context("invalid visualization config")?;

    let mut initial = Some(source.reset());
    let mut migrations = 0usize;
    for index in 0..=options.steps {
        let result = initial.take().unwrap_or_else(|| source.next_snapshot());
        match fetch_result(result)? {
            Fetch::Snapshot(raw) => {
                if let Ok(report) = session.apply_raw(raw) {
                    migrations += report.migrations.len();
                }
            }
            Fetch::Rejected(err) => session.record_rejection(&err),
            Fetch::Exhausted => break,
        }

        let scope = scheduler.start_scoped(simulation_loop(false));
        let ran = scheduler.run_ticks(&mut session, options.ticks);
        drop(scope);
        info!(
            snapshot = index,
            ticks = ran,
            settled = session.engine().is_settled(),
            "snapshot simulated"
        );
    }

    let frame = session.frame();
    for skipped in &frame.skipped {
        warn!(%skipped, "primitive left out of the final frame");
    }
    let mut backend = SvgBackend::new(true);
    backend.draw_frame(&frame);
    fs::write(&options.svg_out, backend.into_document())
        .with_context(|| format!("failed to write {}", options.svg_out.display()))?;

    info!(
        path = %options.svg_out.display(),
        snapshots = session.sequence(),
        migrations,
        diagnostics = session.diagnostics().len(),
        peak_load = session.series().peak_load(),
        "frame written"
    );
    Ok(())
}

enum Fetch {
    Snapshot(RawSnapshot),
    Rejected(SnapshotError),
    Exhausted,
}

fn fetch_result(result: Result<RawSnapshot, SourceError>) -> Result<Fetch> {
    match result {
        Ok(raw) => Ok(Fetch::Snapshot(raw)),
        Err(SourceError::Snapshot(err)) => Ok(Fetch::Rejected(err)),
        Err(SourceError::Exhausted) => Ok(Fetch::Exhausted),
        Err(err) => Err(err).context("snapshot source failed"),
    }
}
