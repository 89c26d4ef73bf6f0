/// Reload orchestration: re-ingest the snapshot and redraw from scratch.
///
/// Failures are logged and reported as `false`. They leave the previous
/// simulation state, the display and `last_reload_time` untouched, so the
/// next detected change can retry.
use crate::display::{DisplayCommand, Renderer, UNBOUNDED};
use crate::snapshot::{FieldSelection, Simulation, SnapshotError};
use crate::watch::WatchState;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Display commands issued, in order, after every successful ingest.
pub const REDRAW_SEQUENCE: [DisplayCommand; 3] = [
    DisplayCommand::Reset,
    DisplayCommand::Clear,
    DisplayCommand::DrawBox,
];

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("cannot open file for reload: {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not restore from '{path}': {source}")]
    Restore {
        path: PathBuf,
        #[source]
        source: SnapshotError,
    },
}

/// Reload the watched snapshot. Returns `true` on success.
pub fn reload<S, R>(state: &mut WatchState, sim: &mut S, renderer: &mut R) -> bool
where
    S: Simulation,
    R: Renderer,
{
    tracing::debug!(path = %state.path.display(), "attempting reload");

    if let Err(e) = ingest(&state.path, sim) {
        tracing::error!("{e}");
        return false;
    }

    refresh(sim, renderer);

    state.last_reload_time = renderer.now();
    tracing::info!(
        path = %state.path.display(),
        t = sim.time(),
        "reloaded snapshot"
    );
    true
}

/// Liveness probe followed by a full restore.
pub fn ingest<S: Simulation>(path: &Path, sim: &mut S) -> Result<(), ReloadError> {
    File::open(path).map_err(|e| ReloadError::Unavailable {
        path: path.to_path_buf(),
        source: e,
    })?;

    sim.restore(path, &FieldSelection::All)
        .map_err(|e| ReloadError::Restore {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Post-ingest consistency pass and full redraw.
fn refresh<S: Simulation, R: Renderer>(sim: &mut S, renderer: &mut R) {
    sim.restriction(&FieldSelection::All);
    renderer.set_color_ranges(&sim.field_stats());
    renderer.set_time(sim.time());

    for command in REDRAW_SEQUENCE {
        renderer.command(command);
    }
    renderer.force_redraw(UNBOUNDED);
}
