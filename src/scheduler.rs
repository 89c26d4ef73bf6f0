/// Single-threaded viewer loop.
///
/// Each iteration polls the display for interactive events with a short
/// timeout, checks the snapshot at the configured cadence, reloads when a
/// change is seen and the cooldown allows it, then sleeps briefly. A change
/// that arrives during the cooldown is dropped, not queued.
use crate::config::SchedulerConfig;
use crate::display::{DisplayCommand, Renderer, UNBOUNDED};
use crate::reload;
use crate::snapshot::{FieldSelection, Simulation, SnapshotError};
use crate::watch::WatchState;
use std::path::Path;
use std::time::Duration;

/// Result of a periodic file check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Unchanged,
    Reloaded,
    ReloadFailed,
    CooldownSkipped,
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// An interactive event was handled and a redraw forced.
    pub event_redraw: bool,
    /// `None` when no check was due.
    pub check: Option<CheckOutcome>,
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub poll_timeout: Duration,
    pub idle_sleep: Duration,
}

impl From<&SchedulerConfig> for Timing {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            idle_sleep: Duration::from_millis(config.idle_sleep_ms),
        }
    }
}

/// Mandatory blocking load done before anything else. There is no previous
/// state to fall back on, so the caller treats failure as fatal.
pub fn initial_load<S: Simulation>(path: &Path, sim: &mut S) -> Result<(), SnapshotError> {
    tracing::info!(path = %path.display(), "loading snapshot");
    sim.restore(path, &FieldSelection::All)
}

pub struct Scheduler<S, R> {
    state: WatchState,
    sim: S,
    renderer: R,
    timing: Timing,
}

impl<S: Simulation, R: Renderer> Scheduler<S, R> {
    /// Take over an already-loaded simulation: record the size baseline,
    /// start the cooldown and cadence clocks and draw the first frame.
    pub fn new(mut state: WatchState, mut sim: S, mut renderer: R, timing: Timing) -> Self {
        state.last_known_size = None;
        state.detect();
        state.last_reload_time = renderer.now();

        sim.restriction(&FieldSelection::All);
        renderer.set_color_ranges(&sim.field_stats());
        renderer.set_time(sim.time());

        renderer.command(DisplayCommand::DrawBox);
        renderer.force_redraw(UNBOUNDED);

        state.last_check_time = renderer.now();

        Self {
            state,
            sim,
            renderer,
            timing,
        }
    }

    pub fn state(&self) -> &WatchState {
        &self.state
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// One loop iteration, without the trailing idle sleep.
    pub fn tick(&mut self) -> Tick {
        let event_redraw = self.renderer.poll(self.timing.poll_timeout);
        if event_redraw {
            self.renderer.force_redraw(UNBOUNDED);
        }

        let now = self.renderer.now();
        if !self.state.check_due(now) {
            return Tick {
                event_redraw,
                check: None,
            };
        }
        self.state.last_check_time = now;

        let check = if !self.state.detect() {
            CheckOutcome::Unchanged
        } else if !self.state.cooldown_elapsed(now) {
            tracing::debug!(
                since_reload = now - self.state.last_reload_time,
                "snapshot changed, waiting for reload cooldown"
            );
            CheckOutcome::CooldownSkipped
        } else if reload::reload(&mut self.state, &mut self.sim, &mut self.renderer) {
            CheckOutcome::Reloaded
        } else {
            CheckOutcome::ReloadFailed
        };

        Tick {
            event_redraw,
            check: Some(check),
        }
    }

    /// Run forever. The process ends by signal.
    pub fn run(mut self) -> ! {
        loop {
            self.tick();
            std::thread::sleep(self.timing.idle_sleep);
        }
    }
}

#[cfg(test)]
impl<S, R> Scheduler<S, R> {
    fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    fn sim(&self) -> &S {
        &self.sim
    }
}
