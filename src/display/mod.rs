//! Rendering side of the viewer.
//!
//! The core talks to the display only through [`Renderer`]: a clock, a
//! bounded event poll, an ordered command channel and a redraw flush.
//! [`server::DisplayServer`] is the browser-backed implementation.

pub mod scene;
pub mod server;

use crate::snapshot::FieldStats;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Flush budget that asks the renderer to drain every pending draw operation.
pub const UNBOUNDED: usize = usize::MAX;

/// Opaque display commands issued by the reload path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayCommand {
    /// Put the camera back in its canonical position.
    Reset,
    /// Drop everything drawn so far.
    Clear,
    /// Queue the domain bounding box.
    DrawBox,
}

/// Interactive events sent by browser clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewEvent {
    Rotate { dx: f64, dy: f64 },
    Zoom { factor: f64 },
    Pan { dx: f64, dy: f64 },
    Reset,
}

pub trait Renderer {
    /// Display clock in seconds. Cadence and cooldown arithmetic use this.
    fn now(&self) -> f64;

    /// Wait up to `timeout` for interactive events. Returns `true` if any
    /// event was consumed.
    fn poll(&mut self, timeout: Duration) -> bool;

    fn command(&mut self, command: DisplayCommand);

    /// Flush up to `budget` pending draw operations. Returns how many were
    /// flushed.
    fn force_redraw(&mut self, budget: usize) -> usize;

    /// Update color-scale ranges from freshly computed statistics.
    fn set_color_ranges(&mut self, stats: &[FieldStats]);

    /// Time coordinate shown alongside the scene.
    fn set_time(&mut self, t: f64);

    /// Human-readable endpoint for operators.
    fn url(&self) -> String;
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Everything the core asked the renderer to do, in order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Command(DisplayCommand),
        ForceRedraw(usize),
        ColorRanges(Vec<String>),
        Time(f64),
    }

    /// Renderer double with a hand-driven clock and scripted events.
    #[derive(Debug, Default)]
    pub struct RecordingRenderer {
        pub clock: f64,
        pub pending_events: usize,
        pub calls: Vec<Call>,
        pub polls: usize,
    }

    impl RecordingRenderer {
        pub fn at(clock: f64) -> Self {
            Self {
                clock,
                ..Default::default()
            }
        }

        pub fn commands(&self) -> Vec<DisplayCommand> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Command(cmd) => Some(*cmd),
                    _ => None,
                })
                .collect()
        }
    }

    impl Renderer for RecordingRenderer {
        fn now(&self) -> f64 {
            self.clock
        }

        fn poll(&mut self, _timeout: Duration) -> bool {
            self.polls += 1;
            if self.pending_events > 0 {
                self.pending_events = 0;
                true
            } else {
                false
            }
        }

        fn command(&mut self, command: DisplayCommand) {
            self.calls.push(Call::Command(command));
        }

        fn force_redraw(&mut self, budget: usize) -> usize {
            self.calls.push(Call::ForceRedraw(budget));
            0
        }

        fn set_color_ranges(&mut self, stats: &[FieldStats]) {
            self.calls.push(Call::ColorRanges(
                stats.iter().map(|s| s.name.clone()).collect(),
            ));
        }

        fn set_time(&mut self, t: f64) {
            self.calls.push(Call::Time(t));
        }

        fn url(&self) -> String {
            "http://test.invalid".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_event_json_shape() {
        let event: ViewEvent = serde_json::from_str(r#"{"kind":"zoom","factor":1.5}"#).unwrap();
        assert_eq!(event, ViewEvent::Zoom { factor: 1.5 });

        let event: ViewEvent = serde_json::from_str(r#"{"kind":"reset"}"#).unwrap();
        assert_eq!(event, ViewEvent::Reset);
    }

    #[test]
    fn test_view_event_rejects_unknown_kind() {
        assert!(serde_json::from_str::<ViewEvent>(r#"{"kind":"spin"}"#).is_err());
    }
}
