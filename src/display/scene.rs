/// Scene model shared between the core and browser clients.
///
/// Draw operations are queued by commands and only become visible to
/// clients when a redraw pass flushes them. Every redraw bumps `revision`.
use super::{DisplayCommand, ViewEvent};
use crate::snapshot::FieldStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

const MIN_ZOOM: f64 = 0.05;
const MAX_ZOOM: f64 = 50.0;

/// Camera parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct View {
    pub theta: f64,
    pub phi: f64,
    pub zoom: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for View {
    fn default() -> Self {
        Self {
            theta: 0.0,
            phi: 0.0,
            zoom: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }
}

impl View {
    pub fn apply(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::Rotate { dx, dy } => {
                self.theta += dx;
                self.phi = (self.phi + dy).clamp(-90.0, 90.0);
            }
            ViewEvent::Zoom { factor } => {
                if factor.is_finite() && factor > 0.0 {
                    self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
                }
            }
            ViewEvent::Pan { dx, dy } => {
                self.tx += dx;
                self.ty += dy;
            }
            ViewEvent::Reset => *self = View::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawOp {
    Box,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorRange {
    pub field: String,
    pub min: f64,
    pub max: f64,
}

/// What clients receive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneFrame {
    pub revision: u64,
    pub time: f64,
    pub view: View,
    pub draw: Vec<DrawOp>,
    pub color_ranges: Vec<ColorRange>,
    pub loaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct Scene {
    view: View,
    pending: VecDeque<DrawOp>,
    drawn: Vec<DrawOp>,
    revision: u64,
    time: f64,
    color_ranges: Vec<ColorRange>,
    loaded_at: Option<DateTime<Utc>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_command(&mut self, command: DisplayCommand) {
        match command {
            DisplayCommand::Reset => self.view = View::default(),
            DisplayCommand::Clear => {
                self.pending.clear();
                self.drawn.clear();
            }
            DisplayCommand::DrawBox => self.pending.push_back(DrawOp::Box),
        }
    }

    pub fn apply_event(&mut self, event: ViewEvent) {
        self.view.apply(event);
    }

    /// Move up to `budget` pending operations into the visible draw list and
    /// start a new revision.
    pub fn flush(&mut self, budget: usize) -> usize {
        let n = budget.min(self.pending.len());
        self.drawn.extend(self.pending.drain(..n));
        self.revision += 1;
        n
    }

    pub fn set_color_ranges(&mut self, stats: &[FieldStats]) {
        self.color_ranges = stats
            .iter()
            .map(|s| ColorRange {
                field: s.name.clone(),
                min: s.min,
                max: s.max,
            })
            .collect();
        self.loaded_at = Some(Utc::now());
    }

    pub fn set_time(&mut self, t: f64) {
        self.time = t;
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn frame(&self) -> SceneFrame {
        SceneFrame {
            revision: self.revision,
            time: self.time,
            view: self.view,
            draw: self.drawn.clone(),
            color_ranges: self.color_ranges.clone(),
            loaded_at: self.loaded_at,
        }
    }
}
