//! Snapshot store: loads the simulation state written by the producer.
//!
//! A snapshot is a JSON document holding the simulation time and a list of
//! scalar fields. Loading never mutates the current state unless the whole
//! document parses and validates, so a torn read leaves the previous
//! snapshot in place.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Errors produced while restoring a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid snapshot {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Which fields a restore or restriction pass should touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelection {
    All,
    Only(Vec<String>),
}

impl FieldSelection {
    fn includes(&self, name: &str) -> bool {
        match self {
            FieldSelection::All => true,
            FieldSelection::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Summary statistics for one field, used for color-scale ranges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldStats {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub count: usize,
}

/// The state-ingest side of the visualization.
pub trait Simulation {
    /// Replace the in-memory state with the contents of `path`.
    ///
    /// On error the previous state must be left untouched.
    fn restore(&mut self, path: &Path, fields: &FieldSelection) -> Result<(), SnapshotError>;

    /// Rebuild the coarse levels of the selected fields.
    fn restriction(&mut self, fields: &FieldSelection);

    fn field_stats(&self) -> Vec<FieldStats>;

    /// Simulation time coordinate of the loaded snapshot.
    fn time(&self) -> f64;
}

#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    t: f64,
    #[serde(default)]
    i: Option<u64>,
    #[serde(default)]
    fields: Vec<FieldDocument>,
}

#[derive(Debug, Deserialize)]
struct FieldDocument {
    name: String,
    values: Vec<f64>,
}

/// A loaded scalar field and its restriction levels.
///
/// `levels[0]` is the finest data as read from disk; each following level
/// halves the resolution until a single value remains.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub levels: Vec<Vec<f64>>,
}

impl Field {
    fn new(name: String, values: Vec<f64>) -> Self {
        Self {
            name,
            levels: vec![values],
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.levels[0]
    }

    fn restrict(&mut self) {
        self.levels.truncate(1);
        while let Some(last) = self.levels.last() {
            if last.len() <= 1 {
                break;
            }
            let coarse = restrict_level(last);
            self.levels.push(coarse);
        }
    }

    fn stats(&self) -> FieldStats {
        let values = self.values();
        let count = values.len();
        if count == 0 {
            return FieldStats {
                name: self.name.clone(),
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                stddev: 0.0,
                count,
            };
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        FieldStats {
            name: self.name.clone(),
            min,
            max,
            mean,
            stddev: variance.sqrt(),
            count,
        }
    }
}

/// Average neighbouring pairs; an odd trailing value is carried as-is.
fn restrict_level(fine: &[f64]) -> Vec<f64> {
    fine.chunks(2)
        .map(|pair| pair.iter().sum::<f64>() / pair.len() as f64)
        .collect()
}

/// In-memory simulation state restored from JSON snapshot files.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    time: f64,
    iteration: Option<u64>,
    fields: Vec<Field>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iteration(&self) -> Option<u64> {
        self.iteration
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn parse(path: &Path, bytes: &[u8]) -> Result<SnapshotDocument, SnapshotError> {
        let doc: SnapshotDocument =
            serde_json::from_slice(bytes).map_err(|e| SnapshotError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let invalid = |reason: String| SnapshotError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        if !doc.t.is_finite() {
            return Err(invalid(format!("non-finite time {}", doc.t)));
        }
        let mut seen = HashSet::new();
        for field in &doc.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field '{}'", field.name)));
            }
            if field.values.iter().any(|v| !v.is_finite()) {
                return Err(invalid(format!("non-finite value in field '{}'", field.name)));
            }
        }
        Ok(doc)
    }
}

impl Simulation for SnapshotStore {
    fn restore(&mut self, path: &Path, fields: &FieldSelection) -> Result<(), SnapshotError> {
        let bytes = std::fs::read(path).map_err(|e| SnapshotError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let doc = Self::parse(path, &bytes)?;

        let loaded: Vec<Field> = doc
            .fields
            .into_iter()
            .filter(|f| fields.includes(&f.name))
            .map(|f| Field::new(f.name, f.values))
            .collect();

        tracing::debug!(
            path = %path.display(),
            t = doc.t,
            fields = loaded.len(),
            "snapshot restored"
        );

        self.time = doc.t;
        self.iteration = doc.i;
        self.fields = loaded;
        Ok(())
    }

    fn restriction(&mut self, fields: &FieldSelection) {
        for field in self.fields.iter_mut().filter(|f| fields.includes(&f.name)) {
            field.restrict();
        }
    }

    fn field_stats(&self) -> Vec<FieldStats> {
        self.fields.iter().map(Field::stats).collect()
    }

    fn time(&self) -> f64 {
        self.time
    }
}
