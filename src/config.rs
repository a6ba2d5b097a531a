//! Engine configuration.
//!
//! All tunable policy constants live here rather than being hard-coded at
//! their use sites. Loaded from and saved to a JSON file; unknown fields are
//! ignored so older engines can open newer config files.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::OrilabelError;

/// Target split ratios. The remainder after train and val goes to test.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.7,
            val: 0.2,
            test: 0.1,
        }
    }
}

/// Tunable policy constants for the annotation engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Proposals below this detector confidence are dropped outright.
    pub confidence_threshold: f64,

    /// A proposal overlapping an existing same-class annotation by more than
    /// this IoU is treated as redundant and discarded.
    pub iou_dedup_threshold: f64,

    /// Maximum undo entries retained per image; oldest dropped silently.
    pub undo_depth: usize,

    /// Seconds between autosave ticks.
    pub autosave_interval_secs: u64,

    /// How many project backups to retain before pruning the oldest.
    pub backup_retention: usize,

    /// Minimum box side length in pixels; shorter boxes are rejected.
    pub min_box_side: f64,

    /// Hit-test radius for corner/edge/rotation handles, in pixels.
    pub handle_tolerance: f64,

    /// A draw gesture shorter than this is treated as a click, not a box.
    pub min_drag_distance: f64,

    /// Arrow-key nudge step in pixels.
    pub nudge_step: f64,

    /// Default split ratios for `assign_split`.
    pub split_ratios: SplitRatios,

    /// Seed for the deterministic split shuffle.
    pub split_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_dedup_threshold: 0.5,
            undo_depth: 100,
            autosave_interval_secs: 300,
            backup_retention: 10,
            min_box_side: 2.0,
            handle_tolerance: 6.0,
            min_drag_distance: 4.0,
            nudge_step: 1.0,
            split_ratios: SplitRatios::default(),
            split_seed: 42,
        }
    }
}

impl EngineConfig {
    /// Loads a config file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, OrilabelError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        let config: Self =
            serde_json::from_str(&data).map_err(|source| OrilabelError::ProjectParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), OrilabelError> {
        self.validate()?;
        let json =
            serde_json::to_string_pretty(self).map_err(|source| OrilabelError::ProjectWrite {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Rejects out-of-range values before they can corrupt engine behavior.
    pub fn validate(&self) -> Result<(), OrilabelError> {
        let fail = |message: String| Err(OrilabelError::ConfigInvalid { message });

        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return fail(format!(
                "confidence_threshold {} outside [0, 1]",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_dedup_threshold) {
            return fail(format!(
                "iou_dedup_threshold {} outside [0, 1]",
                self.iou_dedup_threshold
            ));
        }
        if self.undo_depth == 0 {
            return fail("undo_depth must be at least 1".to_string());
        }
        if self.autosave_interval_secs == 0 {
            return fail("autosave_interval_secs must be at least 1".to_string());
        }
        if self.backup_retention == 0 {
            return fail("backup_retention must be at least 1".to_string());
        }
        if self.min_box_side <= 0.0 {
            return fail(format!("min_box_side {} must be positive", self.min_box_side));
        }
        if self.handle_tolerance < 0.0 {
            return fail(format!(
                "handle_tolerance {} must be non-negative",
                self.handle_tolerance
            ));
        }
        if self.min_drag_distance < 0.0 {
            return fail(format!(
                "min_drag_distance {} must be non-negative",
                self.min_drag_distance
            ));
        }
        if self.nudge_step < 0.0 {
            return fail(format!("nudge_step {} must be non-negative", self.nudge_step));
        }

        let r = &self.split_ratios;
        let sum = r.train + r.val + r.test;
        if r.train < 0.0 || r.val < 0.0 || r.test < 0.0 || (sum - 1.0).abs() > 1e-6 {
            return fail(format!(
                "split_ratios {}/{}/{} must be non-negative and sum to 1",
                r.train, r.val, r.test
            ));
        }
        Ok(())
    }
}
