//! Dataset-level concerns: split assignment, autosave, backups and crash
//! recovery.
//!
//! Split assignment is deterministic: the image keys are taken in sorted
//! order and shuffled with a seeded RNG, so the same image set, ratios and
//! seed always produce the same partition.
//!
//! Autosave writes one JSON record per dirty image into `autosave/` inside
//! the project directory, each through an atomic temp-file-then-rename. A
//! session marker file distinguishes a crash from a clean exit: if the
//! marker is still present on startup, the autosave records are offered for
//! recovery.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::SplitRatios;
use crate::error::OrilabelError;
use crate::model::Split;
use crate::project::{self, ImageRecord};
use crate::store::AnnotationStore;

const AUTOSAVE_DIR: &str = "autosave";
const BACKUP_DIR: &str = "backups";
const SESSION_MARKER: &str = ".session";

/// How many images each split received.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SplitSummary {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

/// Assigns every image to a split, deterministically for a given seed.
///
/// Train and val counts are the truncated products of the ratios; whatever
/// remains goes to test, so no image is ever left unassigned.
pub fn assign_split(
    store: &mut AnnotationStore,
    ratios: &SplitRatios,
    seed: u64,
) -> Result<SplitSummary, OrilabelError> {
    let mut keys = store.image_keys();
    let mut rng = StdRng::seed_from_u64(seed);
    keys.shuffle(&mut rng);

    let total = keys.len();
    let n_train = (total as f64 * ratios.train) as usize;
    let n_val = (total as f64 * ratios.val) as usize;

    let mut summary = SplitSummary::default();
    for (i, key) in keys.iter().enumerate() {
        let split = if i < n_train {
            summary.train += 1;
            Split::Train
        } else if i < n_train + n_val {
            summary.val += 1;
            Split::Val
        } else {
            summary.test += 1;
            Split::Test
        };
        store.set_split(key, split)?;
    }
    log::info!(
        "assigned splits over {total} image(s): {}/{}/{} (seed {seed})",
        summary.train,
        summary.val,
        summary.test
    );
    Ok(summary)
}

/// What one autosave pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutosaveReport {
    pub written: usize,
    pub failed: Vec<String>,
}

/// Records recovered from a crashed session's autosave directory.
pub struct Recovery {
    records: Vec<ImageRecord>,
}

impl Recovery {
    pub fn image_keys(&self) -> Vec<String> {
        self.records.iter().map(|r| r.path.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Owns the on-disk layout of one project directory.
#[derive(Debug)]
pub struct DatasetManager {
    project_dir: PathBuf,
    backup_retention: usize,
    failure_streak: u32,
}

impl DatasetManager {
    pub fn new(project_dir: impl Into<PathBuf>, backup_retention: usize) -> Self {
        Self {
            project_dir: project_dir.into(),
            backup_retention,
            failure_streak: 0,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Path of the main project file inside the managed directory.
    pub fn project_file(&self) -> PathBuf {
        self.project_dir.join("project.json")
    }

    /// Writes every dirty image's record into `autosave/`. Each image is
    /// written independently: one failure is logged and reported but does
    /// not stop the rest, and only successfully written images are marked
    /// clean. Zero dirty images means zero writes.
    pub fn autosave(&mut self, store: &mut AnnotationStore) -> Result<AutosaveReport, OrilabelError> {
        let dirty = store.dirty_keys();
        let mut report = AutosaveReport::default();
        if dirty.is_empty() {
            return Ok(report);
        }

        let dir = self.project_dir.join(AUTOSAVE_DIR);
        fs::create_dir_all(&dir)?;

        for key in dirty {
            let result = project::image_record(store, &key).and_then(|record| {
                let json = serde_json::to_vec_pretty(&record).map_err(|source| {
                    OrilabelError::ProjectWrite {
                        path: dir.join(autosave_file_name(&key)),
                        source,
                    }
                })?;
                project::write_atomic(&dir.join(autosave_file_name(&key)), &json)
            });
            match result {
                Ok(()) => {
                    store.clear_dirty(&key)?;
                    report.written += 1;
                }
                Err(err) => {
                    log::error!("autosave of {key} failed: {err}");
                    report.failed.push(key);
                }
            }
        }

        if report.failed.is_empty() {
            self.failure_streak = 0;
        } else {
            self.failure_streak += 1;
            log::warn!(
                "autosave pass left {} image(s) unsaved ({} consecutive failing passes)",
                report.failed.len(),
                self.failure_streak
            );
        }
        Ok(report)
    }

    /// Consecutive autosave passes that left something unsaved. Callers use
    /// this to escalate from a status-bar note to a modal warning.
    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    /// Snapshots the whole project into `backups/`, pruning the oldest
    /// backups beyond the retention limit.
    pub fn create_backup(
        &self,
        name: &str,
        store: &AnnotationStore,
    ) -> Result<PathBuf, OrilabelError> {
        let dir = self.project_dir.join(BACKUP_DIR);
        fs::create_dir_all(&dir)?;

        let mut millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| OrilabelError::PersistenceFailed {
                path: dir.clone(),
                message: format!("system clock error: {err}"),
            })?
            .as_millis();
        // Zero-padded so lexicographic order is chronological order.
        let mut path = dir.join(format!("project-{millis:013}.json"));
        while path.exists() {
            millis += 1;
            path = dir.join(format!("project-{millis:013}.json"));
        }
        project::save(&path, name, store)?;
        self.prune_backups(&dir)?;
        Ok(path)
    }

    fn prune_backups(&self, dir: &Path) -> Result<(), OrilabelError> {
        let mut backups: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        backups.sort();
        while backups.len() > self.backup_retention {
            let oldest = backups.remove(0);
            log::debug!("pruning backup {}", oldest.display());
            fs::remove_file(oldest)?;
        }
        Ok(())
    }

    /// Drops a session marker. Present marker at startup means the previous
    /// session did not exit cleanly.
    pub fn mark_session_open(&self) -> Result<(), OrilabelError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        fs::create_dir_all(&self.project_dir)?;
        fs::write(
            self.project_dir.join(SESSION_MARKER),
            format!("opened_at_ms={millis}\n"),
        )?;
        Ok(())
    }

    /// Removes the session marker after a successful explicit save.
    pub fn mark_clean_save(&self) -> Result<(), OrilabelError> {
        let marker = self.project_dir.join(SESSION_MARKER);
        if marker.exists() {
            fs::remove_file(marker)?;
        }
        Ok(())
    }

    /// Checks for an unclean previous session and collects its autosave
    /// records. `None` means the last session exited cleanly.
    pub fn recover(&self) -> Result<Option<Recovery>, OrilabelError> {
        if !self.project_dir.join(SESSION_MARKER).exists() {
            return Ok(None);
        }
        let dir = self.project_dir.join(AUTOSAVE_DIR);
        let mut records = Vec::new();
        if dir.is_dir() {
            let mut paths: Vec<PathBuf> = fs::read_dir(&dir)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            paths.sort();
            for path in paths {
                let data = fs::read_to_string(&path)?;
                match serde_json::from_str::<ImageRecord>(&data) {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        log::warn!("ignoring unreadable autosave {}: {err}", path.display());
                    }
                }
            }
        }
        log::info!(
            "previous session did not exit cleanly; {} autosaved image(s) recoverable",
            records.len()
        );
        Ok(Some(Recovery { records }))
    }

    /// Replaces the store's state for every recovered image and marks those
    /// images dirty so the next explicit save persists them.
    pub fn apply_recovery(&self, store: &mut AnnotationStore, recovery: Recovery) {
        for record in recovery.records {
            let (set, split, skipped) = project::restore_record(record, &self.project_dir);
            if skipped > 0 {
                log::warn!(
                    "{skipped} annotation(s) in recovered record for {} were unreadable",
                    set.meta().path
                );
            }
            let key = set.meta().path.clone();
            store.restore_set(set, split);
            store.mark_dirty(&key);
        }
    }
}

/// Flattens an image key into a record file name. Distinct keys can flatten
/// to the same text (`a/b.jpg` and `a_b.jpg`), so a checksum of the original
/// key keeps the names apart.
fn autosave_file_name(key: &str) -> String {
    let flat: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    format!("{flat}-{:08x}.json", crc32c::crc32c(key.as_bytes()))
}

/// Background autosave clock. Ticks arrive over a channel so the interactive
/// thread polls for them between events; the timer never touches the store.
pub struct AutosaveTimer {
    stop: Arc<AtomicBool>,
    rx: Receiver<Instant>,
    handle: Option<JoinHandle<()>>,
}

impl AutosaveTimer {
    pub fn start(interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx): (Sender<Instant>, Receiver<Instant>) = channel();
        let stop_flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            let step = Duration::from_millis(25).min(interval);
            let mut last = Instant::now();
            while !stop_flag.load(Ordering::Relaxed) {
                thread::sleep(step);
                if last.elapsed() >= interval {
                    last = Instant::now();
                    if tx.send(last).is_err() {
                        break;
                    }
                }
            }
        });
        Self {
            stop,
            rx,
            handle: Some(handle),
        }
    }

    /// True if at least one interval has elapsed since the last check.
    pub fn tick_ready(&self) -> bool {
        let mut ready = false;
        while self.rx.try_recv().is_ok() {
            ready = true;
        }
        ready
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutosaveTimer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
