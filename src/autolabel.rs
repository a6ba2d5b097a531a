//! Model-assisted labeling.
//!
//! A [`Detector`] produces oriented box proposals for an image. Ingestion
//! filters them by confidence, drops ones that duplicate existing confirmed
//! annotations, and commits the survivors as a single `AutoPending` batch so
//! one undo removes the whole run.
//!
//! Detection runs off-thread. Results come back over a channel tagged with a
//! generation counter; [`AutoLabeler::cancel`] bumps the counter, and
//! [`AutoLabeler::poll`] silently discards any result whose tag is stale.
//! Cancellation is therefore a discard guarantee, not a thread kill: an
//! abandoned detector run finishes on its own and its output goes nowhere.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use crate::config::EngineConfig;
use crate::error::OrilabelError;
use crate::geometry::{iou, RotatedBox};
use crate::model::{AnnotationId, ImageMeta, Provenance};
use crate::store::{AnnotationStore, Mutation, NewAnnotation};

/// One detector output before it becomes an annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct Proposal {
    pub bbox: RotatedBox,
    pub class_index: usize,
    pub confidence: f64,
}

/// Produces box proposals for one image. Implementations wrap whatever
/// inference backend the application ships; the engine only sees this trait.
pub trait Detector: Send + Sync {
    fn detect(&self, meta: &ImageMeta) -> Result<Vec<Proposal>, OrilabelError>;
}

/// Outcome of ingesting one batch of proposals.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestReport {
    /// Ids of the proposals committed as pending annotations.
    pub committed: Vec<AnnotationId>,
    /// Proposals dropped for confidence below the threshold.
    pub below_confidence: usize,
    /// Proposals dropped as duplicates of existing annotations.
    pub duplicates: usize,
}

/// Filters and commits a batch of proposals for `key`.
///
/// A proposal is a duplicate if its IoU with any same-class annotation the
/// user has already confirmed (manual or accepted) exceeds the configured
/// threshold, or if it overlaps an earlier survivor of the same batch that
/// way. All survivors land in one commit, so the whole run is one undo entry.
pub fn ingest_proposals(
    store: &mut AnnotationStore,
    key: &str,
    proposals: Vec<Proposal>,
    config: &EngineConfig,
) -> Result<IngestReport, OrilabelError> {
    let confirmed: Vec<(usize, RotatedBox)> = store
        .annotations(key)?
        .iter()
        .filter(|ann| {
            matches!(
                ann.provenance,
                Provenance::Manual | Provenance::AutoAccepted
            )
        })
        .map(|ann| (ann.class_index, ann.bbox))
        .collect();

    let mut report = IngestReport::default();
    let mut kept: Vec<NewAnnotation> = Vec::new();

    for proposal in proposals {
        if proposal.confidence < config.confidence_threshold {
            report.below_confidence += 1;
            continue;
        }
        let duplicate = confirmed
            .iter()
            .map(|(class, bbox)| (*class, bbox))
            .chain(kept.iter().map(|n| (n.class_index, &n.bbox)))
            .any(|(class, bbox)| {
                class == proposal.class_index
                    && iou(&proposal.bbox, bbox) > config.iou_dedup_threshold
            });
        if duplicate {
            report.duplicates += 1;
            continue;
        }
        kept.push(NewAnnotation {
            bbox: proposal.bbox,
            class_index: proposal.class_index,
            confidence: Some(proposal.confidence),
            provenance: Provenance::AutoPending,
        });
    }

    if !kept.is_empty() {
        let outcome = store.commit(key, Mutation::CreateBatch(kept))?;
        report.committed = outcome.created;
    }
    log::info!(
        "auto-label ingest for {key}: {} committed, {} low-confidence, {} duplicates",
        report.committed.len(),
        report.below_confidence,
        report.duplicates
    );
    Ok(report)
}

struct DetectionResult {
    generation: u64,
    image_key: String,
    outcome: Result<Vec<Proposal>, String>,
}

/// A result handed back by [`AutoLabeler::poll`], ready for ingestion.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingDetection {
    pub image_key: String,
    pub proposals: Vec<Proposal>,
}

/// Runs a detector on background threads with stale-result cancellation.
pub struct AutoLabeler {
    detector: Arc<dyn Detector>,
    generation: Arc<AtomicU64>,
    tx: Sender<DetectionResult>,
    rx: Receiver<DetectionResult>,
}

impl AutoLabeler {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        let (tx, rx) = channel();
        Self {
            detector,
            generation: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
        }
    }

    /// Kicks off detection for one image on a fresh thread. Any result from
    /// an earlier request becomes stale.
    pub fn request(&self, meta: ImageMeta) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let detector = Arc::clone(&self.detector);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let outcome = detector
                .detect(&meta)
                .map_err(|err| err.to_string());
            // The receiver may be gone if the labeler was dropped.
            let _ = tx.send(DetectionResult {
                generation,
                image_key: meta.path,
                outcome,
            });
        });
    }

    /// Invalidates every in-flight request without blocking on it.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Drains the result channel. Stale results are logged and dropped; the
    /// first current result is returned. A failed current detection surfaces
    /// as [`OrilabelError::AutoLabelFailed`] and changes nothing.
    pub fn poll(&self) -> Result<Option<PendingDetection>, OrilabelError> {
        let current = self.generation.load(Ordering::SeqCst);
        while let Ok(result) = self.rx.try_recv() {
            if result.generation != current {
                log::debug!(
                    "discarding stale auto-label result for {} (generation {} != {current})",
                    result.image_key,
                    result.generation
                );
                continue;
            }
            return match result.outcome {
                Ok(proposals) => Ok(Some(PendingDetection {
                    image_key: result.image_key,
                    proposals,
                })),
                Err(message) => Err(OrilabelError::AutoLabelFailed { message }),
            };
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassList;
    use std::time::Duration;

    const KEY: &str = "img/a.jpg";

    struct FixedDetector {
        proposals: Vec<Proposal>,
    }

    impl Detector for FixedDetector {
        fn detect(&self, _meta: &ImageMeta) -> Result<Vec<Proposal>, OrilabelError> {
            Ok(self.proposals.clone())
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect(&self, _meta: &ImageMeta) -> Result<Vec<Proposal>, OrilabelError> {
            Err(OrilabelError::AutoLabelFailed {
                message: "backend unavailable".to_string(),
            })
        }
    }

    fn store_with_image() -> AnnotationStore {
        let config = EngineConfig::default();
        let mut store =
            AnnotationStore::with_classes(&config, ClassList::from_names(["car", "plane"]));
        store.add_image(ImageMeta::new(KEY, 640, 480)).unwrap();
        store
    }

    fn proposal(cx: f64, class_index: usize, confidence: f64) -> Proposal {
        Proposal {
            bbox: RotatedBox::new(cx, 100.0, 40.0, 20.0, 0.0),
            class_index,
            confidence,
        }
    }

    #[test]
    fn low_confidence_proposals_are_dropped() {
        let mut store = store_with_image();
        let config = EngineConfig::default();
        let report = ingest_proposals(
            &mut store,
            KEY,
            vec![proposal(100.0, 0, 0.9), proposal(300.0, 0, 0.1)],
            &config,
        )
        .unwrap();
        assert_eq!(report.committed.len(), 1);
        assert_eq!(report.below_confidence, 1);
        assert_eq!(store.annotation_count(KEY).unwrap(), 1);
    }

    #[test]
    fn duplicates_of_confirmed_annotations_are_dropped() {
        let mut store = store_with_image();
        let config = EngineConfig::default();
        store
            .commit(
                KEY,
                Mutation::Create(NewAnnotation::manual(
                    RotatedBox::new(100.0, 100.0, 40.0, 20.0, 0.0),
                    0,
                )),
            )
            .unwrap();

        let report = ingest_proposals(
            &mut store,
            KEY,
            vec![
                // Near-identical to the manual box: duplicate.
                proposal(102.0, 0, 0.9),
                // Same place, different class: kept.
                proposal(102.0, 1, 0.9),
                // Same class, elsewhere: kept.
                proposal(400.0, 0, 0.9),
            ],
            &config,
        )
        .unwrap();
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.committed.len(), 2);
    }

    #[test]
    fn within_batch_duplicates_are_dropped() {
        let mut store = store_with_image();
        let config = EngineConfig::default();
        let report = ingest_proposals(
            &mut store,
            KEY,
            vec![proposal(100.0, 0, 0.9), proposal(101.0, 0, 0.8)],
            &config,
        )
        .unwrap();
        assert_eq!(report.committed.len(), 1);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn ingested_batch_is_pending_and_one_undo_entry() {
        let mut store = store_with_image();
        let config = EngineConfig::default();
        let report = ingest_proposals(
            &mut store,
            KEY,
            vec![proposal(100.0, 0, 0.9), proposal(300.0, 1, 0.8)],
            &config,
        )
        .unwrap();
        for id in &report.committed {
            let ann = store.annotation(KEY, *id).unwrap();
            assert_eq!(ann.provenance, Provenance::AutoPending);
            assert!(ann.confidence.is_some());
        }
        store.undo(KEY).unwrap();
        assert_eq!(store.annotation_count(KEY).unwrap(), 0);
    }

    #[test]
    fn empty_surviving_batch_commits_nothing() {
        let mut store = store_with_image();
        let config = EngineConfig::default();
        let report =
            ingest_proposals(&mut store, KEY, vec![proposal(100.0, 0, 0.01)], &config).unwrap();
        assert!(report.committed.is_empty());
        assert!(!store.can_undo(KEY));
        assert!(!store.is_dirty(KEY));
    }

    fn poll_until(labeler: &AutoLabeler) -> Result<Option<PendingDetection>, OrilabelError> {
        for _ in 0..200 {
            match labeler.poll() {
                Ok(None) => thread::sleep(Duration::from_millis(5)),
                other => return other,
            }
        }
        Ok(None)
    }

    #[test]
    fn background_detection_round_trips() {
        let labeler = AutoLabeler::new(Arc::new(FixedDetector {
            proposals: vec![proposal(100.0, 0, 0.9)],
        }));
        labeler.request(ImageMeta::new(KEY, 640, 480));
        let detection = poll_until(&labeler).unwrap().expect("result arrives");
        assert_eq!(detection.image_key, KEY);
        assert_eq!(detection.proposals.len(), 1);
    }

    #[test]
    fn cancelled_request_results_are_discarded() {
        let labeler = AutoLabeler::new(Arc::new(FixedDetector {
            proposals: vec![proposal(100.0, 0, 0.9)],
        }));
        labeler.request(ImageMeta::new(KEY, 640, 480));
        labeler.cancel();
        // Give the worker time to deliver its now-stale result.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(labeler.poll().unwrap(), None);
    }

    #[test]
    fn detector_failure_surfaces_as_error() {
        let labeler = AutoLabeler::new(Arc::new(FailingDetector));
        labeler.request(ImageMeta::new(KEY, 640, 480));
        let err = poll_until(&labeler).unwrap_err();
        assert!(matches!(err, OrilabelError::AutoLabelFailed { .. }));
    }
}
