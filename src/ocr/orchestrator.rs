//! OCR orchestration for one scan attempt
//!
//! Submits the whole preprocessed frame, or each ranked candidate region in
//! turn, to the [`Recognizer`] and stops at the first text that validates.
//! A recognizer error only disqualifies the candidate it happened on; the
//! attempt reports [`AttemptOutcome::Failed`] only when every candidate it
//! tried failed that way.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Recognizer, SegmentationHint};
use crate::analysis::{strip_whitespace, CodeValidator, ExtractedCode};
use crate::vision::{CandidateSet, PreprocessedFrame, Region};

/// Result of one preprocess, select and OCR cycle
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// A candidate produced text that validates
    Found {
        code: ExtractedCode,
        /// Region the code was read from; `None` for whole-frame OCR
        region: Option<Region>,
    },
    /// Every candidate was read but none validated
    NotFound,
    /// The attempt could not run, or the recognizer failed on every candidate
    Failed(String),
    /// A stop request was observed between candidates
    Interrupted,
}

/// Drives the recognizer over the candidates of one attempt
#[derive(Clone)]
pub struct OcrOrchestrator {
    recognizer: Arc<dyn Recognizer>,
    validator: CodeValidator,
}

impl OcrOrchestrator {
    pub fn new(recognizer: Arc<dyn Recognizer>, validator: CodeValidator) -> Self {
        Self {
            recognizer,
            validator,
        }
    }

    pub fn validator(&self) -> &CodeValidator {
        &self.validator
    }

    /// Run OCR over `frame`
    ///
    /// With `candidates` set, each region is cropped and read as a single
    /// line in ranked order; an empty set falls back to the whole frame.
    /// `should_stop` is polled before every recognizer call.
    pub async fn run<F>(
        &self,
        frame: &PreprocessedFrame,
        candidates: Option<&CandidateSet>,
        should_stop: F,
    ) -> AttemptOutcome
    where
        F: Fn() -> bool,
    {
        let plan: Vec<(Option<Region>, SegmentationHint)> = match candidates {
            Some(set) if !set.is_empty() => set
                .regions()
                .iter()
                .map(|r| (Some(*r), SegmentationHint::SingleLine))
                .collect(),
            Some(_) => {
                info!("No candidate region passed the filter, falling back to whole-frame OCR");
                vec![(None, SegmentationHint::SingleBlock)]
            }
            None => vec![(None, SegmentationHint::SingleBlock)],
        };

        let mut attempted = 0usize;
        let mut failures = 0usize;
        let mut last_error = String::new();

        for (index, (region, hint)) in plan.into_iter().enumerate() {
            if should_stop() {
                debug!("Stop requested before candidate {}", index + 1);
                return AttemptOutcome::Interrupted;
            }

            // Crop lives for this iteration only
            let crop = region.map(|r| r.crop(&frame.image));
            let image = crop.as_ref().unwrap_or(&frame.image);

            attempted += 1;
            match self
                .recognizer
                .recognize(image, self.validator.whitelist(), hint)
                .await
            {
                Ok(result) => {
                    let text = strip_whitespace(&result.text);
                    debug!(
                        "Candidate {} ({:?}) read {:?} (confidence {:?})",
                        index + 1,
                        region,
                        text,
                        result.confidence
                    );
                    if let Some(code) = self.validator.extract(&text) {
                        return AttemptOutcome::Found { code, region };
                    }
                }
                Err(e) => {
                    warn!("OCR failed on candidate {}: {}", index + 1, e);
                    failures += 1;
                    last_error = e.to_string();
                }
            }
        }

        if attempted > 0 && failures == attempted {
            AttemptOutcome::Failed(last_error)
        } else {
            AttemptOutcome::NotFound
        }
    }
}
