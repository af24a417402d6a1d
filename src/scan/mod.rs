//! Scan Controller
//!
//! Owns the scan session lifecycle (`Idle -> Scanning -> StopRequested`) and
//! drives attempts: frame source, preprocessing, optional candidate selection,
//! OCR and validation. Cancellation is cooperative. A stop request is seen at
//! the top of the loop, while waiting for a frame and between candidates, so
//! it takes effect after at most one in-flight recognizer call.

pub mod hooks;
pub mod state;

pub use hooks::{ChannelHooks, LogHooks, NoopHooks, ScanEvent, ScanHooks};
pub use state::{ScanOutcome, SessionState};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analysis::CodeValidator;
use crate::capture::{Frame, FrameSource};
use crate::config::{AppConfig, CandidateConfig, ScanMode, ScanSettings};
use crate::error::{Result, ScanError};
use crate::ocr::{AttemptOutcome, OcrOrchestrator, Recognizer};
use crate::vision::{select_candidates, CandidateSet, FramePreprocessor, PreprocessedFrame};

struct Inner {
    state: Mutex<SessionState>,
    settings: ScanSettings,
    poll_interval: Duration,
    candidate_config: CandidateConfig,
    source: Arc<dyn FrameSource>,
    preprocessor: FramePreprocessor,
    orchestrator: OcrOrchestrator,
    hooks: Arc<dyn ScanHooks>,
}

/// Starts, stops and runs scan sessions; cheap to clone
#[derive(Clone)]
pub struct ScanController {
    inner: Arc<Inner>,
}

/// Resets the session to `Idle` however the session task exits
struct SessionGuard(Arc<Inner>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        *state = state.finish();
    }
}

impl ScanController {
    pub fn new(
        config: &AppConfig,
        source: Arc<dyn FrameSource>,
        recognizer: Arc<dyn Recognizer>,
        hooks: Arc<dyn ScanHooks>,
    ) -> Result<Self> {
        let validator = CodeValidator::new(&config.grammar)?;

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(SessionState::Idle),
                settings: config.scan.clone(),
                poll_interval: config.capture.poll_interval(),
                candidate_config: config.candidates.clone(),
                source,
                preprocessor: FramePreprocessor::new(config.preprocessing.clone()),
                orchestrator: OcrOrchestrator::new(recognizer, validator),
                hooks,
            }),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Start a session on the current tokio runtime
    ///
    /// Returns `None` without side effects when a session is already active.
    pub fn start(&self) -> Option<JoinHandle<ScanOutcome>> {
        {
            let mut state = self.inner.state.lock();
            let Some(next) = state.start() else {
                debug!("Start request ignored, session is {}", *state);
                return None;
            };
            *state = next;
        }

        let controller = self.clone();
        Some(tokio::spawn(async move { controller.run_session().await }))
    }

    /// Flag the running session for cancellation; false when nothing is running
    pub fn request_stop(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            let Some(next) = state.request_stop() else {
                return false;
            };
            *state = next;
        }
        self.inner.hooks.on_log("Stop requested");
        true
    }

    fn stop_requested(&self) -> bool {
        self.inner.state.lock().is_stop_requested()
    }

    async fn run_session(self) -> ScanOutcome {
        let guard = SessionGuard(self.inner.clone());
        let hooks = self.inner.hooks.clone();
        let single_shot = self.inner.settings.mode == ScanMode::SingleShot;

        hooks.on_log("Processing frame...");
        info!("Scan session started ({:?})", self.inner.settings.mode);

        let mut attempts = 0u32;
        let outcome = loop {
            if self.stop_requested() {
                break ScanOutcome::Interrupted;
            }

            let Some(frame) = self.next_frame().await else {
                break ScanOutcome::Interrupted;
            };

            attempts += 1;
            hooks.on_progress();

            let result = match frame {
                Ok(frame) => self.attempt(frame).await,
                Err(e) => AttemptOutcome::Failed(format!("frame source error: {}", e)),
            };

            match result {
                AttemptOutcome::Found { code, region } => {
                    hooks.on_log(&format!("Code found: {}", code));
                    break ScanOutcome::Found { code, region };
                }
                AttemptOutcome::Interrupted => break ScanOutcome::Interrupted,
                AttemptOutcome::NotFound => {
                    debug!("Attempt {} found no valid code", attempts);
                }
                AttemptOutcome::Failed(message) => {
                    hooks.on_error(&format!("Scan attempt failed: {}", message));
                }
            }

            if single_shot {
                break ScanOutcome::NotFound;
            }

            tokio::time::sleep(self.inner.settings.inter_attempt_delay()).await;
        };

        // A stop that arrived after the last safe point still interrupts
        let outcome = match outcome {
            ScanOutcome::NotFound if self.stop_requested() => ScanOutcome::Interrupted,
            other => other,
        };

        info!("Scan session finished after {} attempt(s)", attempts);
        drop(guard);

        match &outcome {
            ScanOutcome::Found { code, region } => hooks.on_found(code, *region),
            ScanOutcome::NotFound => hooks.on_not_found(),
            ScanOutcome::Interrupted => hooks.on_interrupted(),
        }

        outcome
    }

    /// Poll the frame source while it is not ready; `None` if a stop arrives first
    ///
    /// Any error other than `CaptureNotReady` is handed back so the attempt fails.
    async fn next_frame(&self) -> Option<Result<Frame>> {
        loop {
            if self.stop_requested() {
                return None;
            }
            match self.inner.source.current_frame() {
                Err(ScanError::CaptureNotReady) => {
                    debug!("Frame source not ready, retrying");
                }
                Err(e) => {
                    warn!("Frame source error: {}", e);
                    return Some(Err(e));
                }
                Ok(frame) => return Some(Ok(frame)),
            }
            tokio::time::sleep(self.inner.poll_interval).await;
        }
    }

    /// One preprocess, select and OCR cycle; working buffers are dropped on return
    async fn attempt(&self, frame: Frame) -> AttemptOutcome {
        let preprocessor = self.inner.preprocessor.clone();
        let candidate_config = self
            .inner
            .settings
            .use_candidate_regions
            .then(|| self.inner.candidate_config.clone());

        let prepared = tokio::task::spawn_blocking(move || prepare(&preprocessor, frame, candidate_config))
            .await;
        let (processed, candidates) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return AttemptOutcome::Failed(format!("preprocessing task failed: {}", e)),
        };

        for stage in &processed.skipped {
            self.inner
                .hooks
                .on_log(&format!("Preprocessing fell back past the {} stage", stage));
        }
        self.inner.hooks.on_frame(&processed, candidates.as_ref());

        self.inner
            .orchestrator
            .run(&processed, candidates.as_ref(), || self.stop_requested())
            .await
    }
}

/// CPU-bound part of an attempt
fn prepare(
    preprocessor: &FramePreprocessor,
    frame: Frame,
    candidate_config: Option<CandidateConfig>,
) -> (PreprocessedFrame, Option<CandidateSet>) {
    let processed = preprocessor.process(frame);
    let candidates = candidate_config.map(|config| select_candidates(&processed.image, &config));
    (processed, candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelLayout;
    use crate::config::PreprocessConfig;
    use crate::ocr::{RecognitionResult, SegmentationHint};
    use async_trait::async_trait;
    use crossbeam_channel::{unbounded, Receiver};
    use image::GrayImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves the same frame, optionally reporting not-ready first
    struct StaticSource {
        width: u32,
        height: u32,
        rgba: Vec<u8>,
        not_ready: AtomicUsize,
    }

    impl StaticSource {
        fn blank(not_ready: usize) -> Arc<Self> {
            Arc::new(Self {
                width: 64,
                height: 48,
                rgba: vec![255; 64 * 48 * 4],
                not_ready: AtomicUsize::new(not_ready),
            })
        }

        /// White frame with ten dark 200x20 bars
        fn bars() -> Arc<Self> {
            let (width, height) = (400u32, 480u32);
            let mut rgba = vec![255u8; (width * height * 4) as usize];
            for i in 0..10u32 {
                let top = 10 + i * 45;
                for y in top..top + 20 {
                    for x in 50..250u32 {
                        let idx = ((y * width + x) * 4) as usize;
                        rgba[idx..idx + 3].copy_from_slice(&[0, 0, 0]);
                    }
                }
            }
            Arc::new(Self {
                width,
                height,
                rgba,
                not_ready: AtomicUsize::new(0),
            })
        }
    }

    impl FrameSource for StaticSource {
        fn current_frame(&self) -> Result<Frame> {
            if self
                .not_ready
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ScanError::CaptureNotReady);
            }
            Frame::new(self.rgba.clone(), self.width, self.height, PixelLayout::Rgba8)
        }
    }

    /// Fails with `InvalidFrame` a number of times, then serves a blank frame
    struct BrokenSource {
        failures: AtomicUsize,
        fallback: Arc<StaticSource>,
    }

    impl BrokenSource {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicUsize::new(failures),
                fallback: StaticSource::blank(0),
            })
        }
    }

    impl FrameSource for BrokenSource {
        fn current_frame(&self) -> Result<Frame> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ScanError::InvalidFrame("truncated buffer".to_string()));
            }
            self.fallback.current_frame()
        }
    }

    /// Answers with a fixed script, then repeats the last answer
    struct MockRecognizer {
        script: Vec<Option<&'static str>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl MockRecognizer {
        fn new(script: Vec<Option<&'static str>>, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                script,
                delay: Duration::from_millis(delay_ms),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Recognizer for MockRecognizer {
        async fn recognize(
            &self,
            _image: &GrayImage,
            _whitelist: &str,
            _hint: SegmentationHint,
        ) -> Result<RecognitionResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let answer = self.script[n.min(self.script.len() - 1)];
            match answer {
                Some(text) => Ok(RecognitionResult::new(text)),
                None => Err(ScanError::recognizer("engine unavailable")),
            }
        }
    }

    fn config(mode: ScanMode) -> AppConfig {
        let mut config = AppConfig::default();
        config.scan.mode = mode;
        config.scan.inter_attempt_delay_ms = 5;
        config.capture.poll_interval_ms = 5;
        config
    }

    fn controller(
        config: &AppConfig,
        source: Arc<dyn FrameSource>,
        recognizer: Arc<MockRecognizer>,
    ) -> (ScanController, Receiver<ScanEvent>) {
        let (tx, rx) = unbounded();
        let controller =
            ScanController::new(config, source, recognizer, Arc::new(ChannelHooks::new(tx))).unwrap();
        (controller, rx)
    }

    fn terminal_events(rx: &Receiver<ScanEvent>) -> Vec<ScanEvent> {
        rx.try_iter().filter(|e| e.is_terminal()).collect()
    }

    async fn wait_for_calls(recognizer: &MockRecognizer, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while recognizer.calls() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_single_shot_found() {
        let recognizer = MockRecognizer::new(vec![Some("ab SGRO1234567890 cd")], 0);
        let (controller, rx) = controller(
            &config(ScanMode::SingleShot),
            StaticSource::blank(0),
            recognizer.clone(),
        );

        let outcome = controller.start().unwrap().await.unwrap();
        match &outcome {
            ScanOutcome::Found { code, region } => {
                assert_eq!(code.as_str(), "SGRO1234567890");
                assert!(region.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(recognizer.calls(), 1);

        let terminal = terminal_events(&rx);
        assert_eq!(terminal.len(), 1);
        assert!(matches!(terminal[0], ScanEvent::Found { .. }));
    }

    #[tokio::test]
    async fn test_single_shot_not_found_is_terminal() {
        let recognizer = MockRecognizer::new(vec![Some("NOTHING")], 0);
        let (controller, rx) = controller(
            &config(ScanMode::SingleShot),
            StaticSource::blank(2),
            recognizer.clone(),
        );

        let outcome = controller.start().unwrap().await.unwrap();
        assert_eq!(outcome, ScanOutcome::NotFound);
        assert_eq!(recognizer.calls(), 1);
        assert_eq!(terminal_events(&rx), vec![ScanEvent::NotFound]);
    }

    #[tokio::test]
    async fn test_single_shot_recognizer_failure_reports_error_then_not_found() {
        let recognizer = MockRecognizer::new(vec![None], 0);
        let (controller, rx) = controller(
            &config(ScanMode::SingleShot),
            StaticSource::blank(0),
            recognizer,
        );

        let outcome = controller.start().unwrap().await.unwrap();
        assert_eq!(outcome, ScanOutcome::NotFound);

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        let error_at = events
            .iter()
            .position(|e| matches!(e, ScanEvent::Error(_)))
            .unwrap();
        let terminal_at = events.iter().position(|e| e.is_terminal()).unwrap();
        assert!(error_at < terminal_at);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_continuous_retries_through_failures_until_found() {
        let recognizer = MockRecognizer::new(
            vec![Some("garbage"), None, Some("more garbage"), Some("SGRO0000000007")],
            0,
        );
        let (controller, rx) = controller(
            &config(ScanMode::Continuous),
            StaticSource::blank(0),
            recognizer.clone(),
        );

        let outcome = controller.start().unwrap().await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Found { .. }));
        assert_eq!(recognizer.calls(), 4);

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        assert_eq!(events.iter().filter(|e| **e == ScanEvent::Progress).count(), 4);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.iter().any(|e| matches!(e, ScanEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_continuous_stop_interrupts() {
        let recognizer = MockRecognizer::new(vec![Some("garbage")], 10);
        let (controller, rx) = controller(
            &config(ScanMode::Continuous),
            StaticSource::blank(0),
            recognizer.clone(),
        );

        let handle = controller.start().unwrap();
        wait_for_calls(&recognizer, 2).await;
        assert!(controller.request_stop());
        assert_eq!(controller.state(), SessionState::StopRequested);

        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, ScanOutcome::Interrupted);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(terminal_events(&rx), vec![ScanEvent::Interrupted]);
        assert!(!controller.request_stop());
    }

    #[tokio::test]
    async fn test_start_while_scanning_is_rejected() {
        let recognizer = MockRecognizer::new(vec![Some("garbage")], 5);
        let (controller, rx) = controller(
            &config(ScanMode::Continuous),
            StaticSource::blank(0),
            recognizer.clone(),
        );

        let handle = controller.start().unwrap();
        assert_eq!(controller.state(), SessionState::Scanning);
        assert!(controller.start().is_none());
        assert_eq!(controller.state(), SessionState::Scanning);

        wait_for_calls(&recognizer, 1).await;
        controller.request_stop();
        assert!(controller.start().is_none());
        handle.await.unwrap();

        assert_eq!(terminal_events(&rx).len(), 1);

        // A new session may begin once the previous one is Idle
        let handle = controller.start().unwrap();
        controller.request_stop();
        assert_eq!(handle.await.unwrap(), ScanOutcome::Interrupted);
    }

    #[tokio::test]
    async fn test_stop_latency_is_one_candidate() {
        let mut config = config(ScanMode::Continuous);
        config.scan.use_candidate_regions = true;
        config.candidates.merge_radius = 0;
        config.preprocessing = PreprocessConfig {
            contrast_enhancement: false,
            blur_kernel: 0,
            binarize: false,
            morphology: false,
            ..PreprocessConfig::default()
        };

        let recognizer = MockRecognizer::new(vec![Some("garbage")], 30);
        let (controller, _rx) = controller(&config, StaticSource::bars(), recognizer.clone());

        let handle = controller.start().unwrap();
        wait_for_calls(&recognizer, 1).await;
        controller.request_stop();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, ScanOutcome::Interrupted);
        // Ten candidates were available; only the in-flight call ran
        assert_eq!(recognizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_candidate_path_reports_region() {
        let mut config = config(ScanMode::SingleShot);
        config.scan.use_candidate_regions = true;
        config.candidates.merge_radius = 0;
        config.preprocessing = PreprocessConfig {
            contrast_enhancement: false,
            blur_kernel: 0,
            binarize: false,
            morphology: false,
            ..PreprocessConfig::default()
        };

        let recognizer = MockRecognizer::new(vec![None, Some("SGRO5555555555")], 0);
        let (controller, _rx) = controller(&config, StaticSource::bars(), recognizer.clone());

        let outcome = controller.start().unwrap().await.unwrap();
        match outcome {
            ScanOutcome::Found { region: Some(region), .. } => {
                assert_eq!((region.width, region.height), (200, 20));
                assert_eq!(region.y, 55);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(recognizer.calls(), 2);
    }

    #[tokio::test]
    async fn test_single_shot_source_error_ends_session() {
        let recognizer = MockRecognizer::new(vec![Some("SGRO1234567890")], 0);
        let (controller, rx) = controller(
            &config(ScanMode::SingleShot),
            BrokenSource::new(usize::MAX),
            recognizer.clone(),
        );

        let handle = controller.start().unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome, ScanOutcome::NotFound);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(recognizer.calls(), 0);

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        let error_at = events
            .iter()
            .position(|e| matches!(e, ScanEvent::Error(m) if m.contains("truncated buffer")))
            .unwrap();
        let terminal: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_terminal())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(terminal.len(), 1);
        assert!(error_at < terminal[0]);
        assert_eq!(events[terminal[0]], ScanEvent::NotFound);
    }

    #[tokio::test]
    async fn test_continuous_recovers_after_source_errors() {
        let recognizer = MockRecognizer::new(vec![Some("SGRO1234567890")], 0);
        let (controller, rx) = controller(
            &config(ScanMode::Continuous),
            BrokenSource::new(2),
            recognizer.clone(),
        );

        let handle = controller.start().unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(outcome, ScanOutcome::Found { .. }));
        assert_eq!(recognizer.calls(), 1);

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        assert_eq!(events.iter().filter(|e| matches!(e, ScanEvent::Error(_))).count(), 2);
        assert_eq!(events.iter().filter(|e| **e == ScanEvent::Progress).count(), 3);
    }

    #[tokio::test]
    async fn test_stop_while_waiting_for_frames() {
        let recognizer = MockRecognizer::new(vec![Some("garbage")], 0);
        let (controller, rx) = controller(
            &config(ScanMode::SingleShot),
            StaticSource::blank(usize::MAX),
            recognizer.clone(),
        );

        let handle = controller.start().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.request_stop();

        assert_eq!(handle.await.unwrap(), ScanOutcome::Interrupted);
        assert_eq!(recognizer.calls(), 0);
        assert_eq!(terminal_events(&rx), vec![ScanEvent::Interrupted]);
    }
}
