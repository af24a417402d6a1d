//! UI hook layer
//!
//! Fire-and-forget notifications from the scan controller. The controller
//! never reads anything back from these.

use crossbeam_channel::Sender;
use tracing::{debug, error, info};

use crate::analysis::ExtractedCode;
use crate::vision::{CandidateSet, PreprocessedFrame, Region};

/// Receives scan lifecycle notifications
pub trait ScanHooks: Send + Sync {
    fn on_log(&self, _message: &str) {}

    /// A new attempt is starting
    fn on_progress(&self) {}

    fn on_found(&self, _code: &ExtractedCode, _region: Option<Region>) {}

    fn on_not_found(&self) {}

    fn on_error(&self, _message: &str) {}

    fn on_interrupted(&self) {}

    /// Preprocessed frame and candidates of the current attempt, for debug views
    fn on_frame(&self, _frame: &PreprocessedFrame, _candidates: Option<&CandidateSet>) {}
}

/// Hooks that ignore every notification
#[derive(Debug, Default)]
pub struct NoopHooks;

impl ScanHooks for NoopHooks {}

/// Routes every notification to `tracing`
#[derive(Debug, Default)]
pub struct LogHooks;

impl ScanHooks for LogHooks {
    fn on_log(&self, message: &str) {
        info!("{}", message);
    }

    fn on_progress(&self) {
        debug!("Scan attempt started");
    }

    fn on_found(&self, code: &ExtractedCode, region: Option<Region>) {
        match region {
            Some(r) => info!(
                "Code found: {} in region ({}, {}) {}x{}",
                code, r.x, r.y, r.width, r.height
            ),
            None => info!("Code found: {}", code),
        }
    }

    fn on_not_found(&self) {
        info!("No valid code found");
    }

    fn on_error(&self, message: &str) {
        error!("Scan error: {}", message);
    }

    fn on_interrupted(&self) {
        info!("Scanning interrupted by user");
    }
}

/// Events sent by [`ChannelHooks`]
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Log(String),
    Progress,
    Found {
        code: ExtractedCode,
        region: Option<Region>,
    },
    NotFound,
    Error(String),
    Interrupted,
}

impl ScanEvent {
    /// Whether this event ends a session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanEvent::Found { .. } | ScanEvent::NotFound | ScanEvent::Interrupted
        )
    }
}

/// Forwards notifications as [`ScanEvent`] messages
#[derive(Debug, Clone)]
pub struct ChannelHooks {
    sender: Sender<ScanEvent>,
}

impl ChannelHooks {
    pub fn new(sender: Sender<ScanEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: ScanEvent) {
        // Receiver may be gone when the UI has shut down
        let _ = self.sender.send(event);
    }
}

impl ScanHooks for ChannelHooks {
    fn on_log(&self, message: &str) {
        self.send(ScanEvent::Log(message.to_string()));
    }

    fn on_progress(&self) {
        self.send(ScanEvent::Progress);
    }

    fn on_found(&self, code: &ExtractedCode, region: Option<Region>) {
        self.send(ScanEvent::Found {
            code: code.clone(),
            region,
        });
    }

    fn on_not_found(&self) {
        self.send(ScanEvent::NotFound);
    }

    fn on_error(&self, message: &str) {
        self.send(ScanEvent::Error(message.to_string()));
    }

    fn on_interrupted(&self) {
        self.send(ScanEvent::Interrupted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_channel_hooks_forward_events() {
        let (tx, rx) = unbounded();
        let hooks = ChannelHooks::new(tx);

        hooks.on_log("hello");
        hooks.on_progress();
        hooks.on_error("bad");
        hooks.on_not_found();

        let events: Vec<ScanEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ScanEvent::Log("hello".to_string()),
                ScanEvent::Progress,
                ScanEvent::Error("bad".to_string()),
                ScanEvent::NotFound,
            ]
        );
        assert!(events[3].is_terminal());
        assert!(!events[2].is_terminal());
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = unbounded();
        drop(rx);
        ChannelHooks::new(tx).on_interrupted();
    }
}
