//! Adapter between a recognition handle and the session
//!
//! Guards start/stop against the handle's activity and folds raw
//! platform signals into [`AdapterEvent`]s.

use tracing::{debug, info, warn};

use super::error::RecognitionError;
use super::handle::{RecognitionConfig, RecognitionHandle, RecognitionHandleFactory, SignalSink};
use super::signal::{AdapterEvent, EndReason, PlatformSignal};

/// Owns the single recognition handle of a session
pub struct RecognitionAdapter {
    handle: Box<dyn RecognitionHandle>,
    /// Subscription generation the handle's signals carry
    generation: u64,
    /// Start was accepted and no end has been observed yet
    active: bool,
    /// An error already ended the segment; the trailing `End` is redundant
    swallow_end: bool,
}

impl RecognitionAdapter {
    /// Create the handle through the factory
    pub fn create(
        factory: &dyn RecognitionHandleFactory,
        config: &RecognitionConfig,
        sink: SignalSink,
    ) -> Result<Self, RecognitionError> {
        let generation = sink.generation();
        let handle = factory.create(config, sink)?;

        info!(
            generation,
            language = %config.language,
            continuous = config.continuous,
            interim_results = config.interim_results,
            "recognition handle created"
        );

        Ok(Self {
            handle,
            generation,
            active: false,
            swallow_end: false,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Request the capability to begin listening
    pub fn start(&mut self) -> Result<(), RecognitionError> {
        if self.active {
            return Err(RecognitionError::AlreadyActive);
        }
        self.handle.start()?;
        self.active = true;
        debug!(generation = self.generation, "recognition start requested");
        Ok(())
    }

    /// Request the capability to stop; no-op when inactive
    pub fn stop(&mut self) {
        if !self.active {
            debug!(generation = self.generation, "recognition already stopped");
            return;
        }
        self.handle.stop();
        debug!(generation = self.generation, "recognition stop requested");
    }

    /// Tear the handle down without waiting for an end signal
    pub fn abort(&mut self) {
        if self.active {
            self.handle.abort();
            self.active = false;
            warn!(generation = self.generation, "recognition aborted");
        }
    }

    /// Fold a platform signal into zero or more adapter events
    pub fn normalize(&mut self, signal: PlatformSignal) -> Vec<AdapterEvent> {
        match signal {
            PlatformSignal::Start => {
                self.swallow_end = false;
                vec![AdapterEvent::Started]
            }
            PlatformSignal::Result {
                result_index,
                results,
            } => {
                let mut events = Vec::new();
                let mut interim = String::new();

                for result in results.iter().skip(result_index) {
                    if result.is_final {
                        events.push(AdapterEvent::Result {
                            text: result.best_transcript().trim().to_string(),
                            is_final: true,
                        });
                    } else {
                        interim.push_str(result.best_transcript());
                    }
                }

                let interim = interim.trim();
                if !interim.is_empty() {
                    events.push(AdapterEvent::Result {
                        text: interim.to_string(),
                        is_final: false,
                    });
                }
                events
            }
            PlatformSignal::Error(kind) => {
                self.active = false;
                self.swallow_end = true;
                vec![AdapterEvent::Ended(EndReason::Error(kind))]
            }
            PlatformSignal::End => {
                self.active = false;
                if std::mem::take(&mut self.swallow_end) {
                    Vec::new()
                } else {
                    vec![AdapterEvent::Ended(EndReason::Completed)]
                }
            }
        }
    }
}

impl Drop for RecognitionAdapter {
    fn drop(&mut self) {
        self.abort();
        debug!(generation = self.generation, "recognition handle released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::error::ErrorKind;
    use crate::recognition::fake::{FakeCall, FakeFactory};
    use crate::recognition::signal::RecognitionResult;
    use tokio::sync::mpsc;

    fn create_adapter() -> (RecognitionAdapter, FakeFactory) {
        let factory = FakeFactory::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let adapter =
            RecognitionAdapter::create(&factory, &RecognitionConfig::default(), SignalSink::new(1, tx))
                .unwrap();
        (adapter, factory)
    }

    fn result_event(text: &str, is_final: bool) -> AdapterEvent {
        AdapterEvent::Result {
            text: text.to_string(),
            is_final,
        }
    }

    #[test]
    fn test_create_applies_config() {
        let (adapter, factory) = create_adapter();
        assert_eq!(adapter.generation(), 1);
        assert!(!adapter.is_active());
        assert_eq!(factory.configs(), vec![RecognitionConfig::default()]);
    }

    #[test]
    fn test_create_unsupported() {
        let factory = FakeFactory::unsupported();
        let (tx, _rx) = mpsc::unbounded_channel();
        let result =
            RecognitionAdapter::create(&factory, &RecognitionConfig::default(), SignalSink::new(0, tx));
        assert!(matches!(result, Err(RecognitionError::Unsupported)));
    }

    #[test]
    fn test_start_twice_is_already_active() {
        let (mut adapter, factory) = create_adapter();
        adapter.start().unwrap();
        assert_eq!(adapter.start(), Err(RecognitionError::AlreadyActive));
        assert_eq!(factory.calls(), vec![FakeCall::Start]);
    }

    #[test]
    fn test_handle_start_failure_leaves_inactive() {
        let (mut adapter, factory) = create_adapter();
        factory.fail_next_start(RecognitionError::AlreadyActive);
        assert_eq!(adapter.start(), Err(RecognitionError::AlreadyActive));
        assert!(!adapter.is_active());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut adapter, factory) = create_adapter();
        adapter.stop();
        assert!(factory.calls().is_empty());

        adapter.start().unwrap();
        adapter.stop();
        adapter.normalize(PlatformSignal::End);
        adapter.stop();
        assert_eq!(factory.calls(), vec![FakeCall::Start, FakeCall::Stop]);
    }

    #[test]
    fn test_interim_entries_concatenate() {
        let (mut adapter, _) = create_adapter();
        let events = adapter.normalize(PlatformSignal::Result {
            result_index: 0,
            results: vec![
                RecognitionResult::interim("hello "),
                RecognitionResult::interim("wor"),
            ],
        });
        assert_eq!(events, vec![result_event("hello wor", false)]);
    }

    #[test]
    fn test_final_entry_overwrites() {
        let (mut adapter, _) = create_adapter();
        let events = adapter.normalize(PlatformSignal::Result {
            result_index: 0,
            results: vec![
                RecognitionResult::final_text(" hello world "),
                RecognitionResult::interim("and "),
                RecognitionResult::interim("more"),
            ],
        });
        assert_eq!(
            events,
            vec![result_event("hello world", true), result_event("and more", false)]
        );
    }

    #[test]
    fn test_result_index_skips_delivered_entries() {
        let (mut adapter, _) = create_adapter();
        let events = adapter.normalize(PlatformSignal::Result {
            result_index: 1,
            results: vec![
                RecognitionResult::final_text("already seen"),
                RecognitionResult::interim("new"),
            ],
        });
        assert_eq!(events, vec![result_event("new", false)]);
    }

    #[test]
    fn test_blank_interim_is_dropped() {
        let (mut adapter, _) = create_adapter();
        let events = adapter.normalize(PlatformSignal::Result {
            result_index: 0,
            results: vec![RecognitionResult::interim("  ")],
        });
        assert!(events.is_empty());
    }

    #[test]
    fn test_error_swallows_trailing_end() {
        let (mut adapter, _) = create_adapter();
        adapter.start().unwrap();

        let events = adapter.normalize(PlatformSignal::Error(ErrorKind::NoSpeech));
        assert_eq!(
            events,
            vec![AdapterEvent::Ended(EndReason::Error(ErrorKind::NoSpeech))]
        );
        assert!(!adapter.is_active());

        assert!(adapter.normalize(PlatformSignal::End).is_empty());
        assert_eq!(
            adapter.normalize(PlatformSignal::End),
            vec![AdapterEvent::Ended(EndReason::Completed)]
        );
    }

    #[test]
    fn test_drop_aborts_active_handle() {
        let (mut adapter, factory) = create_adapter();
        adapter.start().unwrap();
        drop(adapter);
        assert_eq!(factory.calls(), vec![FakeCall::Start, FakeCall::Abort]);
    }
}
