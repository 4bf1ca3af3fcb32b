//! Capability seam: the handle and factory traits a recognition backend implements

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::error::RecognitionError;
use super::signal::{PlatformSignal, Signal};

/// Settings applied to the capability when a handle is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Keep listening across utterances instead of ending after the first final
    pub continuous: bool,
    /// Deliver provisional results while the user is still speaking
    pub interim_results: bool,
    /// BCP 47 language tag
    pub language: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            language: "en-US".to_string(),
        }
    }
}

/// The one subscription a handle delivers its signals through
#[derive(Debug, Clone)]
pub struct SignalSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Signal>,
}

impl SignalSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<Signal>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver a signal; fails once the session side has gone away
    pub fn send(&self, kind: PlatformSignal) -> Result<(), RecognitionError> {
        self.tx
            .send(Signal {
                generation: self.generation,
                kind,
            })
            .map_err(|_| RecognitionError::ChannelClosed)
    }
}

/// A live recognition resource
///
/// All calls only request work. The capability confirms through the
/// [`SignalSink`] it was created with, at some later point.
pub trait RecognitionHandle: Send {
    /// Ask the capability to begin listening
    fn start(&mut self) -> Result<(), RecognitionError>;

    /// Ask the capability to stop; an `End` signal follows
    fn stop(&mut self);

    /// Tear down without delivering further signals
    fn abort(&mut self);
}

/// Creates handles for a specific capability
pub trait RecognitionHandleFactory: Send {
    /// Fails with [`RecognitionError::Unsupported`] when the capability is absent
    fn create(
        &self,
        config: &RecognitionConfig,
        sink: SignalSink,
    ) -> Result<Box<dyn RecognitionHandle>, RecognitionError>;
}

/// Factory for environments without any recognition capability
#[derive(Debug, Default)]
pub struct UnavailableFactory;

impl RecognitionHandleFactory for UnavailableFactory {
    fn create(
        &self,
        _config: &RecognitionConfig,
        _sink: SignalSink,
    ) -> Result<Box<dyn RecognitionHandle>, RecognitionError> {
        Err(RecognitionError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecognitionConfig::default();
        assert!(config.continuous);
        assert!(config.interim_results);
        assert_eq!(config.language, "en-US");
    }

    #[test]
    fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SignalSink::new(7, tx);
        sink.send(PlatformSignal::Start).unwrap();

        let signal = rx.try_recv().unwrap();
        assert_eq!(signal.generation, 7);
        assert_eq!(signal.kind, PlatformSignal::Start);
    }

    #[test]
    fn test_sink_reports_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = SignalSink::new(0, tx);
        drop(rx);
        assert_eq!(sink.send(PlatformSignal::End), Err(RecognitionError::ChannelClosed));
    }

    #[test]
    fn test_unavailable_factory() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = UnavailableFactory.create(&RecognitionConfig::default(), SignalSink::new(0, tx));
        assert!(matches!(result, Err(RecognitionError::Unsupported)));
    }
}
