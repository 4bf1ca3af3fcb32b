//! Scriptable recognition capability for tests

use std::sync::{Arc, Mutex};

use super::error::RecognitionError;
use super::handle::{RecognitionConfig, RecognitionHandle, RecognitionHandleFactory, SignalSink};
use super::signal::PlatformSignal;

/// Calls a fake handle has received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Start,
    Stop,
    Abort,
}

#[derive(Default)]
struct Inner {
    unsupported: bool,
    /// Confirm start/stop through the sink immediately
    auto_confirm: bool,
    fail_next_start: Option<RecognitionError>,
    calls: Vec<FakeCall>,
    configs: Vec<RecognitionConfig>,
    sinks: Vec<SignalSink>,
}

/// Factory whose handles record their calls; clones share state
#[derive(Clone, Default)]
pub struct FakeFactory {
    inner: Arc<Mutex<Inner>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsupported() -> Self {
        let factory = Self::new();
        factory.inner.lock().unwrap().unsupported = true;
        factory
    }

    /// Handles answer `start` with `Start` and `stop` with `End`
    pub fn auto_confirm() -> Self {
        let factory = Self::new();
        factory.inner.lock().unwrap().auto_confirm = true;
        factory
    }

    pub fn fail_next_start(&self, error: RecognitionError) {
        self.inner.lock().unwrap().fail_next_start = Some(error);
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: FakeCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn configs(&self) -> Vec<RecognitionConfig> {
        self.inner.lock().unwrap().configs.clone()
    }

    pub fn creations(&self) -> usize {
        self.inner.lock().unwrap().sinks.len()
    }

    /// Deliver a signal on the most recently created subscription
    pub fn emit(&self, signal: PlatformSignal) {
        self.emit_on(self.creations() - 1, signal);
    }

    /// Deliver a signal on the `index`-th subscription ever created
    pub fn emit_on(&self, index: usize, signal: PlatformSignal) {
        let sink = self.inner.lock().unwrap().sinks[index].clone();
        sink.send(signal).unwrap();
    }
}

impl RecognitionHandleFactory for FakeFactory {
    fn create(
        &self,
        config: &RecognitionConfig,
        sink: SignalSink,
    ) -> Result<Box<dyn RecognitionHandle>, RecognitionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unsupported {
            return Err(RecognitionError::Unsupported);
        }
        inner.configs.push(config.clone());
        inner.sinks.push(sink.clone());

        Ok(Box::new(FakeHandle {
            inner: Arc::clone(&self.inner),
            sink,
        }))
    }
}

struct FakeHandle {
    inner: Arc<Mutex<Inner>>,
    sink: SignalSink,
}

impl RecognitionHandle for FakeHandle {
    fn start(&mut self) -> Result<(), RecognitionError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_start.take() {
            return Err(error);
        }
        inner.calls.push(FakeCall::Start);
        if inner.auto_confirm {
            let _ = self.sink.send(PlatformSignal::Start);
        }
        Ok(())
    }

    fn stop(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(FakeCall::Stop);
        if inner.auto_confirm {
            let _ = self.sink.send(PlatformSignal::End);
        }
    }

    fn abort(&mut self) {
        self.inner.lock().unwrap().calls.push(FakeCall::Abort);
    }
}
