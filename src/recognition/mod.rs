//! Recognition module wrapping an external speech-recognition capability
//!
//! The capability is injected through [`RecognitionHandleFactory`]. The
//! [`RecognitionAdapter`] owns the single handle a session uses and turns
//! the capability's raw signals into [`AdapterEvent`]s.

mod adapter;
mod console;
mod error;
mod handle;
mod signal;

#[cfg(test)]
pub mod fake;

pub use adapter::RecognitionAdapter;
pub use console::ConsoleRecognizerFactory;
pub use error::{ErrorKind, RecognitionError};
pub use handle::{
    RecognitionConfig, RecognitionHandle, RecognitionHandleFactory, SignalSink, UnavailableFactory,
};
pub use signal::{AdapterEvent, EndReason, PlatformSignal, RecognitionResult, Signal};
