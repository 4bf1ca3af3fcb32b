//! Line-oriented recognition capability
//!
//! Treats every line read from stdin as one spoken utterance. Useful for
//! driving the daemon from a terminal without a speech engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::RecognitionError;
use super::handle::{RecognitionConfig, RecognitionHandle, RecognitionHandleFactory, SignalSink};
use super::signal::{PlatformSignal, RecognitionResult};

/// Creates console handles sharing one line source
pub struct ConsoleRecognizerFactory {
    lines: broadcast::Sender<String>,
}

impl ConsoleRecognizerFactory {
    /// Read utterances from the process's stdin
    ///
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (lines, _) = broadcast::channel(64);
        let tx = lines.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        // No receivers just means nobody is subscribed yet
                        let _ = tx.send(line);
                    }
                    Ok(None) => {
                        info!("stdin closed, console recognizer has no more input");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "failed to read from stdin");
                        break;
                    }
                }
            }
        });

        Self::from_lines(lines)
    }

    /// Read utterances from an existing line channel
    pub fn from_lines(lines: broadcast::Sender<String>) -> Self {
        Self { lines }
    }
}

impl RecognitionHandleFactory for ConsoleRecognizerFactory {
    fn create(
        &self,
        config: &RecognitionConfig,
        sink: SignalSink,
    ) -> Result<Box<dyn RecognitionHandle>, RecognitionError> {
        let gate = Arc::new(Gate {
            active: AtomicBool::new(false),
            continuous: config.continuous,
            interim_results: config.interim_results,
        });

        let task = tokio::spawn(forward_lines(
            self.lines.subscribe(),
            Arc::clone(&gate),
            sink.clone(),
        ));

        Ok(Box::new(ConsoleRecognizer { gate, sink, task }))
    }
}

struct Gate {
    active: AtomicBool,
    continuous: bool,
    interim_results: bool,
}

struct ConsoleRecognizer {
    gate: Arc<Gate>,
    sink: SignalSink,
    task: JoinHandle<()>,
}

impl RecognitionHandle for ConsoleRecognizer {
    fn start(&mut self) -> Result<(), RecognitionError> {
        if self.gate.active.swap(true, Ordering::SeqCst) {
            return Err(RecognitionError::AlreadyActive);
        }
        self.sink.send(PlatformSignal::Start)
    }

    fn stop(&mut self) {
        if self.gate.active.swap(false, Ordering::SeqCst) {
            let _ = self.sink.send(PlatformSignal::End);
        }
    }

    fn abort(&mut self) {
        self.gate.active.store(false, Ordering::SeqCst);
    }
}

impl Drop for ConsoleRecognizer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward_lines(
    mut lines: broadcast::Receiver<String>,
    gate: Arc<Gate>,
    sink: SignalSink,
) {
    loop {
        let line = match lines.recv().await {
            Ok(line) => line,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "console recognizer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if !gate.active.load(Ordering::SeqCst) {
            debug!("ignoring console input while not listening");
            continue;
        }

        if deliver_utterance(&line, &gate, &sink).is_err() {
            return;
        }

        if !gate.continuous && gate.active.swap(false, Ordering::SeqCst) {
            let _ = sink.send(PlatformSignal::End);
        }
    }
}

/// Send an utterance's signals, stopping as soon as the gate closes
fn deliver_utterance(line: &str, gate: &Gate, sink: &SignalSink) -> Result<(), RecognitionError> {
    for signal in utterance_signals(line, gate.interim_results) {
        if !gate.active.load(Ordering::SeqCst) {
            debug!("recognition stopped mid-utterance");
            break;
        }
        sink.send(signal)?;
    }
    Ok(())
}

/// Signals for one utterance: growing interim prefixes, then the final text
fn utterance_signals(line: &str, interim_results: bool) -> Vec<PlatformSignal> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let mut signals = Vec::new();
    if interim_results {
        for end in 1..words.len() {
            signals.push(PlatformSignal::Result {
                result_index: 0,
                results: vec![RecognitionResult::interim(words[..end].join(" "))],
            });
        }
    }
    signals.push(PlatformSignal::Result {
        result_index: 0,
        results: vec![RecognitionResult::final_text(words.join(" "))],
    });
    signals
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::recognition::signal::Signal;

    fn final_signal(text: &str) -> PlatformSignal {
        PlatformSignal::Result {
            result_index: 0,
            results: vec![RecognitionResult::final_text(text)],
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Signal>) -> PlatformSignal {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("signal not delivered")
            .expect("channel closed")
            .kind
    }

    #[test]
    fn test_utterance_with_interim() {
        let signals = utterance_signals("  hello   big world ", true);
        assert_eq!(signals.len(), 3);
        assert_eq!(
            signals[0],
            PlatformSignal::Result {
                result_index: 0,
                results: vec![RecognitionResult::interim("hello")],
            }
        );
        assert_eq!(signals[2], final_signal("hello big world"));
    }

    #[test]
    fn test_utterance_without_interim() {
        assert_eq!(utterance_signals("hi there", false), vec![final_signal("hi there")]);
        assert!(utterance_signals("   ", true).is_empty());
    }

    #[test]
    fn test_closed_gate_delivers_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = SignalSink::new(0, tx);
        let gate = Gate {
            active: AtomicBool::new(true),
            continuous: true,
            interim_results: true,
        };

        deliver_utterance("one two three", &gate, &sink).unwrap();
        let mut delivered = 0;
        while rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 3);

        gate.active.store(false, Ordering::SeqCst);
        deliver_utterance("one two three", &gate, &sink).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lines_only_while_active() {
        let (lines, _) = broadcast::channel(8);
        let factory = ConsoleRecognizerFactory::from_lines(lines.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = RecognitionConfig {
            interim_results: false,
            ..RecognitionConfig::default()
        };
        let mut handle = factory.create(&config, SignalSink::new(3, tx)).unwrap();

        handle.start().unwrap();
        assert_eq!(next(&mut rx).await, PlatformSignal::Start);
        assert_eq!(handle.start(), Err(RecognitionError::AlreadyActive));

        lines.send("hello world".to_string()).unwrap();
        assert_eq!(next(&mut rx).await, final_signal("hello world"));

        handle.stop();
        assert_eq!(next(&mut rx).await, PlatformSignal::End);
        handle.stop();

        lines.send("ignored".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_single_shot_ends_after_final() {
        let (lines, _) = broadcast::channel(8);
        let factory = ConsoleRecognizerFactory::from_lines(lines.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = RecognitionConfig {
            continuous: false,
            interim_results: false,
            ..RecognitionConfig::default()
        };
        let mut handle = factory.create(&config, SignalSink::new(0, tx)).unwrap();

        handle.start().unwrap();
        assert_eq!(next(&mut rx).await, PlatformSignal::Start);

        lines.send("done".to_string()).unwrap();
        assert_eq!(next(&mut rx).await, final_signal("done"));
        assert_eq!(next(&mut rx).await, PlatformSignal::End);
    }
}
