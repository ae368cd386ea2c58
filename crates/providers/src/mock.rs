//! Scripted mock generator for tests and smoke checks.

use async_trait::async_trait;
use parley_core::error::GenerationError;
use parley_core::generation::{GenUnit, GenUsage, GenerationRequest, Generator};
use std::sync::Mutex;

/// A mock generator that streams a scripted sequence of text units,
/// closing with a `done` unit carrying the configured usage.
///
/// When `fail_after` is set, the stream errors out after that many units
/// instead of completing.
pub struct MockGenerator {
    units: Vec<String>,
    usage: Option<GenUsage>,
    fail_after: Option<usize>,
    calls: Mutex<usize>,
}

impl MockGenerator {
    pub fn new(units: Vec<String>) -> Self {
        Self {
            units,
            usage: Some(GenUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            }),
            fail_after: None,
            calls: Mutex::new(0),
        }
    }

    /// Stream a single text split into word-sized units.
    pub fn from_text(text: &str) -> Self {
        Self::new(
            text.split_inclusive(' ')
                .map(str::to_string)
                .collect::<Vec<_>>(),
        )
    }

    /// Override the usage record (None = backend reports no usage).
    pub fn with_usage(mut self, usage: Option<GenUsage>) -> Self {
        self.usage = usage;
        self
    }

    /// Fail with a stream error after `n` units.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// How many times `stream` was called.
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(
        &self,
        _request: GenerationRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<GenUnit, GenerationError>>,
        GenerationError,
    > {
        *self.calls.lock().unwrap() += 1;

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let units = self.units.clone();
        let usage = self.usage;
        let fail_after = self.fail_after;

        tokio::spawn(async move {
            for (i, text) in units.into_iter().enumerate() {
                if fail_after == Some(i) {
                    let _ = tx
                        .send(Err(GenerationError::StreamInterrupted(
                            "scripted failure".into(),
                        )))
                        .await;
                    return;
                }
                if tx
                    .send(Ok(GenUnit {
                        text: Some(text),
                        done: false,
                        usage: None,
                    }))
                    .await
                    .is_err()
                {
                    return; // receiver dropped
                }
            }

            let _ = tx
                .send(Ok(GenUnit {
                    text: None,
                    done: true,
                    usage,
                }))
                .await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::generation::PromptTurn;

    fn request() -> GenerationRequest {
        GenerationRequest {
            turns: vec![PromptTurn::human("hi")],
            max_tokens: None,
            temperature: 0.3,
        }
    }

    #[tokio::test]
    async fn streams_units_then_done() {
        let generator = MockGenerator::from_text("Hello there friend");
        let mut rx = generator.stream(request()).await.unwrap();

        let mut text = String::new();
        let mut usage = None;
        while let Some(unit) = rx.recv().await {
            let unit = unit.unwrap();
            if let Some(t) = &unit.text {
                text.push_str(t);
            }
            if unit.done {
                usage = unit.usage;
            }
        }

        assert_eq!(text, "Hello there friend");
        assert_eq!(usage.unwrap().total_tokens, 15);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn failure_interrupts_stream() {
        let generator = MockGenerator::from_text("one two three").failing_after(1);
        let mut rx = generator.stream(request()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(first.is_ok());
        let second = rx.recv().await.unwrap();
        assert!(second.is_err());
        assert!(rx.recv().await.is_none());
    }
}
