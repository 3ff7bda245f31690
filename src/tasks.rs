//! Background execution of service calls.
//!
//! [`TaskRunner::submit`] spawns an operation on the tokio runtime and hands
//! back a [`TaskHandle`] that resolves with the operation's result. While the
//! task runs, the runner's [`ProgressReporter`] receives a heartbeat every
//! 100 ms so a status line can animate.
//!
//! At most one task per key (usually a note guid) runs at a time: a second
//! submission for a busy key is refused with [`TaskError::Busy`]. Tasks are
//! never cancelled or reordered.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::progress::{ProgressEvent, ProgressReporter, SPINNER_FRAMES};

pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("an operation on '{0}' is already in progress")]
    Busy(String),
}

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Releases a task key when the task ends, even if it panicked.
struct KeyGuard {
    key: Option<String>,
    in_flight: InFlight,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}

#[derive(Clone)]
pub struct TaskRunner {
    in_flight: InFlight,
    reporter: Arc<dyn ProgressReporter>,
    tick: Duration,
}

impl TaskRunner {
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            reporter,
            tick: TICK_INTERVAL,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn is_busy(&self, key: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Run `future` in the background.
    ///
    /// `key` serialises work on one object; `None` never conflicts.
    pub fn submit<T, F>(
        &self,
        key: Option<&str>,
        label: impl Into<String>,
        future: F,
    ) -> Result<TaskHandle<T>, TaskError>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let label = label.into();
        if let Some(key) = key {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if !in_flight.insert(key.to_string()) {
                return Err(TaskError::Busy(key.to_string()));
            }
        }
        let guard = KeyGuard {
            key: key.map(str::to_string),
            in_flight: Arc::clone(&self.in_flight),
        };

        let (tx, rx) = oneshot::channel();
        let reporter = Arc::clone(&self.reporter);
        let tick = self.tick;
        let task_label = label.clone();

        tokio::spawn(async move {
            reporter.report(ProgressEvent::Started {
                label: task_label.clone(),
            });

            let ticker = {
                let reporter = Arc::clone(&reporter);
                let label = task_label.clone();
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(tick);
                    // The first tick completes immediately
                    interval.tick().await;
                    let mut frame = 0;
                    loop {
                        interval.tick().await;
                        reporter.report(ProgressEvent::Tick {
                            label: label.clone(),
                            frame,
                        });
                        frame = (frame + 1) % SPINNER_FRAMES;
                    }
                })
            };

            let result = future.await;
            ticker.abort();

            match &result {
                Ok(_) => reporter.report(ProgressEvent::Finished {
                    label: task_label.clone(),
                }),
                Err(e) => reporter.report(ProgressEvent::Failed {
                    label: task_label.clone(),
                    error: format!("{:#}", e),
                }),
            }
            debug!(task = %task_label, ok = result.is_ok(), "task finished");

            drop(guard);
            let _ = tx.send(result);
        });

        Ok(TaskHandle { label, rx })
    }
}

/// Pending result of a submitted task.
pub struct TaskHandle<T> {
    label: String,
    rx: oneshot::Receiver<anyhow::Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn wait(self) -> anyhow::Result<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("task '{}' ended without a result", self.label)),
        }
    }

    /// Wait, then run `callback` on the result before returning it.
    pub async fn on_completion<F>(self, callback: F) -> anyhow::Result<T>
    where
        F: FnOnce(&anyhow::Result<T>),
    {
        let result = self.wait().await;
        callback(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn delivers_the_result() {
        let runner = TaskRunner::new(Arc::new(NoProgress));
        let handle = runner.submit(None, "adding", async { Ok(2 + 2) }).unwrap();
        assert_eq!(handle.label(), "adding");
        assert_eq!(handle.wait().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn one_task_per_key() {
        let runner = TaskRunner::new(Arc::new(NoProgress));
        let (release, wait_release) = oneshot::channel::<()>();
        let first = runner
            .submit(Some("note-1"), "saving", async move {
                let _ = wait_release.await;
                Ok("saved")
            })
            .unwrap();

        assert!(runner.is_busy("note-1"));
        let second = runner.submit(Some("note-1"), "saving", async { Ok("again") });
        assert_eq!(second.err(), Some(TaskError::Busy("note-1".into())));

        let other = runner
            .submit(Some("note-2"), "saving", async { Ok("other") })
            .unwrap();
        assert_eq!(other.wait().await.unwrap(), "other");

        release.send(()).unwrap();
        assert_eq!(first.wait().await.unwrap(), "saved");
        assert!(!runner.is_busy("note-1"));
        let third = runner
            .submit(Some("note-1"), "saving", async { Ok("third") })
            .unwrap();
        assert_eq!(third.wait().await.unwrap(), "third");
    }

    #[tokio::test]
    async fn reports_ticks_and_failure() {
        let recorder = Arc::new(Recorder::default());
        let runner = TaskRunner::new(recorder.clone()).with_tick(Duration::from_millis(10));
        let handle = runner
            .submit(None, "sending", async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err::<(), _>(anyhow!("boom"))
            })
            .unwrap();

        let mut seen = None;
        let result = handle
            .on_completion(|r| seen = Some(r.is_err()))
            .await;
        assert!(result.is_err());
        assert_eq!(seen, Some(true));

        let events = recorder.0.lock().unwrap().clone();
        assert_eq!(
            events.first(),
            Some(&ProgressEvent::Started {
                label: "sending".into()
            })
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, ProgressEvent::Tick { .. })));
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::Failed {
                label: "sending".into(),
                error: "boom".into()
            })
        );
    }
}
