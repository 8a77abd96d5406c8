use std::{future::Future, time::Duration};
use tokio::task::JoinHandle;

/// Delay used for search input.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Runs only the most recently scheduled call, once `delay` has passed without a newer one.
///
/// The pending call is cancelled when a new one is scheduled, on [`Debouncer::cancel`],
/// and when the debouncer is dropped. Must be used inside a Tokio runtime.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn schedule<F>(&mut self, call: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            call.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
