//! Periodic and one-shot callbacks on the event loop (§4.1).

use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Wraps `schedule-every`: `start`, `stop`, and automatic `stop` on drop —
/// the same contract as the source's periodic-callback wrapper.
pub struct Timer {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    pub(crate) fn start(
        handle: &tokio::runtime::Handle,
        delay_ms: u64,
        mut callback: impl FnMut() + Send + 'static,
    ) -> Self {
        let period = Duration::from_millis(delay_ms.max(1));
        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; skip it so the callback's
            // first invocation happens after one full period, matching
            // "fires repeatedly" rather than "fires immediately then
            // repeatedly". Drift is not compensated (§4.1).
            interval.tick().await;
            loop {
                interval.tick().await;
                callback();
            }
        });
        Timer {
            task: Mutex::new(Some(task)),
        }
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `schedule-after`: fires `callback` once after `delay_ms`.
pub(crate) fn schedule_after(
    handle: &tokio::runtime::Handle,
    delay_ms: u64,
    callback: impl FnOnce() + Send + 'static,
) {
    let delay = Duration::from_millis(delay_ms);
    handle.spawn(async move {
        tokio::time::sleep(delay).await;
        callback();
    });
}
