//! Observer callback delivery.
//!
//! Time-observer callbacks run on a dedicated delivery thread so that
//! consumer-side work (UI updates and the like) can never block frame
//! processing on the engine thread. Dispatch is fire-and-forget and
//! preserves submission order.

use std::thread::{self, JoinHandle};

use prism_video_core::TimeObserver;

enum DispatchJob {
    Fire(TimeObserver),
    Shutdown,
}

/// Runs observer callbacks on a dedicated delivery thread.
pub(crate) struct CallbackDispatcher {
    handle: Option<JoinHandle<()>>,
    job_tx: crossbeam_channel::Sender<DispatchJob>,
}

impl CallbackDispatcher {
    /// Creates the dispatcher and starts its delivery thread.
    pub(crate) fn new() -> Self {
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<DispatchJob>();
        let handle = thread::spawn(move || {
            for job in job_rx.iter() {
                match job {
                    DispatchJob::Fire(observer) => {
                        tracing::trace!("firing observer {:?}", observer.id());
                        observer.fire();
                    }
                    DispatchJob::Shutdown => break,
                }
            }
        });
        Self {
            handle: Some(handle),
            job_tx,
        }
    }

    /// Queues an observer callback for asynchronous delivery.
    pub(crate) fn dispatch(&self, observer: TimeObserver) {
        let _ = self.job_tx.send(DispatchJob::Fire(observer));
    }
}

impl Drop for CallbackDispatcher {
    fn drop(&mut self) {
        let _ = self.job_tx.send(DispatchJob::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use prism_video_core::ObserverId;

    #[test]
    fn test_dispatch_preserves_order() {
        let dispatcher = CallbackDispatcher::new();
        let (tx, rx) = crossbeam_channel::unbounded();

        for i in 0..4u64 {
            let tx = tx.clone();
            dispatcher.dispatch(TimeObserver::new(
                ObserverId::new(i),
                Duration::from_secs(i),
                Arc::new(move || {
                    let _ = tx.send(i);
                }),
            ));
        }

        let mut fired = Vec::new();
        for _ in 0..4 {
            fired.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        assert_eq!(fired, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_drop_joins_cleanly() {
        let dispatcher = CallbackDispatcher::new();
        drop(dispatcher);
    }
}
