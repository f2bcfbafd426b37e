//! In-process event broker.
//!
//! Named events fan out to every handler registered under that name, in
//! registration order. Delivery is synchronous: [`EventBroker::notify`]
//! runs each handler to completion on the calling task before moving to the
//! next one, and only returns once all of them have finished. The write
//! worker relies on this to get `put(i), get(i), put(i+1)` with no
//! interleaving.
//!
//! ```text
//! WriteWorker ── notify("write-completed", 7) ──► handler 0 ──► handler 1 ──► return
//! ```
//!
//! Handler failures are isolated. An `Err` or a panic from one handler is
//! logged and counted in the returned [`DeliveryReport`], never re-raised,
//! and the remaining handlers still run.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Published by the write worker after each successful upload; payload is
/// the object identifier.
pub const WRITE_COMPLETED: &str = "write-completed";

/// Published once after the last identifier; payload is [`NO_PAYLOAD`].
pub const WRITE_FINISHED: &str = "write-finished";

/// Sentinel payload for events that carry no identifier.
pub const NO_PAYLOAD: u64 = u64::MAX;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Arc<dyn Fn(u64) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Outcome of one `notify` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Handlers that returned `Ok`
    pub succeeded: usize,
    /// Handlers that returned `Err` or panicked
    pub failed: usize,
}

impl DeliveryReport {
    pub fn invoked(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Publish/subscribe registry keyed by event name.
#[derive(Default)]
pub struct EventBroker {
    subscribers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every future `notify(event, ..)`.
    ///
    /// Appends to the existing list for `event`; earlier handlers are kept.
    /// Events published before this call are not replayed.
    pub fn subscribe<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload| handler(payload).boxed());
        let mut subscribers = self.subscribers.write();
        let list = subscribers.entry(event.to_string()).or_default();
        list.push(handler);
        debug!(event, position = list.len() - 1, "subscriber registered");
    }

    /// Deliver `payload` to every handler currently registered for `event`.
    ///
    /// The handler list is snapshotted before delivery, so a concurrent
    /// `subscribe` is either fully visible to this call or not at all. With
    /// no subscribers this is a no-op.
    pub async fn notify(&self, event: &str, payload: u64) -> DeliveryReport {
        let handlers: Vec<Handler> = {
            let subscribers = self.subscribers.read();
            subscribers.get(event).cloned().unwrap_or_default()
        };

        let mut report = DeliveryReport::default();
        for (position, handler) in handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(async { handler(payload).await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => report.succeeded += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(event, payload, position, error = %e, "event handler failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    warn!(
                        event,
                        payload,
                        position,
                        panic = panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        report
    }

    /// `notify` with the [`NO_PAYLOAD`] sentinel.
    pub async fn notify_signal(&self, event: &str) -> DeliveryReport {
        self.notify(event, NO_PAYLOAD).await
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers.read().get(event).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let subscribers = self.subscribers.read();
        let mut counts: Vec<(&str, usize)> = subscribers
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        counts.sort();
        f.debug_struct("EventBroker")
            .field("subscribers", &counts)
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn recorder(
        broker: &EventBroker,
        event: &str,
        tag: &'static str,
        log: &Arc<Mutex<Vec<(&'static str, u64)>>>,
    ) {
        let log = log.clone();
        broker.subscribe(event, move |payload| {
            let log = log.clone();
            async move {
                log.lock().push((tag, payload));
                HandlerResult::Ok(())
            }
        });
    }

    #[tokio::test]
    async fn test_notify_without_subscribers_is_noop() {
        let broker = EventBroker::new();
        let report = broker.notify(WRITE_COMPLETED, 1).await;
        assert_eq!(report, DeliveryReport::default());
        assert_eq!(broker.subscriber_count(WRITE_COMPLETED), 0);
    }

    #[tokio::test]
    async fn test_fan_out_in_registration_order() {
        let broker = EventBroker::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&broker, WRITE_COMPLETED, "first", &log);
        recorder(&broker, WRITE_COMPLETED, "second", &log);
        recorder(&broker, WRITE_COMPLETED, "third", &log);

        let report = broker.notify(WRITE_COMPLETED, 42).await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(
            *log.lock(),
            vec![("first", 42), ("second", 42), ("third", 42)]
        );
    }

    #[tokio::test]
    async fn test_events_are_routed_by_name() {
        let broker = EventBroker::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&broker, WRITE_COMPLETED, "completed", &log);
        recorder(&broker, WRITE_FINISHED, "finished", &log);

        broker.notify(WRITE_COMPLETED, 3).await;
        broker.notify_signal(WRITE_FINISHED).await;

        assert_eq!(
            *log.lock(),
            vec![("completed", 3), ("finished", NO_PAYLOAD)]
        );
    }

    #[tokio::test]
    async fn test_no_retroactive_delivery() {
        let broker = EventBroker::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&broker, WRITE_COMPLETED, "early", &log);
        broker.notify(WRITE_COMPLETED, 1).await;

        recorder(&broker, WRITE_COMPLETED, "late", &log);
        broker.notify(WRITE_COMPLETED, 2).await;

        assert_eq!(
            *log.lock(),
            vec![("early", 1), ("early", 2), ("late", 2)]
        );
    }

    #[tokio::test]
    async fn test_notify_waits_for_handlers() {
        let broker = EventBroker::new();
        let done = Arc::new(AtomicUsize::new(0));
        let flag = done.clone();
        broker.subscribe(WRITE_COMPLETED, move |_| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.fetch_add(1, Ordering::SeqCst);
                HandlerResult::Ok(())
            }
        });

        broker.notify(WRITE_COMPLETED, 0).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_handler_is_isolated() {
        let broker = EventBroker::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        broker.subscribe(WRITE_COMPLETED, |payload| async move {
            HandlerResult::Err(format!("cannot handle {}", payload).into())
        });
        recorder(&broker, WRITE_COMPLETED, "after-error", &log);

        let report = broker.notify(WRITE_COMPLETED, 5).await;

        assert_eq!(report, DeliveryReport { succeeded: 1, failed: 1 });
        assert_eq!(*log.lock(), vec![("after-error", 5)]);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let broker = EventBroker::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        broker.subscribe(WRITE_COMPLETED, |payload| async move {
            if payload == 9 {
                panic!("handler exploded");
            }
            HandlerResult::Ok(())
        });
        recorder(&broker, WRITE_COMPLETED, "survivor", &log);

        let report = broker.notify(WRITE_COMPLETED, 9).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.invoked(), 2);
        assert_eq!(*log.lock(), vec![("survivor", 9)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_subscribe_and_notify() {
        let broker = Arc::new(EventBroker::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let broker = broker.clone();
            let hits = hits.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    let hits = hits.clone();
                    broker.subscribe(WRITE_COMPLETED, move |_| {
                        let hits = hits.clone();
                        async move {
                            hits.fetch_add(1, Ordering::SeqCst);
                            HandlerResult::Ok(())
                        }
                    });
                    broker.notify(WRITE_FINISHED, 0).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(broker.subscriber_count(WRITE_COMPLETED), 200);
        let report = broker.notify(WRITE_COMPLETED, 1).await;
        assert_eq!(report.succeeded, 200);
        assert_eq!(hits.load(Ordering::SeqCst), 200);
    }
}
