use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

use dbconsole_core::log_store::{LogApi, LogCategory, LogEntry, LogForwarder};
use dbconsole_core::ring_buffer::RingBuffer;

const PENDING_CAPACITY: usize = 256;
const MAX_IN_FLIGHT: u32 = 8;

#[derive(Debug)]
enum Command {
    Entry(LogEntry),
    Clear(Option<LogCategory>),
    Retry(oneshot::Sender<usize>),
    Flush(oneshot::Sender<()>),
}

/// Sizes of the delivery pipeline. Entries that do not fit in `pending`
/// go straight to the failed queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryLimits {
    pub pending: usize,
    pub in_flight: u32,
    pub failed: usize,
}

impl DeliveryLimits {
    #[must_use]
    pub fn new(failed: usize) -> Self {
        Self {
            pending: PENDING_CAPACITY,
            in_flight: MAX_IN_FLIGHT,
            failed,
        }
    }
}

type FailedQueue = Arc<Mutex<RingBuffer<LogEntry>>>;

fn park(failed: &FailedQueue, entry: LogEntry) {
    if let Some(dropped) = failed.lock().push(entry) {
        debug!(timestamp = %dropped.timestamp, "failed-delivery queue full; dropped oldest entry");
    }
}

/// Hands entries to the delivery task without blocking the caller.
#[derive(Debug, Clone)]
pub struct ChannelLogForwarder {
    sender: mpsc::Sender<Command>,
    failed: FailedQueue,
}

impl LogForwarder for ChannelLogForwarder {
    fn forward(&self, entry: &LogEntry) {
        // a closed channel means delivery already shut down
        if let Err(TrySendError::Full(Command::Entry(entry))) =
            self.sender.try_send(Command::Entry(entry.clone()))
        {
            park(&self.failed, entry);
        }
    }

    fn clear_remote(&self, category: Option<LogCategory>) {
        if self.sender.try_send(Command::Clear(category)).is_err() {
            debug!("log delivery backlog full; remote clear skipped");
        }
    }
}

/// Owner side of the delivery task.
#[derive(Debug)]
pub struct LogDeliveryHandle {
    sender: mpsc::Sender<Command>,
    failed: FailedQueue,
    task: JoinHandle<()>,
}

impl LogDeliveryHandle {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.lock().len()
    }

    #[must_use]
    pub fn failed_entries(&self) -> Vec<LogEntry> {
        self.failed.lock().to_vec()
    }

    /// Re-sends every queued failure once and returns how many failed again.
    pub async fn retry_failed(&self) -> usize {
        let (reply, response) = oneshot::channel();
        if self.sender.send(Command::Retry(reply)).await.is_err() {
            return self.failed_count();
        }
        response.await.unwrap_or_else(|_| self.failed_count())
    }

    /// Waits until everything queued before this call has been attempted.
    pub async fn flush(&self) {
        let (reply, response) = oneshot::channel();
        if self.sender.send(Command::Flush(reply)).await.is_ok() {
            let _ = response.await;
        }
    }

    /// Retries the failed queue once and flushes, giving up after `grace`.
    /// Returns the entries still undelivered, or `None` when time ran out.
    pub async fn close(self, grace: Duration) -> Option<usize> {
        let settled = tokio::time::timeout(grace, async {
            let still_failed = self.retry_failed().await;
            self.flush().await;
            still_failed
        })
        .await
        .ok();
        self.task.abort();
        settled
    }
}

/// Starts the delivery task on `runtime`. At most `limits.in_flight` posts
/// run at once; failed posts land in a bounded queue that evicts the oldest
/// entry when full.
pub fn spawn_log_delivery<A: LogApi + 'static>(
    api: Arc<A>,
    limits: DeliveryLimits,
    runtime: &Handle,
) -> (ChannelLogForwarder, LogDeliveryHandle) {
    let (sender, receiver) = mpsc::channel(limits.pending.max(1));
    let failed: FailedQueue = Arc::new(Mutex::new(RingBuffer::new(limits.failed)));
    let task = runtime.spawn(run_delivery(
        api,
        receiver,
        failed.clone(),
        limits.in_flight.max(1),
    ));

    (
        ChannelLogForwarder {
            sender: sender.clone(),
            failed: failed.clone(),
        },
        LogDeliveryHandle {
            sender,
            failed,
            task,
        },
    )
}

async fn run_delivery<A: LogApi + 'static>(
    api: Arc<A>,
    mut receiver: mpsc::Receiver<Command>,
    failed: FailedQueue,
    in_flight: u32,
) {
    let permits = Arc::new(Semaphore::new(in_flight as usize));
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Entry(entry) => post(&api, &failed, &permits, entry).await,
            Command::Clear(category) => {
                if let Err(error) = api.clear_logs(category).await {
                    debug!(%error, "remote log clear failed");
                }
            }
            Command::Retry(reply) => {
                let pending = failed.lock().drain();
                for entry in pending {
                    post(&api, &failed, &permits, entry).await;
                }
                settle(&permits, in_flight).await;
                let _ = reply.send(failed.lock().len());
            }
            Command::Flush(reply) => {
                settle(&permits, in_flight).await;
                let _ = reply.send(());
            }
        }
    }
}

/// Spawns one post once a slot is free.
async fn post<A: LogApi + 'static>(
    api: &Arc<A>,
    failed: &FailedQueue,
    permits: &Arc<Semaphore>,
    entry: LogEntry,
) {
    let Ok(permit) = permits.clone().acquire_owned().await else {
        return;
    };
    let api = api.clone();
    let failed = failed.clone();
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(error) = api.post_log(&entry).await {
            debug!(%error, category = entry.category.as_str(), "log delivery failed");
            park(&failed, entry);
        }
    });
}

// every slot free means no post is in flight
async fn settle(permits: &Semaphore, in_flight: u32) {
    if let Ok(all) = permits.acquire_many(in_flight).await {
        drop(all);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::runtime::Handle;
    use tokio::time::Instant;

    use super::{spawn_log_delivery, DeliveryLimits};
    use dbconsole_core::api::ApiError;
    use dbconsole_core::log_store::{
        details, LogApi, LogCategory, LogEntry, LogForwarder, LogStore,
    };

    #[derive(Default)]
    struct FlakyLogApi {
        offline: AtomicBool,
        posted: Mutex<Vec<String>>,
        clears: AtomicUsize,
    }

    #[async_trait]
    impl LogApi for FlakyLogApi {
        async fn post_log(&self, entry: &LogEntry) -> Result<(), ApiError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ApiError::Transport("connection refused".to_string()));
            }
            self.posted.lock().push(entry.message.clone());
            Ok(())
        }

        async fn cleanup_logs(&self, _max_files: u32) -> Result<(), ApiError> {
            Ok(())
        }

        async fn clear_logs(&self, _category: Option<LogCategory>) -> Result<(), ApiError> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Every post hangs until the client timeout fires.
    #[derive(Default)]
    struct UnreachableLogApi {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl LogApi for UnreachableLogApi {
        async fn post_log(&self, _entry: &LogEntry) -> Result<(), ApiError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ApiError::Timeout(Duration::from_secs(30)))
        }

        async fn cleanup_logs(&self, _max_files: u32) -> Result<(), ApiError> {
            Ok(())
        }

        async fn clear_logs(&self, _category: Option<LogCategory>) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn serial(failed: usize) -> DeliveryLimits {
        DeliveryLimits {
            in_flight: 1,
            ..DeliveryLimits::new(failed)
        }
    }

    #[tokio::test]
    async fn recorded_entries_are_posted() {
        let api = Arc::new(FlakyLogApi::default());
        let (forwarder, handle) =
            spawn_log_delivery(api.clone(), DeliveryLimits::new(10), &Handle::current());
        let store = LogStore::forwarding(50, Arc::new(forwarder));

        store.record(LogCategory::Query, "first", details([]));
        store.record(LogCategory::Audit, "second", details([]));
        store.clear(Some(LogCategory::Query));
        handle.flush().await;

        let mut posted = api.posted.lock().clone();
        posted.sort();
        assert_eq!(posted, vec!["first", "second"]);
        assert_eq!(api.clears.load(Ordering::SeqCst), 1);
        assert_eq!(handle.failed_count(), 0);
    }

    #[tokio::test]
    async fn failures_are_queued_bounded_and_retried_once() {
        let api = Arc::new(FlakyLogApi::default());
        api.offline.store(true, Ordering::SeqCst);
        let (forwarder, handle) = spawn_log_delivery(api.clone(), serial(2), &Handle::current());
        let store = LogStore::forwarding(50, Arc::new(forwarder));

        for message in ["a", "b", "c"] {
            store.record(LogCategory::Common, message, details([]));
        }
        handle.flush().await;

        let queued: Vec<_> = handle
            .failed_entries()
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert_eq!(queued, vec!["b", "c"]);

        assert_eq!(handle.retry_failed().await, 2);

        api.offline.store(false, Ordering::SeqCst);
        assert_eq!(handle.retry_failed().await, 0);
        assert_eq!(*api.posted.lock(), vec!["b", "c"]);
        assert_eq!(handle.close(Duration::from_secs(1)).await, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_backend_never_stalls_exit() {
        let api = Arc::new(UnreachableLogApi::default());
        let limits = DeliveryLimits {
            pending: 4,
            in_flight: 4,
            failed: 100,
        };
        let (forwarder, handle) = spawn_log_delivery(api.clone(), limits, &Handle::current());
        let store = LogStore::in_memory(50);
        store.record(LogCategory::Common, "template", details([]));
        let entry = store.entries(LogCategory::Common).remove(0);

        for _ in 0..20 {
            forwarder.forward(&entry);
        }
        // the backlog holds four; the rest overflow without waiting
        assert_eq!(handle.failed_count(), 16);

        let started = Instant::now();
        handle.flush().await;
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(31));
        assert_eq!(api.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(handle.failed_count(), 20);

        let closing = Instant::now();
        assert_eq!(handle.close(Duration::from_secs(2)).await, None);
        assert!(closing.elapsed() <= Duration::from_secs(3));
    }
}
