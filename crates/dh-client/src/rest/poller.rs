//! Polling subscription emulator.
//!
//! REST has no push, so each subscription gets a worker that repeatedly
//! pulls everything newer than its cursor and feeds the listener:
//!
//! ```text
//!   Polling ──(items)──► Delivering ──► Polling
//!      │ error: wait retry_interval, same cursor
//!      │ empty before retry_interval: wait out the rest
//!      └──(stop / unsubscribed)──► done
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use shared_types::{Device, Timestamped};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::domain::cursor::Cursor;
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::listener::{Listener, ListenerRegistry};
use crate::lifecycle::StopSignal;
use crate::rest::executor::Executor;
use crate::rest::request::RestRequest;

/// Event classes a device can be polled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollClass {
    Commands,
    Notifications,
}

impl PollClass {
    fn segment(self) -> &'static str {
        match self {
            Self::Commands => "command",
            Self::Notifications => "notification",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Commands => "command/poll",
            Self::Notifications => "notification/poll",
        }
    }
}

/// Arguments of a single bounded pull.
#[derive(Debug, Clone, Default)]
pub struct PollQuery<'a> {
    /// Only items newer than this timestamp
    pub since: Option<&'a str>,
    /// Comma-separated names to filter on
    pub names: Option<&'a str>,
    /// How long the server may hold the request open
    pub wait: Option<Duration>,
}

/// `GET /device/{id}/<class>/poll`.
pub(crate) async fn pull<T: DeserializeOwned>(
    executor: &Executor,
    device: &Device,
    class: PollClass,
    query: PollQuery<'_>,
    timeout: Option<Duration>,
) -> ClientResult<Vec<T>> {
    let timeouts = &executor.config().timeouts;
    let wait = query.wait.unwrap_or(timeouts.poll_wait);

    let mut request = RestRequest::get(
        class.label(),
        &["device", device.id.as_str(), class.segment(), "poll"],
    )
    .device(device);
    if let Some(since) = query.since.filter(|since| !since.is_empty()) {
        request = request.query("timestamp", since);
    }
    if let Some(names) = query.names.filter(|names| !names.is_empty()) {
        request = request.query("names", names);
    }
    request = request.query("waitTimeout", wait.as_secs());

    executor
        .fetch(request, Some(timeout.unwrap_or(timeouts.poll)))
        .await
}

/// Where a poll worker gets its items from.
#[async_trait]
pub(crate) trait PollSource<T>: Send + Sync {
    async fn pull(&self, since: &str) -> ClientResult<Vec<T>>;
}

/// Pulls one device's commands or notifications.
pub(crate) struct DevicePoll {
    pub executor: Arc<Executor>,
    pub device: Device,
    pub class: PollClass,
}

#[async_trait]
impl<T> PollSource<T> for DevicePoll
where
    T: DeserializeOwned + Send + 'static,
{
    async fn pull(&self, since: &str) -> ClientResult<Vec<T>> {
        let query = PollQuery {
            since: Some(since),
            ..PollQuery::default()
        };
        pull(&self.executor, &self.device, self.class, query, None).await
    }
}

/// One subscription's worker.
pub(crate) struct Poller<T, S> {
    pub source: S,
    pub listener: Listener<T>,
    pub listeners: Arc<ListenerRegistry<T>>,
    pub cursor: Cursor,
    pub retry_interval: Duration,
}

impl<T, S> Poller<T, S>
where
    T: Timestamped + Send + 'static,
    S: PollSource<T>,
{
    /// Runs until stop, unsubscribe, or the listener closing.
    pub async fn run(mut self, mut stop: StopSignal) {
        let class = self.listeners.class();
        let device_id = self.listener.key().to_string();
        debug!(class, device_id = %device_id, since = %self.cursor.as_str(), "Poll worker started");

        loop {
            if !self.listeners.contains_same(&self.listener) {
                debug!(class, device_id = %device_id, "Unsubscribed");
                break;
            }

            let started = Instant::now();
            let pulled = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                pulled = self.source.pull(self.cursor.as_str()) => pulled,
            };

            match pulled {
                Ok(items) => {
                    if items.is_empty() {
                        // A server that ignores the wait must not turn this into a spin.
                        let rest = self.retry_interval.saturating_sub(started.elapsed());
                        trace!(class, device_id = %device_id, wait_ms = rest.as_millis() as u64, "Nothing new");
                        if !rest.is_zero() && !pause(&mut stop, rest).await {
                            break;
                        }
                        continue;
                    }
                    if !self.listeners.contains_same(&self.listener) {
                        debug!(class, device_id = %device_id, dropped = items.len(), "Unsubscribed during pull");
                        break;
                    }
                    self.cursor.advance_past(&items);
                    trace!(class, device_id = %device_id, count = items.len(), cursor = %self.cursor.as_str(), "Delivering");
                    if !self.deliver(items).await {
                        break;
                    }
                }
                Err(ClientError::Stopped) => break,
                Err(e) => {
                    warn!(
                        class,
                        device_id = %device_id,
                        error = %e,
                        retry_ms = self.retry_interval.as_millis() as u64,
                        "Poll failed, retrying"
                    );
                    if !pause(&mut stop, self.retry_interval).await {
                        break;
                    }
                }
            }
        }

        info!(class, device_id = %device_id, "Poll worker exited");
    }

    /// Pushes items in receive order. False once the listener is closed.
    async fn deliver(&self, items: Vec<T>) -> bool {
        for item in items {
            if self.listener.deliver(item).await.is_err() {
                debug!(device_id = %self.listener.key(), "Listener closed during delivery");
                return false;
            }
        }
        true
    }
}

/// Sleeps for `wait`. False when stop came first.
async fn pause(stop: &mut StopSignal, wait: Duration) -> bool {
    tokio::select! {
        biased;
        _ = stop.stopped() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use parking_lot::Mutex;
    use shared_types::Command;
    use std::collections::VecDeque;

    const T0: &str = "2016-04-21T10:00:00.000";
    const T1: &str = "2016-04-21T10:00:01.000";
    const T2: &str = "2016-04-21T10:00:02.000";

    fn stamped(id: u64, ts: &str) -> Command {
        Command {
            id,
            timestamp: ts.to_string(),
            ..Command::default()
        }
    }

    /// Serves scripted batches, then blocks like an idle long poll.
    ///
    /// With `eager` set, an exhausted script answers empty at once instead,
    /// like a server that ignores the wait.
    #[derive(Default)]
    struct Script {
        batches: Mutex<VecDeque<ClientResult<Vec<Command>>>>,
        cursors: Mutex<Vec<String>>,
        eager: bool,
    }

    #[async_trait]
    impl PollSource<Command> for Arc<Script> {
        async fn pull(&self, since: &str) -> ClientResult<Vec<Command>> {
            self.cursors.lock().push(since.to_string());
            let next = self.batches.lock().pop_front();
            match next {
                Some(batch) => batch,
                None if self.eager => Ok(Vec::new()),
                None => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    fn start(
        lifecycle: &Lifecycle,
        script: &Arc<Script>,
        listeners: &Arc<ListenerRegistry<Command>>,
        retry_interval: Duration,
    ) -> Listener<Command> {
        let (listener, _) = listeners.insert_if_absent(listeners.new_listener("dev-1"));
        let poller = Poller {
            source: script.clone(),
            listener: listener.clone(),
            listeners: listeners.clone(),
            cursor: Cursor::new(Some(T0)),
            retry_interval,
        };
        lifecycle.spawn("poll", poller.run(lifecycle.signal())).unwrap();
        listener
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_order_and_advances_cursor() {
        let lifecycle = Lifecycle::new("test");
        let listeners = Arc::new(ListenerRegistry::new("command", 8));
        let script = Arc::new(Script::default());
        script
            .batches
            .lock()
            .push_back(Ok(vec![stamped(1, T1), stamped(2, T2)]));

        let listener = start(&lifecycle, &script, &listeners, Duration::from_secs(1));
        assert_eq!(listener.recv().await.unwrap().timestamp, T1);
        assert_eq!(listener.recv().await.unwrap().timestamp, T2);

        // the next pull starts from the newest delivered item
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(*script.cursors.lock(), vec![T0.to_string(), T2.to_string()]);

        lifecycle.shutdown(|| {
            listeners.remove_all();
        })
        .await;
        assert_eq!(lifecycle.live_workers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_same_cursor() {
        let lifecycle = Lifecycle::new("test");
        let listeners = Arc::new(ListenerRegistry::new("command", 8));
        let script = Arc::new(Script::default());
        {
            let mut batches = script.batches.lock();
            batches.push_back(Err(ClientError::Connection("refused".into())));
            batches.push_back(Ok(vec![stamped(1, T1)]));
        }

        let listener = start(&lifecycle, &script, &listeners, Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        assert_eq!(listener.recv().await.unwrap().id, 1);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(script.cursors.lock()[..2], [T0.to_string(), T0.to_string()]);

        lifecycle.shutdown(|| {
            listeners.remove_all();
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_empty_answers_are_paced() {
        let lifecycle = Lifecycle::new("test");
        let listeners = Arc::new(ListenerRegistry::new("command", 8));
        let script = Arc::new(Script {
            eager: true,
            ..Script::default()
        });

        let _listener = start(&lifecycle, &script, &listeners, Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1050)).await;

        // one pull per retry interval, not a spin
        let pulls = script.cursors.lock().len();
        assert!((10..=12).contains(&pulls), "{pulls} pulls in ~1s");

        lifecycle
            .shutdown(|| {
                listeners.remove_all();
            })
            .await;
        assert_eq!(lifecycle.live_workers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_ends_worker_without_delivery() {
        let lifecycle = Lifecycle::new("test");
        let listeners = Arc::new(ListenerRegistry::new("command", 8));
        let script = Arc::new(Script::default());

        let listener = start(&lifecycle, &script, &listeners, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1)).await;
        listeners.remove("dev-1");

        // the in-flight pull returns nothing; the worker notices and exits
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(lifecycle.live_workers(), 0);
        assert!(listener.try_recv().is_none());
        lifecycle.shutdown(|| {}).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribed_before_first_pull() {
        let lifecycle = Lifecycle::new("test");
        let listeners = Arc::new(ListenerRegistry::new("command", 8));
        let script = Arc::new(Script::default());
        script.batches.lock().push_back(Ok(vec![stamped(1, T1)]));

        // unsubscribed before the worker ever runs
        let listener = start(&lifecycle, &script, &listeners, Duration::from_secs(1));
        listeners.remove("dev-1");

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(listener.try_recv().is_none());
        assert_eq!(lifecycle.live_workers(), 0);
        lifecycle.shutdown(|| {}).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_retry_wait() {
        let lifecycle = Lifecycle::new("test");
        let listeners = Arc::new(ListenerRegistry::new("command", 8));
        let script = Arc::new(Script::default());
        script
            .batches
            .lock()
            .push_back(Err(ClientError::Connection("refused".into())));

        start(&lifecycle, &script, &listeners, Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let started = tokio::time::Instant::now();
        lifecycle.shutdown(|| {
            listeners.remove_all();
        })
        .await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(lifecycle.live_workers(), 0);
    }
}
