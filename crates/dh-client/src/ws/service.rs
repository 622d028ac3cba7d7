//! WebSocket implementation of [`DeviceApi`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use shared_types::{Command, Device, Notification, ServerInfo};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::adapters::websocket;
use crate::domain::config::{ClientConfig, Endpoint};
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::listener::{Listener, ListenerRegistry};
use crate::lifecycle::Lifecycle;
use crate::ports::inbound::DeviceApi;
use crate::ports::outbound::{FrameReader, FrameWriter};
use crate::ws::envelope::Envelope;
use crate::ws::multiplexer::{Multiplexer, Outbound};

/// DeviceHive over one persistent WebSocket connection.
pub struct WsService {
    config: ClientConfig,
    lifecycle: Arc<Lifecycle>,
    mux: Arc<Multiplexer>,
    queue: mpsc::Sender<Outbound>,
    /// Serializes subscription changes so a second caller sees the
    /// first one's outcome instead of its provisional listener.
    subscriptions: Mutex<()>,
}

impl WsService {
    /// Connects to `<base_url>/<endpoint>` and starts both workers.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let (writer, reader) = websocket::connect(&config).await?;
        Self::with_transport(config, writer, reader)
    }

    /// Starts the service over an already established connection.
    pub fn with_transport<W, R>(config: ClientConfig, writer: W, reader: R) -> ClientResult<Self>
    where
        W: FrameWriter + 'static,
        R: FrameReader + 'static,
    {
        config.validate()?;
        let lifecycle = Arc::new(Lifecycle::new("websocket"));
        let mux = Arc::new(Multiplexer::new(config.listener.capacity));
        let (queue, rx) = mpsc::channel(config.websocket.send_queue);

        lifecycle.spawn("send", mux.clone().run_sender(writer, rx, lifecycle.signal()))?;
        lifecycle.spawn("receive", mux.clone().run_receiver(reader, lifecycle.signal()))?;

        info!(endpoint = ?config.websocket.endpoint, "WebSocket service started");
        Ok(Self {
            config,
            lifecycle,
            mux,
            queue,
            subscriptions: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.mux.registry().pending_count()
    }

    /// Background workers still running.
    pub fn live_workers(&self) -> usize {
        self.lifecycle.live_workers()
    }

    /// Sends `request` and waits for the matching response.
    ///
    /// Ends at whichever comes first: the response, the deadline, or stop.
    async fn call(&self, request: Envelope, timeout: Option<Duration>) -> ClientResult<Envelope> {
        self.lifecycle.ensure_running()?;
        if let Some(reason) = self.mux.lost() {
            return Err(ClientError::Connection(reason));
        }
        let timeout = timeout.unwrap_or(self.config.timeouts.default);
        let action = request.action.clone();

        let (id, envelope, completion) = self
            .mux
            .registry()
            .create(action.clone(), request, timeout)
            .into_parts();
        let queue = self.queue.clone();
        let mux = self.mux.clone();
        let exchange = async move {
            queue.send(Outbound { id, envelope }).await.map_err(|_| {
                // the send worker only lets go of the queue on stop or loss
                mux.lost().map_or(ClientError::Stopped, ClientError::Connection)
            })?;
            completion.await
        };

        let mut stop = self.lifecycle.signal();
        let outcome = tokio::select! {
            biased;
            _ = stop.stopped() => Err(ClientError::Stopped),
            outcome = exchange => outcome,
            _ = tokio::time::sleep(timeout) => {
                warn!(correlation_id = %id, action = %action, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                Err(ClientError::Timeout(timeout))
            }
        };

        if outcome.is_err() {
            self.mux.registry().discard(id);
        }
        outcome
    }

    fn subscribe_request(&self, action: &str, device: &Device, since: Option<&str>) -> ClientResult<Envelope> {
        let mut request = Envelope::request(action).with_device_auth(device);
        if let Some(since) = since.filter(|since| !since.is_empty()) {
            request = request.with("timestamp", since)?;
        }
        if self.config.websocket.endpoint == Endpoint::Client {
            request = request.with("deviceGuids", json!([device.id]))?;
        }
        Ok(request)
    }

    async fn subscribe<T>(
        &self,
        listeners: &ListenerRegistry<T>,
        action: &str,
        device: &Device,
        since: Option<&str>,
        timeout: Option<Duration>,
    ) -> ClientResult<Listener<T>> {
        self.lifecycle.ensure_running()?;
        let _gate = self.subscriptions.lock().await;
        let (listener, inserted) = listeners.insert_if_absent(listeners.new_listener(&device.id));
        if !inserted {
            debug!(class = listeners.class(), device_id = %device.id, "Already subscribed");
            return Ok(listener);
        }

        // Registered before the request goes out: pushes may follow the
        // response immediately.
        let outcome = match self.subscribe_request(action, device, since) {
            Ok(request) => self.call(request, timeout).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            if listeners.contains_same(&listener) {
                listeners.remove(&device.id);
            }
            return Err(e);
        }

        info!(class = listeners.class(), device_id = %device.id, "Subscribed");
        Ok(listener)
    }

    async fn unsubscribe<T>(
        &self,
        listeners: &ListenerRegistry<T>,
        action: &str,
        device: &Device,
        timeout: Option<Duration>,
    ) -> ClientResult<()> {
        self.lifecycle.ensure_running()?;
        let _gate = self.subscriptions.lock().await;

        // Closed before the request goes out: a full listener may be holding
        // up the receive worker, and the response has to get through.
        if !listeners.remove(&device.id) {
            return Ok(());
        }
        info!(class = listeners.class(), device_id = %device.id, "Unsubscribed");

        let mut request = Envelope::request(action).with_device_auth(device);
        if self.config.websocket.endpoint == Endpoint::Client {
            request = request.with("deviceGuids", json!([device.id]))?;
        }
        self.call(request, timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl DeviceApi for WsService {
    async fn server_info(&self, timeout: Option<Duration>) -> ClientResult<ServerInfo> {
        let mut response = self.call(Envelope::request("server/info"), timeout).await?;
        response.take_record("ServerInfo", "info")
    }

    async fn authenticate(&self, device: &Device, timeout: Option<Duration>) -> ClientResult<()> {
        let mut request = Envelope::request("authenticate").with_device_auth(device);
        if let Some(key) = &self.config.access_key {
            request = request.with("accessKey", key)?;
        }
        self.call(request, timeout).await?;
        Ok(())
    }

    async fn register_device(&self, device: &Device, timeout: Option<Duration>) -> ClientResult<()> {
        let request = Envelope::request("device/save")
            .with_device_auth(device)
            .with("device", device.without_id())?;
        self.call(request, timeout).await?;
        Ok(())
    }

    async fn get_device(
        &self,
        device_id: &str,
        device_key: &str,
        timeout: Option<Duration>,
    ) -> ClientResult<Device> {
        let auth = Device {
            id: device_id.to_string(),
            key: device_key.to_string(),
            ..Device::default()
        };

        let mut response = self
            .call(Envelope::request("device/get").with_device_auth(&auth), timeout)
            .await?;
        response.take_record("Device", "device")
    }

    async fn insert_command(
        &self,
        device: &Device,
        command: &Command,
        timeout: Option<Duration>,
    ) -> ClientResult<Command> {
        let request = Envelope::request("command/insert")
            .with_device_guid(&device.id)
            .with_device_auth(device)
            .with("command", command.insert_body())?;
        let mut response = self.call(request, timeout).await?;

        let mut inserted = command.clone();
        inserted.merge(response.take_record("Command", "command")?);
        Ok(inserted)
    }

    async fn update_command(
        &self,
        device: &Device,
        command: &Command,
        timeout: Option<Duration>,
    ) -> ClientResult<()> {
        let request = Envelope::request("command/update")
            .with_device_guid(&device.id)
            .with_device_auth(device)
            .with("commandId", command.id)?
            .with("command", command.update_body())?;
        self.call(request, timeout).await?;
        Ok(())
    }

    async fn subscribe_commands(
        &self,
        device: &Device,
        since: Option<&str>,
        timeout: Option<Duration>,
    ) -> ClientResult<Listener<Command>> {
        self.subscribe(self.mux.commands(), "command/subscribe", device, since, timeout)
            .await
    }

    async fn unsubscribe_commands(&self, device: &Device, timeout: Option<Duration>) -> ClientResult<()> {
        self.unsubscribe(self.mux.commands(), "command/unsubscribe", device, timeout)
            .await
    }

    async fn insert_notification(
        &self,
        device: &Device,
        notification: &Notification,
        timeout: Option<Duration>,
    ) -> ClientResult<Notification> {
        let request = Envelope::request("notification/insert")
            .with_device_guid(&device.id)
            .with_device_auth(device)
            .with("notification", notification.insert_body())?;
        let mut response = self.call(request, timeout).await?;

        let mut inserted = notification.clone();
        inserted.merge(response.take_record("Notification", "notification")?);
        Ok(inserted)
    }

    async fn subscribe_notifications(
        &self,
        device: &Device,
        since: Option<&str>,
        timeout: Option<Duration>,
    ) -> ClientResult<Listener<Notification>> {
        self.subscribe(
            self.mux.notifications(),
            "notification/subscribe",
            device,
            since,
            timeout,
        )
        .await
    }

    async fn unsubscribe_notifications(&self, device: &Device, timeout: Option<Duration>) -> ClientResult<()> {
        self.unsubscribe(
            self.mux.notifications(),
            "notification/unsubscribe",
            device,
            timeout,
        )
        .await
    }

    async fn stop(&self) {
        let mux = self.mux.clone();
        self.lifecycle.shutdown(move || mux.close_all()).await;
    }
}
