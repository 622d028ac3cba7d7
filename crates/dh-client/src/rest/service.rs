//! REST implementation of [`DeviceApi`], plus the calls only REST offers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_types::{Command, Device, Network, Notification, ServerInfo, Timestamped};
use tracing::{debug, info};

use crate::adapters::http::ReqwestTransport;
use crate::domain::config::ClientConfig;
use crate::domain::cursor::Cursor;
use crate::domain::error::{ClientError, ClientResult};
use crate::domain::listener::{Listener, ListenerRegistry};
use crate::ports::inbound::DeviceApi;
use crate::ports::outbound::{HttpMethod, HttpTransport};
use crate::rest::executor::Executor;
use crate::rest::poller::{self, DevicePoll, PollClass, PollQuery, Poller};
use crate::rest::request::RestRequest;

/// DeviceHive over plain HTTP requests.
///
/// Subscriptions are emulated with one long-poll worker per device and
/// event class.
pub struct RestService {
    executor: Arc<Executor>,
    commands: Arc<ListenerRegistry<Command>>,
    notifications: Arc<ListenerRegistry<Notification>>,
}

impl RestService {
    /// Service over a reqwest connection pool.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()?))
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> ClientResult<Self> {
        config.validate()?;
        let capacity = config.listener.capacity;
        info!(base_url = %config.base_url(), "REST service started");
        Ok(Self {
            executor: Arc::new(Executor::new(config, transport)),
            commands: Arc::new(ListenerRegistry::new("command", capacity)),
            notifications: Arc::new(ListenerRegistry::new("notification", capacity)),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.config()
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.executor.registry().pending_count()
    }

    /// Background workers still running, polls and in-flight requests alike.
    pub fn live_workers(&self) -> usize {
        self.executor.lifecycle().live_workers()
    }

    // =========================================================================
    // POLLING
    // =========================================================================

    /// One bounded pull of commands newer than `query.since`.
    pub async fn poll_commands(
        &self,
        device: &Device,
        query: PollQuery<'_>,
        timeout: Option<Duration>,
    ) -> ClientResult<Vec<Command>> {
        poller::pull(&self.executor, device, PollClass::Commands, query, timeout).await
    }

    /// One bounded pull of notifications newer than `query.since`.
    pub async fn poll_notifications(
        &self,
        device: &Device,
        query: PollQuery<'_>,
        timeout: Option<Duration>,
    ) -> ClientResult<Vec<Notification>> {
        poller::pull(&self.executor, device, PollClass::Notifications, query, timeout).await
    }

    fn subscribe<T>(
        &self,
        listeners: &Arc<ListenerRegistry<T>>,
        class: PollClass,
        device: &Device,
        since: Option<&str>,
    ) -> ClientResult<Listener<T>>
    where
        T: Timestamped + serde::de::DeserializeOwned + Send + 'static,
    {
        let lifecycle = self.executor.lifecycle();
        lifecycle.ensure_running()?;
        if let Some(existing) = listeners.find(&device.id) {
            debug!(class = listeners.class(), device_id = %device.id, "Already subscribed");
            return Ok(existing);
        }

        let (listener, inserted) = listeners.insert_if_absent(listeners.new_listener(&device.id));
        if !inserted {
            return Ok(listener);
        }

        let poller = Poller {
            source: DevicePoll {
                executor: self.executor.clone(),
                device: device.clone(),
                class,
            },
            listener: listener.clone(),
            listeners: listeners.clone(),
            cursor: Cursor::new(since),
            retry_interval: self.config().timeouts.retry_interval,
        };
        if let Err(e) = lifecycle.spawn("poll", poller.run(lifecycle.signal())) {
            listeners.remove(&device.id);
            return Err(e);
        }

        info!(class = listeners.class(), device_id = %device.id, "Subscribed");
        Ok(listener)
    }

    fn unsubscribe<T>(&self, listeners: &ListenerRegistry<T>, device: &Device) -> ClientResult<()> {
        self.executor.lifecycle().ensure_running()?;
        if listeners.remove(&device.id) {
            info!(class = listeners.class(), device_id = %device.id, "Unsubscribed");
        }
        Ok(())
    }

    // =========================================================================
    // COMMANDS & NOTIFICATIONS
    // =========================================================================

    pub async fn get_command(
        &self,
        device: &Device,
        command_id: u64,
        timeout: Option<Duration>,
    ) -> ClientResult<Command> {
        let id = command_id.to_string();
        let request = RestRequest::get("command/get", &["device", device.id.as_str(), "command", id.as_str()])
            .device(device);
        self.executor.fetch(request, timeout).await
    }

    pub async fn get_notification(
        &self,
        device: &Device,
        notification_id: u64,
        timeout: Option<Duration>,
    ) -> ClientResult<Notification> {
        let id = notification_id.to_string();
        let request = RestRequest::get(
            "notification/get",
            &["device", device.id.as_str(), "notification", id.as_str()],
        )
        .device(device);
        self.executor.fetch(request, timeout).await
    }

    // =========================================================================
    // DEVICES
    // =========================================================================

    /// Lists devices; zero `take` or `skip` leaves the server default.
    pub async fn list_devices(&self, take: u32, skip: u32, timeout: Option<Duration>) -> ClientResult<Vec<Device>> {
        let request = paged(RestRequest::get("device/list", &["device"]), take, skip);
        self.executor.fetch(request, timeout).await
    }

    pub async fn delete_device(&self, device: &Device, timeout: Option<Duration>) -> ClientResult<()> {
        let request = RestRequest::new("device/delete", HttpMethod::Delete, &["device", device.id.as_str()])
            .device(device);
        self.executor.send(request, timeout).await
    }

    // =========================================================================
    // NETWORKS
    // =========================================================================

    pub async fn list_networks(&self, take: u32, skip: u32, timeout: Option<Duration>) -> ClientResult<Vec<Network>> {
        let request = paged(RestRequest::get("network/list", &["network"]), take, skip);
        self.executor.fetch(request, timeout).await
    }

    pub async fn get_network(&self, network_id: u64, timeout: Option<Duration>) -> ClientResult<Network> {
        let id = network_id.to_string();
        let mut network: Network = self
            .executor
            .fetch(RestRequest::get("network/get", &["network", id.as_str()]), timeout)
            .await?;
        if network.id == 0 {
            network.id = network_id;
        }
        Ok(network)
    }

    /// Inserts `network` and returns it with the server-assigned id.
    pub async fn insert_network(&self, network: &Network, timeout: Option<Duration>) -> ClientResult<Network> {
        let request = RestRequest::new("network/insert", HttpMethod::Post, &["network"]).json(&network.without_id())?;
        let assigned: Network = self.executor.fetch(request, timeout).await?;

        let mut inserted = network.clone();
        inserted.id = assigned.id;
        Ok(inserted)
    }

    pub async fn update_network(&self, network: &Network, timeout: Option<Duration>) -> ClientResult<()> {
        if network.id == 0 {
            return Err(ClientError::InvalidArgument("network has no id".into()));
        }
        let id = network.id.to_string();
        let request = RestRequest::new("network/update", HttpMethod::Put, &["network", id.as_str()])
            .json(&network.without_id())?;
        self.executor.send(request, timeout).await
    }

    pub async fn delete_network(&self, network_id: u64, timeout: Option<Duration>) -> ClientResult<()> {
        let id = network_id.to_string();
        let request = RestRequest::new("network/delete", HttpMethod::Delete, &["network", id.as_str()]);
        self.executor.send(request, timeout).await
    }
}

fn paged(mut request: RestRequest, take: u32, skip: u32) -> RestRequest {
    if take > 0 {
        request = request.query("take", take);
    }
    if skip > 0 {
        request = request.query("skip", skip);
    }
    request
}

#[async_trait]
impl DeviceApi for RestService {
    async fn server_info(&self, timeout: Option<Duration>) -> ClientResult<ServerInfo> {
        self.executor
            .fetch(RestRequest::get("server/info", &["info"]), timeout)
            .await
    }

    /// Credentials travel with every request; nothing to do.
    async fn authenticate(&self, device: &Device, _timeout: Option<Duration>) -> ClientResult<()> {
        self.executor.lifecycle().ensure_running()?;
        debug!(device_id = %device.id, "REST authentication is per request");
        Ok(())
    }

    async fn register_device(&self, device: &Device, timeout: Option<Duration>) -> ClientResult<()> {
        let request = RestRequest::new("device/register", HttpMethod::Put, &["device", device.id.as_str()])
            .device(device)
            .json(&device.without_id())?;
        self.executor.send(request, timeout).await
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
        let request = RestRequest::get("device/get", &["device", device_id]).device(&auth);
        self.executor.fetch(request, timeout).await
    }

    async fn insert_command(
        &self,
        device: &Device,
        command: &Command,
        timeout: Option<Duration>,
    ) -> ClientResult<Command> {
        let request = RestRequest::new(
            "command/insert",
            HttpMethod::Post,
            &["device", device.id.as_str(), "command"],
        )
        .device(device)
        .json(&command.insert_body())?;
        let assigned: Command = self.executor.fetch(request, timeout).await?;

        let mut inserted = command.clone();
        inserted.merge(assigned);
        Ok(inserted)
    }

    async fn update_command(
        &self,
        device: &Device,
        command: &Command,
        timeout: Option<Duration>,
    ) -> ClientResult<()> {
        let id = command.id.to_string();
        let request = RestRequest::new(
            "command/update",
            HttpMethod::Put,
            &["device", device.id.as_str(), "command", id.as_str()],
        )
        .device(device)
        .json(&command.update_body())?;
        self.executor.send(request, timeout).await
    }

    async fn subscribe_commands(
        &self,
        device: &Device,
        since: Option<&str>,
        _timeout: Option<Duration>,
    ) -> ClientResult<Listener<Command>> {
        self.subscribe(&self.commands, PollClass::Commands, device, since)
    }

    async fn unsubscribe_commands(&self, device: &Device, _timeout: Option<Duration>) -> ClientResult<()> {
        self.unsubscribe(&self.commands, device)
    }

    async fn insert_notification(
        &self,
        device: &Device,
        notification: &Notification,
        timeout: Option<Duration>,
    ) -> ClientResult<Notification> {
        let request = RestRequest::new(
            "notification/insert",
            HttpMethod::Post,
            &["device", device.id.as_str(), "notification"],
        )
        .device(device)
        .json(&notification.insert_body())?;
        let assigned: Notification = self.executor.fetch(request, timeout).await?;

        let mut inserted = notification.clone();
        inserted.merge(assigned);
        Ok(inserted)
    }

    async fn subscribe_notifications(
        &self,
        device: &Device,
        since: Option<&str>,
        _timeout: Option<Duration>,
    ) -> ClientResult<Listener<Notification>> {
        self.subscribe(&self.notifications, PollClass::Notifications, device, since)
    }

    async fn unsubscribe_notifications(&self, device: &Device, _timeout: Option<Duration>) -> ClientResult<()> {
        self.unsubscribe(&self.notifications, device)
    }

    async fn stop(&self) {
        let commands = self.commands.clone();
        let notifications = self.notifications.clone();
        let executor = self.executor.clone();
        self.executor
            .lifecycle()
            .shutdown(move || {
                commands.remove_all();
                notifications.remove_all();
                for resolver in executor.registry().drain() {
                    resolver.resolve(Err(ClientError::Stopped));
                }
            })
            .await;
    }
}
