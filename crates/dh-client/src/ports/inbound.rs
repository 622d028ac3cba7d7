//! Inbound port - the device API both transports implement.

use std::time::Duration;

use async_trait::async_trait;
use shared_types::{Command, Device, Notification, ServerInfo};

use crate::domain::error::ClientResult;
use crate::domain::listener::Listener;

/// Device-side DeviceHive operations.
///
/// Every call takes an optional timeout; `None` means the configured
/// default. Once [`DeviceApi::stop`] has begun, every call returns
/// `Stopped` without touching the network.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn server_info(&self, timeout: Option<Duration>) -> ClientResult<ServerInfo>;

    /// Authenticates `device` for the rest of the session where the
    /// transport has sessions; a no-op otherwise.
    async fn authenticate(&self, device: &Device, timeout: Option<Duration>) -> ClientResult<()>;

    /// Registers or updates `device`.
    async fn register_device(&self, device: &Device, timeout: Option<Duration>)
        -> ClientResult<()>;

    async fn get_device(
        &self,
        device_id: &str,
        device_key: &str,
        timeout: Option<Duration>,
    ) -> ClientResult<Device>;

    /// Inserts `command` for `device`. Returns the command with the
    /// server-assigned fields filled in.
    async fn insert_command(
        &self,
        device: &Device,
        command: &Command,
        timeout: Option<Duration>,
    ) -> ClientResult<Command>;

    /// Reports `command.status` and `command.result` for `command.id`.
    async fn update_command(
        &self,
        device: &Device,
        command: &Command,
        timeout: Option<Duration>,
    ) -> ClientResult<()>;

    /// Starts delivering commands for `device` newer than `since`.
    ///
    /// Subscribing again returns the existing listener.
    async fn subscribe_commands(
        &self,
        device: &Device,
        since: Option<&str>,
        timeout: Option<Duration>,
    ) -> ClientResult<Listener<Command>>;

    /// Stops command delivery for `device`. No-op when not subscribed.
    async fn unsubscribe_commands(&self, device: &Device, timeout: Option<Duration>)
        -> ClientResult<()>;

    async fn insert_notification(
        &self,
        device: &Device,
        notification: &Notification,
        timeout: Option<Duration>,
    ) -> ClientResult<Notification>;

    async fn subscribe_notifications(
        &self,
        device: &Device,
        since: Option<&str>,
        timeout: Option<Duration>,
    ) -> ClientResult<Listener<Notification>>;

    async fn unsubscribe_notifications(
        &self,
        device: &Device,
        timeout: Option<Duration>,
    ) -> ClientResult<()>;

    /// Stops the service and waits for every background worker to exit.
    /// Idempotent.
    async fn stop(&self);
}
