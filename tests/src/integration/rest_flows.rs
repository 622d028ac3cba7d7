//! # REST Flows
//!
//! Device sessions against an axum server on localhost. Subscriptions are
//! emulated by long polling, so these flows also cover cursor handling and
//! recovery from failed polls.

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use dh_client::{
        connect, ClientConfig, Command, Device, DeviceApi, Network, Notification, RestService,
        Transport,
    };
    use serde_json::json;

    use crate::integration::support::{init_tracing, spawn_rest, MockRest, T0, T1, T2};

    fn device() -> Device {
        let mut device = Device::new("dev-1", "Demo", None);
        device.key = "dev-key".into();
        device
    }

    fn config(server: &MockRest) -> ClientConfig {
        let mut config = ClientConfig::new(&server.base_url).with_access_key("secret");
        config.timeouts.retry_interval = Duration::from_millis(20);
        config.timeouts.poll_wait = Duration::from_secs(1);
        config
    }

    async fn eventually(what: &str, check: impl Fn() -> bool) {
        let wait = async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    #[tokio::test]
    async fn test_device_session_over_rest() {
        init_tracing();
        let server = spawn_rest().await;
        let service = connect(config(&server), Transport::Auto).await.unwrap();
        let device = device();

        let info = service.server_info(None).await.unwrap();
        assert_eq!((info.version.as_str(), info.timestamp.as_str()), ("3.0", T0));

        service.authenticate(&device, None).await.unwrap();
        service.register_device(&device, None).await.unwrap();
        let fetched = service.get_device("dev-1", "dev-key", None).await.unwrap();
        assert_eq!((fetched.id.as_str(), fetched.name.as_str()), ("dev-1", "Demo"));

        let hello = Notification::new("hello", None);
        let inserted = service.insert_notification(&device, &hello, None).await.unwrap();
        assert_eq!((inserted.id, inserted.name.as_str()), (11, "hello"));

        server.state.queue_commands(json!([
            {"id": 7, "timestamp": T1, "command": "blink"},
            {"id": 8, "timestamp": T2, "command": "dim", "parameters": {"level": 40}},
        ]));
        let commands = service
            .subscribe_commands(&device, Some(&info.timestamp), None)
            .await
            .unwrap();
        for expected in [7, 8] {
            let command = tokio::time::timeout(Duration::from_secs(5), commands.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(command.id, expected);
            let result = Command::result(command.id, "Done", None);
            service.update_command(&device, &result, None).await.unwrap();
        }

        // the poll after the batch resumes from its newest timestamp
        eventually("second poll", || server.state.poll_count() >= 2).await;
        {
            let polls = server.state.polls.lock();
            assert_eq!(polls[0].get("timestamp").map(String::as_str), Some(T0));
            assert_eq!(polls[0].get("waitTimeout").map(String::as_str), Some("1"));
            assert_eq!(polls[1].get("timestamp").map(String::as_str), Some(T2));
        }

        let updates = server.state.updates.lock().clone();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], (7, json!({"status": "Done"})));

        let auth = server.state.auth.lock().clone();
        assert!(auth
            .iter()
            .all(|(bearer, device_id)| bearer.as_deref() == Some("Bearer secret")
                && device_id.as_deref() == Some("dev-1")));

        service.unsubscribe_commands(&device, None).await.unwrap();
        assert!(commands.is_closed());
        service.stop().await;
    }

    #[tokio::test]
    async fn test_missing_device_is_remote_error() {
        let server = spawn_rest().await;
        let service = connect(config(&server), Transport::Rest).await.unwrap();

        let err = service.get_device("ghost", "", None).await.unwrap_err();
        let remote = err.remote().unwrap();
        assert_eq!(remote.status, Some(404));
        assert_eq!(remote.message, "Device not found");

        let err = service
            .insert_command(&Device::new("ghost", "", None), &Command::new("ping", None), None)
            .await
            .unwrap_err();
        assert_eq!(err.remote().unwrap().status, Some(404));
        service.stop().await;
    }

    // =========================================================================
    // POLLING
    // =========================================================================

    #[tokio::test]
    async fn test_subscription_survives_failed_polls() {
        let server = spawn_rest().await;
        server.state.failing_polls.store(2, Ordering::SeqCst);
        server
            .state
            .queue_commands(json!([{"id": 3, "timestamp": T1, "command": "reset"}]));
        let service = connect(config(&server), Transport::Rest).await.unwrap();

        let commands = service
            .subscribe_commands(&device(), Some(T0), None)
            .await
            .unwrap();
        let command = tokio::time::timeout(Duration::from_secs(5), commands.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(command.id, 3);

        // the failed polls retried from the same cursor
        let polls = server.state.polls.lock().clone();
        assert!(polls.len() >= 3);
        assert!(polls[..3]
            .iter()
            .all(|q| q.get("timestamp").map(String::as_str) == Some(T0)));
        service.stop().await;
    }

    #[tokio::test]
    async fn test_stop_ends_polling() {
        let server = spawn_rest().await;
        let service = RestService::new(config(&server)).unwrap();

        let commands = service.subscribe_commands(&device(), None, None).await.unwrap();
        eventually("first poll", || server.state.poll_count() >= 1).await;
        assert!(service.live_workers() >= 1);

        tokio::time::timeout(Duration::from_secs(5), service.stop())
            .await
            .unwrap();
        assert_eq!(service.live_workers(), 0);
        assert!(commands.recv().await.is_none());

        let polls = server.state.poll_count();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.state.poll_count(), polls);
        assert!(service.server_info(None).await.unwrap_err().is_stopped());
    }

    // =========================================================================
    // NETWORKS
    // =========================================================================

    #[tokio::test]
    async fn test_network_insert_and_list() {
        let server = spawn_rest().await;
        let service = RestService::new(config(&server)).unwrap();

        let lab = service
            .insert_network(&Network::new("lab", "lab-key"), None)
            .await
            .unwrap();
        assert_eq!((lab.id, lab.name.as_str()), (1, "lab"));
        service
            .insert_network(&Network::new("field", ""), None)
            .await
            .unwrap();

        let networks = service.list_networks(0, 0, None).await.unwrap();
        let names: Vec<_> = networks.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["lab", "field"]);
        service.stop().await;
    }
}
