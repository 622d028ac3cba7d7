//! # WebSocket Flows
//!
//! Device sessions against a real WebSocket server on localhost:
//!
//! 1. **Session**: info, authenticate, register, notify, subscribe, answer
//! 2. **Correlation**: out-of-order responses and late responses after a timeout
//! 3. **Failure**: remote errors and connection loss
//! 4. **Routing**: pushes reach only the subscribed device's listener

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use dh_client::{
        connect, ClientConfig, ClientError, Command, Device, DeviceApi, Endpoint, Notification,
        Transport, WsService,
    };
    use serde_json::{json, Value};

    use crate::integration::support::{
        device_hive_ws, failure, init_tracing, push_notification, spawn_ws, success, Reply, T0, T1,
    };

    fn device() -> Device {
        let mut device = Device::new("dev-1", "Demo", None);
        device.key = "dev-key".into();
        device
    }

    async fn open(base_url: &str) -> Arc<dyn DeviceApi> {
        let config = ClientConfig::new(base_url).with_access_key("secret");
        connect(config, Transport::Auto).await.unwrap()
    }

    // =========================================================================
    // SESSION
    // =========================================================================

    #[tokio::test]
    async fn test_device_session_over_websocket() {
        init_tracing();
        let mut server = spawn_ws(device_hive_ws()).await;
        let service = open(&server.base_url).await;
        let device = device();

        let info = service.server_info(None).await.unwrap();
        assert_eq!((info.version.as_str(), info.timestamp.as_str()), ("3.0", T0));
        let handshake = server.handshake.lock().clone().unwrap();
        assert_eq!(handshake.path, "/device");
        assert_eq!(handshake.authorization.as_deref(), Some("Bearer secret"));

        service.authenticate(&device, None).await.unwrap();
        let frame = server.expect("authenticate").await;
        assert_eq!(frame["accessKey"], "secret");
        assert_eq!(frame["deviceKey"], "dev-key");

        service.register_device(&device, None).await.unwrap();
        let frame = server.expect("device/save").await;
        assert_eq!(frame["device"]["name"], "Demo");

        let hello = Notification::new("hello", Some(json!({"version": 1})));
        let inserted = service.insert_notification(&device, &hello, None).await.unwrap();
        assert_eq!((inserted.id, inserted.timestamp.as_str()), (11, T1));
        assert_eq!(inserted.name, "hello");

        // the handler pushes command 7 right behind the subscribe response
        let commands = service
            .subscribe_commands(&device, Some(T0), None)
            .await
            .unwrap();
        let frame = server.expect("command/subscribe").await;
        assert_eq!(frame["timestamp"], T0);
        let command = tokio::time::timeout(Duration::from_secs(5), commands.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((command.id, command.name.as_str()), (7, "blink"));

        let result = Command::result(command.id, "Done", command.parameters.clone());
        service.update_command(&device, &result, None).await.unwrap();
        let frame = server.expect("command/update").await;
        assert_eq!(frame["commandId"], 7);
        assert_eq!(frame["command"]["status"], "Done");
        assert_eq!(frame["command"]["result"], json!({"times": 3}));

        service.unsubscribe_commands(&device, None).await.unwrap();
        assert!(commands.is_closed());
        service.stop().await;
    }

    #[tokio::test]
    async fn test_client_endpoint_names_devices() {
        let mut server = spawn_ws(device_hive_ws()).await;
        let mut config = ClientConfig::new(&server.base_url);
        config.websocket.endpoint = Endpoint::Client;
        let service = WsService::connect(config).await.unwrap();

        service
            .subscribe_notifications(&device(), None, None)
            .await
            .unwrap();
        let frame = server.expect("notification/subscribe").await;
        assert_eq!(frame["deviceGuids"], json!(["dev-1"]));
        assert!(frame.get("timestamp").is_none());

        let handshake = server.handshake.lock().clone().unwrap();
        assert_eq!(handshake.path, "/client");
        assert_eq!(handshake.authorization, None);
        service.stop().await;
    }

    // =========================================================================
    // CORRELATION
    // =========================================================================

    #[tokio::test]
    async fn test_responses_matched_out_of_order() {
        let mut held: Option<Value> = None;
        let mut server = spawn_ws(Box::new(move |request: &Value| {
            match request["action"].as_str() {
                Some("device/get") => {
                    held = Some(request.clone());
                    Reply::Frames(vec![])
                }
                Some("server/info") => {
                    let mut frames = vec![success(
                        request,
                        json!({"info": {"apiVersion": "3.0", "serverTimestamp": T0}}),
                    )];
                    if let Some(held) = held.take() {
                        frames.push(success(&held, json!({"device": {"id": "dev-1", "name": "Demo"}})));
                    }
                    Reply::Frames(frames)
                }
                _ => Reply::Frames(vec![failure(request, 404, "unknown action")]),
            }
        }))
        .await;
        let service = open(&server.base_url).await;

        let slow = tokio::spawn({
            let service = service.clone();
            async move { service.get_device("dev-1", "dev-key", None).await }
        });
        server.expect("device/get").await;

        let info = service.server_info(None).await.unwrap();
        assert_eq!(info.version, "3.0");
        let device = slow.await.unwrap().unwrap();
        assert_eq!((device.id.as_str(), device.name.as_str()), ("dev-1", "Demo"));
        service.stop().await;
    }

    #[tokio::test]
    async fn test_late_response_after_timeout_is_dropped() {
        let mut held: Option<Value> = None;
        let server = spawn_ws(Box::new(move |request: &Value| match held.take() {
            None => {
                held = Some(request.clone());
                Reply::Frames(vec![])
            }
            Some(late) => Reply::Frames(vec![
                success(&late, json!({"info": {"apiVersion": "late", "serverTimestamp": T0}})),
                success(request, json!({"info": {"apiVersion": "3.0", "serverTimestamp": T1}})),
            ]),
        }))
        .await;
        let service = open(&server.base_url).await;

        let err = service
            .server_info(Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let info = service.server_info(None).await.unwrap();
        assert_eq!((info.version.as_str(), info.timestamp.as_str()), ("3.0", T1));
        service.stop().await;
    }

    // =========================================================================
    // FAILURE
    // =========================================================================

    #[tokio::test]
    async fn test_remote_error_carries_code() {
        let server = spawn_ws(Box::new(|request: &Value| {
            Reply::Frames(vec![failure(request, 403, "Forbidden")])
        }))
        .await;
        let service = open(&server.base_url).await;

        let err = service.authenticate(&device(), None).await.unwrap_err();
        let remote = err.remote().unwrap();
        assert_eq!((remote.code, remote.message.as_str()), (Some(403), "Forbidden"));
        service.stop().await;
    }

    #[tokio::test]
    async fn test_connection_loss_fails_pending_call() {
        let server = spawn_ws(Box::new(|_: &Value| Reply::Hangup)).await;
        let service = open(&server.base_url).await;

        let err = tokio::time::timeout(Duration::from_secs(5), service.server_info(None))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)), "{err:?}");

        tokio::time::timeout(Duration::from_secs(5), service.stop())
            .await
            .unwrap();
        assert!(service.server_info(None).await.unwrap_err().is_stopped());
    }

    // =========================================================================
    // ROUTING
    // =========================================================================

    #[tokio::test]
    async fn test_pushes_routed_by_device() {
        let server = spawn_ws(Box::new(|request: &Value| {
            if request["action"] != "notification/subscribe" {
                return Reply::Frames(vec![success(request, json!({}))]);
            }
            Reply::Frames(vec![
                success(request, json!({})),
                push_notification("dev-2", json!({"id": 1, "notification": "stray"})),
                push_notification("dev-1", json!({"id": 2, "notification": "temperature"})),
            ])
        }))
        .await;
        let service = open(&server.base_url).await;

        let notifications = service
            .subscribe_notifications(&device(), None, None)
            .await
            .unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!((first.id, first.name.as_str()), (2, "temperature"));
        assert!(notifications.try_recv().is_none());

        service.stop().await;
        assert!(notifications.is_closed());
        assert!(notifications.recv().await.is_none());
    }
}
