//! # Handshake and Reconnect Flows
//!
//! 1. Handshake reaches `Trusted` and confirms with the shared secret
//! 2. A rejected challenge leaves the session untrusted
//! 3. Each reconnect runs a fresh handshake with a fresh key
//! 4. Reconnect attempts are bounded

#[cfg(test)]
mod tests {
    use crate::harness::{agent_config, control_plane_keypair, test_agent, ControlPlane};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::watch;
    use uplink_agent::adapters::MemoryConnector;
    use uplink_agent::domain::Confirmation;
    use uplink_agent::ports::MockArchiveFetcher;
    use uplink_agent::{LifecycleEvent, RunExit, SessionState};

    #[tokio::test]
    async fn test_handshake_reaches_trusted() {
        let tmp = TempDir::new().unwrap();
        let (connector, mut peers) = MemoryConnector::new();
        let agent = test_agent(
            agent_config(tmp.path(), 1),
            connector,
            MockArchiveFetcher::default(),
            Some("tok"),
        );
        let (tx, rx) = watch::channel(false);
        let connection = Arc::clone(&agent.agent.connection);
        let running = tokio::spawn(async move { connection.run(rx).await });

        let mut control_plane = ControlPlane::new(peers.recv().await.unwrap());
        let proof = control_plane.exchange_keys().await;
        assert_eq!(proof.app_id, "app-1");
        assert_eq!(proof.app_name, "shop");
        assert_eq!(proof.secret_key, "s3cret");
        assert_eq!(proof.token.as_deref(), Some("tok"));
        assert!(!proof.public_key.contains("PRIVATE"));
        assert_eq!(agent.agent.session.read().state(), SessionState::KeyExchanged);

        let confirmation = control_plane.authorize("ok").await.unwrap();
        assert_eq!(confirmation.app_id, "app-1");
        assert_eq!(confirmation.token.as_deref(), Some("tok"));
        let body: Confirmation = confirmation
            .encrypted
            .open_json(&control_plane_keypair())
            .unwrap();
        assert_eq!(body, Confirmation::new("s3cret"));
        assert_eq!(agent.agent.session.read().state(), SessionState::Trusted);

        tx.send(true).unwrap();
        assert_eq!(running.await.unwrap(), RunExit::Shutdown);
        assert_eq!(agent.agent.session.read().state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_rejected_challenge_blocks_commands() {
        let tmp = TempDir::new().unwrap();
        let (connector, mut peers) = MemoryConnector::new();
        let agent = test_agent(
            agent_config(tmp.path(), 1),
            connector,
            MockArchiveFetcher::default(),
            Some("tok"),
        );
        let (_tx, rx) = watch::channel(false);
        let connection = Arc::clone(&agent.agent.connection);
        tokio::spawn(async move { connection.run(rx).await });

        let mut control_plane = ControlPlane::new(peers.recv().await.unwrap());
        control_plane.exchange_keys().await;
        assert!(control_plane.authorize("denied").await.is_none());

        let ack = control_plane
            .command(json!({"from": "tok", "to": "app", "action": "rebuild"}))
            .await;
        assert_eq!(ack, vec![json!("Session is not trusted"), json!(null)]);
        assert_eq!(agent.host.rebuild_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_still_handshakes() {
        let tmp = TempDir::new().unwrap();
        let (connector, mut peers) = MemoryConnector::new();
        let agent = test_agent(
            agent_config(tmp.path(), 1),
            connector,
            MockArchiveFetcher::default(),
            None,
        );
        let (_tx, rx) = watch::channel(false);
        let connection = Arc::clone(&agent.agent.connection);
        tokio::spawn(async move { connection.run(rx).await });

        let mut control_plane = ControlPlane::new(peers.recv().await.unwrap());
        let proof = control_plane.handshake().await;
        assert!(proof.token.is_none());
        assert_eq!(agent.agent.session.read().state(), SessionState::Trusted);
    }

    #[tokio::test]
    async fn test_reconnect_rotates_session_key() {
        let tmp = TempDir::new().unwrap();
        let (connector, mut peers) = MemoryConnector::new();
        let agent = test_agent(
            agent_config(tmp.path(), 3),
            connector,
            MockArchiveFetcher::default(),
            Some("tok"),
        );
        let mut lifecycle = agent.agent.connection.subscribe();
        let (_tx, rx) = watch::channel(false);
        let connection = Arc::clone(&agent.agent.connection);
        tokio::spawn(async move { connection.run(rx).await });

        let mut first = ControlPlane::new(peers.recv().await.unwrap());
        first.handshake().await;
        let old_key = first.agent_key().clone();

        first.disconnect();
        loop {
            if lifecycle.recv().await.unwrap() == LifecycleEvent::Disconnected {
                break;
            }
        }

        let mut second = ControlPlane::new(peers.recv().await.unwrap());
        second.handshake().await;
        assert_ne!(second.agent_key(), &old_key);

        // Commands sealed to the previous session's key no longer open
        let ack = second
            .command_sealed_to(&old_key, json!({"from": "tok", "to": "app", "action": "rebuild"}))
            .await;
        assert_eq!(ack, vec![json!("Unable to decrypt command envelope"), json!(null)]);

        let ack = second
            .command(json!({"from": "tok", "to": "app", "action": "rebuild"}))
            .await;
        let (_, body) = second.open_reply(&ack);
        assert_eq!(body.data, Some(json!(true)));
        assert_eq!(agent.host.rebuild_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_attempts_are_bounded() {
        let tmp = TempDir::new().unwrap();
        let (connector, _peers) = MemoryConnector::new();
        let connector = connector.fail_next(usize::MAX);
        let attempts = connector.attempts();
        let agent = test_agent(
            agent_config(tmp.path(), 5),
            connector,
            MockArchiveFetcher::default(),
            Some("tok"),
        );
        let (_tx, rx) = watch::channel(false);

        let exit = tokio::time::timeout(Duration::from_secs(10), agent.agent.connection.run(rx))
            .await
            .unwrap();

        assert_eq!(exit, RunExit::ReconnectExhausted);
        // initial attempt plus five reconnects
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
    }
}
