//! # Command Flows
//!
//! Sealed `todo` commands against a trusted agent:
//!
//! - validation rejections come back as plain `[err, null]`
//! - handler outcomes come back sealed as `{err, data}`
//! - referenced archives are synced before the handler runs, and a failed
//!   archive keeps the handler from running at all

#[cfg(test)]
mod tests {
    use crate::harness::{agent_config, test_agent, zip_bytes, ControlPlane, TestAgent};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::watch;
    use uplink_agent::adapters::MemoryConnector;
    use uplink_agent::ports::MockArchiveFetcher;

    struct Trusted {
        agent: TestAgent,
        control_plane: ControlPlane,
        tmp: TempDir,
        _shutdown: watch::Sender<bool>,
    }

    async fn trusted(fetcher: MockArchiveFetcher) -> Trusted {
        let tmp = TempDir::new().unwrap();
        let (connector, mut peers) = MemoryConnector::new();
        let agent = test_agent(agent_config(tmp.path(), 1), connector, fetcher, Some("tok"));

        let (shutdown, rx) = watch::channel(false);
        let connection = Arc::clone(&agent.agent.connection);
        tokio::spawn(async move { connection.run(rx).await });

        let mut control_plane = ControlPlane::new(peers.recv().await.unwrap());
        control_plane.handshake().await;

        Trusted {
            agent,
            control_plane,
            tmp,
            _shutdown: shutdown,
        }
    }

    #[tokio::test]
    async fn test_rebuild_round_trip() {
        let t = trusted(MockArchiveFetcher::default()).await;

        let ack = t
            .control_plane
            .command(json!({"from": "tok", "to": "app", "action": "rebuild"}))
            .await;
        let (envelope, body) = t.control_plane.open_reply(&ack);

        assert_eq!(envelope.app_id, "app-1");
        assert_eq!(envelope.token.as_deref(), Some("tok"));
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"err": null, "data": true}));
        assert_eq!(t.agent.host.rebuild_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_rejections_are_plain() {
        let t = trusted(MockArchiveFetcher::default()).await;

        let ack = t
            .control_plane
            .command(json!({"from": "someone-else", "to": "app", "action": "rebuild"}))
            .await;
        assert_eq!(ack, vec![json!("Bad user token"), json!(null)]);

        let ack = t
            .control_plane
            .command(json!({"to": "app", "action": "rebuild"}))
            .await;
        assert_eq!(ack, vec![json!("Some required attributes are missing"), json!(null)]);

        // Routing is checked before `files` / `action` are looked at
        let ack = t
            .control_plane
            .command(json!({"to": "app", "action": 7, "files": [{"token": "f"}]}))
            .await;
        assert_eq!(ack, vec![json!("Some required attributes are missing"), json!(null)]);

        let ack = t
            .control_plane
            .command(json!({"from": null, "to": "app", "action": "rebuild"}))
            .await;
        assert_eq!(ack, vec![json!("Bad user token"), json!(null)]);

        let ack = t
            .control_plane
            .raw_command(json!({"from": "tok", "to": "app", "action": "rebuild"}))
            .await;
        assert_eq!(ack, vec![json!("Unable to decrypt command envelope"), json!(null)]);

        assert_eq!(t.agent.host.rebuild_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_action_is_sealed() {
        let t = trusted(MockArchiveFetcher::default()).await;
        let ack = t
            .control_plane
            .command(json!({"from": "tok", "to": "app", "action": "selfDestruct"}))
            .await;
        let (_, body) = t.control_plane.open_reply(&ack);
        assert_eq!(body.err.as_deref(), Some("Unknow action"));
        assert_eq!(body.data, None);
    }

    #[tokio::test]
    async fn test_handle_config_and_pull_server() {
        let t = trusted(MockArchiveFetcher::default()).await;

        let ack = t
            .control_plane
            .command(json!({"from": "tok", "to": "app", "action": "handleConfig"}))
            .await;
        assert_eq!(t.control_plane.open_reply(&ack).1.data, Some(json!(true)));
        assert_eq!(t.agent.host.config_change_count(), 1);

        let ack = t
            .control_plane
            .command(json!({"from": "tok", "to": "app", "action": "pullServer"}))
            .await;
        let data = t.control_plane.open_reply(&ack).1.data.unwrap();
        assert_eq!(data["token"], "tok");
        assert_eq!(data["templates"], json!({}));
    }

    #[tokio::test]
    async fn test_files_then_action() {
        let fetcher = MockArchiveFetcher::default()
            .with_archive("mod-1", zip_bytes(&[("index.js", "module.exports = {};")]))
            .with_archive("api-1", zip_bytes(&[("user/config/routes.json", "{}")]));
        let t = trusted(fetcher).await;

        let ack = t
            .control_plane
            .command(json!({
                "from": "tok",
                "to": "app",
                "action": "rebuild",
                "files": [
                    {"token": "mod-1", "src": "modules", "dest": "modules/x"},
                    {"token": "api-1", "src": "api", "dest": "api/user"}
                ]
            }))
            .await;
        let (_, body) = t.control_plane.open_reply(&ack);

        assert_eq!(body.err, None);
        assert!(t.tmp.path().join("modules/x/index.js").exists());
        assert!(t.tmp.path().join("api/user/config/routes.json").exists());
        assert_eq!(t.agent.host.rebuild_count(), 1);

        // Download requests carry the session token
        let requests = t.agent.fetcher.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.token == "tok"));
    }

    #[tokio::test]
    async fn test_failed_file_skips_action() {
        let fetcher =
            MockArchiveFetcher::default().with_archive("mod-1", zip_bytes(&[("a.js", "a")]));
        let t = trusted(fetcher).await;

        let ack = t
            .control_plane
            .command(json!({
                "from": "tok",
                "to": "app",
                "action": "rebuild",
                "files": [
                    {"token": "mod-1", "src": "modules", "dest": "modules/a"},
                    {"token": "gone", "src": "modules", "dest": "modules/b"}
                ]
            }))
            .await;
        let (_, body) = t.control_plane.open_reply(&ack);

        assert!(body
            .err
            .unwrap()
            .starts_with("Download ZIP or unzip not worked fine"));
        assert_eq!(body.data, None);
        assert_eq!(t.agent.host.rebuild_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_and_rename_batches() {
        let t = trusted(MockArchiveFetcher::default()).await;
        let root = t.tmp.path();
        std::fs::create_dir_all(root.join("api/user")).unwrap();
        std::fs::write(root.join("api/user/model.js"), "x").unwrap();
        std::fs::write(root.join("stale.txt"), "x").unwrap();

        let ack = t
            .control_plane
            .command(json!({
                "from": "tok",
                "to": "app",
                "action": "renameFileOrFolder",
                "toRename": [{"oldPath": "api/user", "newPath": "api/member"}]
            }))
            .await;
        assert_eq!(t.control_plane.open_reply(&ack).1.data, Some(json!(true)));
        assert!(root.join("api/member/model.js").exists());
        assert!(!root.join("api/user").exists());

        let ack = t
            .control_plane
            .command(json!({
                "from": "tok",
                "to": "app",
                "action": "removeFileOrFolder",
                "toRemove": [{"path": "stale.txt"}, {"path": "nope"}]
            }))
            .await;
        let (_, body) = t.control_plane.open_reply(&ack);
        assert_eq!(body.err.as_deref(), Some("Unknow path 'nope'"));
    }

    #[tokio::test]
    async fn test_mixed_remove_batch_reports_missing_path() {
        let t = trusted(MockArchiveFetcher::default()).await;
        let root = t.tmp.path();
        std::fs::create_dir_all(root.join("public")).unwrap();
        std::fs::write(root.join("public/old.png"), "x").unwrap();
        std::fs::write(root.join("public/keep.png"), "x").unwrap();

        let ack = t
            .control_plane
            .command(json!({
                "from": "tok",
                "to": "app",
                "action": "removeFileOrFolder",
                "toRemove": [{"path": "public/old.png"}, {"path": "public/ghost.png"}]
            }))
            .await;
        let (_, body) = t.control_plane.open_reply(&ack);

        assert_eq!(body.err.as_deref(), Some("Unknow path 'public/ghost.png'"));
        assert_eq!(body.data, None);
        assert!(!root.join("public/ghost.png").exists());
        assert!(root.join("public/keep.png").exists());

        // The existing entry is still removed; the batch does not roll back
        for _ in 0..100 {
            if !root.join("public/old.png").exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!root.join("public/old.png").exists());
    }

    #[tokio::test]
    async fn test_no_action_acknowledges() {
        let t = trusted(MockArchiveFetcher::default()).await;
        let ack = t
            .control_plane
            .command(json!({"from": "tok", "to": "app"}))
            .await;
        assert_eq!(t.control_plane.open_reply(&ack).1.data, Some(json!(true)));
    }
}
