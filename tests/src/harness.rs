//! # Control Plane Harness
//!
//! Plays the control plane's side of an in-memory link: answers the key
//! exchange, issues the challenge and sends sealed commands.

use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uplink_agent::adapters::{MemoryConnector, PeerEnd, TokioFs, ZipExtractor};
use uplink_agent::domain::{EncryptedEnvelope, ReplyBody, TrustProof};
use uplink_agent::ports::{MockArchiveFetcher, MockCredentialStore, MockHost};
use uplink_agent::service::handshake::events;
use uplink_agent::{Agent, AgentConfig, AgentDependencies, ReconnectPolicy};
use uplink_crypto::{KeyPair, PublicKey, SealedBox};

const KEY_BITS: usize = 1024;
const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// Control-plane keypair, shared by every test in the binary.
pub fn control_plane_keypair() -> Arc<KeyPair> {
    static KEY: OnceLock<Arc<KeyPair>> = OnceLock::new();
    Arc::clone(KEY.get_or_init(|| {
        Arc::new(KeyPair::generate_with_bits(KEY_BITS).expect("keygen"))
    }))
}

/// Development config rooted at `app_root` with fast reconnects.
pub fn agent_config(app_root: &Path, max_attempts: u32) -> AgentConfig {
    AgentConfig {
        url: "http://127.0.0.1:9".into(),
        app_id: "app-1".into(),
        name: "shop".into(),
        secret_key: "s3cret".into(),
        app_root: app_root.to_path_buf(),
        key_bits: KEY_BITS,
        call_timeout_secs: 5,
        reconnect: ReconnectPolicy {
            max_attempts,
            min_delay_ms: 5,
            max_delay_ms: 10,
        },
        ..Default::default()
    }
}

/// Agent over an in-memory link plus the mocks behind it.
pub struct TestAgent {
    /// Wired agent.
    pub agent: Agent,
    /// Host mock (rebuild / config-change counters).
    pub host: MockHost,
    /// Archive source.
    pub fetcher: MockArchiveFetcher,
}

/// Build an agent with `connector`, `fetcher` and credential `token`.
pub fn test_agent(
    config: AgentConfig,
    connector: MemoryConnector,
    fetcher: MockArchiveFetcher,
    token: Option<&str>,
) -> TestAgent {
    let host = MockHost::default();
    let credentials = MockCredentialStore {
        token: token.map(String::from),
        should_fail: false,
    };
    let deps = AgentDependencies {
        connector: Arc::new(connector),
        fetcher: Arc::new(fetcher.clone()),
        extractor: Arc::new(ZipExtractor::new()),
        fs: Arc::new(TokioFs::new()),
        host: Arc::new(host.clone()),
        credentials: Arc::new(credentials),
    };
    TestAgent {
        agent: Agent::new(config, deps),
        host,
        fetcher,
    }
}

/// Control-plane end of one connection.
pub struct ControlPlane {
    peer: PeerEnd,
    keypair: Arc<KeyPair>,
    agent_key: Option<PublicKey>,
}

impl ControlPlane {
    /// Wrap a freshly accepted peer end.
    pub fn new(peer: PeerEnd) -> Self {
        Self {
            peer,
            keypair: control_plane_keypair(),
            agent_key: None,
        }
    }

    /// Answer `getPublicKey` and read the trust proof from `check`.
    pub async fn exchange_keys(&mut self) -> TrustProof {
        let request = self.next_frame().await;
        assert_eq!(request.event, events::GET_PUBLIC_KEY);
        request.reply(vec![json!(self.keypair.public_key_pem().expect("pem"))]);

        let check = self.next_frame().await;
        assert_eq!(check.event, events::CHECK);
        let sealed: SealedBox = serde_json::from_value(check.data).expect("sealed check");
        let proof: TrustProof = sealed.open_json(&self.keypair).expect("open trust proof");

        self.agent_key = Some(PublicKey::from_pem(&proof.public_key).expect("agent key"));
        proof
    }

    /// Send the `authorized` challenge. On `"ok"`, answer and return the
    /// agent's `testEncryption` confirmation.
    pub async fn authorize(&mut self, status: &str) -> Option<EncryptedEnvelope> {
        let challenge = SealedBox::seal_json(self.agent_key(), &json!({ "status": status }))
            .expect("seal challenge");
        assert!(
            self.peer
                .send(events::AUTHORIZED, serde_json::to_value(challenge).expect("json"))
                .await
        );

        if status != "ok" {
            return None;
        }
        let confirm = self.next_frame().await;
        assert_eq!(confirm.event, events::TEST_ENCRYPTION);
        let envelope: EncryptedEnvelope =
            serde_json::from_value(confirm.data.clone()).expect("confirmation envelope");
        confirm.reply(vec![Value::Null]);
        Some(envelope)
    }

    /// Full handshake; returns the trust proof.
    pub async fn handshake(&mut self) -> TrustProof {
        let proof = self.exchange_keys().await;
        self.authorize("ok").await.expect("confirmation");
        proof
    }

    /// Seal `envelope` to the agent and send it as `todo`; returns the ack.
    pub async fn command(&self, envelope: Value) -> Vec<Value> {
        let key = self.agent_key().clone();
        self.command_sealed_to(&key, envelope).await
    }

    /// Same as [`command`](Self::command) with an explicit recipient key.
    pub async fn command_sealed_to(&self, key: &PublicKey, envelope: Value) -> Vec<Value> {
        let sealed = SealedBox::seal_json(key, &envelope).expect("seal command");
        self.raw_command(json!({ "encrypted": sealed })).await
    }

    /// Send an arbitrary `todo` payload.
    pub async fn raw_command(&self, payload: Value) -> Vec<Value> {
        tokio::time::timeout(FRAME_TIMEOUT, self.peer.call("todo", payload))
            .await
            .expect("todo ack timed out")
            .expect("link closed before ack")
    }

    /// Open a sealed reply ack.
    pub fn open_reply(&self, ack: &[Value]) -> (EncryptedEnvelope, ReplyBody) {
        assert_eq!(ack.len(), 1, "expected a sealed reply, got {:?}", ack);
        let envelope: EncryptedEnvelope =
            serde_json::from_value(ack[0].clone()).expect("reply envelope");
        let body = envelope.encrypted.open_json(&self.keypair).expect("open reply");
        (envelope, body)
    }

    /// Agent's public key for this session.
    pub fn agent_key(&self) -> &PublicKey {
        self.agent_key.as_ref().expect("keys not exchanged yet")
    }

    /// Drop the link from the control-plane side.
    pub fn disconnect(&mut self) {
        self.peer.disconnect();
    }

    async fn next_frame(&mut self) -> uplink_agent::adapters::OutboundFrame {
        tokio::time::timeout(FRAME_TIMEOUT, self.peer.next_outbound())
            .await
            .expect("agent frame timed out")
            .expect("agent closed the link")
    }
}

/// In-memory zip with `(name, contents)` entries.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buffer);
        for (name, contents) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .expect("zip entry");
            writer.write_all(contents.as_bytes()).expect("zip write");
        }
        writer.finish().expect("zip finish");
    }
    buffer.into_inner()
}
