use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use shardgate::auth::{TokenService, TokenSettings, TokenSubject};

pub const JWT_SECRET: &str = "integration-test-secret";
pub const SHARD_COUNT: usize = 2;

/// One server process per test. Dropping it kills and reaps the child, so nothing
/// outlives the test that started it.
pub struct TestServer {
    pub base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Shards that refuse connections: port 1 on loopback has no listener.
fn unreachable_shards() -> String {
    let shards: Vec<String> = (0..SHARD_COUNT)
        .map(|id| {
            format!(
                r#"{{"id":{id},"host":"127.0.0.1","port":1,"user":"postgres","password":"not-for-clients","database":"shard_{id}"}}"#
            )
        })
        .collect();
    format!("[{}]", shards.join(","))
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_shardgate"));
        cmd.env("APP_ENV", "development")
            .env("SHARDGATE_PORT", port.to_string())
            .env("SHARDS", unreachable_shards())
            .env_remove("SHARDS_FILE")
            .env_remove("JWT_ISSUER")
            .env("JWT_SECRET", JWT_SECRET)
            .env("TENANT_HEADER_FALLBACK", "true")
            .env("DATABASE_CONNECT_RETRIES", "0")
            .env("DATABASE_CONNECT_TIMEOUT_MS", "500")
            .env("HEALTH_PROBE_TIMEOUT_MS", "500")
            .env("HEALTH_MONITOR_INTERVAL_SECS", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub async fn start_server() -> Result<TestServer> {
    let server = TestServer::spawn()?;
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// A token the spawned server accepts.
#[allow(dead_code)]
pub fn bearer(tenant_id: i64, restaurant_id: Option<i64>) -> String {
    let tokens = TokenService::new(JWT_SECRET.as_bytes(), TokenSettings::default()).expect("token service");
    let token = tokens
        .issue(TokenSubject {
            user_id: 1,
            email: "owner@example.com".to_string(),
            tenant_id,
            restaurant_id,
            role: "owner".to_string(),
        })
        .expect("token");
    format!("Bearer {token}")
}
