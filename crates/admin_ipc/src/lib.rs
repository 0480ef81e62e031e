use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use state::EntityState;
use storage::{EntityRecord, SnapshotRecord};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/match_collector.sock";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum AdminRequest {
    Status,
    Entities,
    Entity { entity_id: String },
    Snapshots { entity_id: String },
    LatestSnapshot { entity_id: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AdminStatus {
    pub run_id: String,
    pub collector: String,
    pub entities: BTreeMap<String, EntityState>,
}

/// One match with its snapshots ordered by period and clock.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntityDetail {
    pub entity: EntityRecord,
    pub snapshots: Vec<SnapshotRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum AdminResponse {
    Status(AdminStatus),
    Entities(Vec<EntityRecord>),
    Entity(Option<EntityDetail>),
    Snapshots(Vec<SnapshotRecord>),
    LatestSnapshot(Option<SnapshotRecord>),
    Error(String),
}

/// Serves one JSON line request per connection until the listener fails.
///
/// Handler errors are returned to the client as [`AdminResponse::Error`].
pub async fn run_server<F, Fut>(socket_path: &str, handler: F) -> Result<()>
where
    F: Fn(AdminRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AdminResponse>> + Send + 'static,
{
    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    let handler = Arc::new(handler);
    info!(socket = socket_path, "admin ipc listening");
    loop {
        let (stream, _) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_stream(stream, handler).await {
                warn!(error = ?err, "admin ipc handler error");
            }
        });
    }
}

async fn handle_stream<F, Fut>(stream: UnixStream, handler: Arc<F>) -> Result<()>
where
    F: Fn(AdminRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AdminResponse>> + Send + 'static,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    let n = reader.read_line(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }
    let resp = match serde_json::from_str::<AdminRequest>(buf.trim()) {
        Ok(req) => handler(req)
            .await
            .unwrap_or_else(|err| AdminResponse::Error(format!("{err:#}"))),
        Err(err) => AdminResponse::Error(format!("invalid request: {err}")),
    };
    let line = serde_json::to_string(&resp)? + "\n";
    write_half.write_all(line.as_bytes()).await?;
    Ok(())
}

pub async fn send_request(socket_path: &str, req: &AdminRequest) -> Result<AdminResponse> {
    let mut stream = UnixStream::connect(socket_path).await?;
    let line = serde_json::to_string(req)? + "\n";
    stream.write_all(line.as_bytes()).await?;
    let (read_half, _) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    let _ = reader.read_line(&mut buf).await?;
    let resp: AdminResponse = serde_json::from_str(buf.trim())?;
    Ok(resp)
}
