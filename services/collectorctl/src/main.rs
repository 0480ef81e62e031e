use admin_ipc::{send_request, AdminRequest, AdminResponse, DEFAULT_SOCKET_PATH};
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "collectorctl", about = "Inspect a running collectord")]
struct Cli {
    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: String,

    /// Pretty-print the JSON response.
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run id and in-memory clock/period per tracked match.
    Status,
    /// Every stored match, newest first.
    Entities,
    /// One match with all of its snapshots.
    Entity { entity_id: String },
    /// Stored snapshots for one match, ordered by period and clock.
    Snapshots { entity_id: String },
    /// Most recent snapshot for one match.
    Latest { entity_id: String },
}

impl Command {
    fn into_request(self) -> AdminRequest {
        match self {
            Command::Status => AdminRequest::Status,
            Command::Entities => AdminRequest::Entities,
            Command::Entity { entity_id } => AdminRequest::Entity { entity_id },
            Command::Snapshots { entity_id } => AdminRequest::Snapshots { entity_id },
            Command::Latest { entity_id } => AdminRequest::LatestSnapshot { entity_id },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let req = cli.command.into_request();

    let resp = send_request(&cli.socket, &req).await?;
    if cli.pretty {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    } else {
        println!("{}", serde_json::to_string(&resp)?);
    }
    if let AdminResponse::Error(message) = resp {
        bail!("collectord rejected request: {message}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_maps_to_latest_snapshot_request() {
        let cli = Cli::parse_from(["collectorctl", "latest", "E1"]);
        assert_eq!(
            cli.command.into_request(),
            AdminRequest::LatestSnapshot {
                entity_id: "E1".into()
            }
        );
    }

    #[test]
    fn entity_maps_to_entity_request() {
        let cli = Cli::parse_from(["collectorctl", "entity", "E7"]);
        assert_eq!(
            cli.command.into_request(),
            AdminRequest::Entity {
                entity_id: "E7".into()
            }
        );
    }

    #[test]
    fn socket_flag_overrides_default() {
        let cli = Cli::parse_from(["collectorctl", "--socket", "/tmp/other.sock", "entities"]);
        assert_eq!(cli.socket, "/tmp/other.sock");
        assert_eq!(cli.command.into_request(), AdminRequest::Entities);
    }
}
