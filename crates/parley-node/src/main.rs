use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_node::{spawn_node, Command, NodeConfig};
use parley_shared::constants::APP_NAME;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_node=debug,parley_net=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting {APP_NAME} node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");

    let (node, task) = spawn_node(config).await?;

    // One command per stdin line, one JSON result per stdout line.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => line,
                    None => {
                        node.execute("exit").await;
                        break;
                    }
                };
                let result = node.execute(&line).await;
                println!("{}", serde_json::to_string(&result)?);
                if matches!(Command::parse(&line), Ok(Command::Exit)) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                node.execute("exit").await;
                break;
            }
        }
    }

    task.await?;
    Ok(())
}
