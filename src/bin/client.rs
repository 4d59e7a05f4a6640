use std::time::Duration;

use anyhow::Context;
use chat_relay::{client::Client, config::ClientConfig};
use tokio::{io::BufReader, net::TcpStream, sync::mpsc};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the chat
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = ClientConfig::from_env()?;
    let stream = TcpStream::connect(cfg.server)
        .await
        .with_context(|| format!("Cannot connect to the server at {}", cfg.server))?;

    let (console, mut lines) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            println!("{line}");
        }
    });

    let res = Client::new(cfg, console).run(stream, BufReader::new(tokio::io::stdin())).await;
    // a blocked stdin read would otherwise hold the runtime open
    let _ = tokio::time::timeout(Duration::from_millis(200), printer).await;
    match res {
        Ok(())  => std::process::exit(0),
        Err(e)  => {
            eprintln!("{e}");
            std::process::exit(1)
        }
    }
}
