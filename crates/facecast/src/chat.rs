use crate::config::Config;
use anyhow::{Context, Result};
use facecast_client::{http_client, ChatLog, QueryClient, Speaker};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

fn client(config: &Config) -> Result<QueryClient> {
    let http = http_client(config.http_timeout).context("building HTTP client")?;
    Ok(QueryClient::new(http, &config.query_url))
}

/// Ask one question and print the reply.
pub async fn ask_once(config: &Config, question: &str) -> Result<()> {
    let mut log = ChatLog::new();
    let reply = log.exchange(&client(config)?, question).await?;
    println!("{}", reply.text);
    Ok(())
}

/// Read questions from stdin until EOF, printing the transcript as it grows.
pub async fn run(config: &Config) -> Result<()> {
    let client = client(config)?;
    let mut log = ChatLog::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("{}: ", Speaker::You);
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await.context("reading stdin")? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = log.exchange(&client, &line).await?;
        println!("{}: {}", reply.speaker, reply.text);
    }

    tracing::debug!(messages = log.messages().len(), "chat ended");
    Ok(())
}
