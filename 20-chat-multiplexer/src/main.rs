use anyhow::{Context, Result};
use clap::Parser;

use chat_multiplexer::{ChatClient, cli::Cli, shell::Shell};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Stdout belongs to the shell.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let tls = cli.tls()?;
    let client = ChatClient::connect(&cli.server, tls.as_ref(), cli.options())
        .await
        .with_context(|| format!("could not start a session with {}", cli.server))?;
    println!("*** connected to {}", cli.server);

    let result = Shell::new(&client).run().await;
    client.shutdown().await;
    result
}
