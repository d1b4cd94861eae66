use clap::Parser;
use servercon_cli::{Cli, init_tracing, load_config, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.log_filter);
    run(cli, config).await
}
