use clap::Parser;
use codelia_cli::cli_args::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    codelia_cli::run_main(cli).await
}
