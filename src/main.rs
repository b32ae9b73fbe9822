use certdb::{
    cli::{Cli, handle_command},
    telemetry,
};
use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    telemetry::init_tracing();

    let cli = Cli::parse();
    handle_command(cli).await
}
