use clap::Parser;
use toolflow::cli::{self, Cli, Command};
use toolflow::infrastructure::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = cli::load_config(cli.config.as_deref())?;
    init_logging(&config.logging);

    match cli.command {
        Command::Serve => cli::serve::run(&config).await,
        Command::Validate { file } => cli::run::validate(&file),
        Command::Run { file, vars } => cli::run::run(&config, &file, &vars).await,
    }
}
