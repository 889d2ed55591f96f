//! IntelliInspect - Main Entry Point

use clap::Parser;
use intelli_inspect::cli::{cmd_add_timestamps, cmd_serve, cmd_train, Cli, Commands, TrainArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intelli_inspect=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, host, data_dir, models_dir }) => {
            cmd_serve(host, port, data_dir, models_dir).await?;
        }
        Some(Commands::Train {
            data,
            train_start,
            train_end,
            test_start,
            test_end,
            models_dir,
            no_balance,
        }) => {
            let args = TrainArgs {
                data: &data,
                train_start: &train_start,
                train_end: &train_end,
                test_start: &test_start,
                test_end: &test_end,
                models_dir: &models_dir,
                balance: !no_balance,
            };
            tokio::task::block_in_place(|| cmd_train(args))?;
        }
        Some(Commands::AddTimestamps { input, output }) => {
            cmd_add_timestamps(&input, &output)?;
        }
        None => {
            cmd_serve(None, None, None, None).await?;
        }
    }

    Ok(())
}
