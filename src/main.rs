//! Beverage quality - Main Entry Point

use beverage_quality::analysis::AugmentConfig;
use beverage_quality::cli::{cmd_analyze, cmd_augment, cmd_predict, cmd_split, cmd_train, Cli, Commands};
use beverage_quality::telemetry::{Telemetry, TelemetryConfig};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut logging = TelemetryConfig::default().with_verbosity(cli.global.verbose);
    if let Some(dir) = &cli.global.log_dir {
        logging = logging.with_log_dir(dir);
    }
    let telemetry = Telemetry::init(logging)?;

    let global = &cli.global;
    let result = match &cli.command {
        Commands::Split { dataset } => cmd_split(global, dataset),
        Commands::Train { dataset, config, regression } => {
            cmd_train(global, dataset, config.as_deref(), *regression)
        }
        Commands::Predict { dataset, features, json } => {
            cmd_predict(global, dataset, features, json.as_deref())
        }
        Commands::Analyze { input, target } => cmd_analyze(input, target),
        Commands::Augment { input, output, target, rows, noise, seed } => {
            let config = AugmentConfig::default()
                .with_target_rows(*rows)
                .with_noise_level(*noise)
                .with_seed(*seed);
            cmd_augment(input, output, target, &config)
        }
    };

    telemetry.shutdown();
    result
}
