use std::io;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use runmat_engine_worker::{serve, Engine, Shutdown, ENGINE_NAME};
use runmat_logging::{init_logging, LogFormat, LoggingOptions};

#[derive(Parser)]
#[command(
    name = "runmat-engine-worker",
    version = env!("CARGO_PKG_VERSION"),
    about = "RunMat engine process speaking the engine protocol on stdin/stdout"
)]
struct Cli {
    /// Engine name reported in the ready greeting
    #[arg(long, default_value = ENGINE_NAME)]
    name: String,

    /// Log filter, e.g. `debug` or `runmat_engine_worker=trace`
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format on stderr
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logging = init_logging(LoggingOptions {
        level: cli.log_level,
        format: cli.log_format,
        process: Some(cli.name.clone()),
    });

    let mut engine = Engine::new(cli.name);
    let stdin = io::stdin();
    let stdout = io::stdout();
    let outcome = serve(&mut engine, &mut stdin.lock(), &mut stdout.lock())
        .context("engine protocol failed")?;
    info!("{}: stopped ({outcome:?})", engine.name());
    if let Shutdown::Exit(code) = outcome {
        process::exit(code);
    }
    Ok(())
}
