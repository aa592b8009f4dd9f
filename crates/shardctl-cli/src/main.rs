//! `shardctl`: lifecycle controller for a shardworld cluster.

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod ops;
mod run;

/// Bad command line.
const EXIT_USAGE: i32 = 1;
/// An operation failed against the live cluster.
const EXIT_OPERATIONAL: i32 = 2;

#[derive(Parser)]
#[command(
    name = "shardctl",
    version,
    about = "Start, stop, and hot-swap the processes of a shardworld cluster",
    after_help = ops::USAGE
)]
struct Cli {
    /// Log level, forwarded to spawned gate and game processes.
    #[arg(long = "log", default_value = "info", value_name = "LEVEL")]
    log: String,

    /// Detach spawned processes into their own sessions.
    #[arg(long)]
    detached: bool,

    /// One or more chained commands.
    #[arg(required = true, value_name = "COMMAND")]
    commands: Vec<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap exits 2 on usage errors by default; we reserve 2
            // for operational failures.
            let _ = err.print();
            if err.use_stderr() {
                std::process::exit(EXIT_USAGE);
            }
            return;
        }
    };

    init_tracing(&cli.log);

    let ops = match ops::parse(&cli.commands) {
        Ok(ops) => ops,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("{}", ops::USAGE);
            std::process::exit(EXIT_USAGE);
        }
    };

    if let Err(err) = run::run(&ops, &cli.log, cli.detached) {
        eprintln!("error: {err}");
        std::process::exit(EXIT_OPERATIONAL);
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
