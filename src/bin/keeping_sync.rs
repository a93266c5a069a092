use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use keeping_sync::app::{self, App, ProgressSink, SyncOptions};
use keeping_sync::config::{Config, ConfigLoader};
use keeping_sync::domain::DestinationKind;
use keeping_sync::error::{ErrorKind, SyncError};
use keeping_sync::keeping::KeepingHttpClient;
use keeping_sync::notion::NotionHttpClient;
use keeping_sync::output::{ConsoleOutput, JsonOutput, OutputMode};
use keeping_sync::sink::{Destination, WarehouseDestination, WorkspaceDestination};
use keeping_sync::warehouse::BigQueryHttpClient;

#[derive(Parser)]
#[command(name = "keeping-sync")]
#[command(about = "Copy new Keeping time entries into Notion or BigQuery")]
#[command(version, author)]
struct Cli {
    /// Path to a JSON config file (default: ./keeping-sync.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Fetch time entries and append the new ones to a destination")]
    Sync(SyncArgs),
    #[command(about = "List the rows currently stored in a destination")]
    Show(ShowArgs),
}

#[derive(Args)]
struct SyncArgs {
    #[arg(long, value_enum)]
    destination: DestinationKind,

    /// First day of the window (YYYY-MM-DD)
    #[arg(long, requires = "end")]
    start: Option<String>,

    /// Last day of the window (YYYY-MM-DD)
    #[arg(long, requires = "start")]
    end: Option<String>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct ShowArgs {
    #[arg(long, value_enum)]
    destination: DestinationKind,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SyncError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error.kind() {
        ErrorKind::Config => 2,
        ErrorKind::Upstream => 3,
        ErrorKind::Parse => 4,
    }
}

fn run() -> miette::Result<()> {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Command::Sync(args) => run_sync(args, config, output_mode),
        Command::Show(args) => run_show(args, config, output_mode),
    }
}

fn run_sync(args: SyncArgs, mut config: Config, output_mode: OutputMode) -> miette::Result<()> {
    if args.start.is_some() {
        config.window.start = args.start;
        config.window.end = args.end;
    }
    let today = chrono::Local::now().date_naive();
    let window = config.window(today)?;

    let keeping = KeepingHttpClient::new(&config.keeping()?)?;
    let destination = build_destination(args.destination, &config)?;
    let app = App::new(keeping);
    let options = SyncOptions {
        dry_run: args.dry_run,
    };

    match output_mode {
        OutputMode::Json => {
            let result = app.sync(destination.as_ref(), &window, options, &JsonOutput)?;
            JsonOutput::print_sync(&result).into_diagnostic()?;
        }
        OutputMode::Text => {
            let result = app.sync(destination.as_ref(), &window, options, &ConsoleOutput)?;
            ConsoleOutput::print_sync(&result);
        }
    }
    Ok(())
}

fn run_show(args: ShowArgs, config: Config, output_mode: OutputMode) -> miette::Result<()> {
    let destination = build_destination(args.destination, &config)?;
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Text => &ConsoleOutput,
    };
    let result = app::show(destination.as_ref(), sink)?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_show(&result).into_diagnostic()?,
        OutputMode::Text => ConsoleOutput::print_show(&result),
    }
    Ok(())
}

fn build_destination(
    kind: DestinationKind,
    config: &Config,
) -> Result<Box<dyn Destination>, SyncError> {
    Ok(match kind {
        DestinationKind::Warehouse => Box::new(WarehouseDestination::new(
            BigQueryHttpClient::new(&config.warehouse()?)?,
        )),
        DestinationKind::Workspace => Box::new(WorkspaceDestination::new(NotionHttpClient::new(
            &config.notion()?,
        )?)),
    })
}
