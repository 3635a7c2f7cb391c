use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use hybrid3_dataset_manager::app::{App, FetchOptions};
use hybrid3_dataset_manager::config::{ConfigLoader, ResolvedConfig};
use hybrid3_dataset_manager::domain::{MaterialId, MaterialSelection};
use hybrid3_dataset_manager::error::Hybrid3Error;
use hybrid3_dataset_manager::hybrid3::{
    DEFAULT_BASE_URL, Hybrid3Client, Hybrid3HttpClient,
};
use hybrid3_dataset_manager::output::{JsonOutput, OutputMode, TextProgress};
use hybrid3_dataset_manager::store::Store;

#[derive(Parser)]
#[command(name = "hybrid3-dm")]
#[command(about = "Fetch HybriD3 material records and flatten them into one property table")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Manage material records")]
    Data(DataArgs),
}

#[derive(Args)]
struct DataArgs {
    #[command(subcommand)]
    command: Option<DataCommand>,
}

#[derive(Subcommand)]
enum DataCommand {
    #[command(about = "Fetch raw material records into the project store")]
    Fetch(FetchArgs),
    #[command(about = "Flatten stored records into one wide property table")]
    Table(TableArgs),
    #[command(about = "List locally available materials")]
    List,
    #[command(about = "Show the normalized properties of one material")]
    Info(InfoArgs),
    #[command(about = "Clear the project-local store")]
    Clear,
}

#[derive(Args, Clone)]
struct FetchArgs {
    /// Material id or inclusive range, e.g. `20` or `1-50`.
    selection: Option<String>,

    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    force: bool,

    #[arg(long)]
    no_cache: bool,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Clone)]
struct TableArgs {
    /// Write the table JSON to this path in addition to printing a summary.
    #[arg(long)]
    out: Option<String>,
}

#[derive(Args)]
struct InfoArgs {
    id: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<Hybrid3Error>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &Hybrid3Error) -> u8 {
    match error {
        Hybrid3Error::MaterialNotFound(_)
        | Hybrid3Error::MissingConfig
        | Hybrid3Error::EmptyStore => 2,
        Hybrid3Error::ApiHttp(_) | Hybrid3Error::ApiStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let store = Store::new().into_diagnostic()?;

    match cli.command {
        Some(Commands::Data(args)) => run_data(args, store, output_mode),
        None => run_data_command(
            DataCommand::Fetch(FetchArgs {
                selection: None,
                config: None,
                force: false,
                no_cache: false,
                dry_run: false,
            }),
            store,
            output_mode,
        ),
    }
}

fn run_data(args: DataArgs, store: Store, output_mode: OutputMode) -> miette::Result<()> {
    let command = args.command.unwrap_or(DataCommand::Fetch(FetchArgs {
        selection: None,
        config: None,
        force: false,
        no_cache: false,
        dry_run: false,
    }));

    run_data_command(command, store, output_mode)
}

fn run_data_command(
    command: DataCommand,
    store: Store,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match command {
        DataCommand::Fetch(args) => run_fetch(args, store, output_mode),
        DataCommand::Table(args) => {
            let app = App::new(store, offline_client());
            run_table(args, app, output_mode)
        }
        DataCommand::List => {
            let app = App::new(store, offline_client());
            run_list(app, output_mode)
        }
        DataCommand::Info(args) => {
            let app = App::new(store, offline_client());
            run_info(args, app, output_mode)
        }
        DataCommand::Clear => {
            let app = App::new(store, offline_client());
            run_clear(app, output_mode)
        }
    }
}

/// Commands that only read the local store still need a base URL to render
/// dataset file links; take it from the config when one is present.
fn offline_client() -> NopHybrid3 {
    let base_url = ConfigLoader::resolve(None)
        .map(|config| config.base_url)
        .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    NopHybrid3 { base_url }
}

struct NopHybrid3 {
    base_url: String,
}

impl Hybrid3Client for NopHybrid3 {
    fn fetch_systems(&self) -> Result<Vec<serde_json::Value>, Hybrid3Error> {
        Err(Hybrid3Error::ApiHttp(
            "HybriD3 client not configured".to_string(),
        ))
    }

    fn fetch_datasets(&self, _id: MaterialId) -> Result<Vec<serde_json::Value>, Hybrid3Error> {
        Err(Hybrid3Error::ApiHttp(
            "HybriD3 client not configured".to_string(),
        ))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn run_fetch(args: FetchArgs, store: Store, output_mode: OutputMode) -> miette::Result<()> {
    let FetchArgs {
        selection,
        config,
        force,
        no_cache,
        dry_run,
    } = args;

    let selection = selection
        .map(|value| value.parse::<MaterialSelection>())
        .transpose()
        .into_diagnostic()?;

    let resolved_config: Option<ResolvedConfig> = if selection.is_none() {
        ConfigLoader::resolve(config.as_deref())
            .into_diagnostic()
            .map(Some)?
    } else {
        // A config alongside an explicit selection only contributes base_url.
        ConfigLoader::resolve(config.as_deref()).ok()
    };

    let base_url = resolved_config
        .as_ref()
        .map(|config| config.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let client = Hybrid3HttpClient::with_base_url(base_url).into_diagnostic()?;
    let app = App::new(store, client);

    let fetch_options = FetchOptions {
        force,
        no_cache,
        dry_run,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app
                .fetch(selection, resolved_config.as_ref(), fetch_options, &JsonOutput)
                .into_diagnostic()?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let result = app
                .fetch(
                    selection,
                    resolved_config.as_ref(),
                    fetch_options,
                    &TextProgress,
                )
                .into_diagnostic()?;
            print_fetch_summary(&result);
            Ok(())
        }
    }
}

fn run_table<C: Hybrid3Client>(
    args: TableArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let out = args.out.map(Utf8PathBuf::from);

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.table(out.as_deref(), &JsonOutput).into_diagnostic()?;
            JsonOutput::print_table(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let result = app.table(out.as_deref(), &TextProgress).into_diagnostic()?;
            print_table_summary(&result, out.as_deref());
            Ok(())
        }
    }
}

fn run_list<C: Hybrid3Client>(app: App<C>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.list(&JsonOutput).into_diagnostic()?;
            JsonOutput::print_list(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let result = app.list(&TextProgress).into_diagnostic()?;
            for entry in &result.materials {
                let location = match (&entry.project_path, &entry.cache_path) {
                    (Some(_), Some(_)) => "project+cache",
                    (Some(_), None) => "project",
                    (None, Some(_)) => "cache",
                    (None, None) => "unknown",
                };
                println!("{} {} ({location})", entry.id, entry.formula);
            }
            Ok(())
        }
    }
}

fn run_info<C: Hybrid3Client>(
    args: InfoArgs,
    app: App<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = args.id.parse::<MaterialId>().into_diagnostic()?;

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.info(id, &JsonOutput).into_diagnostic()?;
            JsonOutput::print_info(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let result = app.info(id, &TextProgress).into_diagnostic()?;
            println!(
                "material {}: {} (organic {}, inorganic {})",
                result.id, result.formula, result.organic, result.inorganic
            );
            for property in &result.properties {
                let unit = property.unit.as_deref().unwrap_or("None");
                let points = property
                    .points
                    .map(|count| count.to_string())
                    .unwrap_or_else(|| "file".to_string());
                match &property.secondary {
                    Some(secondary) => println!(
                        "  {}({}) [{unit}] vs {}({}) [{}], {points} points",
                        property.name,
                        property.property_id,
                        secondary.name,
                        secondary.property_id,
                        secondary.unit,
                    ),
                    None => println!(
                        "  {}({}) [{unit}], {points} points",
                        property.name, property.property_id,
                    ),
                }
            }
            Ok(())
        }
    }
}

fn run_clear<C: Hybrid3Client>(app: App<C>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.clear(&JsonOutput).into_diagnostic()?;
            JsonOutput::print_clear(&result).into_diagnostic()?;
            Ok(())
        }
        OutputMode::Interactive => {
            let _result = app.clear(&TextProgress).into_diagnostic()?;
            println!("project store cleared");
            Ok(())
        }
    }
}

fn print_fetch_summary(result: &hybrid3_dataset_manager::app::FetchResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}HybriD3 fetch summary{reset}");
    println!("{green}materials: {}{reset}", result.items.len());

    for item in &result.items {
        let action = item.action.as_str();
        let color = if action == "cache" || action == "project" {
            green
        } else if action == "download" {
            cyan
        } else {
            yellow
        };
        let formula = item.formula.as_deref().unwrap_or("?");
        println!("{color}  {} {formula} ({action}){reset}", item.id);
        if let Some(path) = &item.project_path {
            println!("{color}    project: {path}{reset}");
        }
        if let Some(path) = &item.cache_path {
            println!("{color}    cache: {path}{reset}");
        }
    }
}

fn print_table_summary(
    result: &hybrid3_dataset_manager::app::TableResult,
    out: Option<&camino::Utf8Path>,
) {
    println!(
        "table: {} rows x {} columns",
        result.row_count, result.column_count
    );
    for column in result.table.columns() {
        let filled = column.cells.iter().filter(|cell| cell.is_some()).count();
        println!("  {} ({filled}/{} filled)", column.name, result.row_count);
    }
    if !result.skipped.is_empty() {
        println!("skipped {} material(s):", result.skipped.len());
        for skipped in &result.skipped {
            println!("  {}: {}", skipped.id, skipped.reason);
        }
    }
    if let Some(out) = out {
        println!("written to {out}");
    }
}
