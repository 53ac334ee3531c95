use std::path::{Path, PathBuf};

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use pvt_tools::config::ToolConfig;
use pvt_tools::io::text::render_table;
use pvt_tools::io::{FileTableSource, TableFormat, TableSource, ValuesTableSource};
use pvt_tools::reconcile::{Reconciliation, ViewMode};
use pvt_tools::session::{OidcSession, SessionAuthenticator};
use pvt_tools::sync::{self, ReconcileOutcome};
use pvt_tools::{Result, ToolError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: i32 = 1;
const EXIT_WARNING: i32 = 2;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_tracing() {
        eprintln!("error: {error}");
        std::process::exit(EXIT_FAILURE);
    }
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(error) if error.is_user_facing() => {
            eprintln!("warning: {error}");
            std::process::exit(EXIT_WARNING);
        }
        Err(error) => {
            eprintln!("error: {error}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Reconcile(args) => execute_reconcile(args),
    }
}

fn execute_reconcile(args: ReconcileArgs) -> Result<i32> {
    let config = match &args.config {
        Some(path) => ToolConfig::load(path)?,
        None => ToolConfig::default(),
    };
    if let Some(url) = config.sheets.spreadsheet_url() {
        debug!(%url, worksheet = ?config.sheets.worksheet, "configured PVT spreadsheet");
    }

    let pvt = args.pvt_source()?;
    let survey = file_source(&args.survey, args.survey_format.as_deref())?;
    // The operator running the binary is the logged-in user.
    let session = OidcSession::new(&config.auth, true);
    debug!(logout_url = %session.logout_url(), "session ready");

    let reconciliation = match sync::reconcile_sources(pvt.as_ref(), &survey, &session, &config)? {
        ReconcileOutcome::Reconciled(reconciliation) => reconciliation,
        ReconcileOutcome::Skipped { warning } => {
            eprintln!("warning: {warning}");
            return Ok(EXIT_WARNING);
        }
    };

    print_report(&reconciliation, args.view.into())?;

    let output = resolve_output(args.output.as_deref(), reconciliation.export().file_name());
    sync::save_output(&reconciliation, &output)?;
    println!("Combined table written to {}", output.display());
    Ok(0)
}

fn print_report(reconciliation: &Reconciliation, mode: ViewMode) -> Result<()> {
    println!("Combined Data Table");
    print!("{}", render_table(&reconciliation.view(mode)?));

    println!();
    println!("Missing Values");
    match reconciliation.unmatched_contacts() {
        Ok((pvt_contacts, survey_contacts)) => {
            println!("Missing Survey Data");
            print!("{}", render_table(&pvt_contacts));
            println!("Missing PVT Data");
            print!("{}", render_table(&survey_contacts));
        }
        Err(ToolError::MissingColumn(column)) => {
            debug!(%column, "contact column absent, listing session identifiers");
            println!("Missing Survey Data");
            print_keys(reconciliation.missing_from_pvt_side().keys());
            println!("Missing PVT Data");
            print_keys(reconciliation.missing_from_survey_side().keys());
        }
        Err(other) => return Err(other),
    }
    Ok(())
}

fn print_keys<'a>(keys: impl Iterator<Item = &'a pvt_tools::model::CellValue>) {
    for key in keys {
        println!("{key}");
    }
}

fn file_source(path: &Path, format: Option<&str>) -> Result<FileTableSource> {
    match format {
        Some(tag) => Ok(FileTableSource::with_format(path, tag.parse::<TableFormat>()?)),
        None => FileTableSource::new(path),
    }
}

fn resolve_output(output: Option<&Path>, file_name: &str) -> PathBuf {
    match output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(file_name),
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Merge PVT and survey exports into one combined workbook."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Join a PVT export with a survey export on the session identifier.
    Reconcile(ReconcileArgs),
}

#[derive(clap::Args)]
#[command(group(ArgGroup::new("pvt_input").required(true).args(["pvt", "pvt_values"])))]
struct ReconcileArgs {
    /// PVT export (csv, xls, xlsx).
    #[arg(long)]
    pvt: Option<PathBuf>,

    /// Saved spreadsheet values payload to use as the PVT table.
    #[arg(long)]
    pvt_values: Option<PathBuf>,

    /// Overrides the PVT format inferred from the file extension.
    #[arg(long)]
    pvt_format: Option<String>,

    /// Survey export (csv, xls, xlsx).
    #[arg(long)]
    survey: PathBuf,

    /// Overrides the survey format inferred from the file extension.
    #[arg(long)]
    survey_format: Option<String>,

    /// Output path or directory. A `.csv` path writes CSV, anything else an
    /// xlsx workbook. Defaults to a random workbook name in the current
    /// directory.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Columns of the combined table to print.
    #[arg(long, value_enum, default_value_t = ViewKind::Basic)]
    view: ViewKind,

    /// Optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ReconcileArgs {
    fn pvt_source(&self) -> Result<Box<dyn TableSource>> {
        match (&self.pvt, &self.pvt_values) {
            (_, Some(values)) => Ok(Box::new(ValuesTableSource::from_json_file(values)?)),
            (Some(path), None) => Ok(Box::new(file_source(path, self.pvt_format.as_deref())?)),
            (None, None) => Err(ToolError::MissingInput(PathBuf::from("--pvt"))),
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ViewKind {
    Basic,
    Extended,
}

impl From<ViewKind> for ViewMode {
    fn from(kind: ViewKind) -> Self {
        match kind {
            ViewKind::Basic => ViewMode::Basic,
            ViewKind::Extended => ViewMode::Extended,
        }
    }
}
