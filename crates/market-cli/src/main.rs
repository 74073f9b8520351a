#![forbid(unsafe_code)]

mod cmd;
mod context;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use context::{MarketContext, SessionArgs};
use market_core::config::{self, EffectiveConfig};
use market_core::error::ErrorCode;
use output::{CliError, CliFailure, OutputMode, render_error};
use std::env;
use std::path::Path;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "mkt: classifieds market for forum platforms",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    session: SessionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a market store",
        long_about = "Create .market/ with a config template and a migrated SQLite store.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    mkt init\n\n    # Rewrite the config template\n    mkt init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Manage sections",
        long_about = "Create, inspect and change the section tree. Changes need --role moderator.",
        after_help = "EXAMPLES:\n    # Add a category and a leaf section\n    mkt --user mod --role moderator section add vehicles --title Vehicles --category true\n    mkt --user mod --role moderator section add bikes --title Bikes --parent vehicles\n\n    # Print the tree\n    mkt section tree"
    )]
    Section(cmd::section::SectionArgs),

    #[command(
        next_help_heading = "Listings",
        about = "Post an offer or a wish",
        long_about = "Create a listing in a section. Offers need a price.",
        after_help = "EXAMPLES:\n    # Offer a bike\n    mkt --user alice create offer -s bikes -t \"Red city bike, 28 inch\" --price 120\n\n    # Post the saved draft\n    mkt --user alice create wish --from-draft"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Listings",
        about = "Show one listing",
        after_help = "EXAMPLES:\n    mkt show mk-3f2a9c01de\n\n    # Check the address a link used\n    mkt show mk-3f2a9c01de --section cars"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Listings",
        about = "List listings",
        long_about = "List listings visible to the acting user, newest first by default.",
        after_help = "EXAMPLES:\n    # Open offers under a category\n    mkt list -s vehicles -k offer\n\n    # Everything one author posted\n    mkt list --author alice --state all --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Listings",
        about = "Edit a listing",
        after_help = "EXAMPLES:\n    mkt --user alice edit mk-3f2a9c01de --price 99\n    mkt --user alice edit mk-3f2a9c01de --no-location"
    )]
    Edit(cmd::edit::EditArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Close listings",
        after_help = "EXAMPLES:\n    mkt --user alice close mk-3f2a9c01de"
    )]
    Close(cmd::lifecycle::BatchArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Reopen closed listings",
        long_about = "Reopen closed listings. Listings older than items.expire_days stay closed.",
        after_help = "EXAMPLES:\n    mkt --user alice open mk-3f2a9c01de"
    )]
    Open(cmd::lifecycle::BatchArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Delete listings",
        after_help = "EXAMPLES:\n    mkt --user mod --role moderator delete mk-3f2a9c01de --reason spam"
    )]
    Delete(cmd::lifecycle::DeleteArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Restore deleted listings",
        after_help = "EXAMPLES:\n    mkt --user mod --role moderator undelete mk-3f2a9c01de"
    )]
    Undelete(cmd::lifecycle::BatchArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Move listings to another section",
        after_help = "EXAMPLES:\n    mkt --user mod --role moderator move mk-3f2a9c01de --to cars"
    )]
    Move(cmd::move_cmd::MoveArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the edit history of a listing",
        after_help = "EXAMPLES:\n    mkt --user alice history mk-3f2a9c01de"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Read",
        about = "Search open listings",
        after_help = "EXAMPLES:\n    mkt search city bike --max-price 200\n    mkt search --near 52.52,13.40 --radius 10 -k offer"
    )]
    Search(cmd::search::SearchArgs),

    #[command(
        next_help_heading = "Listings",
        about = "Save, show or clear your draft"
    )]
    Draft(cmd::draft::DraftArgs),

    #[command(
        next_help_heading = "Admin",
        about = "Manage exchange rates",
        after_help = "EXAMPLES:\n    mkt --user mod --role moderator rates set EUR=1.08 GBP=1.27\n    mkt rates list"
    )]
    Rates(cmd::rates::RatesArgs),

    #[command(
        next_help_heading = "Admin",
        about = "Inspect and run background jobs"
    )]
    Jobs(cmd::jobs::JobsArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("MARKET_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "market_core=debug,mkt=debug,info"
        } else {
            "warn"
        })
    });

    let format = env::var("MARKET_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn dispatch(cli: &Cli, root: &Path, effective: &EffectiveConfig, output: OutputMode) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init(ref args) => return cmd::init::run_init(args, output, root),
        Commands::Completions(ref args) => {
            return cmd::completions::run_completions(args, &mut Cli::command());
        }
        _ => {}
    }

    let mut ctx = MarketContext::open(root, &cli.session, effective)?;
    match cli.command {
        Commands::Section(ref args) => cmd::section::run_section(args, &ctx)?,
        Commands::Create(ref args) => cmd::create::run_create(args, &mut ctx)?,
        Commands::Show(ref args) => cmd::show::run_show(args, &ctx)?,
        Commands::List(ref args) => cmd::list::run_list(args, &ctx)?,
        Commands::Edit(ref args) => cmd::edit::run_edit(args, &mut ctx)?,
        Commands::Close(ref args) => cmd::lifecycle::run_close(args, &mut ctx)?,
        Commands::Open(ref args) => cmd::lifecycle::run_open(args, &mut ctx)?,
        Commands::Delete(ref args) => cmd::lifecycle::run_delete(args, &mut ctx)?,
        Commands::Undelete(ref args) => cmd::lifecycle::run_undelete(args, &mut ctx)?,
        Commands::Move(ref args) => cmd::move_cmd::run_move(args, &mut ctx)?,
        Commands::History(ref args) => cmd::history::run_history(args, &ctx)?,
        Commands::Search(ref args) => cmd::search::run_search(args, &ctx)?,
        Commands::Draft(ref args) => cmd::draft::run_draft(args, &ctx)?,
        Commands::Rates(ref args) => cmd::rates::run_rates(args, &mut ctx)?,
        Commands::Jobs(ref args) => cmd::jobs::run_jobs(args, &mut ctx)?,
        Commands::Init(_) | Commands::Completions(_) => {}
    }
    ctx.finish()
}

/// Resolve the working directory and config, then dispatch. Returns the
/// output mode errors should be reported in.
fn run(cli: &Cli) -> (OutputMode, anyhow::Result<()>) {
    let fallback = if cli.json { OutputMode::Json } else { OutputMode::Text };
    let root = match env::current_dir() {
        Ok(root) => root,
        Err(err) => return (fallback, Err(err.into())),
    };
    let effective = match config::resolve_config(&root, cli.json) {
        Ok(effective) => effective,
        Err(err) => {
            let failure = CliFailure::new(ErrorCode::ConfigParseError, format!("{err:#}"));
            return (fallback, Err(failure.into()));
        }
    };
    let output = OutputMode::from_resolved(&effective.resolved_output);
    (output, dispatch(cli, &root, &effective, output))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let (output, result) = run(&cli);
    let Err(err) = result else {
        return ExitCode::SUCCESS;
    };
    tracing::debug!(error = %format!("{err:#}"), "command failed");
    if let Err(render_err) = render_error(output, &CliError::from(&err)) {
        eprintln!("error: {err:#} (while reporting: {render_err})");
    }
    ExitCode::FAILURE
}
