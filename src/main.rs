mod config;
mod error;
mod index;
mod launcher;
mod manager;
mod model;
mod opener;
mod rendezvous;
mod resolver;
mod selector;
mod sources;

use crate::config::{Settings, load_config};
use crate::launcher::Launcher;
use crate::manager::{IndexManager, SystemIndexGenerator};
use crate::model::MimeDesktopIds;
use crate::opener::{Opener, ResourceKind, detect_mime, parse_resource};
use crate::resolver::Resolver;
use crate::selector::Selector;
use crate::sources::DesktopFileParser;
use crate::sources::mimeinfo::SubclassTable;
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Open files and URLs with a choice of applications", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open a file
    File(OpenArgs),
    /// Open an absolute URL, e.g. https://example.com
    Url(OpenArgs),
    /// Open a URL if the argument has a scheme, a file otherwise
    #[command(visible_aliases = ["file-or-url", "r"])]
    Resource(OpenArgs),
    /// Query the associations and desktop IDs
    Query(QueryArgs),
    /// Manage the cached index
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
    /// Run a program in a new terminal and signal its start over a FIFO
    #[command(hide = true)]
    Relay {
        fifo: PathBuf,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct OpenArgs {
    /// Path or URL to open
    target: String,
    /// Do not use the cache, read desktop files and association lists instead
    #[arg(long)]
    skip_cache: bool,
    /// Use this MIME type instead of detecting it
    #[arg(long, value_name = "MIME")]
    mime_type: Option<String>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    #[command(subcommand)]
    command: QueryCommand,
    /// Do not use the cache, read desktop files and association lists instead
    #[arg(long, global = true)]
    skip_cache: bool,
    /// Output format. The verbose output is not stable, scripts should use json
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Verbose)]
    format: OutputFormat,
}

#[derive(Subcommand, Debug)]
enum QueryCommand {
    /// Desktop IDs associated with a MIME type and its broader types
    Mime { mime: String },
    /// Desktop IDs that can open a file
    File { path: PathBuf },
    /// Desktop files of a desktop ID, highest priority first
    DesktopLocations { desktop_id: String },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Regenerate the index and save it
    Update,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Verbose,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .init();
    let cli = Cli::parse();
    run(cli.command)
}

/// The relay only needs its arguments, every other command reads the
/// configuration first.
fn run(command: Commands) -> Result<()> {
    match command {
        Commands::File(args) => open(&settings()?, args, ResourceKind::File),
        Commands::Url(args) => open(&settings()?, args, ResourceKind::Url),
        Commands::Resource(args) => open(&settings()?, args, ResourceKind::Unknown),
        Commands::Query(args) => query(&settings()?, args),
        Commands::Cache {
            command: CacheCommand::Update,
        } => update_cache(&settings()?),
        Commands::Relay { fifo, command } => Ok(launcher::relay(&fifo, &command)?),
    }
}

fn settings() -> Result<Settings> {
    let config = load_config()?;
    Ok(Settings::from_env(&config)?)
}

fn index_manager(settings: &Settings, skip_cache: bool) -> IndexManager<SystemIndexGenerator> {
    IndexManager::new(
        SystemIndexGenerator::new(settings.current_desktop.clone()),
        settings.cache_path.clone(),
        skip_cache,
        settings.cache_ttl,
    )
}

fn open(settings: &Settings, args: OpenArgs, kind: ResourceKind) -> Result<()> {
    let resource = parse_resource(&args.target, kind)?;
    let index = index_manager(settings, args.skip_cache).load_and_save()?;
    let hierarchy = SubclassTable::load_from_os();
    let resolver = Resolver::new(&index, &hierarchy, &DesktopFileParser);
    let selector = Selector::new(settings.start_modes);
    let launcher = Launcher::new(
        settings.start_modes,
        settings.terminal.clone(),
        launcher::parent_is_shell,
    );

    let mut input = io::stdin().lock();
    let mut output = io::stdout().lock();
    Opener::new(resolver, &selector, &launcher).open(
        resource,
        args.mime_type,
        &mut input,
        &mut output,
    )?;
    Ok(())
}

fn query(settings: &Settings, args: QueryArgs) -> Result<()> {
    let index = index_manager(settings, args.skip_cache).load_and_save()?;
    let mut output = io::stdout().lock();

    let mime = match args.command {
        QueryCommand::Mime { mime } => mime,
        QueryCommand::File { path } => detect_mime(&path, false)?,
        QueryCommand::DesktopLocations { desktop_id } => {
            let mut locations = index.desktop_file_locations(&desktop_id);
            if locations.is_empty() && !desktop_id.ends_with(".desktop") {
                warn!(
                    "No desktop file found with ID {}, but it does not end in .desktop. \
                     Assuming it was forgotten.",
                    desktop_id
                );
                locations = index.desktop_file_locations(&format!("{desktop_id}.desktop"));
            }
            return write_locations(&mut output, locations, args.format);
        }
    };

    let hierarchy = SubclassTable::load_from_os();
    let levels = Resolver::new(&index, &hierarchy, &DesktopFileParser).candidates_for_mime(&mime);
    write_levels(&mut output, &levels, args.format)
}

fn write_levels<W: Write>(output: &mut W, levels: &[MimeDesktopIds], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *output, levels)?;
            writeln!(output)?;
        }
        OutputFormat::Verbose => {
            for level in levels {
                if level.desktop_ids.is_empty() {
                    writeln!(output, "{}: No associated applications", level.mime)?;
                } else {
                    writeln!(output, "{}: {}", level.mime, level.desktop_ids.join(", "))?;
                }
            }
        }
    }
    Ok(())
}

fn write_locations<W: Write>(output: &mut W, locations: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut *output, locations)?;
            writeln!(output)?;
        }
        OutputFormat::Verbose => {
            for location in locations {
                writeln!(output, "{}", location)?;
            }
        }
    }
    Ok(())
}

fn update_cache(settings: &Settings) -> Result<()> {
    let manager = index_manager(settings, true);
    let index = manager.load()?.index;
    manager.save(&index)?;
    info!(
        "Saved index version {} with {} MIME types to {:?}",
        index.version(),
        index.associations().len(),
        manager.cache_path()
    );
    println!("Cache successfully updated.");
    Ok(())
}
