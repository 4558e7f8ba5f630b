use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use docx2wiki_core::config::{AppConfig, load_config};
use docx2wiki_core::confluence::ConfluenceClient;
use docx2wiki_core::convert::PandocConverter;
use docx2wiki_core::discover::discover_documents;
use docx2wiki_core::housekeeping::clear_directory;
use docx2wiki_core::journal::RunLog;
use docx2wiki_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, normalize_for_display, resolve_paths,
};
use docx2wiki_core::titles::TitleMap;
use docx2wiki_core::upload::{PageAction, UploadSettings, Uploader, plan_tree};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "docx2wiki",
    version,
    about = "Migrate a folder tree of Word documents into a Confluence page tree"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Folder holding the documents")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Enable debug tracing on stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Convert every document and publish it as a page")]
    Migrate(MigrateArgs),
    #[command(about = "Print the page title chosen for every document")]
    Titles,
    #[command(about = "Print the page tree a migration would create")]
    Plan(PlanArgs),
    #[command(about = "Empty the media extraction folder")]
    Clean,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    #[arg(long, value_name = "KEY", help = "Target space key")]
    space_key: Option<String>,
    #[arg(long, value_name = "ID", help = "Page id the top-level pages are created under")]
    parent_id: Option<String>,
    #[arg(long, help = "Print the run report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct PlanArgs {
    #[arg(long, help = "Print the plan as JSON")]
    json: bool,
}

/// Runtime paths with `[import]` settings applied, plus the parsed config.
struct Runtime {
    paths: ResolvedPaths,
    config: AppConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Migrate(args)) => run_migrate(&runtime, args),
        Some(Commands::Titles) => run_titles(&runtime),
        Some(Commands::Plan(args)) => run_plan(&runtime, args),
        Some(Commands::Clean) => run_clean(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_migrate(runtime: &RuntimeOptions, args: MigrateArgs) -> Result<()> {
    let Runtime { paths, config } = load_runtime(runtime)?;
    let log = RunLog::open(&paths.log_path, true)?;
    log.start_run();

    if !paths.data_dir.is_dir() {
        log.error(format!(
            "data folder not found: {}",
            normalize_for_display(&paths.data_dir)
        ));
        bail!(
            "data folder not found: {}",
            normalize_for_display(&paths.data_dir)
        );
    }

    let connection = config.connection();
    if connection.base_url.is_empty() {
        log.warn("CONFLUENCE_BASE_URL is not set; every request will fail");
    }
    let mut target = config.target();
    if let Some(space_key) = args.space_key {
        target.space_key = space_key;
    }
    if let Some(parent_id) = args.parent_id {
        target.parent_page_id = Some(parent_id);
    }

    let extension = config.extension();
    let documents = discover_documents(&paths.data_dir, &extension)?;
    let titles = TitleMap::build(&documents);
    log.info(format!("discovered {} document(s)", titles.len()));
    for (path, title) in titles.iter() {
        log.info(format!("title map: {} -> '{title}'", display_relative(&paths, path)));
    }

    let mut client = ConfluenceClient::new(connection)?;
    let converter = PandocConverter::new(
        config.pandoc_binary(),
        &paths.media_root,
        &paths.project_root,
    );
    let settings = UploadSettings {
        space_key: target.space_key.clone(),
        extension,
        media_dir: paths.media_dir(),
    };
    let report = Uploader::new(&mut client, &converter, &titles, &log, &settings)
        .upload_tree(&paths.data_dir, target.parent_page_id.as_deref())?;
    log.info(format!(
        "run finished: {} created, {} updated, {} failed",
        report.created, report.updated, report.failed
    ));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("migrate");
        println!("data_dir: {}", normalize_for_display(&paths.data_dir));
        println!("space_key: {}", target.space_key);
        println!(
            "parent_page_id: {}",
            target.parent_page_id.as_deref().unwrap_or("<none>")
        );
        println!("documents: {}", titles.len());
        println!("pages.created: {}", report.created);
        println!("pages.updated: {}", report.updated);
        println!("pages.failed: {}", report.failed);
        println!("documents.skipped: {}", report.skipped_documents);
        println!("folders.skipped: {}", report.skipped_folders.len());
        println!("attachments.uploaded: {}", report.attachments_uploaded);
        println!("attachments.failed: {}", report.attachments_failed);
        println!("requests: {}", report.request_count);
        for page in report.pages.iter().filter(|page| page.action != PageAction::Updated) {
            println!("{}: {} ({})", page.action.as_str(), page.title, page.source);
        }
        for folder in &report.skipped_folders {
            println!("folder_skipped: {folder}");
        }
        println!("log_path: {}", normalize_for_display(log.path()));
        println!("result: {}", if report.success() { "ok" } else { "partial" });
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_titles(runtime: &RuntimeOptions) -> Result<()> {
    let Runtime { paths, config } = load_runtime(runtime)?;
    ensure_data_dir(&paths)?;
    let documents = discover_documents(&paths.data_dir, &config.extension())?;
    let titles = TitleMap::build(&documents);

    println!("titles");
    println!("data_dir: {}", normalize_for_display(&paths.data_dir));
    println!("documents: {}", titles.len());
    for (path, title) in titles.iter() {
        println!("{} -> {title}", display_relative(&paths, path));
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_plan(runtime: &RuntimeOptions, args: PlanArgs) -> Result<()> {
    let Runtime { paths, config } = load_runtime(runtime)?;
    ensure_data_dir(&paths)?;
    let extension = config.extension();
    let titles = TitleMap::build(&discover_documents(&paths.data_dir, &extension)?);
    let plan = plan_tree(&paths.data_dir, &extension, &titles)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        let target = config.target();
        println!("plan");
        println!("space_key: {}", target.space_key);
        println!(
            "parent_page_id: {}",
            target.parent_page_id.as_deref().unwrap_or("<none>")
        );
        println!("pages: {}", plan.len());
        for page in &plan {
            println!("{}- {}", "  ".repeat(page.depth), page.title);
        }
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_clean(runtime: &RuntimeOptions) -> Result<()> {
    let Runtime { paths, .. } = load_runtime(runtime)?;
    let log = RunLog::open(&paths.log_path, false)?;
    let media_dir = paths.media_dir();
    let report = clear_directory(&media_dir, &log);

    println!("clean");
    println!("media_dir: {}", normalize_for_display(&media_dir));
    println!("removed_files: {}", report.removed_files);
    println!("failed: {}", report.failed);
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    if report.failed > 0 {
        bail!("{} file(s) could not be deleted", report.failed);
    }
    Ok(())
}

fn ensure_data_dir(paths: &ResolvedPaths) -> Result<()> {
    if !paths.data_dir.is_dir() {
        bail!(
            "data folder not found: {}",
            normalize_for_display(&paths.data_dir)
        );
    }
    Ok(())
}

fn load_runtime(runtime: &RuntimeOptions) -> Result<Runtime> {
    let mut paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)
        .with_context(|| format!("failed to load {}", paths.config_path.display()))?;
    paths.apply_import_settings(&config.import);
    tracing::debug!(
        project_root = %paths.project_root.display(),
        data_dir = %paths.data_dir.display(),
        "runtime resolved"
    );
    Ok(Runtime { paths, config })
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn display_relative(paths: &ResolvedPaths, path: &std::path::Path) -> String {
    normalize_for_display(path.strip_prefix(&paths.data_dir).unwrap_or(path))
}
