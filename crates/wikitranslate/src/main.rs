use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use wikitranslate_core::article::parse;
use wikitranslate_core::config::{WikiConfig, load_config, save_language};
use wikitranslate_core::language::{self, LANGUAGES, LanguageInfo};
use wikitranslate_core::ledger::CachedPageInfo;
use wikitranslate_core::mediawiki::{MediaWikiClient, MediaWikiClientConfig, WikiReadApi};
use wikitranslate_core::page::{PageContext, PageMode};
use wikitranslate_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, init_layout, resolve_paths,
};
use wikitranslate_core::store::{KeyValueStore, MemoryStore, SqliteStore};
use wikitranslate_core::template::build_translation_status_template;
use wikitranslate_core::workflow::{TranslatorContext, TranslatorSettings};

#[derive(Debug, Parser)]
#[command(
    name = "wikitranslate",
    version,
    about = "Translation helper for wiki articles: headers, status templates and link checks"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "KEY", help = "Target language key, e.g. Polish")]
    language: Option<String>,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[arg(long, global = true, help = "Keep link statuses in memory only")]
    no_cache: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    language: Option<String>,
    no_cache: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            language: cli.language.clone(),
            no_cache: cli.no_cache,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create .wikitranslate/ and a default config")]
    Init(InitArgs),
    #[command(about = "List known languages")]
    Languages,
    #[command(about = "Show or change the active translation language")]
    Language(LanguageArgs),
    #[command(about = "Show how a page source splits into header and body")]
    Parse(ParseArgs),
    #[command(about = "Check which links of a translation already have translations")]
    Check(CheckArgs),
    #[command(about = "Print the source of a new translation")]
    Draft(DraftArgs),
    #[command(name = "status-template", about = "Print a translation status template line")]
    StatusTemplate(StatusTemplateArgs),
    Revision(RevisionArgs),
    #[command(about = "Fetch a page and store what kind of page it is")]
    Snapshot(SnapshotArgs),
    Cache(CacheArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct LanguageArgs {
    #[command(subcommand)]
    command: LanguageSubcommand,
}

#[derive(Debug, Subcommand)]
enum LanguageSubcommand {
    Show,
    #[command(about = "Store the language in the project config")]
    Set { key: String },
}

#[derive(Debug, Args)]
struct ParseArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct CheckArgs {
    title: String,
    #[arg(long, value_name = "PATH", help = "Read the translation source from a file")]
    file: Option<PathBuf>,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct DraftArgs {
    title: String,
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<NaiveDate>,
}

#[derive(Debug, Args)]
struct StatusTemplateArgs {
    english_title: String,
    #[arg(long, value_name = "ID")]
    revision: i64,
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<NaiveDate>,
}

#[derive(Debug, Args)]
struct RevisionArgs {
    #[command(subcommand)]
    command: RevisionSubcommand,
}

#[derive(Debug, Subcommand)]
enum RevisionSubcommand {
    #[command(about = "Record the current English revision for a translated title")]
    Record { title: String },
    Show { title: String },
    Forget { title: String },
}

#[derive(Debug, Args)]
struct SnapshotArgs {
    title: String,
    #[arg(long, help = "Print the snapshot as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Debug, Subcommand)]
enum CacheSubcommand {
    Show { link: String },
    Invalidate { link: String },
}

type Translator = TranslatorContext<MediaWikiClient, Box<dyn KeyValueStore>>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Languages) => run_languages(),
        Some(Commands::Language(LanguageArgs { command })) => run_language(&runtime, command),
        Some(Commands::Parse(args)) => run_parse(args),
        Some(Commands::Check(args)) => run_check(&runtime, args),
        Some(Commands::Draft(args)) => run_draft(&runtime, args),
        Some(Commands::StatusTemplate(args)) => run_status_template(&runtime, args),
        Some(Commands::Revision(RevisionArgs { command })) => run_revision(&runtime, command),
        Some(Commands::Snapshot(args)) => run_snapshot(&runtime, args),
        Some(Commands::Cache(CacheArgs { command })) => run_cache(&runtime, command),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("wikitranslate_core=debug,wikitranslate=debug,warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, &InitOptions { force: args.force })?;

    println!("Initialized wikitranslate runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("store_path: {}", normalize_path(&paths.store_path));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    Ok(())
}

fn run_languages() -> Result<()> {
    for info in LANGUAGES {
        println!(
            "{}\t{}\t{}\t{}",
            info.key,
            info.subtag.unwrap_or("-"),
            info.english_name,
            info.localized_name
        );
    }
    Ok(())
}

fn run_language(runtime: &RuntimeOptions, command: LanguageSubcommand) -> Result<()> {
    match command {
        LanguageSubcommand::Show => {
            let (_, language) = load_settings(runtime)?;
            println!("language: {}", language.key);
            println!("localized_name: {}", language.localized_name);
            println!("title_suffix: {}", language.title_suffix().trim_start());
        }
        LanguageSubcommand::Set { key } => {
            let paths = resolve_runtime_paths(runtime)?;
            let language = save_language(&paths.config_path, &key)?;
            println!("language set {}", language.key);
            println!("config_path: {}", normalize_path(&paths.config_path));
            if env::var_os("WIKITRANSLATE_LANGUAGE").is_some() {
                warn!("WIKITRANSLATE_LANGUAGE is set and takes precedence over the config file");
            }
        }
    }
    Ok(())
}

fn run_parse(args: ParseArgs) -> Result<()> {
    let source = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let article = parse(&source);

    println!("parse {}", normalize_path(&args.file));
    print_bucket("redirects", article.redirects());
    print_bucket("magic_words", article.magic_words());
    print_bucket("categories", article.categories());
    println!(
        "interlanguage_links.count: {}",
        article.interlanguage_links().len()
    );
    for (subtag, line) in article.interlanguage_links() {
        println!("interlanguage_links.{subtag}: {line}");
    }
    print_bucket("templates", article.templates());
    print_bucket("related_articles", article.related_articles());
    println!("body.lines: {}", article.body().len());
    let links = article.localizable_links();
    println!("localizable_links.count: {}", links.len());
    for link in &links {
        println!("localizable_links.target: {link}");
    }
    Ok(())
}

fn run_check(runtime: &RuntimeOptions, args: CheckArgs) -> Result<()> {
    let source = match &args.file {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let mut translator = build_translator(runtime)?;
    let page = PageContext::new(args.title, PageMode::Editor);
    let report = translator.check_translation(&page, source.as_deref())?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("check {}", report.title);
    println!("language: {}", translator.language().english_name);
    println!("links_checked: {}", report.links_checked);
    for record in &report.records {
        match record.redirect_target() {
            Some(target) => println!(
                "{}\t{} -> {}",
                record.status(),
                record.source_link(),
                target.with_anchor()
            ),
            None => println!("{}\t{}", record.status(), record.source_link()),
        }
    }
    if !report.failures.is_empty() {
        println!("failures:");
        for failure in &report.failures {
            println!("  - {}: {}", failure.link, failure.message);
        }
    }
    debug!(requests = translator.api().request_count(), "wiki requests issued");
    Ok(())
}

fn run_draft(runtime: &RuntimeOptions, args: DraftArgs) -> Result<()> {
    let mut translator = build_translator(runtime)?;
    let page = PageContext::new(args.title, PageMode::CreateEditor);
    let date = args.date.unwrap_or_else(today);
    let draft = translator.draft_translation(&page, date)?;
    println!("{draft}");
    Ok(())
}

fn run_status_template(runtime: &RuntimeOptions, args: StatusTemplateArgs) -> Result<()> {
    let (config, language) = load_settings(runtime)?;
    let language = config.localized_status_template().then_some(language);
    let date = args.date.unwrap_or_else(today);
    println!(
        "{}",
        build_translation_status_template(&args.english_title, date, args.revision, language)
    );
    Ok(())
}

fn run_revision(runtime: &RuntimeOptions, command: RevisionSubcommand) -> Result<()> {
    let mut translator = build_translator(runtime)?;
    match command {
        RevisionSubcommand::Record { title } => {
            let revision = translator.record_revision(&title)?;
            println!("revision record {title}");
            println!("english_revision_id: {revision}");
        }
        RevisionSubcommand::Show { title } => {
            println!("revision show {title}");
            match translator.recorded_revision(&title)? {
                Some(revision) => println!("english_revision_id: {revision}"),
                None => println!("english_revision_id: <none>"),
            }
        }
        RevisionSubcommand::Forget { title } => {
            translator.forget_revision(&title)?;
            println!("revision forget {title}");
        }
    }
    Ok(())
}

fn run_snapshot(runtime: &RuntimeOptions, args: SnapshotArgs) -> Result<()> {
    let mut translator = build_translator(runtime)?;
    let info = translator.snapshot(&args.title)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    println!("snapshot {}", args.title);
    match &info {
        CachedPageInfo::English { .. } => println!("kind: english"),
        CachedPageInfo::Translated {
            english_revision_id,
            ..
        } => {
            println!("kind: translated");
            println!(
                "english_revision_id: {}",
                english_revision_id
                    .map(|revision| revision.to_string())
                    .unwrap_or_else(|| "<none>".to_string())
            );
        }
        CachedPageInfo::Redirect { redirects_to, .. } => {
            println!("kind: redirect");
            println!("redirects_to: {redirects_to}");
        }
    }
    println!("page_name: {}", info.page_name());
    println!("latest_revision_id: {}", info.latest_revision_id());
    Ok(())
}

fn run_cache(runtime: &RuntimeOptions, command: CacheSubcommand) -> Result<()> {
    let translator = build_translator(runtime)?;
    match command {
        CacheSubcommand::Show { link } => {
            let entry = translator.cache_entry(&link)?;
            println!("cache show {link}");
            println!("status: {}", entry.status);
            println!(
                "expires_at: {}",
                entry
                    .expires_at
                    .map(|instant| instant.to_rfc3339())
                    .unwrap_or_else(|| "<none>".to_string())
            );
            println!(
                "redirect_target: {}",
                entry.redirect_target.as_deref().unwrap_or("<none>")
            );
        }
        CacheSubcommand::Invalidate { link } => {
            translator.invalidate_link(&link)?;
            println!("cache invalidate {link}");
        }
    }
    Ok(())
}

fn build_translator(runtime: &RuntimeOptions) -> Result<Translator> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let language = resolve_language(runtime, &config)?;

    let store: Box<dyn KeyValueStore> = if runtime.no_cache {
        Box::new(MemoryStore::new())
    } else {
        Box::new(SqliteStore::open(&paths.store_path)?)
    };
    let client = MediaWikiClient::new(MediaWikiClientConfig::from_config(&config))?;
    debug!(
        store = %normalize_path(&paths.store_path),
        language = language.key,
        "translator ready"
    );
    Ok(TranslatorContext::new(
        client,
        store,
        language,
        TranslatorSettings::from_config(&config),
    ))
}

fn load_settings(runtime: &RuntimeOptions) -> Result<(WikiConfig, &'static LanguageInfo)> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let language = resolve_language(runtime, &config)?;
    Ok((config, language))
}

fn resolve_language(runtime: &RuntimeOptions, config: &WikiConfig) -> Result<&'static LanguageInfo> {
    match runtime.language.as_deref() {
        Some(key) => language::lookup(key),
        None => config.language(),
    }
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

    let paths = resolve_paths(&context, &overrides)?;
    debug!("{}", paths.diagnostics());
    Ok(paths)
}

fn print_bucket(name: &str, lines: &[String]) {
    println!("{name}.count: {}", lines.len());
    for line in lines {
        println!("{name}.line: {line}");
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
