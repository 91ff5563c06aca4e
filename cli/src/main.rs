#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use deckgen::catalog::{self, PROVIDERS};
use deckgen::config::AppConfig;
use deckgen::notice::NoticeLevel;
use deckgen::persistence::{self, FileStorage, PersistedState};
use deckgen::state::{Field, HistoryRecord, MAX_TEXT_CHARS, TemplateFile};
use deckgen::Store;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Deckgen(#[from] deckgen::Error),
    #[error("no input text; pass --text, --text-file, or --from-history")]
    MissingText,
    #[error("input text is {chars} characters; the limit is {MAX_TEXT_CHARS}")]
    TextTooLong { chars: usize },
    #[error("unknown provider `{0}`; run `deckgen providers` for the list")]
    UnknownProvider(String),
    #[error("provider `{provider}` has no model `{model}`")]
    UnknownModel { provider: String, model: String },
    #[error("no history entry with id {0}")]
    UnknownHistory(i64),
    #[error("read input failed: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "deckgen", about = "Generate slide decks from text through a presentation endpoint")]
struct Cli {
    #[arg(long, env = "DECKGEN_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, env = "DECKGEN_DATA_DIR")]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit text and download the generated presentation.
    Generate(GenerateArgs),
    /// List providers and their models.
    Providers,
    History(HistoryCommand),
    /// Show persisted settings.
    Settings,
    /// Replace the API key with the clipboard contents.
    PasteKey,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long, conflicts_with = "text_file")]
    text: Option<String>,

    #[arg(long, help = "Input file path, or - for stdin")]
    text_file: Option<String>,

    #[arg(long)]
    guidance: Option<String>,

    #[arg(long, help = "Slide count, 1-40")]
    slides: Option<String>,

    #[arg(long, help = "Template .pptx or .potx file")]
    template: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    reuse_images: bool,

    #[arg(long)]
    provider: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long, env = "DECKGEN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, default_value_t = false)]
    paste_key: bool,

    #[arg(long, help = "Start from the parameters of a history entry")]
    from_history: Option<i64>,

    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct HistoryCommand {
    #[command(subcommand)]
    command: HistorySubcommand,
}

#[derive(Subcommand, Debug)]
enum HistorySubcommand {
    List,
    Show {
        id: i64,
    },
    Export {
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_lookup(|key| match key {
        "DECKGEN_ENDPOINT" => cli.endpoint.clone(),
        "DECKGEN_DATA_DIR" => cli.data_dir.clone(),
        _ => std::env::var(key).ok(),
    })?;
    tracing::debug!(endpoint = %config.endpoint, data_dir = %config.data_dir.display(), "config loaded");

    let store = Store::from_config(&config)?;
    let result = match cli.command {
        Command::Generate(args) => run_generate(&store, args).await,
        Command::Providers => {
            print_providers(&store);
            Ok(())
        }
        Command::History(history) => run_history(&store, history),
        Command::Settings => {
            print_settings(&config);
            Ok(())
        }
        Command::PasteKey => store.paste_api_key_from_clipboard().await.map_err(CliError::from),
    };
    print_notices(&store);
    result
}

async fn run_generate(store: &Store, args: GenerateArgs) -> Result<(), CliError> {
    if let Some(id) = args.from_history {
        let record = store.find_history(id).ok_or(CliError::UnknownHistory(id))?;
        store.load_history_item(record);
    }

    match read_input_text(args.text, args.text_file.as_deref())? {
        Some(text) => store.set_field(Field::Text(text)),
        None if store.snapshot().text.trim().is_empty() => return Err(CliError::MissingText),
        None => {}
    }
    if let Some(guidance) = args.guidance {
        store.set_field(Field::Guidance(guidance));
    }
    if let Some(raw) = args.slides {
        store.slide_input_changed(raw);
        store.slide_input_committed();
    }
    if let Some(path) = args.template {
        store.set_field(Field::Template(Some(TemplateFile::from_path(&path)?)));
    }
    if args.reuse_images {
        store.set_field(Field::ReuseImages(true));
    }
    if let Some(provider) = args.provider {
        if catalog::provider(&provider).is_none() {
            return Err(CliError::UnknownProvider(provider));
        }
        store.set_provider(provider);
    }
    if let Some(model) = args.model {
        if !store.models().iter().any(|m| m.id == model) {
            return Err(CliError::UnknownModel { provider: store.snapshot().provider, model });
        }
        store.set_field(Field::Model(model));
    }
    if args.paste_key {
        store.paste_api_key_from_clipboard().await?;
    } else if let Some(api_key) = args.api_key {
        store.set_field(Field::ApiKey(api_key));
    }

    let state = store.snapshot();
    if !state.is_form_valid() {
        eprintln!("warning: form looks incomplete (text over 10 characters and an API key are expected)");
    }
    if state.text_near_limit() {
        eprintln!("warning: {} characters, approaching the {MAX_TEXT_CHARS} limit", state.text_chars());
    }
    eprintln!(
        "generating {} slides with {}/{}{}",
        state.num_slides,
        state.provider,
        state.model,
        state.template.as_ref().map(|t| format!(" using {} ({:.2} MB)", t.name, t.size_mb())).unwrap_or_default()
    );

    store.generate_presentation().await?;
    let path = store.download_last_file(&args.out)?;
    println!("{}", path.display());

    let state = store.snapshot();
    eprintln!("response time: {} ms, api calls: {}", state.response_time_ms, state.api_calls);
    Ok(())
}

fn run_history(store: &Store, history: HistoryCommand) -> Result<(), CliError> {
    match history.command {
        HistorySubcommand::List => {
            let state = store.snapshot();
            if state.history.is_empty() {
                println!("no history");
            }
            let now = OffsetDateTime::now_utc();
            for record in &state.history {
                println!("{}", history_line(record, now));
            }
            Ok(())
        }
        HistorySubcommand::Show { id } => {
            let record = store.find_history(id).ok_or(CliError::UnknownHistory(id))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        HistorySubcommand::Export { out } => {
            let path = store.export_history(&out)?;
            println!("{}", path.display());
            Ok(())
        }
        HistorySubcommand::Clear => {
            store.clear_history();
            Ok(())
        }
    }
}

fn print_providers(store: &Store) {
    let selected = store.snapshot().provider;
    for provider in PROVIDERS {
        let marker = if provider.id == selected { "*" } else { " " };
        println!("{marker} {:<10} {} - {}", provider.id, provider.name, provider.description);
        for model in provider.models {
            println!("    {:<28} {}", model.id, model.label);
        }
    }
}

fn print_settings(config: &AppConfig) {
    let storage = FileStorage::new(config.data_dir.clone());
    let PersistedState { history, settings } = persistence::load_state(&storage);
    println!("endpoint:  {}", config.endpoint);
    println!("data dir:  {}", storage.dir().display());
    println!("provider:  {}", settings.provider);
    println!("api key:   {}", mask_key(&settings.api_key));
    println!("history:   {} entries", history.len());
}

fn print_notices(store: &Store) {
    for notice in store.take_notices() {
        match notice.level {
            NoticeLevel::Success => eprintln!("ok: {}", notice.message),
            NoticeLevel::Error => eprintln!("error: {}", notice.message),
        }
    }
}

/// Text from `--text`, or from `--text-file` (`-` reads stdin).
fn read_input_text(text: Option<String>, text_file: Option<&str>) -> Result<Option<String>, CliError> {
    let text = match (text, text_file) {
        (Some(text), _) => text,
        (None, Some("-")) => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
        (None, Some(path)) => std::fs::read_to_string(Path::new(path))?,
        (None, None) => return Ok(None),
    };
    check_text_len(&text)?;
    Ok(Some(text))
}

fn check_text_len(text: &str) -> Result<(), CliError> {
    let chars = text.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(CliError::TextTooLong { chars });
    }
    Ok(())
}

/// First four characters, the rest starred.
fn mask_key(key: &str) -> String {
    if key.is_empty() {
        return "(not set)".to_owned();
    }
    let visible: String = key.chars().take(4).collect();
    let hidden = key.chars().count().saturating_sub(4);
    format!("{visible}{}", "*".repeat(hidden))
}

fn history_line(record: &HistoryRecord, now: OffsetDateTime) -> String {
    let age = record.parsed_timestamp().map_or_else(|| "unknown".to_owned(), |ts| format_age(now, ts));
    format!(
        "{:<14} {:>9}  {:>2} slides  {}/{}  {}",
        record.id, age, record.slides, record.provider, record.model, record.title
    )
}

fn format_age(now: OffsetDateTime, then: OffsetDateTime) -> String {
    let secs = (now - then).whole_seconds();
    match secs {
        s if s < 60 => "just now".to_owned(),
        s if s < 3_600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3_600),
        s => format!("{}d ago", s / 86_400),
    }
}
