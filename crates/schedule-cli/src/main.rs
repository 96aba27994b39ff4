//! `schedule` CLI — dose times, schedule range queries, regimen derivation,
//! and transcription from the command line.
//!
//! ## Usage
//!
//! ```sh
//! # Dose times for four doses a day on the default routine
//! schedule slots --times 4
//!
//! # Occurrences of user 7 in March 2026 from a JSON bundle of schedule records
//! schedule query -i schedules.json --user 7 --month 2026-03
//!
//! # Week containing a date, or an explicit range
//! schedule query -i schedules.json --user 7 --week 2026-03-04
//! schedule query -i schedules.json --user 7 --from 2026-03-01 --to 2026-03-15
//!
//! # Regimen from a saved model response, or from text via the configured LLM
//! schedule derive --response reply.txt --today 2026-03-02
//! schedule derive --text "Amoxicillin 1 tablet twice a day for 5 days"
//!
//! # Recognized text for an audio recording or a label photo
//! schedule transcribe -i note.m4a
//! ```
//!
//! Settings come from `--config FILE` (or `./schedule.toml`), then `SCHEDULE_*`
//! environment variables; a `.env` file is loaded first.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use clap::{ArgGroup, Parser, Subcommand};
use schedule_engine::derivation::DerivationPipeline;
use schedule_engine::extractor::{IntentExtractor, TextUnderstanding};
use schedule_engine::model::{ScheduleRecord, UserId};
use schedule_engine::range::RangeQuery;
use schedule_engine::routine::StaticRoutines;
use schedule_engine::slots::{distribute, Routine};
use schedule_engine::store::MemoryStore;
use schedule_engine::transcription::{Media, Transcriber};
use schedule_engine::Settings;
use schedule_remote::{ChatCompletionClient, HttpTranscriptionBackend, RemoteSettings};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "schedule",
    version,
    about = "Recurring schedules and medication regimens"
)]
struct Cli {
    /// Settings file (defaults to ./schedule.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print dose times for N doses a day, one HH:MM per line
    Slots {
        /// Doses per day
        #[arg(short, long)]
        times: u32,
        /// Routine JSON file (camelCase anchors); defaults to the configured routine
        #[arg(long)]
        routine: Option<String>,
    },
    /// Expand stored schedules into occurrences for a month, week, or date range
    #[command(group(ArgGroup::new("range").required(true).args(["month", "week", "from"])))]
    Query {
        /// JSON array of schedule records (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
        /// Owner whose schedules are expanded
        #[arg(long)]
        user: UserId,
        /// Calendar month, YYYY-MM
        #[arg(long)]
        month: Option<String>,
        /// Any date in the Monday-to-Sunday week, YYYY-MM-DD
        #[arg(long)]
        week: Option<String>,
        /// First day of a custom range, YYYY-MM-DD
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// Last day of a custom range, YYYY-MM-DD
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
    /// Derive daily dose schedules from recognized medication text
    #[command(group(ArgGroup::new("source").required(true).args(["response", "text"])))]
    Derive {
        /// Saved text-understanding reply to use instead of calling the provider
        #[arg(long)]
        response: Option<String>,
        /// Recognized text to send to the configured chat-completions provider
        #[arg(long)]
        text: Option<String>,
        /// First day of the regimen, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        today: Option<String>,
        /// Owner of the derived schedules
        #[arg(long, default_value_t = 1)]
        user: UserId,
        /// Routine JSON file; defaults to the configured routine
        #[arg(long)]
        routine: Option<String>,
    },
    /// Send an audio recording or image to the transcription provider
    Transcribe {
        /// Media file
        #[arg(short, long)]
        input: String,
        /// MIME type (guessed from the extension if omitted)
        #[arg(long)]
        content_type: Option<String>,
        /// Overall deadline in seconds
        #[arg(long, default_value_t = 120)]
        deadline: u64,
    },
}

/// Text-understanding stand-in that replays a saved reply.
struct SavedResponse(String);

#[async_trait]
impl TextUnderstanding for SavedResponse {
    async fn complete(&self, _instruction: &str, _text: &str) -> schedule_engine::error::Result<String> {
        Ok(self.0.clone())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    init_tracing(&settings.logging.level);

    match cli.command {
        Commands::Slots { times, routine } => {
            let routine = load_routine(routine.as_deref(), &settings)?;
            for time in distribute(&routine, times).context("Failed to distribute doses")? {
                println!("{}", time.format("%H:%M"));
            }
        }
        Commands::Query {
            input,
            user,
            month,
            week,
            from,
            to,
        } => {
            let records: Vec<ScheduleRecord> = serde_json::from_str(&read_input(input.as_deref())?)
                .context("Failed to parse schedule records")?;
            debug!(records = records.len(), "loaded schedule bundle");
            let store = Arc::new(MemoryStore::with_records(records));
            let query = RangeQuery::new(store, settings.expansion_policy()?);

            let occurrences = match (month, week, from, to) {
                (Some(month), _, _, _) => {
                    let first = parse_date(&format!("{month}-01"), "--month")?;
                    query.in_month(user, first.year(), first.month()).await?
                }
                (_, Some(week), _, _) => query.in_week(user, parse_date(&week, "--week")?).await?,
                (_, _, Some(from), Some(to)) => {
                    query
                        .in_range(user, parse_date(&from, "--from")?, parse_date(&to, "--to")?)
                        .await?
                }
                _ => bail!("one of --month, --week, or --from/--to is required"),
            };
            println!("{}", serde_json::to_string_pretty(&occurrences)?);
        }
        Commands::Derive {
            response,
            text,
            today,
            user,
            routine,
        } => {
            let routines = StaticRoutines::new(load_routine(routine.as_deref(), &settings)?);
            let today = today.map(|t| parse_date(&t, "--today")).transpose()?;
            let derived = match (response, text) {
                (Some(path), text) => {
                    let reply = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read file: {}", path))?;
                    let text = text.unwrap_or_else(|| reply.clone());
                    derive(SavedResponse(reply), routines, &settings, user, &text, today).await?
                }
                (None, Some(text)) => {
                    let remote = RemoteSettings::load(cli.config.as_deref())?;
                    let client = ChatCompletionClient::from_settings(&remote.llm)?;
                    derive(client, routines, &settings, user, &text, today).await?
                }
                (None, None) => bail!("one of --response or --text is required"),
            };
            println!("{}", serde_json::to_string_pretty(&derived)?);
        }
        Commands::Transcribe {
            input,
            content_type,
            deadline,
        } => {
            let bytes =
                std::fs::read(&input).with_context(|| format!("Failed to read file: {}", input))?;
            let remote = RemoteSettings::load(cli.config.as_deref())?;
            let backend = HttpTranscriptionBackend::from_settings(&remote.transcription)?;
            let media = Media {
                file_name: file_name(&input),
                content_type: content_type.unwrap_or_else(|| guess_content_type(&input).to_string()),
                bytes,
            };
            let transcriber = Transcriber::new(backend, settings.transcription);
            let text = transcriber
                .transcribe(&media, Duration::from_secs(deadline))
                .await
                .context("Transcription failed")?;
            println!("{}", text);
        }
    }

    Ok(())
}

async fn derive<T: TextUnderstanding>(
    service: T,
    routines: StaticRoutines,
    settings: &Settings,
    user: UserId,
    text: &str,
    today: Option<NaiveDate>,
) -> Result<Vec<schedule_engine::DerivedSchedule>> {
    let pipeline = DerivationPipeline::new(
        IntentExtractor::new(service, settings.extraction),
        routines,
        settings.derivation.clone(),
        settings.expansion_policy()?,
    );
    let today = today.unwrap_or_else(|| pipeline.today());
    Ok(pipeline.derive(user, text, today).await?)
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_routine(path: Option<&str>, settings: &Settings) -> Result<Routine> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read file: {}", path))?;
            serde_json::from_str(&raw).with_context(|| format!("Invalid routine in {}", path))
        }
        None => Ok(settings.default_routine()?),
    }
}

fn parse_date(raw: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid {} value '{}', expected YYYY-MM-DD", flag, raw))
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn guess_content_type(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
