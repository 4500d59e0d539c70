//! DebateArena CLI - scored AI debates in the terminal
//!
//! Hosts a debate between two configured participants and prints its event
//! stream as it happens.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use debatearena_core::config::default_config;
use debatearena_core::{
    Config, DebateEvent, DebateManager, HealthScore, OpenAiGenerator, OpenAiScorer, Persistence,
    SqliteStore,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "debatearena",
    version,
    about = "DebateArena - Watch AIs battle it out over a topic",
    long_about = "Runs scored debates between AI participants using OpenAI-compatible APIs. \
                  Each turn is judged and the weaker argument costs health."
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "debatearena.toml", value_name = "FILE")]
    config: PathBuf,

    /// Override the SQLite database path
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Disable audio synthesis even if the config enables it
    #[arg(long)]
    no_audio: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new debate and watch it to the end
    Run {
        /// The topic to debate
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// First participant (opens the debate)
        #[arg(long, value_name = "NAME")]
        p1: Option<String>,

        /// Second participant
        #[arg(long, value_name = "NAME")]
        p2: Option<String>,

        /// Who is recorded as creating the debate
        #[arg(long, value_name = "USER")]
        by: Option<String>,
    },
    /// List stored debates that have not finished
    List,
    /// Resume a stored debate that was interrupted
    Resume {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let store = Arc::new(SqliteStore::open(&config.storage.database_path)?);

    if let Command::List = cli.command {
        return list_debates(store.as_ref()).await;
    }

    let generator = Arc::new(OpenAiGenerator::new(config.clone())?);
    let scorer = Arc::new(OpenAiScorer::new(&config)?);
    let manager = DebateManager::new(config.clone(), generator, scorer, store);
    let manager = Arc::new(with_audio(manager, &config).await);
    let sweeper = manager.spawn_sweeper();

    let (id, ending) = match cli.command {
        Command::Run { topic, p1, p2, by } => {
            let mut roster = config.participants.iter().map(|p| p.name.clone());
            let (p1, p2) = match (p1.or_else(|| roster.next()), p2.or_else(|| roster.next())) {
                (Some(p1), Some(p2)) => (p1, p2),
                _ => return Err("Need two participants; configure a roster or pass --p1/--p2".into()),
            };
            let by = by
                .or_else(|| env::var("USER").ok())
                .unwrap_or_else(|| "cli".to_string());

            let id = manager.create_debate(&topic, &p1, &p2, &by).await?;
            print_header(&topic, &p1, &p2, &id);
            let (_, events) = manager.subscribe(&id)?;
            manager.start_debate(&id)?;
            let ending = watch(&manager, events).await;
            (id, ending)
        }
        Command::Resume { id } => {
            let loaded = manager.load_active_on_startup().await?;
            info!(loaded, "stored debates available");
            let snapshot = manager
                .snapshot(&id)
                .ok_or_else(|| format!("No resumable debate with ID {}", id))?;
            let [p1, p2] = &snapshot.participants;
            print_header(&snapshot.topic, p1, p2, &id);
            let (_, events) = manager.subscribe(&id)?;
            manager.resume_debate(&id)?;
            let ending = watch(&manager, events).await;
            (id, ending)
        }
        Command::List => return Ok(()),
    };

    manager.shutdown().await;
    sweeper.await.ok();

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", verdict(&id, ending.as_ref()).bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

/// File config if present, then environment, then flags.
fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "no config file, using defaults");
        default_config()
    };

    if let Ok(base) = env::var("OPENAI_API_BASE").or_else(|_| env::var("OPENAI_BASE_URL")) {
        config.llm.api_base = base;
    }
    if let Ok(key) = env::var("OPENAI_API_KEY") {
        config.llm.api_key = key;
    }
    if config.llm.api_key.is_empty() {
        eprintln!(
            "{}",
            "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
        );
    }

    if let Some(db) = &cli.db {
        config.storage.database_path = db.clone();
    }
    if cli.no_audio {
        config.audio.enabled = false;
    }
    Ok(config)
}

#[cfg(feature = "kokoro")]
async fn with_audio(manager: DebateManager, config: &Config) -> DebateManager {
    if !config.audio.enabled {
        return manager;
    }
    match debatearena_core::KokoroSynthesizer::new(config).await {
        Ok(synth) => manager.with_audio(Arc::new(synth)),
        Err(e) => {
            warn!(error = %e, "audio disabled");
            manager
        }
    }
}

#[cfg(not(feature = "kokoro"))]
async fn with_audio(manager: DebateManager, config: &Config) -> DebateManager {
    if config.audio.enabled {
        warn!("audio requested but this build lacks the kokoro feature");
    }
    manager
}

async fn list_debates(store: &dyn Persistence) -> Result<(), Box<dyn std::error::Error>> {
    let records = store.list_active().await?;
    if records.is_empty() {
        println!("{}", "No unfinished debates.".dimmed());
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {}  {} vs {}  {}",
            record.id.bright_white(),
            record.status.to_string().yellow(),
            record.participant1.bright_cyan(),
            record.participant2.bright_cyan(),
            format!("\"{}\"", record.topic).dimmed()
        );
    }
    Ok(())
}

fn print_header(topic: &str, p1: &str, p2: &str, id: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {}", "DebateArena".bold()).bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), topic.bright_white());
    println!("{} {} vs {}", "Match:".bold(), p1.bright_cyan(), p2.bright_cyan());
    println!("{} {}", "ID:".bold(), id.dimmed());
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

/// Print events until the debate ends or Ctrl-C. Returns the terminal event, if any.
async fn watch(manager: &DebateManager, mut events: mpsc::Receiver<DebateEvent>) -> Option<DebateEvent> {
    let cap = manager.config().arena.display_cap;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) if event.is_terminal() => {
                    print_event(event.clone(), cap);
                    return Some(event);
                }
                Some(event) => print_event(event, cap),
                None => return None,
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("{}", "Interrupted; the debate can be resumed later.".yellow());
                return None;
            }
        }
    }
}

/// Closing line, taken from the terminal event rather than the registry.
fn verdict(id: &str, ending: Option<&DebateEvent>) -> String {
    match ending {
        Some(DebateEvent::GameOver { winner, .. }) => {
            format!("  Debate concluded. Winner: {}", winner)
        }
        Some(DebateEvent::Timeout { .. }) => "  Debate ended without a winner.".to_string(),
        Some(DebateEvent::Error { .. }) => "  Debate ended after an internal error.".to_string(),
        _ => format!("  Debate {} did not finish. Resume it with `debatearena resume {}`.", id, id),
    }
}

fn print_event(event: DebateEvent, cap: i32) {
    match event {
        DebateEvent::System { message } => {
            println!();
            println!("{}", format!("  📢 {}", message).bright_magenta().bold());
            println!();
        }
        DebateEvent::Message { speaker, text, score } => {
            let rating = score
                .map(|s| format!("[{:.1}/10]", s.average))
                .unwrap_or_default();
            println!("{} {} {}", "▶".bright_cyan(), speaker.bright_cyan().bold(), rating.yellow());
            // Word wrap and indent the content
            let wrapped = textwrap(&text, 66);
            for line in wrapped.lines() {
                println!("  {}", line);
            }
            println!();
        }
        DebateEvent::Audio { artifact_ref, .. } => {
            println!("  {}", format!("♪ {}", artifact_ref).dimmed());
        }
        DebateEvent::ScoreUpdate { normalized, .. } => {
            println!("  {}", health_bars(normalized, cap));
            println!("{}", "─".repeat(70).dimmed());
        }
        DebateEvent::GameOver { message, .. } => {
            println!("{}", format!("  🏆 {}", message).bright_green().bold());
        }
        DebateEvent::Timeout { message } => {
            println!("{}", format!("  ⏱ {}", message).yellow().bold());
        }
        DebateEvent::Error { message } => {
            println!("{}", format!("  ✖ {}", message).red().bold());
        }
    }
}

fn health_bars(health: HealthScore, cap: i32) -> String {
    const WIDTH: i32 = 20;
    let bar = |hp: i32| {
        let filled = if cap > 0 { (hp * WIDTH / cap).clamp(0, WIDTH) } else { 0 };
        format!(
            "{}{} {:>3}",
            "█".repeat(filled as usize),
            "░".repeat((WIDTH - filled) as usize),
            hp
        )
    };
    format!("{}   {}", bar(health.first).green(), bar(health.second).red())
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_comes_from_terminal_event() {
        let game_over = DebateEvent::GameOver {
            winner: "Candidate A".to_string(),
            message: "Candidate A wins!".to_string(),
        };
        assert!(verdict("d1", Some(&game_over)).contains("Winner: Candidate A"));

        let timeout = DebateEvent::Timeout { message: "timed out".to_string() };
        assert!(verdict("d1", Some(&timeout)).contains("without a winner"));
    }

    #[test]
    fn test_verdict_without_ending_points_to_resume() {
        assert!(verdict("d1", None).contains("debatearena resume d1"));
    }

    #[test]
    fn test_textwrap_respects_width() {
        let wrapped = textwrap("one two three four five six seven", 10);
        assert!(wrapped.lines().all(|l| l.len() <= 10));
        assert_eq!(wrapped.split_whitespace().count(), 7);
    }
}
