use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::language::{Doctor, Language};
use crate::playback::{PlaybackCommand, PlaybackKey};

#[derive(Parser, Debug)]
#[command(name = "ai-hospital")]
#[command(version)]
#[command(about = "Medical dialogue simulator: replay scripted cases or consult an AI doctor")]
pub struct Args {
    /// Config file (defaults to ./ai-hospital.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// UI and reply language
    #[arg(long, short, value_enum, global = true)]
    pub language: Option<Language>,

    /// Model that plays the doctor
    #[arg(long, short, value_enum, global = true)]
    pub doctor: Option<Doctor>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Talk to the AI doctor. Commands: /summary, /reset, /lang, /quit
    Chat,

    /// Search the case catalog
    Cases {
        /// Case-insensitive search over title, description, category and tags
        #[arg(default_value = "")]
        query: String,

        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Use the bundled catalog instead of the data service
        #[arg(long)]
        offline: bool,
    },

    /// Replay a case transcript. Keys: space, left, right, r, q
    Play {
        case_id: String,

        /// Seconds between lines
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,

        #[arg(long)]
        offline: bool,
    },

    Login {
        username: String,
        /// Read from the terminal when omitted
        #[arg(long)]
        password: Option<String>,
    },

    Register {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },

    Logout,

    /// Show the signed-in user
    Whoami,

    /// Update gender and birth date of the signed-in user
    Profile {
        #[arg(long, value_parser = parse_gender, action = clap::ArgAction::Set)]
        gender: bool,
        /// YYYY-MM-DD
        #[arg(long)]
        birth_date: String,
    },

    /// Change username and password (signs out afterwards)
    Credentials {
        new_username: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// List past sessions of the signed-in user
    History,

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Accepts `male`/`female` and their single-letter and Chinese forms.
pub fn parse_gender(s: &str) -> Result<bool, String> {
    match s.trim().to_lowercase().as_str() {
        "male" | "m" | "男" => Ok(true),
        "female" | "f" | "女" => Ok(false),
        _ => Err(format!("Unknown gender: {}", s)),
    }
}

/// One line typed during playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackInput {
    Command(PlaybackCommand),
    Quit,
}

/// Parse a line of playback input. Stdin is line-buffered, so arrow keys
/// arrive as their escape sequences followed by Enter.
///
/// `p`/`space` toggles, `a`/`<`/left rewinds, `d`/`>`/right advances,
/// `r` resets, `40%` seeks, `q` quits.
pub fn parse_playback_input(line: &str) -> Option<PlaybackInput> {
    let key = |k| Some(PlaybackInput::Command(PlaybackCommand::Key(k)));
    if line == " " {
        return key(PlaybackKey::Space);
    }
    match line.trim() {
        "p" | "space" => key(PlaybackKey::Space),
        "a" | "<" | "\x1b[D" => key(PlaybackKey::ArrowLeft),
        "d" | ">" | "\x1b[C" => key(PlaybackKey::ArrowRight),
        "r" => Some(PlaybackInput::Command(PlaybackCommand::Reset)),
        "q" | "quit" => Some(PlaybackInput::Quit),
        other => {
            let pct: f64 = other.strip_suffix('%')?.trim().parse().ok()?;
            Some(PlaybackInput::Command(PlaybackCommand::Seek(pct / 100.0)))
        }
    }
}

/// Map `-v` occurrences onto a filter, falling back to the configured level.
pub fn log_filter(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "ai_hospital=debug".to_string(),
        _ => "ai_hospital=trace".to_string(),
    }
}
