use clap::{CommandFactory, Parser};
use colored::*;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

use ai_hospital::api::DialogueSummary;
use ai_hospital::catalog::{filter_cases, find_case, Pagination};
use ai_hospital::cli::{log_filter, parse_playback_input, Args, Command, PlaybackInput};
use ai_hospital::history::group_by_date;
use ai_hospital::language::translations;
use ai_hospital::playback::PlaybackSnapshot;
use ai_hospital::render;
use ai_hospital::{
    builtin_cases, AuthContext, AuthStore, CaseQuery, ChatSession, Config, DialogueLine,
    DialoguePlayback, HospitalClient, HospitalError, Language, LanguageContext, MedicalCase,
    PlaybackDriver, Role, SessionEvent, SessionSettings,
};

type StdinLines = Lines<BufReader<Stdin>>;

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

fn init_tracing(filter: &str) {
    let env_filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => match filter.parse::<tracing_subscriber::EnvFilter>() {
            Ok(f) => f,
            Err(e) => {
                eprintln!("WARN: log level '{}' is not a valid filter ({}); using 'warn'", filter, e);
                tracing_subscriber::EnvFilter::new("warn")
            }
        },
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn stdin_lines() -> StdinLines {
    BufReader::new(tokio::io::stdin()).lines()
}

async fn prompt_line(lines: &mut StdinLines, prompt: &str) -> Result<String, HospitalError> {
    print!("{}", prompt.bright_yellow());
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?.unwrap_or_default())
}

async fn password_or_prompt(given: Option<String>, lines: &mut StdinLines) -> Result<String, HospitalError> {
    match given {
        Some(p) => Ok(p),
        None => prompt_line(lines, "Password: ").await,
    }
}

fn show_error(error: &HospitalError, language: Language) {
    eprintln!("{}", render::render_error(error, language));
}

// ---------------------------------------------------------------------------
// chat
// ---------------------------------------------------------------------------

async fn run_chat(config: &Config, client: HospitalClient) -> Result<(), HospitalError> {
    let language = LanguageContext::new(config.language);
    let (session, mut events) = ChatSession::new(
        client,
        SessionSettings::from_config(config),
        config.language,
        config.doctor,
    );

    println!("{}", render::header(language.text(&translations::DIRECT_INTERACTION_TITLE)));
    println!(
        "{} {}",
        translations::DOCTOR.get(language.get()).bright_yellow(),
        config.doctor.label(language.get())
    );
    println!("{}", language.text(&translations::CONVERSATION_HINT).dimmed());

    let printer_language = language.clone();
    let printer = tokio::spawn(async move {
        let mut printer = render::StreamPrinter::new();
        while let Some(event) = events.recv().await {
            let lang = printer_language.get();
            match event {
                SessionEvent::MessageUpdated(m) if m.role != Role::Patient => {
                    print!("{}", printer.update(&m, lang));
                    let _ = std::io::stdout().flush();
                }
                SessionEvent::Toast(t) => eprintln!("{}", render::render_toast(&t)),
                SessionEvent::Waiting(true) => {
                    eprintln!("{}", translations::WAITING_FOR_RESPONSE.get(lang).dimmed())
                }
                _ => {}
            }
        }
    });

    let mut lines = stdin_lines();
    loop {
        print!("{} ", ">".bright_green().bold());
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let handle = match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/lang" => {
                let next = language.toggle();
                session.set_language(next);
                println!("{}", language.text(&translations::TOGGLE_LANGUAGE).dimmed());
                continue;
            }
            "/reset" => {
                // The session already published a toast for the failure.
                if let Err(e) = session.reset_dialogue().await {
                    warn!(error = %e, "reset failed");
                }
                continue;
            }
            "/summary" => session.generate_summary(),
            text => session.send_message(text),
        };
        match handle {
            Ok(handle) => {
                tokio::select! {
                    outcome = handle => {
                        if let Ok(state) = outcome {
                            info!(?state, "request complete");
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        session.abort();
                        println!();
                    }
                }
                tokio::task::yield_now().await;
            }
            Err(e) => show_error(&e, language.get()),
        }
    }

    drop(session);
    printer.abort();
    Ok(())
}

// ---------------------------------------------------------------------------
// cases / play
// ---------------------------------------------------------------------------

async fn run_cases(
    client: &HospitalClient,
    language: Language,
    query: &str,
    page: u32,
    offline: bool,
) -> Result<(), HospitalError> {
    if !offline {
        match client.list_cases(&CaseQuery::search(query).with_page(page)).await {
            Ok(resp) => {
                let cases: Vec<&MedicalCase> = resp.cases.iter().collect();
                print!("{}", render::render_case_list(&cases, language));
                let pages = Pagination::from_response(page, &resp);
                println!(
                    "{}",
                    format!("{}/{} ({})", pages.page(), pages.total_pages(), resp.total_cases).dimmed()
                );
                return Ok(());
            }
            Err(e) => {
                warn!(error = %e, "case service unavailable, using bundled catalog");
            }
        }
    }
    let cases = filter_cases(builtin_cases(), query);
    print!("{}", render::render_case_list(&cases, language));
    Ok(())
}

async fn resolve_case(client: &HospitalClient, id: &str, offline: bool) -> Option<MedicalCase> {
    if let Some(case) = find_case(builtin_cases(), id) {
        return Some(case.clone());
    }
    if offline {
        return None;
    }
    match client.list_cases(&CaseQuery::search(id)).await {
        Ok(resp) => resp.cases.into_iter().find(|c| c.id == id),
        Err(e) => {
            warn!(error = %e, case_id = id, "case lookup failed");
            None
        }
    }
}

fn print_lines(lines: &[DialogueLine], language: Language) {
    for line in lines {
        println!("{} {}", render::role_label(line.role, language), line.text);
    }
}

async fn run_play(case: MedicalCase, interval: Duration, language: Language) -> Result<(), HospitalError> {
    println!("{}", render::header(&case.title));
    println!("{}", case.category.dimmed());
    if case.dialogue.is_empty() {
        println!("{}", translations::NO_CASES_FOUND.get(language).yellow());
        return Ok(());
    }

    let transcript = case.dialogue.clone();
    let (handle, mut snapshots) = PlaybackDriver::spawn(DialoguePlayback::new(case.dialogue), interval);
    let mut lines = stdin_lines();
    let mut shown: Option<PlaybackSnapshot> = None;

    loop {
        tokio::select! {
            snap = snapshots.recv() => {
                let Some(snap) = snap else { break };
                match shown {
                    Some(prev) if snap.index > prev.index => {
                        print_lines(&transcript[prev.index + 1..=snap.index], language);
                    }
                    Some(prev) if snap.index == prev.index => {}
                    _ => {
                        println!("{}", "-".repeat(50).dimmed());
                        print_lines(&transcript[..=snap.index], language);
                    }
                }
                println!("{}", render::render_progress(&snap, language).dimmed());
                shown = Some(snap);
            }
            line = lines.next_line() => {
                match line? {
                    None => break,
                    Some(line) => match parse_playback_input(&line) {
                        Some(PlaybackInput::Quit) => break,
                        Some(PlaybackInput::Command(cmd)) => {
                            handle.send(cmd);
                        }
                        None => {}
                    },
                }
            }
        }
    }
    handle.stop().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// account
// ---------------------------------------------------------------------------

fn print_history(dialogues: &[DialogueSummary], language: Language) {
    let today = chrono::Local::now().date_naive();
    print!("{}", render::render_history(&group_by_date(dialogues), today, language));
}

async fn run(args: Args) -> Result<(), HospitalError> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(language) = args.language {
        config = config.with_language(language);
    }
    if let Some(doctor) = args.doctor {
        config = config.with_doctor(doctor);
    }
    init_tracing(&log_filter(args.verbose, &config.log_level));
    info!(version = env!("CARGO_PKG_VERSION"), agent = %config.agent_api_url, "ai-hospital starting");

    let language = config.language;
    let client = HospitalClient::from_config(&config);
    let mut auth = AuthContext::open(client.clone(), AuthStore::new(&config.state_dir))?;
    let mut lines = stdin_lines();

    match args.command {
        Command::Chat => run_chat(&config, client).await?,
        Command::Cases { query, page, offline } => {
            run_cases(&client, language, &query, page, offline).await?
        }
        Command::Play { case_id, interval, offline } => {
            let Some(case) = resolve_case(&client, &case_id, offline).await else {
                println!("{}", translations::NO_CASES_FOUND.get(language).yellow());
                return Ok(());
            };
            let interval = interval.map(Duration::from_secs).unwrap_or(config.playback_interval());
            run_play(case, interval, language).await?
        }
        Command::Login { username, password } => {
            let password = password_or_prompt(password, &mut lines).await?;
            let user = auth.login(&username, &password).await?;
            println!("{} {}", translations::LOGIN_SUCCESS.get(language).bright_green(), user.username);
        }
        Command::Register { username, password } => {
            let password = password_or_prompt(password, &mut lines).await?;
            let confirm = prompt_line(&mut lines, "Confirm password: ").await?;
            auth.register(&username, &password, &confirm).await?;
            println!("{}", translations::REGISTER_SUCCESS.get(language).bright_green());
        }
        Command::Logout => auth.logout()?,
        Command::Whoami => match auth.user() {
            Some(user) => {
                println!("{} (#{})", user.username.bright_white().bold(), user.id);
                if let Some(birth) = &user.birth_date {
                    println!("  {}", birth);
                }
                if let Some(age) = user.age {
                    println!("  {}", age);
                }
            }
            None => println!("{}", "not signed in".dimmed()),
        },
        Command::Profile { gender, birth_date } => {
            auth.edit_profile(gender, &birth_date).await?;
            println!("{}", translations::PROFILE_UPDATED.get(language).bright_green());
        }
        Command::Credentials { new_username, password } => {
            let password = password_or_prompt(password, &mut lines).await?;
            let confirm = prompt_line(&mut lines, "Confirm password: ").await?;
            auth.edit_credentials(&new_username, &password, &confirm).await?;
            println!("{}", translations::CREDENTIALS_UPDATED.get(language).bright_green());
        }
        Command::History => {
            let Some(user) = auth.user() else {
                return Err(HospitalError::Auth("not signed in".into()));
            };
            let resp = client.list_dialogues(user.id).await?;
            print_history(&resp.dialogues, language);
        }
        Command::Completions { .. } => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Command::Completions { shell } = args.command {
        clap_complete::generate(shell, &mut Args::command(), "ai-hospital", &mut std::io::stdout());
        return;
    }

    let language = args.language.unwrap_or_default();
    if let Err(e) = run(args).await {
        show_error(&e, language);
        std::process::exit(1);
    }
}
