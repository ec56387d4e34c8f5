// src/cli/repl.rs

// --- Imports ---
use crate::cli::helper::ReplHelper;
use crate::error::Result;
use crate::session::{Notice, Reply, Session};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

// --- Constants ---
const HISTORY_FILE: &str = "history.txt";
const FAREWELL: &str = "Goodbye!";
const HIST_PREVIEW_CHARS: usize = 80;
const UNKNOWN_COMMAND_MSG: &str = "Unknown command. Type '/help' for available commands.";

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Help,
    Keys,
    /// `/key N`, already converted to a 0-based index.
    SelectKey(usize),
    BadKeyArgument(String),
    Clear,
    Reset,
    Hist,
    Model(Option<String>),
    Exit,
    Unknown(String),
    Prompt(String),
}

pub fn parse_input(input: &str) -> Input {
    let input = input.trim();
    let Some(command_line) = input.strip_prefix('/') else {
        return Input::Prompt(input.to_string());
    };
    let mut parts = command_line.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("");
    let args = parts.next().map(str::trim).unwrap_or("");

    match command {
        "help" => Input::Help,
        "keys" => Input::Keys,
        "key" => match args.parse::<usize>() {
            Ok(n) if n >= 1 => Input::SelectKey(n - 1),
            _ => Input::BadKeyArgument(args.to_string()),
        },
        "clear" => Input::Clear,
        "reset" => Input::Reset,
        "hist" => Input::Hist,
        "model" if args.is_empty() => Input::Model(None),
        "model" => Input::Model(Some(args.to_string())),
        "salir" | "exit" | "quit" => Input::Exit,
        other => Input::Unknown(other.to_string()),
    }
}

// --- History File Helper ---
fn get_history_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("keychat");
    std::fs::create_dir_all(&path).ok();
    path.push(HISTORY_FILE);
    path
}

// --- Main REPL Function ---
pub async fn run_interactive(session: &mut Session) -> Result<()> {
    info!("Starting interactive chat session.");

    // --- Setup Rustyline Editor ---
    let mut rl = Editor::<ReplHelper, DefaultHistory>::new()?;
    rl.set_helper(Some(ReplHelper::new()));
    let history_path = get_history_path();
    if let Err(e) = rl.load_history(&history_path) {
        warn!("Failed to load command history from {:?}: {}", history_path, e);
    }

    clear_screen()?;
    print_banner(session);

    // --- Main Loop ---
    loop {
        let prompt_string = format_prompt(session);

        match rl.readline(&prompt_string) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if let Err(e) = rl.add_history_entry(input) {
                    warn!("Failed to add line to history: {}", e);
                }

                match parse_input(input) {
                    Input::Exit => break,
                    Input::Prompt(message) => {
                        if !handle_prompt(session, &message).await {
                            break;
                        }
                    }
                    command => handle_command(session, command)?,
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => {
                error!("Readline error: {:?}", err);
                eprintln!("Input Error: {}", err);
                break;
            }
        }
    }

    // --- Save history ---
    if let Err(e) = rl.save_history(&history_path) {
        error!("Failed to save command history to {:?}: {}", history_path, e);
    }

    println!("\n{}", FAREWELL);
    info!("Exiting interactive chat session.");
    Ok(())
}

// --- Helper Functions ---

fn print_banner(session: &Session) {
    println!("{}", "=".repeat(60));
    println!("{:^60}", "KEYCHAT");
    println!("{}", "=".repeat(60));
    println!(" Keys: {} | Model: {}", session.pool().len(), session.model());
    println!("{}", "=".repeat(60));
    println!("Type '/help' for commands, or your prompt.");
    println!();
}

fn format_prompt(session: &Session) -> String {
    let pool = session.pool();
    format!("[G{}/{}] >>> ", pool.index() + 1, pool.len())
}

fn clear_screen() -> Result<()> {
    print!("\x1B[2J\x1B[1;1H");
    io::stdout().flush()?;
    Ok(())
}

fn print_notice(notice: &Notice) {
    match notice {
        Notice::AttemptFailed { key, outcome } => println!("\n{} (key {})", outcome, key),
        Notice::Rotated { position, total } => {
            println!("[KEY] Switching to key {}/{}", position, total)
        }
        Notice::ModelDowngraded { from, to } => {
            println!("[MODEL] '{}' not found, switching to '{}'", from, to)
        }
    }
}

// --- Prompt Handler ---
// Returns false when the user interrupted the request and the session should end.
async fn handle_prompt(session: &mut Session, message: &str) -> bool {
    println!("[...] Querying {}...", session.model());

    let reply = tokio::select! {
        reply = session.ask_with(message, |notice| print_notice(&notice)) => reply,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted during request");
            return false;
        }
    };

    match reply {
        Reply::Answer { text, key } => println!("\n[G{}]: {}\n", key, text.trim()),
        Reply::Empty => println!("\n[WARNING] Empty response\n"),
        Reply::Exhausted { attempts } => {
            debug!(attempts, "Retry budget exhausted");
            println!("\n[ERROR] Could not get a response ({} attempts)\n", attempts);
        }
    }
    true
}

// --- Application Command Handler ---
fn handle_command(session: &mut Session, command: Input) -> Result<()> {
    debug!(?command, "Handling app command");

    match command {
        Input::Help => print_help(),
        Input::Keys => {
            let active = session.pool().index();
            for (i, masked) in session.pool().masked().iter().enumerate() {
                let marker = if i == active { "*" } else { " " };
                println!(" {} {}. {}", marker, i + 1, masked);
            }
        }
        Input::SelectKey(index) => {
            let total = session.pool().len();
            if session.pool_mut().select(index) {
                println!("[KEY] Using key {}/{}", index + 1, total);
            } else {
                println!("[ERROR] No key {}. Valid range: 1-{}", index + 1, total);
            }
        }
        Input::BadKeyArgument(arg) => {
            println!("Usage: /key N (got '{}')", arg);
        }
        Input::Clear => {
            clear_screen()?;
            print_banner(session);
        }
        Input::Reset => {
            session.reset_conversation();
            println!("[INFO] Conversation cleared");
        }
        Input::Hist => print_conversation(session),
        Input::Model(None) => println!("Model: {}", session.model()),
        Input::Model(Some(name)) => {
            session.set_model(name);
            println!("Model set to: {}", session.model());
        }
        Input::Unknown(name) => println!("'/{}': {}", name, UNKNOWN_COMMAND_MSG),
        Input::Exit | Input::Prompt(_) => {} // Handled in main loop
    }
    Ok(())
}

fn print_conversation(session: &Session) {
    let conversation = session.conversation();
    if conversation.is_empty() {
        println!("[INFO] No conversation yet");
        return;
    }
    println!(
        "[INFO] {} turns stored, last {} sent with each prompt",
        conversation.len(),
        session.max_history()
    );
    for turn in conversation.recent(conversation.len()) {
        let mut preview: String = turn.text.chars().take(HIST_PREVIEW_CHARS).collect();
        if turn.text.chars().count() > HIST_PREVIEW_CHARS {
            preview.push_str("...");
        }
        println!(" {:>5}: {}", turn.role.as_provider_role(), preview.replace('\n', " "));
    }
}

// --- Help Command ---
fn print_help() {
    println!("Available Commands:");
    println!("  /help                    - Show this help message.");
    println!("  /keys                    - List loaded API keys (masked).");
    println!("  /key N                   - Switch to key N.");
    println!("  /clear                   - Clear the screen.");
    println!("  /reset                   - Forget the conversation so far.");
    println!("  /hist                    - Show the stored conversation.");
    println!("  /model [name]            - Show or set the model.");
    println!("  /salir | /exit | /quit   - Exit the application.");
    println!("Controls:");
    println!("  Up/Down Arrows           - Navigate input history.");
    println!("  Tab                      - Complete commands.");
    println!("  Ctrl+C / Ctrl+D          - Exit.");
}
