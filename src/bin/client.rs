//! # Terminal Board Client
//!
//! Joins one retrospective board, prints the derived view on every change
//! and turns typed lines into board commands.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin retro-client -- --config config/client.toml
//! cargo run --bin retro-client -- --server http://localhost:3000 --board k2Jd9xQw1p --name Alex
//! cargo run --bin retro-client -- --server http://localhost:3000 --create "Sprint 42" --name Alex
//! ```
//!
//! The client will:
//! 1. Load configuration from the TOML file (if given) and apply flag overrides
//! 2. Create the board, or look it up to learn whether it is anonymous
//! 3. Ask for a display name when the board needs one
//! 4. Open the board channel and keep it alive
//! 5. Render the board and timer on every change until `quit`

use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};

use retro_sync::client::api::BoardApi;
use retro_sync::client::credentials::SessionCredentials;
use retro_sync::client::view::{BoardView, TicketContent};
use retro_sync::client::{BoardSession, SortMode, SystemClock, TimerState, VoteOutcome};
use retro_sync::common::config::{load_config, SyncSettings};
use retro_sync::common::connection::WsConnector;

const DEFAULT_COLUMNS: [&str; 3] = ["Went well", "To improve", "Action items"];

/// Command-line arguments for the board client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the client configuration file (TOML format)
    ///
    /// Example: config/client.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Board id to join (overrides the config file)
    #[arg(short, long)]
    board: Option<String>,

    /// Display name (overrides the config file)
    #[arg(short, long)]
    name: Option<String>,

    /// Server base URL, e.g. http://localhost:3000
    #[arg(short, long)]
    server: Option<String>,

    /// Facilitator token of the board
    #[arg(short, long)]
    token: Option<String>,

    /// Create a new board with this title and join it as facilitator
    #[arg(long, conflicts_with = "board")]
    create: Option<String>,

    /// Column names for --create (repeatable)
    #[arg(long = "column", requires = "create")]
    columns: Vec<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// Initialize the logging system with timestamp, level, and message formatting.
///
/// Format: `[HH:MM:SS] [LEVEL] message`
fn init_logger(verbose: bool) {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(if verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .init();
}

/// Settings after merging the config file and flags.
struct Resolved {
    server_url: String,
    board_id: Option<String>,
    name: Option<String>,
    token: Option<String>,
    sync: SyncSettings,
}

fn resolve(args: &Args) -> anyhow::Result<Resolved> {
    let mut resolved = Resolved {
        server_url: String::new(),
        board_id: None,
        name: None,
        token: None,
        sync: SyncSettings::default(),
    };

    if let Some(path) = &args.config {
        let config: retro_sync::common::config::ClientConfig =
            load_config(path).with_context(|| format!("loading {}", path))?;
        resolved.server_url = config.client.server_url;
        resolved.name = Some(config.client.name).filter(|n| !n.trim().is_empty());
        resolved.board_id = Some(config.board.id).filter(|id| !id.is_empty());
        resolved.token = config.board.facilitator_token;
        resolved.sync = config.sync;
    }

    if let Some(server) = &args.server {
        resolved.server_url = server.clone();
    }
    if let Some(board) = &args.board {
        resolved.board_id = Some(board.clone());
    }
    if let Some(name) = &args.name {
        resolved.name = Some(name.clone());
    }
    if let Some(token) = &args.token {
        resolved.token = Some(token.clone());
    }

    if resolved.server_url.is_empty() {
        bail!("no server URL: pass --server or set client.server_url in the config");
    }
    Ok(resolved)
}

// ============================================================================
// LINE COMMANDS
// ============================================================================

/// One line typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Add { column: String, content: String },
    Edit { ticket: String, content: String },
    Remove { ticket: String },
    Vote { ticket: String },
    Blur,
    HideVotes,
    Limit(Option<u32>),
    ToggleLimit,
    Timer(u32),
    StopTimer,
    Merge { source: String, target: String },
    Undo,
    Split { ticket: String, segment: usize },
    Sort(SortMode),
    Dismiss,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  add <column#|id> <text>     add a ticket
  edit <ticket> <text>        edit your ticket
  rm <ticket>                 remove a ticket
  vote <ticket>               toggle your vote
  merge <source> <target>     merge source into target
  undo                        undo the last merge (10s)
  split <ticket> <segment#>   split a segment out of a merged ticket
  sort newest|votes           change ticket order
  blur | hide                 facilitator: toggle blur / hidden votes
  limit <1-10>|off|toggle     facilitator: per-column vote limit
  timer <seconds> | stop      facilitator: start / stop the timer
  ok                          dismiss the last error
  quit";

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let two = |rest: &str| -> Result<(String, String), String> {
            rest.split_once(char::is_whitespace)
                .map(|(a, b)| (a.to_string(), b.trim().to_string()))
                .filter(|(_, b)| !b.is_empty())
                .ok_or_else(|| format!("usage: {} <id> <value>", verb))
        };
        let one = |rest: &str| -> Result<String, String> {
            if rest.is_empty() {
                Err(format!("usage: {} <id>", verb))
            } else {
                Ok(rest.to_string())
            }
        };

        match verb {
            "add" => two(rest).map(|(column, content)| Command::Add { column, content }),
            "edit" => two(rest).map(|(ticket, content)| Command::Edit { ticket, content }),
            "rm" | "remove" => one(rest).map(|ticket| Command::Remove { ticket }),
            "vote" => one(rest).map(|ticket| Command::Vote { ticket }),
            "blur" => Ok(Command::Blur),
            "hide" => Ok(Command::HideVotes),
            "limit" => match rest {
                "off" | "none" => Ok(Command::Limit(None)),
                "toggle" => Ok(Command::ToggleLimit),
                n => n
                    .parse()
                    .map(|n| Command::Limit(Some(n)))
                    .map_err(|_| "usage: limit <1-10>|off|toggle".to_string()),
            },
            "timer" => rest
                .parse()
                .map(Command::Timer)
                .map_err(|_| "usage: timer <seconds>".to_string()),
            "stop" => Ok(Command::StopTimer),
            "merge" => two(rest).map(|(source, target)| Command::Merge { source, target }),
            "undo" => Ok(Command::Undo),
            "split" => {
                let (ticket, segment) = two(rest)?;
                let segment: usize = segment
                    .parse()
                    .map_err(|_| "usage: split <ticket> <segment#>".to_string())?;
                if segment == 0 {
                    return Err("segments are numbered from 1".to_string());
                }
                Ok(Command::Split {
                    ticket,
                    segment: segment - 1,
                })
            }
            "sort" => rest.parse().map(Command::Sort),
            "ok" => Ok(Command::Dismiss),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(format!("unknown command '{}' (try 'help')", other)),
        }
    }
}

/// Accept a 1-based column number or a column id.
fn column_id(session: &BoardSession, column: &str) -> Option<String> {
    let board = session.store().board()?;
    if let Ok(n) = column.parse::<usize>() {
        return board.columns.get(n.checked_sub(1)?).map(|c| c.id.clone());
    }
    board
        .columns
        .iter()
        .find(|c| c.id == column)
        .map(|c| c.id.clone())
}

/// Execute one command.
///
/// # Returns
/// `false` when the user asked to quit.
fn execute(session: &mut BoardSession, command: Command) -> bool {
    let dropped = || println!("(not connected, command dropped)");
    let report = |result: retro_sync::common::error::Result<bool>| match result {
        Ok(true) => {}
        Ok(false) => dropped(),
        Err(e) => println!("{}", e),
    };

    match command {
        Command::Add { column, content } => match column_id(session, &column) {
            Some(id) => report(session.add_ticket(&id, &content)),
            None => println!("unknown column '{}'", column),
        },
        Command::Edit { ticket, content } => report(session.edit_ticket(&ticket, &content)),
        Command::Remove { ticket } => report(Ok(session.remove_ticket(&ticket))),
        Command::Vote { ticket } => match session.toggle_vote(&ticket) {
            VoteOutcome::Sent => {}
            VoteOutcome::Dropped => dropped(),
            VoteOutcome::Blocked => println!("vote limit reached in this column"),
        },
        Command::Blur => report(Ok(session.toggle_blur())),
        Command::HideVotes => report(Ok(session.toggle_hide_votes())),
        Command::Limit(limit) => report(session.set_vote_limit(limit)),
        Command::ToggleLimit => report(session.toggle_vote_limit()),
        Command::Timer(secs) => report(session.start_timer(secs)),
        Command::StopTimer => report(Ok(session.stop_timer())),
        Command::Merge { source, target } => {
            report(session.merge_tickets(&source, &target));
            if session.undo_available() {
                println!("merged. type 'undo' within 10s to revert");
            }
        }
        Command::Undo => {
            if !session.undo_merge() {
                println!("nothing to undo");
            }
        }
        Command::Split { ticket, segment } => report(session.split_ticket(&ticket, segment)),
        Command::Sort(mode) => session.store().set_sort_mode(mode),
        Command::Dismiss => session.store().clear_error(),
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
    }
    true
}

// ============================================================================
// RENDERING
// ============================================================================

fn render(view: Option<&BoardView>, timer: TimerState, error: Option<&str>, connected: bool) {
    let Some(view) = view else {
        println!("Connecting...");
        return;
    };

    println!();
    println!(
        "== {} ==  [{} online]{}{}{}",
        view.title,
        view.participant_count,
        if connected { "" } else { "  (reconnecting)" },
        if view.is_facilitator { "  (facilitator)" } else { "" },
        if view.is_blurred { "  (blurred)" } else { "" },
    );
    match timer {
        TimerState::Inactive => {}
        TimerState::Running { urgent: true, .. } => println!("⏱  {} !", timer),
        _ => println!("⏱  {}", timer),
    }

    for (i, column) in view.columns.iter().enumerate() {
        match column.vote_badge {
            Some((mine, limit)) => println!("\n[{}] {}  ({}/{} votes)", i + 1, column.name, mine, limit),
            None => println!("\n[{}] {}", i + 1, column.name),
        }
        for ticket in &column.tickets {
            let votes = ticket
                .vote_count
                .map(|n| format!("+{}", n))
                .unwrap_or_else(|| "+?".to_string());
            let mark = if ticket.has_voted { "*" } else { " " };
            match &ticket.content {
                TicketContent::Masked => println!("  {} {:>4} {}  ░░░░░░", mark, votes, ticket.id),
                TicketContent::Visible { text, segments } => {
                    let author = ticket
                        .author
                        .as_deref()
                        .map(|a| format!("  ({})", a))
                        .unwrap_or_default();
                    if segments.len() > 1 {
                        println!("  {} {:>4} {}{}", mark, votes, ticket.id, author);
                        for (n, segment) in segments.iter().enumerate() {
                            println!("           {}. {}", n + 1, segment);
                        }
                    } else {
                        println!("  {} {:>4} {}  {}{}", mark, votes, ticket.id, text, author);
                    }
                }
            }
        }
    }
    if let Some(error) = error {
        println!("\n! {}  (type 'ok' to dismiss)", error);
    }
}

fn prompt_name() -> anyhow::Result<String> {
    print!("Your name: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let name = line.trim().to_string();
    if name.is_empty() {
        return Err(anyhow!("a name is required to join this board"));
    }
    Ok(name)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let settings = resolve(&args)?;
    let api = BoardApi::new(settings.server_url.clone());
    let mut credentials = SessionCredentials::new();

    // Create or look up the board
    let (board_id, is_anonymous) = if let Some(title) = &args.create {
        let columns: Vec<String> = if args.columns.is_empty() {
            DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect()
        } else {
            args.columns.clone()
        };
        let created = api.create_board(title, &columns).await?;
        credentials.remember_token(&created.board.id, &created.facilitator_token);
        println!("Board created. Share this id: {}", created.board.id);
        (created.board.id, created.board.is_anonymous)
    } else {
        let board_id = settings
            .board_id
            .clone()
            .ok_or_else(|| anyhow!("no board: pass --board, --create or set board.id"))?;
        let is_anonymous = match api.get_board(&board_id).await {
            Ok(board) => board.is_anonymous,
            Err(e) => {
                warn!("⚠️  Could not look up board '{}': {}", board_id, e);
                false
            }
        };
        (board_id, is_anonymous)
    };

    if let Some(token) = &settings.token {
        credentials.remember_token(&board_id, token);
    }
    if let Some(name) = &settings.name {
        credentials.remember_name(&board_id, name);
    }
    if credentials.needs_name(&board_id, is_anonymous) {
        credentials.remember_name(&board_id, &prompt_name()?);
    }
    let params = credentials
        .join_params(&board_id, is_anonymous)
        .ok_or_else(|| anyhow!("a name is required to join this board"))?;

    let connector = Arc::new(WsConnector::new(settings.server_url.clone()));
    let mut session = BoardSession::new(connector, settings.sync.clone(), Arc::new(SystemClock));
    session.join(params).await;
    info!("Type 'help' for commands");

    let mut store_rx = session.store().subscribe();
    let mut timer_rx = session
        .countdown()
        .map(|c| c.subscribe())
        .ok_or_else(|| anyhow!("countdown not running"))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = store_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = store_rx.borrow_and_update().clone();
                render(state.view().as_ref(), session.timer(), state.last_error.as_deref(), state.connected);
            }
            changed = timer_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let timer = *timer_rx.borrow_and_update();
                if timer != TimerState::Inactive {
                    println!("⏱  {}", timer);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Ok(command) => {
                        if !execute(&mut session, command) {
                            break;
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.leave().await;
    info!("👋 Left board '{}'", board_id);
    Ok(())
}
