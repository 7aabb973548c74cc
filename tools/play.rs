/// Play: interactive shell over the story engine.
///
/// Usage: play [--story <path>] [--config <path>] [--session <id>]
///
/// Commands:
///   look              show the current node
///   choose <n>        take choice n (or just type the number)
///   reset             start over with a fresh profile
///   share             show the share card (endings only)
///   history           list the choices taken so far
///   json              print the current view as JSON
///   session           show session id, profile and tallies
///   help              list commands
///   quit              exit

use chrono::Utc;
use clap::Parser;
use forest_flow::schema::session::SessionId;
use forest_flow::schema::view::NodeView;
use forest_flow::{PipelineError, StoryEngine};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "play", about = "Walk a story graph interactively")]
struct Args {
    /// Story file in RON; defaults to the built-in Mystic Forest.
    #[arg(long)]
    story: Option<String>,
    /// Engine config in RON.
    #[arg(long)]
    config: Option<String>,
    /// Resume or create this session id instead of generating one.
    #[arg(long)]
    session: Option<String>,
}

fn token() -> u64 {
    Utc::now().timestamp().unsigned_abs()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let mut builder = StoryEngine::builder();
    if let Some(ref path) = args.story {
        builder = builder.story_path(path);
    }
    if let Some(ref path) = args.config {
        builder = builder.config_path(path);
    }
    let engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let requested = args.session.map(SessionId::new);
    let mut view = match engine.open(requested.as_ref(), token()) {
        Ok(view) => view,
        Err(e) => {
            eprintln!("Failed to open session: {}", e);
            std::process::exit(1);
        }
    };
    let id = view.session_id.clone();

    println!("Loaded {} nodes, starting at '{}'", engine.graph().len(), engine.graph().start());
    println!("Session: {}", id);
    println!("Type 'help' for commands.\n");
    print_view(&view);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("play> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        // A bare number is shorthand for `choose <n>`.
        let choice_arg = if cmd == "choose" || cmd == "c" {
            parts.get(1).copied()
        } else if cmd.parse::<usize>().is_ok() {
            Some(parts[0])
        } else {
            None
        };

        if let Some(arg) = choice_arg {
            let Ok(index) = arg.parse::<usize>() else {
                println!("Usage: choose <n>");
                continue;
            };
            match engine.choose(&id, index, token()) {
                Ok(next) => {
                    view = next;
                    print_view(&view);
                }
                Err(e) => report(&e),
            }
            continue;
        }

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "choose" | "c" => println!("Usage: choose <n>"),
            "look" | "l" => match engine.view(&id, token()) {
                Ok(current) => {
                    view = current;
                    print_view(&view);
                }
                Err(e) => report(&e),
            },
            "reset" => match engine.reset(Some(&id), token()) {
                Ok(fresh) => {
                    view = fresh;
                    println!("Session reset.\n");
                    print_view(&view);
                }
                Err(e) => report(&e),
            },
            "share" => match engine.share_card(&id, token()) {
                Ok(card) => {
                    println!("Ending: {} (score {})", card.ending_category, card.score);
                    println!("Prompt: {}", card.prompt);
                    println!("Image:  {}\n", card.image_url);
                }
                Err(e) => report(&e),
            },
            "history" => match engine.session(&id) {
                Ok(state) => {
                    if state.history().is_empty() {
                        println!("No choices yet.\n");
                        continue;
                    }
                    for (i, record) in state.history().iter().enumerate() {
                        println!(
                            "  {}. [{}] #{} {}{}",
                            i + 1,
                            record.from_node,
                            record.choice_index,
                            record.text,
                            record
                                .tag
                                .as_deref()
                                .map(|t| format!(" ({})", t))
                                .unwrap_or_default()
                        );
                    }
                    println!("  Path: {}\n", state.path().join(" → "));
                }
                Err(e) => report(&e),
            },
            "json" => match serde_json::to_string_pretty(&view) {
                Ok(json) => println!("{}\n", json),
                Err(e) => println!("Failed to serialize view: {}\n", e),
            },
            "session" => match engine.session(&id) {
                Ok(state) => {
                    let traits: Vec<&str> = state.profile().traits.iter().map(|t| t.name()).collect();
                    println!("Id:      {}", state.id());
                    println!("Started: {}", state.created_at().to_rfc3339());
                    println!("Traits:  {}", traits.join(", "));
                    println!("Styles:  {}", state.profile().styles.join(", "));
                    println!("Score:   {}", state.score());
                    let mut tally: Vec<_> = state.sentiment().iter().collect();
                    tally.sort();
                    for (tag, count) in tally {
                        println!("  {:<12} {}", tag, count);
                    }
                    println!();
                }
                Err(e) => report(&e),
            },
            _ => println!("Unknown command: {}. Type 'help' for commands.", cmd),
        }
    }
}

fn print_view(view: &NodeView) {
    println!("[{}] score {}", view.node_id, view.score);
    println!("{}\n", view.situation);
    println!("  Image: {}", view.image_url);
    println!("  Seed:  {}\n", view.image_seed);

    if view.is_end {
        if let Some(ref category) = view.ending_category {
            println!("*** {} ***", category);
        }
        if let Some(ref art) = view.ending_art {
            println!("  Retrospective: {}", art.retrospective_url);
            println!("  Cover:         {}", art.cover_url);
        }
        println!("\nThe story is over. Type 'share' for a share card or 'reset' to play again.\n");
        return;
    }

    for choice in &view.choices {
        println!("  {}) {}", choice.index, choice.text);
    }
    println!();
}

fn report(e: &PipelineError) {
    println!("Error: {}\n", e);
}

fn print_help() {
    println!("Commands:");
    println!("  look              show the current node");
    println!("  choose <n>        take choice n (or just type the number)");
    println!("  reset             start over with a fresh profile");
    println!("  share             show the share card (endings only)");
    println!("  history           list the choices taken so far");
    println!("  json              print the current view as JSON");
    println!("  session           show session id, profile and tallies");
    println!("  help              list commands");
    println!("  quit              exit");
    println!();
}
