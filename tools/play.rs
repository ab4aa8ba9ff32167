/// Play: an interactive terminal shell for a content bundle.
///
/// Usage: play [--content <path>] [--saves <dir>] [--seed <n>]
///
/// The shell walks the title screen and menu, then forwards every line to
/// the engine. Timed conversation steps run while the shell waits. Set
/// RUST_LOG=debug to see engine traces on stderr.

use redemption_engine::core::engine::GameEngine;
use redemption_engine::core::persistence::FileSaveStore;
use redemption_engine::schema::log::LogTag;
use redemption_engine::schema::state::View;
use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const DEFAULT_CONTENT: &str = "content/redemption.ron";
const DEFAULT_SAVES: &str = "saves";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let mut content_path = DEFAULT_CONTENT.to_string();
    let mut saves_dir = DEFAULT_SAVES.to_string();
    let mut seed: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--content" if i + 1 < args.len() => {
                i += 1;
                content_path = args[i].clone();
            }
            "--saves" if i + 1 < args.len() => {
                i += 1;
                saves_dir = args[i].clone();
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().ok();
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let saves = match FileSaveStore::new(&saves_dir) {
        Ok(saves) => saves,
        Err(e) => {
            eprintln!("Cannot use save directory '{}': {}", saves_dir, e);
            std::process::exit(1);
        }
    };
    let seed = seed.unwrap_or_else(clock_seed);
    let mut engine = match GameEngine::builder()
        .seed(seed)
        .content_path(&content_path)
        .save_store(saves)
        .build()
    {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let started = Instant::now();
    let mut printer = LogPrinter::default();
    engine.boot();
    printer.print_new(&engine);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", prompt_for(&engine));
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();

        match engine.state().current_view {
            View::Loading => engine.boot(),
            View::Title => engine.advance_from_title(),
            View::Opening => engine.begin_gameplay(),
            View::Settings => engine.close_settings(),
            View::Menu if matches!(line, "quit" | "exit") => {
                println!("Goodbye.");
                break;
            }
            _ => {
                // Errors are already narrated in the log.
                if let Err(e) = engine.submit(line) {
                    tracing::debug!("command failed: {}", e);
                }
            }
        }
        printer.print_new(&engine);

        if let Some(path) = engine.take_load_request() {
            load_file(&mut engine, &path, &stdin);
            printer.print_new(&engine);
        }

        // Let timed conversation steps play out.
        while let Some(due) = engine.next_due() {
            let now = elapsed_ms(started);
            if due > now {
                std::thread::sleep(Duration::from_millis(due - now));
            }
            if let Err(e) = engine.poll(elapsed_ms(started)) {
                tracing::debug!("continuation failed: {}", e);
            }
            printer.print_new(&engine);
        }
    }
}

/// Prints the log lines that appeared since the last call.
#[derive(Default)]
struct LogPrinter {
    epoch: u64,
    shown: usize,
}

impl LogPrinter {
    fn print_new(&mut self, engine: &GameEngine) {
        if engine.log_epoch() != self.epoch {
            self.epoch = engine.log_epoch();
            self.shown = 0;
        }
        for line in engine.log().iter().skip(self.shown) {
            println!("{}", paint(&line.text, line.tag));
        }
        self.shown = engine.log().len();
    }
}

fn prompt_for(engine: &GameEngine) -> String {
    let state = engine.state();
    let named = !state.is_awaiting_name() && !state.player_name.is_empty();
    match state.current_view {
        View::Gameplay if named => format!("{} {}", engine.player_display_name(), engine.prompt()),
        View::Gameplay => engine.prompt().to_string(),
        View::Settings => "(Enter to return)".to_string(),
        View::Ending => "(game over)".to_string(),
        _ => ">".to_string(),
    }
}

fn load_file(engine: &mut GameEngine, path: &str, stdin: &io::Stdin) {
    let path = if path.is_empty() {
        print!("Path to save file: ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() {
            return;
        }
        line.trim().to_string()
    } else {
        path.to_string()
    };
    if path.is_empty() {
        return;
    }

    match std::fs::read_to_string(&path) {
        Ok(data) => {
            if let Err(e) = engine.import_save(&data) {
                tracing::debug!("import failed: {}", e);
            }
        }
        Err(e) => println!("Could not read '{}': {}", path, e),
    }
}

/// ANSI colour for each tag; the terminal stands in for the styled log.
fn paint(text: &str, tag: LogTag) -> String {
    let code = match tag {
        LogTag::System => "37",
        LogTag::Hero => "96",
        LogTag::Guide => "93",
        LogTag::Agent => "91",
        LogTag::Positive => "92",
        LogTag::Negative => "31",
        LogTag::FaithLow => "35",
        LogTag::FaithMid => "33",
        LogTag::FaithHigh => "32",
    };
    format!("\x1b[{}m{}\x1b[0m", code, text)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(42)
}

fn print_usage() {
    println!("Usage: play [--content <path>] [--saves <dir>] [--seed <n>]");
    println!();
    println!("  --content <path>  content bundle (default: {})", DEFAULT_CONTENT);
    println!("  --saves <dir>     autosave and export directory (default: {})", DEFAULT_SAVES);
    println!("  --seed <n>        fixed RNG seed for a reproducible run");
}
