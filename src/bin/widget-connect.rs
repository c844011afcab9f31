//! Terminal host for the widget connection core

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use widget_connect_core::api::HttpStatusEndpoint;
use widget_connect_core::config::Config;
use widget_connect_core::host::{Host, ThreadTimer, WindowFeatures};
use widget_connect_core::monitor::SettingsMonitor;
use widget_connect_core::settings::FileSettingsStore;
use widget_connect_core::{ConnectController, Outcome};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "widget-connect", version, subcommand_required = true)]
struct Args {
    /// Settings file (default: ~/.config/widget-connect/settings.json)
    #[arg(long, global = true)]
    settings: Option<String>,

    /// JSON file overriding endpoints and timing
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show connection status
    Status,
    /// Connect a widget account through the browser
    Connect {
        /// Print the authorization link instead of opening a browser
        #[arg(long)]
        manual: bool,
    },
    /// Print the embeddable script tag
    Snippet {
        /// Also copy it to the clipboard
        #[arg(long)]
        copy: bool,
    },
    /// Disconnect the widget account
    Reset {
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Open the widget dashboard
    Dashboard,
    /// Print the status again whenever the settings file changes
    Watch,
}

struct TerminalHost {
    assume_yes: bool,
}

impl Host for TerminalHost {
    fn notice(&self, text: &str) {
        println!("{}", text);
    }

    fn alert(&self, text: &str) {
        eprintln!("{}", text);
    }

    fn confirm(&self, text: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{} [y/N] ", text);
        let _ = io::stdout().flush();
        let mut response = String::new();
        if io::stdin().lock().read_line(&mut response).is_err() {
            return false;
        }
        response.trim().eq_ignore_ascii_case("y")
    }

    fn open_window(&self, url: &str, _features: &WindowFeatures) -> bool {
        println!("Authorization URL:");
        println!("  {}", url);
        if std::env::var("WIDGET_CONNECT_NO_BROWSER").is_ok() {
            return true;
        }
        match open::that(url) {
            Ok(()) => true,
            Err(e) => {
                info!("Failed to open browser: {}", e);
                false
            }
        }
    }

    fn open_url(&self, url: &str) -> bool {
        open::that(url).is_ok()
    }

    fn copy_to_clipboard(&self, text: &str) -> Result<(), String> {
        arboard::Clipboard::new()
            .and_then(|mut clipboard| clipboard.set_text(text.to_string()))
            .map_err(|e| e.to_string())
    }
}

/// Initialize logging using env_logger.
/// Reads RUST_LOG, e.g. `RUST_LOG=widget_connect_core=debug widget-connect connect`
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

fn main() {
    init_logging();
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = Config::load(args.config.as_deref()).context("Failed to load config")?;
    let store = FileSettingsStore::new(args.settings.as_deref());
    let settings_path = store.path().to_path_buf();
    let assume_yes = matches!(args.command, Command::Reset { yes: true });

    let mut controller = ConnectController::new(
        config.clone(),
        Box::new(store),
        Box::new(HttpStatusEndpoint::new(&config)),
        Box::new(TerminalHost { assume_yes }),
        Box::new(ThreadTimer),
    )
    .with_context(|| format!("Failed to read {}", settings_path.display()))?;

    match args.command {
        Command::Status => {
            println!("Status: {}", controller.status_line());
            if let Some(snippet) = controller.snippet() {
                println!();
                println!("Add this snippet to every page that should show the chat widget:");
                println!("  {}", snippet);
            }
        }
        Command::Connect { manual } => {
            if controller.is_connected() {
                println!("Already {}. Run `reset` first.", controller.status_line().to_lowercase());
                return Ok(());
            }
            let handle = controller.cancel_handle();
            ctrlc::set_handler(move || handle.cancel()).context("Failed to set Ctrl-C handler")?;

            println!("Waiting for authorization... (Ctrl-C to cancel)");
            let outcome = if manual {
                controller.connect_manually()?
            } else {
                controller.initiate()?
            };
            match outcome {
                Outcome::Connected => println!("Status: {}", controller.status_line()),
                Outcome::Cancelled => println!("Cancelled."),
                Outcome::PopupBlocked => bail!("could not open a browser, try `connect --manual`"),
                Outcome::TimedOut => bail!("authorization timed out"),
            }
        }
        Command::Snippet { copy } => {
            if copy {
                let snippet = controller.copy_snippet()?;
                println!("{}", snippet);
            } else {
                match controller.snippet() {
                    Some(snippet) => println!("{}", snippet),
                    None => bail!("not connected"),
                }
            }
        }
        Command::Reset { .. } => {
            if !controller.reset()? {
                println!("Reset cancelled.");
            }
        }
        Command::Dashboard => {
            if !controller.open_dashboard() {
                println!("{}", controller.config().dashboard_url);
            }
        }
        Command::Watch => watch(&mut controller, &settings_path)?,
    }

    Ok(())
}

fn watch(controller: &mut ConnectController, settings_path: &std::path::Path) -> Result<()> {
    let changed = Arc::new(Mutex::new(false));
    let _monitor = SettingsMonitor::new(settings_path, Arc::clone(&changed))?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))
        .context("Failed to set Ctrl-C handler")?;

    println!("Status: {}", controller.status_line());
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(500));
        let was_changed = changed
            .lock()
            .map(|mut flag| std::mem::replace(&mut *flag, false))
            .unwrap_or(false);
        if was_changed {
            controller.reload()?;
            println!("Status: {}", controller.status_line());
        }
    }
    Ok(())
}
