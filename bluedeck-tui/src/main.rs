/*!
 * BlueDeck Device Manager
 * Bluetooth discovery and adapter control from the terminal
 * Onyx Digital Intelligence Development LLC
 */

use anyhow::{bail, Result};
use bluedeck_core::bluez::BluezRadio;
use bluedeck_core::policy::PolicyPermissions;
use bluedeck_core::{Config, Power, ViewModel};
use clap::{Parser, Subcommand, ValueEnum};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::info;

mod app;
mod logging;
mod ui;

use app::{App, Flow};
use ui::render_ui;

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

#[derive(Parser)]
#[command(name = "bluedeck")]
#[command(about = "BlueDeck Bluetooth Device Manager")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log file used while the interactive screen is open
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the device manager screen
    Ui,
    /// Scan once and print the device list
    Scan {
        /// Print JSON instead of plain lines
        #[arg(long)]
        json: bool,
    },
    /// Turn Bluetooth on or off
    Power {
        #[arg(value_enum)]
        state: PowerArg,
    },
    /// Show adapter availability and power
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum PowerArg {
    On,
    Off,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let command = cli.command.unwrap_or(Commands::Ui);

    let _logging = match command {
        Commands::Ui => {
            let log_path = cli
                .log_file
                .clone()
                .unwrap_or_else(|| config_path.with_file_name("bluedeck.log"));
            logging::init_file(&log_path, cli.debug)?
        }
        _ => logging::init_stderr(cli.debug),
    };

    let config = Config::load(&config_path)?;
    info!("BlueDeck starting with {}", config_path.display());

    let view = build_view(&config, &config_path).await?;

    match command {
        Commands::Ui => run_ui(view, &config).await,
        Commands::Scan { json } => run_scan(view, json).await,
        Commands::Power { state } => run_power(view, state).await,
        Commands::Status => run_status(&view, &config),
    }
}

async fn build_view(config: &Config, config_path: &Path) -> Result<ViewModel> {
    let radio = BluezRadio::connect(&config.bluetooth).await?;
    let permissions = PolicyPermissions::new(config.permissions.clone(), config_path);
    Ok(ViewModel::new(Arc::new(radio), Arc::new(permissions), config).await)
}

async fn run_ui(view: ViewModel, config: &Config) -> Result<()> {
    // Initialize terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(view, &config.bluetooth.adapter);
    let result = event_loop(&mut terminal, &mut app, config.ui.tick_ms).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // Leave the radio quiet on exit
    app.view.stop_scan().await;
    result
}

async fn event_loop(terminal: &mut Tui, app: &mut App, tick_ms: u64) -> Result<()> {
    let mut ticker = interval(Duration::from_millis(tick_ms.max(10)));

    loop {
        if event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Flow::Quit = app.handle_key(key.code).await {
                        return Ok(());
                    }
                }
            }
        }

        ticker.tick().await;
        app.tick().await;

        terminal.draw(|f| render_ui(f, app))?;
    }
}

async fn run_scan(mut view: ViewModel, json: bool) -> Result<()> {
    view.scan_for_devices().await;
    fail_on_notice(&view)?;

    let cancel = view.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    view.finish_scan().await;
    fail_on_notice(&view)?;
    info!("{}", view.status());

    if json {
        println!("{}", serde_json::to_string_pretty(view.devices())?);
    } else {
        for device in view.devices() {
            println!("{}  {:<10}  {}", device.address, device.bond_state.to_string(), device.display_name());
        }
    }
    Ok(())
}

async fn run_power(mut view: ViewModel, state: PowerArg) -> Result<()> {
    let target = match state {
        PowerArg::On => Power::On,
        PowerArg::Off => Power::Off,
    };

    if view.adapter_state().power != target {
        view.toggle_bluetooth().await;
        fail_on_notice(&view)?;
    }
    println!("Bluetooth {}", view.adapter_state().power);
    Ok(())
}

fn run_status(view: &ViewModel, config: &Config) -> Result<()> {
    if !view.is_available() {
        println!("{}: unavailable", config.bluetooth.adapter);
        return Ok(());
    }
    let state = view.adapter_state();
    println!("{}: power {}, scanning {}", config.bluetooth.adapter, state.power, state.scanning);
    Ok(())
}

fn fail_on_notice(view: &ViewModel) -> Result<()> {
    match view.notice() {
        Some(notice) => bail!("{}: {}", notice.title(), notice.message),
        None => Ok(()),
    }
}
