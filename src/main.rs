mod api;
mod cache;
mod config;
mod daykey;
mod error;
mod models;
mod service;
mod storage;
mod ui;
mod views;

use std::io::Write;
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};

use api::pagination::{fetch_all_usage_events, USAGE_EVENTS_PAGE_SIZE};
use api::{DashboardApi, HttpDashboardClient};
use cache::EventCache;
use config::{
    clear_session_cookie, db_path, ensure_initialized, get_session_cookie, load_config,
    set_session_cookie, AppConfig,
};
use error::AppError;
use service::{query_range, ActivityHub};
use storage::Storage;
use ui::run::run_tui;

#[derive(Debug, Parser)]
#[command(name = "cursor-pulse")]
#[command(about = "Cursor dashboard activity charts in the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    Session {
        #[arg(long)]
        cookie: Option<String>,
        #[arg(long)]
        clear: bool,
    },
    Tui,
    Refresh,
    Export {
        #[arg(long, default_value = "tokens")]
        view: String,
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportView {
    Tokens,
    Cost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Json,
    Csv,
}

fn parse_view(input: &str) -> Result<ExportView, AppError> {
    match input.to_ascii_lowercase().as_str() {
        "tokens" => Ok(ExportView::Tokens),
        "cost" => Ok(ExportView::Cost),
        _ => Err(AppError::Config(
            "Unsupported view. Use tokens or cost.".into(),
        )),
    }
}

fn parse_format(input: &str) -> Result<ExportFormat, AppError> {
    match input.to_ascii_lowercase().as_str() {
        "json" => Ok(ExportFormat::Json),
        "csv" => Ok(ExportFormat::Csv),
        _ => Err(AppError::Config(
            "Unsupported export format. Use json or csv.".into(),
        )),
    }
}

fn build_client(cfg: &AppConfig) -> Result<HttpDashboardClient, AppError> {
    HttpDashboardClient::new(&cfg.base_url, get_session_cookie())
}

fn open_cache() -> Result<EventCache, AppError> {
    Ok(EventCache::new(Storage::open(&db_path()?)?))
}

async fn refresh(cfg: &AppConfig) -> Result<(), AppError> {
    let client = build_client(cfg)?;
    let cache = open_cache()?;
    let range = query_range(Local::now());

    match client.user_analytics(range).await {
        Ok(data) => println!(
            "Fetched {} analytics days (team of {}).",
            data.daily_metrics.len(),
            data.total_members_in_team
        ),
        Err(e) => eprintln!("Analytics fetch failed: {e}"),
    }

    let result = fetch_all_usage_events(&client, range, USAGE_EVENTS_PAGE_SIZE, |_, progress| {
        print!(
            "\rFetching usage events... {}/{}",
            progress.fetched, progress.total
        );
        let _ = std::io::stdout().flush();
    })
    .await;
    println!();

    let events = result?;
    cache.save(Local::now().timestamp_millis(), &events);
    println!("Fetched {} usage events; cache updated.", events.len());
    Ok(())
}

fn export(cfg: &AppConfig, view: ExportView, format: ExportFormat) -> Result<(), AppError> {
    let cache = open_cache()?;
    let events = cache.load(Local::now().timestamp_millis()).ok_or_else(|| {
        AppError::Config("No cached usage events. Run `cursor-pulse refresh` first.".into())
    })?;
    let windowed = views::trailing_window(&events, cfg.bar_window_days, Local::now());

    match (view, format) {
        (ExportView::Tokens, ExportFormat::Json) => {
            let rows = views::token_bar_series(&windowed);
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        (ExportView::Tokens, ExportFormat::Csv) => {
            println!("day,subscription,usage");
            for row in views::token_bar_series(&windowed) {
                println!("{},{},{}", row.day, row.subscription, row.usage);
            }
        }
        (ExportView::Cost, ExportFormat::Json) => {
            let rows = views::cost_bar_series(&windowed);
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        (ExportView::Cost, ExportFormat::Csv) => {
            println!("day,subscription,usage");
            for row in views::cost_bar_series(&windowed) {
                println!("{},{:.2},{:.2}", row.day, row.subscription, row.usage);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!("Initialized cursor-pulse config and data directories.");
        }
        Commands::Session { cookie, clear } => {
            ensure_initialized()?;
            if clear {
                clear_session_cookie()?;
                println!("Session cookie cleared.");
            } else if let Some(cookie) = cookie {
                set_session_cookie(cookie.trim())?;
                println!("Session cookie stored.");
            } else {
                return Err(AppError::Config("Provide --cookie <value> or --clear.".into()));
            }
        }
        Commands::Tui => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let client = build_client(&cfg)?;
            let hub = ActivityHub::new(Arc::new(client), open_cache()?, cfg.bar_window_days);
            run_tui(&cfg, hub).await?;
        }
        Commands::Refresh => {
            ensure_initialized()?;
            let cfg = load_config()?;
            refresh(&cfg).await?;
        }
        Commands::Export { view, format } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            export(&cfg, parse_view(&view)?, parse_format(&format)?)?;
        }
    }

    Ok(())
}
