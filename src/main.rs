use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::Parser;
use tracing::{debug, error, warn};

mod config;
mod db;
mod decode;
mod fetch;
mod logger;
mod metrics;
mod models;
mod report;
mod sheets;
mod validate;

use config::Settings;
use decode::SourcedIdDecoder;
use fetch::FetchWindow;
use models::Attempt;
use report::ValidationLog;
use validate::Validator;

/// Pulls one window of learning-platform attempt events, validates and
/// normalizes them, loads the result into Postgres and optionally mirrors
/// raw rows plus statistics to a spreadsheet.
#[derive(Parser, Debug)]
#[command(name = "assessment-hub")]
#[command(about = "Attempt ingestion pipeline for LMS clients")]
#[command(version)]
struct Args {
    /// Window start in client-local time, e.g. "2026-02-25 06:00:00"
    #[arg(long)]
    start: String,

    /// Window length in hours
    #[arg(long, default_value = "3")]
    duration_hours: i64,

    /// Also upload raw rows and the statistics report to Google Sheets
    #[arg(long)]
    export: bool,

    /// Directory for run logs and the validation log
    #[arg(long, default_value = "logs", env = "HUB_LOG_DIR")]
    log_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    logger::init(&args.log_dir)?;
    logger::cleanup_old_logs(&args.log_dir);

    let settings = Settings::from_env()?;
    let start = NaiveDateTime::parse_from_str(&args.start, "%Y-%m-%d %H:%M:%S")
        .context("--start must look like 2026-02-25 06:00:00")?;
    let window =
        FetchWindow::starting_at(start, settings.client_utc_offset_hours, args.duration_hours)?;

    let http = reqwest::Client::new();
    let items = fetch::fetch_raw(&http, &settings, &window).await?;
    if items.is_empty() {
        warn!("no data were fetched");
        return Ok(());
    }

    let sink = ValidationLog::open(&args.log_dir).context("could not open validation log")?;
    let validator = Validator::new(SourcedIdDecoder::new(&settings.platform_domain), sink);
    let attempts = validator.validate_batch(&items);
    for attempt in &attempts {
        debug!(?attempt, "validated attempt");
    }
    if attempts.is_empty() {
        warn!("no valid attempts in the fetched window; nothing to persist");
        return Ok(());
    }

    let admin = db::connect(&settings.db.admin_postgres_url()).await?;
    db::admin::ensure_database(&admin, &settings.db).await?;
    db::admin::ensure_role(&admin, &settings.db).await?;
    admin.close().await;

    let admin_db = db::connect(&settings.db.admin_db_url()).await?;
    db::admin::ensure_schema(&admin_db, &settings.db).await?;
    admin_db.close().await;

    let pool = db::connect(&settings.db.app_db_url()).await?;
    db::schema::apply_schema(&pool, &settings.db.schema).await?;
    db::loader::insert_attempts(&pool, &settings.db.schema, &settings.client, &attempts).await?;

    if args.export {
        // Export failures should not undo a successful load.
        if let Err(e) = export(&http, &settings, &attempts).await {
            error!(error = %e, "spreadsheet export failed");
        }
    }

    Ok(())
}

async fn export(http: &reqwest::Client, settings: &Settings, attempts: &[Attempt]) -> Result<()> {
    let token = settings
        .sheets
        .access_token
        .as_deref()
        .context("SHEETS_ACCESS_TOKEN not set")?;
    let exporter = sheets::SheetsExporter::new(http, token);
    let stamp = Local::now().format("%Y-%m-%d %H:%M").to_string();

    if let Some(spreadsheet_id) = settings.sheets.export_spreadsheet_id.as_deref() {
        exporter
            .upload_attempts(spreadsheet_id, &format!("{stamp} fetch"), attempts)
            .await?;
    }
    if let Some(spreadsheet_id) = settings.sheets.report_spreadsheet_id.as_deref() {
        let total = metrics::overall(attempts);
        let per_course = metrics::per_course(attempts);
        exporter
            .upload_report(spreadsheet_id, &format!("{stamp} report"), &total, &per_course)
            .await?;
    }
    Ok(())
}
