use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::config::Settings;

/// Query-parameter timestamp format the attempt endpoint expects.
const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One fetch window in UTC. The end bound is inclusive, so a whole working
/// period keeps its final microsecond out of the next window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

impl FetchWindow {
    /// Builds a window from a client-local naive start time.
    pub fn starting_at(
        start: NaiveDateTime,
        client_utc_offset_hours: i32,
        duration_hours: i64,
    ) -> Result<Self> {
        let offset = FixedOffset::east_opt(client_utc_offset_hours * 3600)
            .context("client UTC offset out of range")?;
        let start_utc = start
            .and_local_timezone(offset)
            .single()
            .context("ambiguous client-local start time")?
            .with_timezone(&Utc);
        let end_utc = start_utc + Duration::hours(duration_hours) - Duration::microseconds(1);
        Ok(Self { start_utc, end_utc })
    }
}

/// Pulls one window of raw attempt items. The response must be a JSON array;
/// each element is validated later, one at a time.
pub async fn fetch_raw(
    http: &reqwest::Client,
    settings: &Settings,
    window: &FetchWindow,
) -> Result<Vec<Value>> {
    info!("getting data from {}", settings.api_url);

    let start = window.start_utc.format(API_TIMESTAMP_FORMAT).to_string();
    let end = window.end_utc.format(API_TIMESTAMP_FORMAT).to_string();
    let params = [
        ("client", settings.client.as_str()),
        ("client_key", settings.client_key.as_str()),
        ("start", start.as_str()),
        ("end", end.as_str()),
    ];

    let started = Instant::now();
    let response = http
        .get(&settings.api_url)
        .query(&params)
        .send()
        .await
        .context("attempt API request failed")?;
    info!(
        status = %response.status(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "attempt API responded"
    );

    let data: Value = response
        .json()
        .await
        .context("attempt API returned malformed JSON")?;
    let items = match data {
        Value::Array(items) => items,
        _ => bail!("attempt API response is not an array"),
    };

    info!(
        "fetched period is {} - {}, got {} items in response",
        window.start_utc,
        window.end_utc,
        items.len()
    );
    Ok(items)
}
