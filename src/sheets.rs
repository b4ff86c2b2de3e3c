use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::info;

use crate::metrics::AttemptStats;
use crate::models::Attempt;

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Thin client over the Sheets v4 REST surface. The access token is minted
/// outside this process; the exporter only attaches it.
pub struct SheetsExporter<'a> {
    http: &'a reqwest::Client,
    access_token: String,
}

impl<'a> SheetsExporter<'a> {
    pub fn new(http: &'a reqwest::Client, access_token: impl Into<String>) -> Self {
        Self {
            http,
            access_token: access_token.into(),
        }
    }

    /// One worksheet per fetch: header plus one raw row per attempt, written
    /// in a single batch.
    pub async fn upload_attempts(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        attempts: &[Attempt],
    ) -> Result<()> {
        if attempts.is_empty() {
            return Ok(());
        }
        self.add_sheet(spreadsheet_id, sheet_name).await?;
        self.write_values(spreadsheet_id, sheet_name, attempt_rows(attempts))
            .await?;
        info!("{} attempts uploaded to sheet '{sheet_name}'", attempts.len());
        Ok(())
    }

    /// Per-course statistics plus a total row.
    pub async fn upload_report(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        total: &AttemptStats,
        per_course: &BTreeMap<String, AttemptStats>,
    ) -> Result<()> {
        self.add_sheet(spreadsheet_id, sheet_name).await?;
        self.write_values(spreadsheet_id, sheet_name, report_rows(total, per_course))
            .await?;
        info!("report uploaded to sheet '{sheet_name}'");
        Ok(())
    }

    async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<()> {
        let body = json!({
            "requests": [
                {"addSheet": {"properties": {"title": title}}}
            ]
        });
        self.http
            .post(format!("{SHEETS_API}/{spreadsheet_id}:batchUpdate"))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("sheets batchUpdate request failed")?
            .error_for_status()
            .context("sheets batchUpdate rejected")?;
        Ok(())
    }

    async fn write_values(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<()> {
        let body = json!({"values": rows});
        self.http
            .put(format!("{SHEETS_API}/{spreadsheet_id}/values/{sheet_name}!A1"))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("sheets values.update request failed")?
            .error_for_status()
            .context("sheets values.update rejected")?;
        Ok(())
    }
}

fn attempt_rows(attempts: &[Attempt]) -> Vec<Vec<Value>> {
    let mut rows = vec![vec![
        json!("created_at"),
        json!("user_id"),
        json!("course_name"),
        json!("target_id"),
        json!("attempt_type"),
        json!("is_correct"),
        json!("raw_oauth_consumer_key"),
        json!("raw_lis_result_sourcedid"),
        json!("raw_lis_outcome_service_url"),
    ]];
    for att in attempts {
        rows.push(vec![
            json!(att.created_at.to_rfc3339()),
            json!(att.user_id),
            json!(att.course_name),
            json!(att.target_id),
            json!(att.attempt_type.as_str()),
            json!(att.is_correct),
            json!(att.raw_oauth_consumer_key),
            json!(att.raw_lis_result_sourcedid),
            json!(att.raw_lis_outcome_service_url),
        ]);
    }
    rows
}

fn report_rows(total: &AttemptStats, per_course: &BTreeMap<String, AttemptStats>) -> Vec<Vec<Value>> {
    let mut rows = vec![vec![
        json!("course"),
        json!("attempts"),
        json!("unique_users"),
        json!("avg_attempts_per_user"),
        json!("median_attempts_per_user"),
        json!("runs"),
        json!("submits"),
        json!("correct_submits"),
    ]];
    for (course, stats) in per_course {
        rows.push(stats_row(json!(course), stats));
    }
    rows.push(stats_row(json!("total"), total));
    rows
}

fn stats_row(label: Value, stats: &AttemptStats) -> Vec<Value> {
    vec![
        label,
        json!(stats.attempts),
        json!(stats.unique_users),
        json!(stats.avg_attempts_per_user),
        json!(stats.median_attempts_per_user),
        json!(stats.runs),
        json!(stats.submits),
        json!(stats.correct_submits),
    ]
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::AttemptType;

    fn attempt() -> Attempt {
        Attempt {
            user_id: "user42".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 2, 25, 6, 12, 33).unwrap(),
            course_name: Some("Intro to CS".to_string()),
            course_alias: Some("to".to_string()),
            target_id: Some("abcdef123".to_string()),
            target_alias: Some("to abc...123".to_string()),
            attempt_type: AttemptType::Submit,
            is_correct: Some(1),
            raw_oauth_consumer_key: Some("key-1".to_string()),
            raw_lis_result_sourcedid: Some("sourcedid".to_string()),
            raw_lis_outcome_service_url: None,
        }
    }

    #[test]
    fn attempt_rows_have_header_and_verbatim_values() {
        let rows = attempt_rows(&[attempt()]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], json!("created_at"));
        assert_eq!(rows[1][0], json!("2026-02-25T06:12:33+00:00"));
        assert_eq!(rows[1][4], json!("submit"));
        assert_eq!(rows[1][5], json!(1));
        // missing raw value stays null, not empty string
        assert_eq!(rows[1][8], Value::Null);
    }

    #[test]
    fn report_rows_end_with_the_total() {
        let stats = AttemptStats {
            attempts: 3,
            unique_users: 2,
            avg_attempts_per_user: 1.5,
            median_attempts_per_user: 1.0,
            runs: 2,
            submits: 1,
            correct_submits: 1,
        };
        let mut per_course = BTreeMap::new();
        per_course.insert("A".to_string(), stats.clone());

        let rows = report_rows(&stats, &per_course);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][0], json!("A"));
        assert_eq!(rows[2][0], json!("total"));
        assert_eq!(rows[2][1], json!(3));
        assert_eq!(rows[2][3], json!(1.5));
    }
}
