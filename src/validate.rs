use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::decode::SourcedIdDecoder;
use crate::models::{Attempt, AttemptType};
use crate::report::{RejectionKind, RejectionSink};

const EXPECTED_RAW_FIELDS: [&str; 5] = [
    "lti_user_id",
    "attempt_type",
    "created_at",
    "is_correct",
    "passback_params",
];

const EXPECTED_PASSBACK_FIELDS: [&str; 3] = [
    "oauth_consumer_key",
    "lis_result_sourcedid",
    "lis_outcome_service_url",
];

/// Why an item was dropped, or which soft repair was applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    #[error("not a mapping")]
    NotAMapping,
    #[error("field set mismatch")]
    FieldSetMismatch,
    #[error("invalid user id")]
    InvalidUserId,
    #[error("invalid attempt type")]
    InvalidAttemptType,
    #[error("invalid correctness value")]
    InvalidCorrectness,
    #[error("unparseable timestamp")]
    UnparseableTimestamp,
    #[error("invalid passback payload")]
    InvalidPassbackPayload,
    #[error("user id mismatch between general and passback fields")]
    UserIdMismatch,
    #[error("passback params field set differs from expected")]
    PassbackFieldsFilled,
    #[error("sourcedid did not match the expected pattern")]
    SourcedIdUnmatched,
}

enum Verdict {
    Valid(Attempt),
    Rejected(Reason),
}

/// Single entry point for turning raw API items into [`Attempt`] records.
///
/// Hard failures drop the item; decode failures and passback shape drift are
/// repaired in place. Either way the sink hears about it, so `validate`
/// itself never errors.
pub struct Validator<S> {
    decoder: SourcedIdDecoder,
    sink: S,
}

impl<S: RejectionSink> Validator<S> {
    pub fn new(decoder: SourcedIdDecoder, sink: S) -> Self {
        Self { decoder, sink }
    }

    pub fn validate(&self, raw: &Value) -> Option<Attempt> {
        match self.check(raw) {
            Verdict::Valid(attempt) => Some(attempt),
            Verdict::Rejected(reason) => {
                self.sink.record(RejectionKind::Drop, &reason, raw);
                None
            }
        }
    }

    /// Stable filter over one fetched batch: output order follows input
    /// order, failed items are simply absent.
    pub fn validate_batch(&self, items: &[Value]) -> Vec<Attempt> {
        info!("parsing {} data items", items.len());
        let mut attempts = Vec::with_capacity(items.len());
        let mut failed = 0usize;
        for item in items {
            match self.validate(item) {
                Some(attempt) => attempts.push(attempt),
                None => failed += 1,
            }
        }
        info!("{failed} items failed validation");
        info!("{} attempts successfully added", attempts.len());
        attempts
    }

    fn check(&self, raw: &Value) -> Verdict {
        let item = match raw.as_object() {
            Some(map) => map,
            None => return Verdict::Rejected(Reason::NotAMapping),
        };

        // Exact key-set match: extra top-level keys are as fatal as missing
        // ones, the upstream contract is strict.
        let fields: BTreeSet<&str> = item.keys().map(String::as_str).collect();
        if fields != BTreeSet::from(EXPECTED_RAW_FIELDS) {
            return Verdict::Rejected(Reason::FieldSetMismatch);
        }

        let user_id = match item["lti_user_id"].as_str() {
            Some(s) if !s.is_empty() => s,
            _ => return Verdict::Rejected(Reason::InvalidUserId),
        };

        let attempt_type = match item["attempt_type"].as_str().and_then(AttemptType::parse) {
            Some(t) => t,
            None => return Verdict::Rejected(Reason::InvalidAttemptType),
        };

        let is_correct = match &item["is_correct"] {
            Value::Null => None,
            Value::Number(n) => match n.as_i64() {
                Some(v @ (0 | 1)) => Some(v as i16),
                _ => return Verdict::Rejected(Reason::InvalidCorrectness),
            },
            _ => return Verdict::Rejected(Reason::InvalidCorrectness),
        };

        let created_at = match item["created_at"].as_str().and_then(parse_timestamp) {
            Some(ts) => ts,
            None => return Verdict::Rejected(Reason::UnparseableTimestamp),
        };

        // The passback payload arrives as a string-encoded object, usually
        // single-quoted.
        let passback = match item["passback_params"].as_str() {
            Some(s) => s,
            None => return Verdict::Rejected(Reason::InvalidPassbackPayload),
        };
        let passback = match serde_json::from_str(&passback.replace('\'', "\"")) {
            Ok(Value::Object(map)) => map,
            _ => return Verdict::Rejected(Reason::InvalidPassbackPayload),
        };

        // The nested payload has historically inconsistent shape, so unlike
        // the top level it is tolerated: absent keys become null.
        let passback_fields: BTreeSet<&str> = passback.keys().map(String::as_str).collect();
        if passback_fields != BTreeSet::from(EXPECTED_PASSBACK_FIELDS) {
            self.sink
                .record(RejectionKind::Repair, &Reason::PassbackFieldsFilled, raw);
        }
        let raw_passback = |key: &str| -> Option<String> {
            match passback.get(key) {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            }
        };

        let decoded = passback
            .get("lis_result_sourcedid")
            .and_then(Value::as_str)
            .and_then(|sid| self.decoder.decode(sid));

        let (course_name, course_alias, target_id, target_alias) = match decoded {
            Some(id) => {
                // Redundant user ids must agree; disagreement outranks a
                // missing decode.
                if id.user_id != user_id {
                    return Verdict::Rejected(Reason::UserIdMismatch);
                }
                let course_name = id.course.replace('+', " ");
                let course_alias = course_name
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or(&course_name)
                    .to_string();
                let target_alias = format!("{} {}", course_alias, abbreviate(&id.target_id));
                (
                    Some(course_name),
                    Some(course_alias),
                    Some(id.target_id),
                    Some(target_alias),
                )
            }
            None => {
                self.sink
                    .record(RejectionKind::Repair, &Reason::SourcedIdUnmatched, raw);
                (None, None, None, None)
            }
        };

        Verdict::Valid(Attempt {
            user_id: user_id.to_string(),
            created_at,
            course_name,
            course_alias,
            target_id,
            target_alias,
            attempt_type,
            is_correct,
            raw_oauth_consumer_key: raw_passback("oauth_consumer_key"),
            raw_lis_result_sourcedid: raw_passback("lis_result_sourcedid"),
            raw_lis_outcome_service_url: raw_passback("lis_outcome_service_url"),
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Timestamps without an offset are taken as UTC.
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

/// Display form of a target id: first three and last three characters.
fn abbreviate(target_id: &str) -> String {
    let chars: Vec<char> = target_id.chars().collect();
    let head: String = chars.iter().take(3).collect();
    let tail: String = chars[chars.len().saturating_sub(3)..].iter().collect();
    format!("{head}...{tail}")
}
