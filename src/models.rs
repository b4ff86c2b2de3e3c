use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of attempt kinds the platform emits.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttemptType {
    Run,
    Submit,
}

impl AttemptType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "run" => Some(Self::Run),
            "submit" => Some(Self::Submit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Submit => "submit",
        }
    }
}

/// One validated attempt event, immutable once built.
///
/// Identifier-derived fields are None when the packed sourcedid did not
/// decode; the raw passback values are kept verbatim either way so failed
/// decodes stay auditable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Attempt {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub course_name: Option<String>,
    pub course_alias: Option<String>,
    pub target_id: Option<String>,
    pub target_alias: Option<String>,
    pub attempt_type: AttemptType,
    pub is_correct: Option<i16>,
    pub raw_oauth_consumer_key: Option<String>,
    pub raw_lis_result_sourcedid: Option<String>,
    pub raw_lis_outcome_service_url: Option<String>,
}
