use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::models::{Attempt, AttemptType};

/// Aggregate statistics over one set of attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptStats {
    pub attempts: usize,
    pub unique_users: usize,
    pub avg_attempts_per_user: f64,
    pub median_attempts_per_user: f64,
    pub runs: usize,
    pub submits: usize,
    pub correct_submits: usize,
}

pub fn overall(attempts: &[Attempt]) -> AttemptStats {
    compute(attempts.iter())
}

/// Per-course rows, keyed by course name. Attempts whose identifier failed
/// to decode carry no course and only show up in [`overall`].
pub fn per_course(attempts: &[Attempt]) -> BTreeMap<String, AttemptStats> {
    let mut by_course: BTreeMap<&str, Vec<&Attempt>> = BTreeMap::new();
    for att in attempts {
        if let Some(course) = att.course_name.as_deref() {
            by_course.entry(course).or_default().push(att);
        }
    }
    by_course
        .into_iter()
        .map(|(course, atts)| (course.to_string(), compute(atts.into_iter())))
        .collect()
}

fn compute<'a>(attempts: impl Iterator<Item = &'a Attempt>) -> AttemptStats {
    let mut per_user: HashMap<&str, usize> = HashMap::new();
    let mut total = 0usize;
    let mut runs = 0usize;
    let mut submits = 0usize;
    let mut correct_submits = 0usize;

    for att in attempts {
        total += 1;
        *per_user.entry(att.user_id.as_str()).or_insert(0) += 1;
        match att.attempt_type {
            AttemptType::Run => runs += 1,
            AttemptType::Submit => {
                submits += 1;
                if att.is_correct == Some(1) {
                    correct_submits += 1;
                }
            }
        }
    }

    let unique_users = per_user.len();
    let mut counts: Vec<usize> = per_user.into_values().collect();
    counts.sort_unstable();

    let avg_attempts_per_user = if unique_users == 0 {
        0.0
    } else {
        total as f64 / unique_users as f64
    };
    // Lower median: the middle element of the sorted counts, biased down on
    // even lengths.
    let median_attempts_per_user = if counts.is_empty() {
        0.0
    } else {
        counts[(counts.len() - 1) / 2] as f64
    };

    AttemptStats {
        attempts: total,
        unique_users,
        avg_attempts_per_user,
        median_attempts_per_user,
        runs,
        submits,
        correct_submits,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn attempt(user: &str, course: Option<&str>, kind: AttemptType, correct: Option<i16>) -> Attempt {
        Attempt {
            user_id: user.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 2, 25, 6, 0, 0).unwrap(),
            course_name: course.map(str::to_string),
            course_alias: course.map(str::to_string),
            target_id: Some("tgt123456".to_string()),
            target_alias: None,
            attempt_type: kind,
            is_correct: correct,
            raw_oauth_consumer_key: None,
            raw_lis_result_sourcedid: None,
            raw_lis_outcome_service_url: None,
        }
    }

    #[test]
    fn per_course_aggregation() {
        let attempts = vec![
            attempt("u1", Some("A"), AttemptType::Run, None),
            attempt("u1", Some("A"), AttemptType::Run, None),
            attempt("u2", Some("A"), AttemptType::Submit, Some(1)),
        ];

        let rows = per_course(&attempts);
        let a = &rows["A"];
        assert_eq!(a.attempts, 3);
        assert_eq!(a.unique_users, 2);
        assert_eq!(a.avg_attempts_per_user, 1.5);
        assert_eq!(a.median_attempts_per_user, 1.0);
        assert_eq!(a.runs, 2);
        assert_eq!(a.submits, 1);
        assert_eq!(a.correct_submits, 1);
    }

    #[test]
    fn incorrect_and_unknown_submits_are_not_counted_correct() {
        let attempts = vec![
            attempt("u1", Some("A"), AttemptType::Submit, Some(0)),
            attempt("u2", Some("A"), AttemptType::Submit, None),
        ];
        let total = overall(&attempts);
        assert_eq!(total.submits, 2);
        assert_eq!(total.correct_submits, 0);
    }

    #[test]
    fn courseless_attempts_count_only_in_overall() {
        let attempts = vec![
            attempt("u1", Some("A"), AttemptType::Run, None),
            attempt("u2", None, AttemptType::Run, None),
        ];
        assert_eq!(overall(&attempts).attempts, 2);
        let rows = per_course(&attempts);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows["A"].attempts, 1);
    }

    #[test]
    fn empty_input_yields_zeroed_stats() {
        let total = overall(&[]);
        assert_eq!(total.attempts, 0);
        assert_eq!(total.unique_users, 0);
        assert_eq!(total.avg_attempts_per_user, 0.0);
        assert_eq!(total.median_attempts_per_user, 0.0);
    }

    #[test]
    fn median_is_the_lower_middle() {
        // per-user counts 1, 2, 4 -> middle element is 2
        let attempts = vec![
            attempt("u1", Some("A"), AttemptType::Run, None),
            attempt("u2", Some("A"), AttemptType::Run, None),
            attempt("u2", Some("A"), AttemptType::Run, None),
            attempt("u3", Some("A"), AttemptType::Run, None),
            attempt("u3", Some("A"), AttemptType::Run, None),
            attempt("u3", Some("A"), AttemptType::Run, None),
            attempt("u3", Some("A"), AttemptType::Run, None),
        ];
        assert_eq!(overall(&attempts).median_attempts_per_user, 2.0);
    }
}
