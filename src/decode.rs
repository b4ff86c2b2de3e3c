use regex::Regex;

/// Components unpacked from a `lis_result_sourcedid` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIdentifier {
    /// Raw course token; '+' still encodes the space separator.
    pub course: String,
    pub target_id: String,
    pub user_id: String,
}

/// Matcher for the packed identifier convention
/// `course-v1:<course>:lms.<domain>-<target_id>:<user_id>`.
///
/// The platform domain is injected at construction so tests can use a
/// synthetic one. Course and target exclude ':'; the user id takes the
/// remainder and may itself contain ':'.
#[derive(Debug, Clone)]
pub struct SourcedIdDecoder {
    pattern: Regex,
}

impl SourcedIdDecoder {
    pub fn new(domain: &str) -> Self {
        let pattern = Regex::new(&format!(
            r"^course-v1:(?P<course>[^:]+):lms\.{}-(?P<target_id>[^:]+):(?P<user_id>.+)$",
            regex::escape(domain)
        ))
        .expect("valid sourcedid pattern");
        Self { pattern }
    }

    /// No-match is `None`, not an error; callers treat the result as optional.
    pub fn decode(&self, candidate: &str) -> Option<DecodedIdentifier> {
        let caps = self.pattern.captures(candidate)?;
        Some(DecodedIdentifier {
            course: caps["course"].to_string(),
            target_id: caps["target_id"].to_string(),
            user_id: caps["user_id"].to_string(),
        })
    }
}
