//! Job number tags embedded in chat text.
//!
//! A tag is `#` followed by exactly five digits and a closing `!`, e.g. `#55555!`.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

static JOB_TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([0-9]{5})!").expect("job tag pattern compiles"));

/// A five-digit job number, as listed in the jobs spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobNumber(String);

impl JobNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the first job number tag from message text.
pub fn extract_job_number(text: &str) -> Option<JobNumber> {
    JOB_TAG_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|digits| JobNumber(digits.as_str().to_string()))
}
