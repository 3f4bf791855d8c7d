// Outcome Tag Domain Model
//
// The only persisted artifact this system defines: key/value metadata on the
// source object recording whether it was encoded. Key names are stable so a
// later run (or another process) can interpret a tag written earlier.

use crate::domain::job::JobState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const KEY_ENCODED: &str = "encoded";
pub const KEY_STATUS: &str = "status";
pub const KEY_ENCODED_DATE: &str = "encoded_date";
pub const KEY_TRANSFORM: &str = "transform";

/// Format of the `encoded_date` value (UTC date)
pub const ENCODED_DATE_FORMAT: &str = "%m/%d/%Y";

/// Metadata key names, optionally prefixed (e.g. `ams_` for stores tagged by
/// older tooling)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeTagKeys {
    prefix: String,
}

impl OutcomeTagKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn encoded(&self) -> String {
        format!("{}{}", self.prefix, KEY_ENCODED)
    }

    pub fn status(&self) -> String {
        format!("{}{}", self.prefix, KEY_STATUS)
    }

    pub fn encoded_date(&self) -> String {
        format!("{}{}", self.prefix, KEY_ENCODED_DATE)
    }

    pub fn transform(&self) -> String {
        format!("{}{}", self.prefix, KEY_TRANSFORM)
    }

    /// Every key an outcome tag may carry
    pub fn all(&self) -> [String; 4] {
        [self.encoded(), self.status(), self.encoded_date(), self.transform()]
    }
}

/// Idempotency marker written once per terminal job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeTag {
    pub encoded: bool,
    /// Terminal state name
    pub status: String,
    pub encoded_date: Option<NaiveDate>,
    pub recipe_name: Option<String>,
}

impl OutcomeTag {
    /// Build the tag for a terminal state. Returns `None` for non-terminal
    /// states: a tag is never written while a job is still running.
    pub fn for_terminal(state: JobState, recipe_name: &str, today: NaiveDate) -> Option<Self> {
        match state {
            JobState::Finished => Some(Self {
                encoded: true,
                status: state.to_string(),
                encoded_date: Some(today),
                recipe_name: Some(recipe_name.to_string()),
            }),
            JobState::Error | JobState::Canceled | JobState::SubmissionFailed => Some(Self {
                encoded: false,
                status: state.to_string(),
                encoded_date: None,
                recipe_name: None,
            }),
            _ => None,
        }
    }

    pub fn to_metadata(&self, keys: &OutcomeTagKeys) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(keys.encoded(), self.encoded.to_string());
        metadata.insert(keys.status(), self.status.clone());
        if let Some(date) = self.encoded_date {
            metadata.insert(
                keys.encoded_date(),
                date.format(ENCODED_DATE_FORMAT).to_string(),
            );
        }
        if let Some(recipe) = &self.recipe_name {
            metadata.insert(keys.transform(), recipe.clone());
        }
        metadata
    }

    /// Parse a tag from object metadata; `None` if the `encoded` key is absent
    /// or not a boolean.
    pub fn from_metadata(keys: &OutcomeTagKeys, metadata: &HashMap<String, String>) -> Option<Self> {
        let encoded = parse_bool(metadata.get(&keys.encoded())?)?;
        Some(Self {
            encoded,
            status: metadata.get(&keys.status()).cloned().unwrap_or_default(),
            encoded_date: metadata
                .get(&keys.encoded_date())
                .and_then(|s| NaiveDate::parse_from_str(s, ENCODED_DATE_FORMAT).ok()),
            recipe_name: metadata.get(&keys.transform()).cloned(),
        })
    }
}

/// True when metadata carries a truthy `encoded` marker
pub fn is_processed(keys: &OutcomeTagKeys, metadata: &HashMap<String, String>) -> bool {
    metadata
        .get(&keys.encoded())
        .and_then(|v| parse_bool(v))
        .unwrap_or(false)
}

/// True when metadata carries any outcome tag (success or failure)
pub fn has_outcome(keys: &OutcomeTagKeys, metadata: &HashMap<String, String>) -> bool {
    metadata
        .get(&keys.encoded())
        .and_then(|v| parse_bool(v))
        .is_some()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn test_finished_tag_metadata() {
        let tag = OutcomeTag::for_terminal(JobState::Finished, "H264Recipe", day()).unwrap();
        let metadata = tag.to_metadata(&OutcomeTagKeys::default());

        assert_eq!(metadata.get("encoded").map(String::as_str), Some("true"));
        assert_eq!(metadata.get("status").map(String::as_str), Some("Finished"));
        assert_eq!(
            metadata.get("encoded_date").map(String::as_str),
            Some("03/07/2024")
        );
        assert_eq!(
            metadata.get("transform").map(String::as_str),
            Some("H264Recipe")
        );
    }

    #[test]
    fn test_failure_tags() {
        for state in [JobState::Error, JobState::Canceled, JobState::SubmissionFailed] {
            let tag = OutcomeTag::for_terminal(state, "r", day()).unwrap();
            let metadata = tag.to_metadata(&OutcomeTagKeys::default());
            assert_eq!(metadata.get("encoded").map(String::as_str), Some("false"));
            assert_eq!(metadata.get("status"), Some(&state.to_string()));
            assert!(!metadata.contains_key("encoded_date"));
            assert!(!metadata.contains_key("transform"));
        }
    }

    #[test]
    fn test_no_tag_for_running_states() {
        for state in [
            JobState::Submitted,
            JobState::Queued,
            JobState::Scheduled,
            JobState::Processing,
        ] {
            assert!(OutcomeTag::for_terminal(state, "r", day()).is_none());
        }
    }

    #[test]
    fn test_prefixed_keys_round_trip() {
        let keys = OutcomeTagKeys::new("ams_");
        let tag = OutcomeTag::for_terminal(JobState::Finished, "r", day()).unwrap();
        let metadata = tag.to_metadata(&keys);

        assert!(metadata.contains_key("ams_encoded"));
        assert!(is_processed(&keys, &metadata));
        assert!(!is_processed(&OutcomeTagKeys::default(), &metadata));
        assert_eq!(OutcomeTag::from_metadata(&keys, &metadata), Some(tag));
    }

    #[test]
    fn test_is_processed_tolerates_case_and_garbage() {
        let keys = OutcomeTagKeys::default();
        let mut metadata = HashMap::new();
        metadata.insert("encoded".to_string(), "TRUE".to_string());
        assert!(is_processed(&keys, &metadata));

        metadata.insert("encoded".to_string(), "yes".to_string());
        assert!(!is_processed(&keys, &metadata));
        assert!(!has_outcome(&keys, &metadata));

        metadata.insert("encoded".to_string(), "false".to_string());
        assert!(!is_processed(&keys, &metadata));
        assert!(has_outcome(&keys, &metadata));
    }
}
