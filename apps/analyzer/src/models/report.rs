use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Hire,
    #[default]
    Interview,
    Reject,
}

impl Recommendation {
    /// Case-insensitive match against the three canonical values.
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hire" => Some(Recommendation::Hire),
            "interview" => Some(Recommendation::Interview),
            "reject" => Some(Recommendation::Reject),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Hire => "hire",
            Recommendation::Interview => "interview",
            Recommendation::Reject => "reject",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillsMatch {
    pub matched: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

/// Scored comparison of a structured resume against one job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub overall_score: u8, // 0 – 100
    pub skills_match: SkillsMatch,
    pub experience_assessment: String,
    pub education_assessment: String,
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub recommendation: Recommendation,
    pub scorer_backend: String, // "llm" | "keyword"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_is_case_insensitive() {
        assert_eq!(Recommendation::from_raw("Hire"), Some(Recommendation::Hire));
        assert_eq!(
            Recommendation::from_raw("  REJECT "),
            Some(Recommendation::Reject)
        );
        assert_eq!(Recommendation::from_raw("strong yes"), None);
    }

    #[test]
    fn test_recommendation_serializes_lowercase() {
        let json = serde_json::to_string(&Recommendation::Interview).unwrap();
        assert_eq!(json, r#""interview""#);
    }
}
