//! Match Scoring: compares a structured resume with a job posting.
//!
//! `LlmMatchScorer` (default) asks the generation service for a report and
//! coerces its answer into a [`MatchReport`]. `KeywordMatchScorer` (see
//! `keyword.rs`) is the deterministic fallback. The orchestrator holds either
//! as `Arc<dyn MatchScorer>`.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::llm_client::{strip_json_fences, TextGenerator};
use crate::models::job::JobPosting;
use crate::models::report::{MatchReport, Recommendation, SkillsMatch};
use crate::models::resume::StructuredResume;
use crate::pipeline::error::PipelineError;
use crate::pipeline::prompts::{
    MATCH_PROMPT_TEMPLATE, MATCH_REPORT_SCHEMA, STRICT_SCHEMA_INSTRUCTION, UNKNOWN_POSITION,
};

/// Attempts before a schema violation becomes a job failure.
const MAX_SCHEMA_ATTEMPTS: u32 = 2;

static LEADING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(-?\d+(?:\.\d+)?)").unwrap());

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Implement this to swap scoring backends without touching the orchestrator.
#[async_trait]
pub trait MatchScorer: Send + Sync {
    async fn score(
        &self,
        resume: &StructuredResume,
        posting: &JobPosting,
    ) -> Result<MatchReport, PipelineError>;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmMatchScorer
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmMatchScorer {
    generator: Arc<dyn TextGenerator>,
}

impl LlmMatchScorer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl MatchScorer for LlmMatchScorer {
    async fn score(
        &self,
        resume: &StructuredResume,
        posting: &JobPosting,
    ) -> Result<MatchReport, PipelineError> {
        let prompt = build_match_prompt(resume, posting);
        let mut last_violation = String::new();

        for attempt in 1..=MAX_SCHEMA_ATTEMPTS {
            let attempt_prompt = if attempt == 1 {
                prompt.clone()
            } else {
                format!("{prompt}\n\n{STRICT_SCHEMA_INSTRUCTION}")
            };

            let raw = self
                .generator
                .generate(&attempt_prompt, MATCH_REPORT_SCHEMA)
                .await
                .map_err(|e| PipelineError::GenerationFailure(e.to_string()))?;

            match parse_match_report(&raw) {
                Ok(report) => {
                    info!(
                        "Match report: score={} recommendation={}",
                        report.overall_score, report.recommendation
                    );
                    return Ok(report);
                }
                Err(violation) => {
                    warn!(
                        "Match report attempt {attempt}/{MAX_SCHEMA_ATTEMPTS} violated schema: {violation}"
                    );
                    last_violation = violation;
                }
            }
        }

        Err(PipelineError::SchemaParse(format!(
            "response did not match the match report schema after {MAX_SCHEMA_ATTEMPTS} attempts: {last_violation}"
        )))
    }
}

pub fn build_match_prompt(resume: &StructuredResume, posting: &JobPosting) -> String {
    let title = posting
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNKNOWN_POSITION);
    let description = posting.description.as_deref().unwrap_or("").trim();
    let skills = if posting.required_skills.is_empty() {
        "(none listed)".to_string()
    } else {
        posting.required_skills.join(", ")
    };

    MATCH_PROMPT_TEMPLATE
        .replace("{resume_summary}", &resume.summary())
        .replace("{job_title}", title)
        .replace("{job_description}", description)
        .replace("{required_skills}", &skills)
        .replace("{schema}", MATCH_REPORT_SCHEMA)
}

// ────────────────────────────────────────────────────────────────────────────
// Response coercion
// ────────────────────────────────────────────────────────────────────────────

/// Parses generator output into a report. `Err` carries a human-readable
/// description of the schema violation.
pub fn parse_match_report(raw: &str) -> Result<MatchReport, String> {
    let object = parse_json_object(raw)?;

    let field = |name: &str| {
        object
            .get(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| format!("missing field '{name}'"))
    };

    let overall_score = coerce_score(field("overall_score")?)?;

    let skills_match = match field("skills_match")? {
        Value::Object(skills) => SkillsMatch {
            matched: string_list(skills.get("matched")).into_iter().collect(),
            missing: string_list(skills.get("missing")).into_iter().collect(),
        },
        other => return Err(format!("'skills_match' must be an object, got {other}")),
    };

    let experience_assessment = text_field(field("experience_assessment")?);
    let education_assessment = text_field(field("education_assessment")?);
    let strengths = string_list(Some(field("strengths")?));
    let gaps = string_list(Some(field("gaps")?));
    let recommendation = coerce_recommendation(field("recommendation")?);

    Ok(MatchReport {
        overall_score,
        skills_match,
        experience_assessment,
        education_assessment,
        strengths,
        gaps,
        recommendation,
        scorer_backend: "llm".to_string(),
    })
}

/// Strict parse first, then the outermost `{...}` block for answers wrapped in prose.
fn parse_json_object(raw: &str) -> Result<Map<String, Value>, String> {
    let text = strip_json_fences(raw);
    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(strict_err) => {
            let start = text.find('{');
            let end = text.rfind('}');
            match (start, end) {
                (Some(start), Some(end)) if start < end => {
                    serde_json::from_str(&text[start..=end])
                        .map_err(|e| format!("invalid JSON: {e}"))?
                }
                _ => return Err(format!("no JSON object in response: {strict_err}")),
            }
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}

/// Accepts `85`, `85.4`, `"85"`, `"85%"`, `"85/100"`; rounds and clamps to 0..=100.
fn coerce_score(value: &Value) -> Result<u8, String> {
    let score = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("'overall_score' is not a finite number: {n}"))?,
        Value::String(s) => LEADING_NUMBER_RE
            .captures(s)
            .and_then(|c| c[1].parse::<f64>().ok())
            .ok_or_else(|| format!("'overall_score' has no numeric value: {s:?}"))?,
        other => return Err(format!("'overall_score' must be a number, got {other}")),
    };
    Ok(score.round().clamp(0.0, 100.0) as u8)
}

fn coerce_recommendation(value: &Value) -> Recommendation {
    let parsed = value.as_str().and_then(Recommendation::from_raw);
    parsed.unwrap_or_else(|| {
        warn!("Unrecognized recommendation {value}, defaulting to interview");
        Recommendation::Interview
    })
}

fn text_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Arrays of strings, or one comma separated string.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    items.into_iter().filter(|s| !s.is_empty()).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
