//! KeywordMatchScorer: pure-Rust, deterministic scorer with no LLM call.
//!
//! Algorithm:
//! 1. Keywords are the posting's required skills, or when none are listed,
//!    the capitalized / technical tokens of the description.
//! 2. For each keyword:
//!    - exact match against a resume skill → strength 1.0
//!    - substring of any title, degree, organization or skill → strength 0.6
//!    - no match → strength 0.0
//! 3. overall_score = Σ strength / keyword count × 100
//! 4. Recommendation: hire ≥ 80, interview ≥ 40, otherwise reject.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::models::job::JobPosting;
use crate::models::report::{MatchReport, Recommendation, SkillsMatch};
use crate::models::resume::StructuredResume;
use crate::pipeline::error::PipelineError;
use crate::pipeline::scorer::MatchScorer;

const EXACT_STRENGTH: f32 = 1.0;
const TEXT_STRENGTH: f32 = 0.6;
const HIRE_THRESHOLD: u8 = 80;
const INTERVIEW_THRESHOLD: u8 = 40;

/// Capitalized words that carry no skill signal.
const DESCRIPTION_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "for", "in", "is", "it", "of", "on", "or", "our",
    "the", "this", "to", "we", "will", "with", "you", "your",
];

pub struct KeywordMatchScorer;

#[async_trait]
impl MatchScorer for KeywordMatchScorer {
    async fn score(
        &self,
        resume: &StructuredResume,
        posting: &JobPosting,
    ) -> Result<MatchReport, PipelineError> {
        Ok(compute_keyword_match(resume, posting))
    }
}

fn compute_keyword_match(resume: &StructuredResume, posting: &JobPosting) -> MatchReport {
    let keywords = posting_keywords(posting);
    let experience_assessment = format!(
        "{} experience entr{} found.",
        resume.experience.len(),
        if resume.experience.len() == 1 { "y" } else { "ies" }
    );
    let education_assessment = match resume.education.first() {
        Some(edu) => format!("Most recent listed education: {}.", edu.institution),
        None => "No education entries found.".to_string(),
    };

    if keywords.is_empty() {
        return MatchReport {
            overall_score: 0,
            skills_match: SkillsMatch::default(),
            experience_assessment,
            education_assessment,
            strengths: vec![],
            gaps: vec!["Posting lists no comparable keywords.".to_string()],
            recommendation: Recommendation::Interview,
            scorer_backend: "keyword".to_string(),
        };
    }

    let corpus = resume_corpus(resume);

    let mut matched = BTreeSet::new();
    let mut missing = BTreeSet::new();
    let mut strengths = Vec::new();
    let mut gaps = Vec::new();
    let mut total = 0.0_f32;

    for keyword in &keywords {
        let needle = keyword.to_lowercase();
        let strength = if resume.skills.contains(&needle) {
            EXACT_STRENGTH
        } else if corpus.iter().any(|text| text.contains(&needle)) {
            TEXT_STRENGTH
        } else {
            0.0
        };
        total += strength;

        if strength >= EXACT_STRENGTH {
            strengths.push(format!("Lists {keyword} as a skill"));
            matched.insert(keyword.clone());
        } else if strength > 0.0 {
            strengths.push(format!("Mentions {keyword} in experience or education"));
            matched.insert(keyword.clone());
        } else {
            gaps.push(format!("No evidence of {keyword}"));
            missing.insert(keyword.clone());
        }
    }

    let overall_score = ((total / keywords.len() as f32) * 100.0)
        .round()
        .clamp(0.0, 100.0) as u8;

    MatchReport {
        overall_score,
        skills_match: SkillsMatch { matched, missing },
        experience_assessment,
        education_assessment,
        strengths,
        gaps,
        recommendation: recommend(overall_score),
        scorer_backend: "keyword".to_string(),
    }
}

fn recommend(score: u8) -> Recommendation {
    if score >= HIRE_THRESHOLD {
        Recommendation::Hire
    } else if score >= INTERVIEW_THRESHOLD {
        Recommendation::Interview
    } else {
        Recommendation::Reject
    }
}

/// Required skills, falling back to technical-looking description tokens.
/// Deduplicated case-insensitively, first spelling wins.
fn posting_keywords(posting: &JobPosting) -> Vec<String> {
    let candidates: Vec<String> = if posting.required_skills.is_empty() {
        posting
            .description
            .as_deref()
            .unwrap_or("")
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '(' | ')' | '/'))
            .map(|token| token.trim_end_matches(['.', '!', '?']))
            .filter(|token| is_technical_token(token))
            .map(String::from)
            .collect()
    } else {
        posting
            .required_skills
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    let mut seen = BTreeSet::new();
    candidates
        .into_iter()
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect()
}

fn is_technical_token(token: &str) -> bool {
    let Some(first) = token.chars().next() else {
        return false;
    };
    if DESCRIPTION_STOPWORDS.contains(&token.to_lowercase().as_str()) {
        return false;
    }
    first.is_uppercase() || token.contains(['+', '#']) || token.chars().any(|c| c.is_ascii_digit())
}

fn resume_corpus(resume: &StructuredResume) -> Vec<String> {
    let education = resume
        .education
        .iter()
        .flat_map(|e| [Some(&e.institution), e.degree.as_ref()]);
    let experience = resume
        .experience
        .iter()
        .flat_map(|e| [Some(&e.organization), e.title.as_ref()]);

    education
        .chain(experience)
        .flatten()
        .chain(resume.skills.iter())
        .map(|s| s.to_lowercase())
        .collect()
}
