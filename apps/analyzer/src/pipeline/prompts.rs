// Prompt constants for match scoring.

/// JSON schema the generation service must follow. Also sent as the schema hint.
pub const MATCH_REPORT_SCHEMA: &str = r#"{
  "overall_score": <integer 0-100>,
  "skills_match": {
    "matched": [<string>, ...],
    "missing": [<string>, ...]
  },
  "experience_assessment": <string>,
  "education_assessment": <string>,
  "strengths": [<string>, ...],
  "gaps": [<string>, ...],
  "recommendation": "hire" | "interview" | "reject"
}"#;

/// Match prompt template.
/// Replace: {resume_summary}, {job_title}, {job_description}, {required_skills}, {schema}
pub const MATCH_PROMPT_TEMPLATE: &str = r#"You are an expert technical recruiter. Compare the candidate's resume to the job posting and assess the fit.

RESUME:
{resume_summary}

JOB POSTING:
Title: {job_title}
Description: {job_description}
Required skills: {required_skills}

Return a JSON object with this EXACT schema (no extra fields):
{schema}

Rules:
- overall_score is an integer from 0 (no fit) to 100 (perfect fit).
- skills_match.matched lists required skills the resume demonstrates; skills_match.missing lists the rest.
- recommendation is exactly one of "hire", "interview" or "reject".
- Base every statement on the resume above. Do NOT invent experience."#;

/// Appended on the retry after a response that did not match the schema.
pub const STRICT_SCHEMA_INSTRUCTION: &str = "\
    Your previous answer did not match the required schema. \
    Respond ONLY with a single JSON object matching the schema exactly. \
    No prose, no markdown, no missing fields.";

pub const UNKNOWN_POSITION: &str = "Unknown Position";
