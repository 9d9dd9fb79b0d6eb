use std::collections::BTreeSet;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::models::entity::RawEntity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub institution: String,
    pub degree: Option<String>,
    pub date_range: Option<String>,
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub organization: String,
    pub title: Option<String>,
    pub date_range: Option<String>,
    pub location: Option<String>,
}

/// Sectioned view of a resume. `skills` is a sorted set so that the JSON
/// rendering is stable for identical input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredResume {
    pub personal: PersonalInfo,
    pub education: Vec<EducationEntry>,
    pub experience: Vec<ExperienceEntry>,
    pub skills: BTreeSet<String>,
}

/// An entity the structurer could not place in any section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncategorizedEntity {
    pub entity: RawEntity,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuringDiagnostics {
    pub uncategorized: Vec<UncategorizedEntity>,
}

impl StructuredResume {
    /// Plain-text rendering used when prompting the generation service.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let p = &self.personal;
        let _ = writeln!(out, "Name: {}", p.name.as_deref().unwrap_or(""));
        let _ = writeln!(out, "Location: {}", p.location.as_deref().unwrap_or(""));
        let _ = writeln!(
            out,
            "Contact: {} | {}",
            p.email.as_deref().unwrap_or(""),
            p.phone.as_deref().unwrap_or("")
        );

        out.push_str("\nEDUCATION:\n");
        for edu in &self.education {
            out.push_str("- ");
            out.push_str(&edu.institution);
            if let Some(degree) = &edu.degree {
                let _ = write!(out, ", {degree}");
            }
            if let Some(dates) = &edu.date_range {
                let _ = write!(out, ", {dates}");
            }
            if let Some(gpa) = &edu.gpa {
                let _ = write!(out, ", GPA: {gpa}");
            }
            out.push('\n');
        }

        out.push_str("\nEXPERIENCE:\n");
        for exp in &self.experience {
            out.push_str("- ");
            out.push_str(&exp.organization);
            if let Some(title) = &exp.title {
                let _ = write!(out, ", {title}");
            }
            if let Some(dates) = &exp.date_range {
                if dates.contains(" - ") {
                    let _ = write!(out, ", {dates}");
                } else {
                    let _ = write!(out, ", {dates} - Present");
                }
            }
            if let Some(location) = &exp.location {
                let _ = write!(out, ", {location}");
            }
            out.push('\n');
        }

        out.push_str("\nSKILLS:\n");
        out.push_str(&self.skills.iter().cloned().collect::<Vec<_>>().join(", "));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lists_sections() {
        let resume = StructuredResume {
            personal: PersonalInfo {
                name: Some("Jane Doe".to_string()),
                email: Some("jane@example.com".to_string()),
                phone: None,
                location: Some("Boston".to_string()),
            },
            education: vec![EducationEntry {
                institution: "MIT".to_string(),
                degree: None,
                date_range: Some("2020".to_string()),
                gpa: Some("3.8".to_string()),
            }],
            experience: vec![ExperienceEntry {
                organization: "Acme".to_string(),
                title: Some("Engineer".to_string()),
                date_range: Some("2021".to_string()),
                location: None,
            }],
            skills: ["python".to_string(), "aws".to_string()].into_iter().collect(),
        };

        let summary = resume.summary();
        assert!(summary.contains("Name: Jane Doe"));
        assert!(summary.contains("- MIT, 2020, GPA: 3.8"));
        assert!(summary.contains("- Acme, Engineer, 2021 - Present"));
        assert!(summary.ends_with("aws, python"));
    }
}
