//! Resume Structurer: groups normalized entities into personal info,
//! education, experience and skills.
//!
//! Association is purely positional. Every DATE, TITLE, QUANTITY and LOCATION
//! entity is owned by the nearest ORGANIZATION within `association_window`
//! characters; an organization is then classified from its own text and the
//! entities it owns. All thresholds live in [`StructurerConfig`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::entity::RawEntity;
use crate::models::resume::{
    EducationEntry, ExperienceEntry, PersonalInfo, StructuredResume, StructuringDiagnostics,
    UncategorizedEntity,
};
use crate::pipeline::normalizer::NormalizedEntities;

const DEFAULT_DEGREE_KEYWORDS: &[&str] = &[
    "university",
    "college",
    "institute",
    "school",
    "academy",
    "polytechnic",
    "bachelor",
    "bachelors",
    "master",
    "masters",
    "doctorate",
    "degree",
    "diploma",
    "phd",
    "mba",
    "b.s.",
    "bsc",
    "b.a.",
    "m.s.",
    "msc",
    "m.a.",
    "beng",
    "meng",
];

const DEFAULT_AFFILIATION_KEYWORDS: &[&str] = &["association", "society", "club"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructurerConfig {
    /// Max characters between an organization and an entity it owns.
    pub association_window: usize,
    /// Characters after the name that still count as the resume header.
    pub leading_block: usize,
    pub gpa_min: f32,
    pub gpa_max: f32,
    /// Matched per whole token, case-insensitive. Undotted keywords ignore dots
    /// in the text ("Ph.D." matches `phd`). Dotted keywords need their dots
    /// unless a field follows: "M.S." and "MS in Physics" match `m.s.`, the
    /// state code in "Boston, MA" does not match `m.a.`.
    pub degree_keywords: Vec<String>,
    pub affiliation_keywords: Vec<String>,
}

impl Default for StructurerConfig {
    fn default() -> Self {
        Self {
            association_window: 100,
            leading_block: 200,
            gpa_min: 0.0,
            gpa_max: 4.0,
            degree_keywords: DEFAULT_DEGREE_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            affiliation_keywords: DEFAULT_AFFILIATION_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuringOutcome {
    pub resume: StructuredResume,
    pub diagnostics: StructuringDiagnostics,
}

/// Entities claimed by one organization, in document order.
#[derive(Default)]
struct Association<'a> {
    dates: Vec<&'a RawEntity>,
    titles: Vec<&'a RawEntity>,
    quantities: Vec<&'a RawEntity>,
    locations: Vec<&'a RawEntity>,
}

/// Builds a [`StructuredResume`]. Pure and deterministic: the same
/// normalized input always yields the same output.
pub fn structure(entities: &NormalizedEntities, config: &StructurerConfig) -> StructuringOutcome {
    let mut uncategorized: Vec<UncategorizedEntity> = Vec::new();
    let mut skills: BTreeSet<String> = BTreeSet::new();

    // 1. Personal header
    let name_entity = entities.persons.first();
    for extra in entities.persons.iter().skip(1) {
        uncategorized.push(uncategorized_entry(extra, "additional person mention"));
    }
    let personal_location = find_personal_location(&entities.locations, name_entity, config);

    let personal = PersonalInfo {
        name: name_entity.map(|e| e.text.trim().to_string()),
        email: entities.contact.email.clone(),
        phone: entities.contact.phone.clone(),
        location: personal_location.map(|idx| entities.locations[idx].text.trim().to_string()),
    };

    // 2. Offset-window association
    let orgs = &entities.organizations;
    let mut associations: Vec<Association> = orgs.iter().map(|_| Association::default()).collect();

    for date in &entities.dates {
        match nearest_organization(date, orgs, config.association_window) {
            Some(i) => associations[i].dates.push(date),
            None => uncategorized.push(no_owner(date, config)),
        }
    }
    for title in &entities.titles {
        match nearest_organization(title, orgs, config.association_window) {
            Some(i) => associations[i].titles.push(title),
            None => {
                add_skill(&mut skills, &title.text);
            }
        }
    }
    for quantity in &entities.quantities {
        match nearest_organization(quantity, orgs, config.association_window) {
            Some(i) => associations[i].quantities.push(quantity),
            None => uncategorized.push(no_owner(quantity, config)),
        }
    }
    for (idx, location) in entities.locations.iter().enumerate() {
        if Some(idx) == personal_location {
            continue;
        }
        match nearest_organization(location, orgs, config.association_window) {
            Some(i) => associations[i].locations.push(location),
            None => uncategorized.push(no_owner(location, config)),
        }
    }

    // 3. Classification
    let mut education = Vec::new();
    let mut experience = Vec::new();

    for (org, assoc) in orgs.iter().zip(&associations) {
        // Owned entities that no output field ends up holding.
        let mut unused: Vec<&RawEntity> = inner_dates(&assoc.dates).to_vec();
        let title = nearest(org, &assoc.titles);
        for other in assoc.titles.iter().filter(|t| Some(**t) != title) {
            add_skill(&mut skills, &other.text);
        }

        let gpa = assoc
            .quantities
            .iter()
            .find(|q| parse_gpa(&q.text, config.gpa_min, config.gpa_max).is_some());
        let date_range = date_range(&assoc.dates);

        let is_education = has_keyword(&org.text, &config.degree_keywords)
            || title.is_some_and(|t| has_keyword(&t.text, &config.degree_keywords))
            || gpa.is_some();

        if is_education {
            unused.extend(assoc.quantities.iter().filter(|q| Some(**q) != gpa.copied()));
            unused.extend(&assoc.locations);
            education.push(EducationEntry {
                institution: org.text.trim().to_string(),
                degree: title.map(|t| t.text.trim().to_string()),
                date_range,
                gpa: gpa.map(|q| q.text.trim().to_string()),
            });
        } else if has_keyword(&org.text, &config.affiliation_keywords)
            && date_range.is_none()
            && title.is_none()
        {
            uncategorized.push(uncategorized_entry(
                org,
                "affiliation without dates or title",
            ));
            for owned in assoc.quantities.iter().chain(&assoc.locations) {
                uncategorized.push(uncategorized_entry(
                    owned,
                    "attached to an uncategorized organization",
                ));
            }
        } else {
            let location = nearest(org, &assoc.locations);
            unused.extend(&assoc.quantities);
            unused.extend(assoc.locations.iter().filter(|l| Some(**l) != location));
            experience.push(ExperienceEntry {
                organization: org.text.trim().to_string(),
                title: title.map(|t| t.text.trim().to_string()),
                date_range,
                location: location.map(|l| l.text.trim().to_string()),
            });
        }

        let reason = format!("owned by {}, no field for it", org.text.trim());
        for owned in unused {
            uncategorized.push(uncategorized_entry(owned, &reason));
        }
    }

    for entry in &uncategorized {
        debug!(
            "Uncategorized {} {:?}: {}",
            entry.entity.entity_type.as_str(),
            entry.entity.text,
            entry.reason
        );
    }
    info!(
        "Structured resume: {} education, {} experience, {} skills, {} uncategorized",
        education.len(),
        experience.len(),
        skills.len(),
        uncategorized.len()
    );

    StructuringOutcome {
        resume: StructuredResume {
            personal,
            education,
            experience,
            skills,
        },
        diagnostics: StructuringDiagnostics { uncategorized },
    }
}

/// Index of the organization nearest to `entity` within `window` characters.
/// Ties go to the earlier organization.
fn nearest_organization(entity: &RawEntity, orgs: &[RawEntity], window: usize) -> Option<usize> {
    orgs.iter()
        .enumerate()
        .map(|(i, org)| (org.gap_to(entity), i))
        .filter(|(gap, _)| *gap <= window)
        .min()
        .map(|(_, i)| i)
}

fn nearest<'a>(anchor: &RawEntity, candidates: &[&'a RawEntity]) -> Option<&'a RawEntity> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(i, c)| (anchor.gap_to(c), *i))
        .map(|(_, c)| *c)
}

/// The header location: nearest to the name and inside the leading block.
fn find_personal_location(
    locations: &[RawEntity],
    name: Option<&RawEntity>,
    config: &StructurerConfig,
) -> Option<usize> {
    let block_end = name.map_or(0, |n| n.end_offset) + config.leading_block;
    locations
        .iter()
        .enumerate()
        .filter(|(_, loc)| loc.start_offset < block_end)
        .min_by_key(|(i, loc)| (name.map_or(loc.start_offset, |n| n.gap_to(loc)), *i))
        .map(|(i, _)| i)
}

/// Dates strictly between the first and last one; the range only shows the ends.
fn inner_dates<'a, 'b>(dates: &'b [&'a RawEntity]) -> &'b [&'a RawEntity] {
    match dates.len() {
        0..=2 => &[],
        n => &dates[1..n - 1],
    }
}

fn date_range(dates: &[&RawEntity]) -> Option<String> {
    match dates {
        [] => None,
        [only] => Some(only.text.trim().to_string()),
        [first, .., last] => Some(format!("{} - {}", first.text.trim(), last.text.trim())),
    }
}

/// Parses a GPA such as `3.8`, `GPA: 3.75` or `3.8/4.0`. Bare integers are
/// rejected (too often counts) unless written against the scale.
pub fn parse_gpa(text: &str, min: f32, max: f32) -> Option<f32> {
    let lower = text.trim().to_ascii_lowercase();
    let value = lower
        .strip_prefix("gpa")
        .map(|rest| rest.trim_start_matches([':', ' ']))
        .unwrap_or(lower.as_str());

    let numerator = match value.split_once('/') {
        Some((num, scale)) => {
            let scale: f32 = scale.trim().parse().ok()?;
            if (scale - max).abs() > f32::EPSILON {
                return None;
            }
            num.trim()
        }
        None if value.contains('.') => value,
        None => return None,
    };

    let gpa: f32 = numerator.parse().ok()?;
    (min..=max).contains(&gpa).then_some(gpa)
}

fn has_keyword(text: &str, keywords: &[String]) -> bool {
    let tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .map(|token| token.trim_matches('.').to_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    tokens.iter().enumerate().any(|(i, token)| {
        keywords.iter().any(|keyword| {
            let keyword = keyword.trim_matches('.').to_lowercase();
            if keyword.contains('.') {
                let field_follows =
                    matches!(tokens.get(i + 1).map(String::as_str), Some("in" | "of"));
                *token == keyword
                    || (field_follows && token.replace('.', "") == keyword.replace('.', ""))
            } else {
                token.replace('.', "") == keyword
            }
        })
    })
}

fn add_skill(skills: &mut BTreeSet<String>, text: &str) {
    let skill = text.trim().to_lowercase();
    if !skill.is_empty() {
        skills.insert(skill);
    }
}

fn no_owner(entity: &RawEntity, config: &StructurerConfig) -> UncategorizedEntity {
    uncategorized_entry(
        entity,
        &format!(
            "no organization within {} characters",
            config.association_window
        ),
    )
}

fn uncategorized_entry(entity: &RawEntity, reason: &str) -> UncategorizedEntity {
    UncategorizedEntity {
        entity: entity.clone(),
        reason: reason.to_string(),
    }
}
