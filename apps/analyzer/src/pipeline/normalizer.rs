//! Entity Normalizer: drops low-confidence entities, collapses duplicate spans
//! and partitions what remains by type.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::entity::{EntityType, RawEntity};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+").unwrap());

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?\(?\d[\d\s().-]{5,}\d").unwrap());

const PHONE_MIN_DIGITS: usize = 7;
const PHONE_MAX_DIGITS: usize = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Entities scored below this are discarded.
    pub min_confidence: f32,
    /// Same-type entities whose overlap exceeds this fraction of the shorter
    /// span are merged.
    pub merge_overlap_ratio: f32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            merge_overlap_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Normalizer output: one position-ordered list per entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedEntities {
    pub persons: Vec<RawEntity>,
    pub organizations: Vec<RawEntity>,
    pub dates: Vec<RawEntity>,
    pub locations: Vec<RawEntity>,
    pub titles: Vec<RawEntity>,
    pub quantities: Vec<RawEntity>,
    pub other: Vec<RawEntity>,
    pub contact: ContactInfo,
    /// Entities discarded for low confidence or an empty span.
    pub dropped: usize,
    /// Entities folded into a higher-confidence duplicate.
    pub merged: usize,
}

impl NormalizedEntities {
    pub fn of_type(&self, entity_type: EntityType) -> &[RawEntity] {
        match entity_type {
            EntityType::Person => &self.persons,
            EntityType::Organization => &self.organizations,
            EntityType::Date => &self.dates,
            EntityType::Location => &self.locations,
            EntityType::Title => &self.titles,
            EntityType::Quantity => &self.quantities,
            EntityType::Other => &self.other,
        }
    }

    fn bucket_mut(&mut self, entity_type: EntityType) -> &mut Vec<RawEntity> {
        match entity_type {
            EntityType::Person => &mut self.persons,
            EntityType::Organization => &mut self.organizations,
            EntityType::Date => &mut self.dates,
            EntityType::Location => &mut self.locations,
            EntityType::Title => &mut self.titles,
            EntityType::Quantity => &mut self.quantities,
            EntityType::Other => &mut self.other,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawEntity> {
        EntityType::ALL
            .into_iter()
            .flat_map(move |t| self.of_type(t).iter())
    }

    pub fn len(&self) -> usize {
        EntityType::ALL.iter().map(|t| self.of_type(*t).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalizes a position-ordered entity sequence. Never fails: anything
/// unusable is counted in `dropped` and skipped.
pub fn normalize(entities: &[RawEntity], config: &NormalizerConfig) -> NormalizedEntities {
    let mut out = NormalizedEntities::default();

    let mut kept: Vec<&RawEntity> = Vec::with_capacity(entities.len());
    for entity in entities {
        if entity.confidence < config.min_confidence
            || entity.text.trim().is_empty()
            || entity.end_offset <= entity.start_offset
        {
            debug!(
                "Dropping {} entity {:?} (confidence {:.2})",
                entity.entity_type.as_str(),
                entity.text,
                entity.confidence
            );
            out.dropped += 1;
            continue;
        }
        kept.push(entity);
    }
    kept.sort_by_key(|e| (e.start_offset, e.end_offset));

    for entity in kept {
        let bucket = out.bucket_mut(entity.entity_type);
        let duplicate = bucket
            .iter()
            .position(|existing| overlap_ratio(existing, entity) > config.merge_overlap_ratio);
        match duplicate {
            Some(idx) => {
                if entity.confidence > bucket[idx].confidence {
                    bucket[idx] = entity.clone();
                }
                out.merged += 1;
            }
            None => bucket.push(entity.clone()),
        }
    }

    // A merge can swap in a span that starts earlier than its neighbours.
    for entity_type in EntityType::ALL {
        out.bucket_mut(entity_type)
            .sort_by_key(|e| (e.start_offset, e.end_offset));
    }

    out.contact = extract_contact(&out.other);
    out
}

/// Overlap as a fraction of the shorter span.
fn overlap_ratio(a: &RawEntity, b: &RawEntity) -> f32 {
    let shorter = a.span_len().min(b.span_len());
    if shorter == 0 {
        return 0.0;
    }
    a.overlap_with(b) as f32 / shorter as f32
}

fn extract_contact(other: &[RawEntity]) -> ContactInfo {
    let mut contact = ContactInfo::default();
    for entity in other {
        if contact.email.is_none() {
            if let Some(m) = EMAIL_RE.find(&entity.text) {
                contact.email = Some(m.as_str().to_string());
                continue;
            }
        }
        if contact.phone.is_none() {
            contact.phone = find_phone(&entity.text);
        }
    }
    contact
}

fn find_phone(text: &str) -> Option<String> {
    PHONE_RE.find_iter(text).find_map(|m| {
        let digits = m.as_str().chars().filter(char::is_ascii_digit).count();
        (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS)
            .contains(&digits)
            .then(|| m.as_str().trim().to_string())
    })
}
