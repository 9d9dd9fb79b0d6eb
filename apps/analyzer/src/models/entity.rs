use serde::{Deserialize, Serialize};

/// Semantic category assigned to a span by the entity-recognition service.
///
/// Categories the service emits that the pipeline has no use for (`EVENT`,
/// `COMMERCIAL_ITEM`, ...) deserialize to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Person,
    Organization,
    Date,
    Location,
    Title,
    Quantity,
    #[serde(other)]
    Other,
}

impl EntityType {
    pub const ALL: [EntityType; 7] = [
        EntityType::Person,
        EntityType::Organization,
        EntityType::Date,
        EntityType::Location,
        EntityType::Title,
        EntityType::Quantity,
        EntityType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Organization => "ORGANIZATION",
            EntityType::Date => "DATE",
            EntityType::Location => "LOCATION",
            EntityType::Title => "TITLE",
            EntityType::Quantity => "QUANTITY",
            EntityType::Other => "OTHER",
        }
    }
}

/// A typed span of resume text. Offsets are character offsets into the
/// extracted text, `end_offset` exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub start_offset: usize,
    pub end_offset: usize,
    pub confidence: f32,
}

impl RawEntity {
    pub fn new(
        entity_type: EntityType,
        text: impl Into<String>,
        start_offset: usize,
        end_offset: usize,
        confidence: f32,
    ) -> Self {
        Self {
            text: text.into(),
            entity_type,
            start_offset,
            end_offset,
            confidence,
        }
    }

    pub fn span_len(&self) -> usize {
        self.end_offset.saturating_sub(self.start_offset)
    }

    /// Number of characters shared by both spans.
    pub fn overlap_with(&self, other: &RawEntity) -> usize {
        let start = self.start_offset.max(other.start_offset);
        let end = self.end_offset.min(other.end_offset);
        end.saturating_sub(start)
    }

    /// Characters between the two spans; 0 when they touch or overlap.
    pub fn gap_to(&self, other: &RawEntity) -> usize {
        if self.end_offset <= other.start_offset {
            other.start_offset - self.end_offset
        } else if other.end_offset <= self.start_offset {
            self.start_offset - other.end_offset
        } else {
            0
        }
    }
}
