//! The business record exposed under `/v1/records`.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FieldErrors, PipelineResult};
use crate::store::filters::Filters;
use crate::store::{ResourceId, Revise, Version, Versioned};

const TITLE_MAX_BYTES: usize = 500;
const MIN_YEAR: i32 = 1888;
const MAX_TAGS: usize = 5;

/// Sort values accepted by the list endpoint.
pub const SORT_SAFELIST: [&str; 6] = ["id", "title", "year", "-id", "-title", "-year"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: ResourceId,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    pub tags: Vec<String>,
    pub version: Version,
}

impl Record {
    /// Current field values, the starting point for a partial update.
    pub fn fields(&self) -> RecordFields {
        RecordFields {
            title: self.title.clone(),
            year: self.year,
            tags: self.tags.clone(),
        }
    }
}

impl Versioned for Record {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }
}

impl Revise<RecordFields> for Record {
    fn revise(self, fields: RecordFields, version: Version) -> Self {
        Self {
            title: fields.title,
            year: fields.year,
            tags: fields.tags,
            version,
            ..self
        }
    }
}

/// Writable fields of a record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordFields {
    pub title: String,
    pub year: i32,
    pub tags: Vec<String>,
}

impl RecordFields {
    pub fn validate(&self) -> PipelineResult<()> {
        let mut errors = FieldErrors::new();

        errors.check(!self.title.is_empty(), "title", "must be provided");
        errors.check(
            self.title.len() <= TITLE_MAX_BYTES,
            "title",
            "must not be more than 500 bytes long",
        );

        errors.check(self.year != 0, "year", "must be provided");
        errors.check(self.year >= MIN_YEAR, "year", "must be greater than 1888");
        errors.check(
            self.year <= Utc::now().year(),
            "year",
            "must not be in the future",
        );

        errors.check(!self.tags.is_empty(), "tags", "must contain at least 1 tag");
        errors.check(
            self.tags.len() <= MAX_TAGS,
            "tags",
            "must not contain more than 5 tags",
        );
        let unique: HashSet<&String> = self.tags.iter().collect();
        errors.check(
            unique.len() == self.tags.len(),
            "tags",
            "must not contain duplicate values",
        );

        errors.into_result()
    }
}

/// Partial update body; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub tags: Option<Vec<String>>,
}

impl RecordPatch {
    pub fn apply(self, fields: &mut RecordFields) {
        if let Some(title) = self.title {
            fields.title = title;
        }
        if let Some(year) = self.year {
            fields.year = year;
        }
        if let Some(tags) = self.tags {
            fields.tags = tags;
        }
    }
}

/// A validated list query.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    /// Case-insensitive substring match on the title; empty matches all.
    pub title: String,
    /// Records must carry every one of these tags.
    pub tags: Vec<String>,
    pub filters: Filters,
}
