//! Pagination and sorting for list queries.
//!
//! A [`SortSpec`] can only be built from a value on the caller's allow-list,
//! so an unsafe sort column never reaches a store.

use serde::Serialize;

use crate::error::{FieldErrors, PipelineError, PipelineResult};

const MAX_PAGE: u32 = 10_000_000;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// A validated sort column and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    column: &'static str,
    direction: SortDirection,
}

impl SortSpec {
    /// Accept `raw` only if it appears verbatim in `safelist`. A leading
    /// `-` selects descending order.
    pub fn parse(raw: &str, safelist: &[&'static str]) -> PipelineResult<Self> {
        let entry = safelist
            .iter()
            .copied()
            .find(|allowed| *allowed == raw)
            .ok_or_else(|| PipelineError::invalid("sort", "invalid sort value"))?;

        Ok(match entry.strip_prefix('-') {
            Some(column) => Self {
                column,
                direction: SortDirection::Descending,
            },
            None => Self {
                column: entry,
                direction: SortDirection::Ascending,
            },
        })
    }

    pub fn column(&self) -> &'static str {
        self.column
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

/// Validated page window plus sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    page: u32,
    page_size: u32,
    sort: SortSpec,
}

impl Filters {
    /// Validate every field at once so the caller sees all problems.
    pub fn new(
        page: i64,
        page_size: i64,
        sort: &str,
        safelist: &[&'static str],
    ) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.check(page > 0, "page", "must be greater than zero");
        errors.check(
            page <= i64::from(MAX_PAGE),
            "page",
            "must be a maximum of 10 million",
        );
        errors.check(page_size > 0, "page_size", "must be greater than zero");
        errors.check(
            page_size <= i64::from(MAX_PAGE_SIZE),
            "page_size",
            "must be a maximum of 100",
        );

        let sort = SortSpec::parse(sort, safelist);
        if sort.is_err() {
            errors.add("sort", "invalid sort value");
        }

        match sort {
            Ok(sort) if errors.is_empty() => Ok(Self {
                page: page as u32,
                page_size: page_size as u32,
                sort,
            }),
            _ => Err(errors),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

/// Pagination metadata returned with list responses. Empty when nothing
/// matched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u32,
    #[serde(skip_serializing_if = "is_zero_usize")]
    pub total_records: usize,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn is_zero_usize(value: &usize) -> bool {
    *value == 0
}

impl Metadata {
    pub fn calculate(total_records: usize, filters: &Filters) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        let page_size = filters.page_size as usize;
        Self {
            current_page: filters.page,
            page_size: filters.page_size,
            first_page: 1,
            last_page: total_records.div_ceil(page_size) as u32,
            total_records,
        }
    }
}
