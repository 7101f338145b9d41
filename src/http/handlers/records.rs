//! `/v1/records` handlers.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{Permitted, ReadRecords, WriteRecords};
use crate::error::{FieldErrors, PipelineError, PipelineResult};
use crate::http::handlers::{ApiJson, RecordId};
use crate::http::AppState;
use crate::store::record::SORT_SAFELIST;
use crate::store::{Filters, RecordFields, RecordPatch, RecordQuery, RecordStore, Version};

pub const X_EXPECTED_VERSION: HeaderName = HeaderName::from_static("x-expected-version");

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_PAGE_SIZE: i64 = 20;
const DEFAULT_SORT: &str = "id";

/// Raw list query parameters; validated into a [`RecordQuery`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
    title: Option<String>,
    tags: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
    sort: Option<String>,
}

fn read_int(raw: Option<&str>, default: i64, field: &str, errors: &mut FieldErrors) -> i64 {
    match raw {
        None | Some("") => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            errors.add(field, "must be an integer value");
            default
        }),
    }
}

fn read_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

impl ListParams {
    pub fn into_query(self) -> PipelineResult<RecordQuery> {
        let mut errors = FieldErrors::new();
        let page = read_int(self.page.as_deref(), DEFAULT_PAGE, "page", &mut errors);
        let page_size = read_int(
            self.page_size.as_deref(),
            DEFAULT_PAGE_SIZE,
            "page_size",
            &mut errors,
        );
        let sort = self.sort.as_deref().unwrap_or(DEFAULT_SORT);

        let filters = match Filters::new(page, page_size, sort, &SORT_SAFELIST) {
            Ok(filters) if errors.is_empty() => filters,
            Ok(_) => return Err(PipelineError::Validation(errors)),
            Err(more) => {
                for (field, message) in more.iter() {
                    errors.add(field, message);
                }
                return Err(PipelineError::Validation(errors));
            }
        };

        Ok(RecordQuery {
            title: self.title.unwrap_or_default(),
            tags: read_csv(self.tags.as_deref()),
            filters,
        })
    }
}

/// `GET /v1/records`
pub async fn list(
    _: Permitted<ReadRecords>,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> PipelineResult<Response> {
    let query = params.into_query()?;
    let (records, metadata) = state
        .deadline
        .run("list", state.records.store().list(&query))
        .await?;
    Ok(Json(json!({ "records": records, "metadata": metadata })).into_response())
}

/// `POST /v1/records`
pub async fn create(
    Permitted(identity, _): Permitted<WriteRecords>,
    State(state): State<AppState>,
    ApiJson(fields): ApiJson<RecordFields>,
) -> PipelineResult<Response> {
    fields.validate()?;
    let record = state
        .deadline
        .run("insert", state.records.store().insert(fields))
        .await?;

    tracing::info!(record_id = %record.id, principal_id = %identity.id, "Record created");
    let location = format!("/v1/records/{}", record.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "record": record })),
    )
        .into_response())
}

/// `GET /v1/records/{id}`
pub async fn show(
    _: Permitted<ReadRecords>,
    State(state): State<AppState>,
    RecordId(id): RecordId,
) -> PipelineResult<Response> {
    let record = state.records.fetch(id).await?;
    Ok(Json(json!({ "record": record })).into_response())
}

fn expected_version(headers: &HeaderMap) -> PipelineResult<Option<Version>> {
    headers
        .get(&X_EXPECTED_VERSION)
        .map(|value| {
            value
                .to_str()
                .ok()
                .and_then(|v| v.parse::<Version>().ok())
                .ok_or_else(|| {
                    PipelineError::MalformedRequest(
                        "X-Expected-Version must be an integer".to_string(),
                    )
                })
        })
        .transpose()
}

/// `PATCH /v1/records/{id}`
///
/// Applies the patch to the version just read. When the client sends
/// `X-Expected-Version`, a mismatch with that read is a conflict.
pub async fn update(
    Permitted(identity, _): Permitted<WriteRecords>,
    State(state): State<AppState>,
    RecordId(id): RecordId,
    headers: HeaderMap,
    ApiJson(patch): ApiJson<RecordPatch>,
) -> PipelineResult<Response> {
    let expected = expected_version(&headers)?;
    let record = state
        .records
        .modify(id, |current| {
            if matches!(expected, Some(v) if v != current.version) {
                tracing::info!(record_id = %id, read_version = %current.version, "Stale expected version");
                return Err(PipelineError::Conflict);
            }
            let mut fields = current.fields();
            patch.apply(&mut fields);
            fields.validate()?;
            Ok(fields)
        })
        .await?;

    tracing::info!(record_id = %id, principal_id = %identity.id, version = %record.version, "Record updated");
    Ok(Json(json!({ "record": record })).into_response())
}

/// `DELETE /v1/records/{id}`
pub async fn delete(
    Permitted(identity, _): Permitted<WriteRecords>,
    State(state): State<AppState>,
    RecordId(id): RecordId,
) -> PipelineResult<Response> {
    state.records.delete(id).await?;
    tracing::info!(record_id = %id, principal_id = %identity.id, "Record deleted");
    Ok(Json(json!({ "message": "record successfully deleted" })).into_response())
}
