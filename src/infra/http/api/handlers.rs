//! Bookmark API handlers.
//!
//! Every handler returns `Result<impl IntoResponse, ApiError>`; error
//! conversion helpers live at the bottom of the file.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::Deserialize;
use time::OffsetDateTime;

use magpie_api_types::{
    BookmarkPayload, HealthResponse, SaveBookmarkRequest, TagListResponse, UpdateBookmarkRequest,
};

use crate::application::auth::ApiIdentity;
use crate::application::bookmarks::{BookmarkError, SaveBookmarkCommand, UpdateBookmarkCommand};
use crate::application::export::{ExportFormat, render_markdown};
use crate::application::pagination::PageParams;
use crate::application::store::{BookmarkQuery, StoreError};
use crate::domain::error::DomainError;

use super::error::{ApiError, codes};
use super::models::{export_document, list_response, metadata_from_payload};
use super::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct BookmarkListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub tag: Option<String>,
    pub q: Option<String>,
    pub public: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

pub async fn save_bookmark(
    State(state): State<ApiState>,
    Extension(identity): Extension<ApiIdentity>,
    Json(payload): Json<SaveBookmarkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    identity
        .require_admin()
        .map_err(|_| ApiError::unauthorized())?;

    let cmd = SaveBookmarkCommand {
        url: payload.url,
        tags: payload.tags,
        notes: payload.notes,
        is_public: payload.is_public,
        metadata: payload.metadata.map(metadata_from_payload),
    };

    let record = state.bookmarks.save(cmd).await.map_err(bookmark_to_api)?;
    Ok((StatusCode::CREATED, Json(BookmarkPayload::from(record))))
}

/// Anonymous callers are pinned to the public subset; asking for private
/// records without a token is refused rather than silently narrowed.
pub async fn list_bookmarks(
    State(state): State<ApiState>,
    Extension(identity): Extension<ApiIdentity>,
    Query(query): Query<BookmarkListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let public = if identity.is_admin() {
        query.public
    } else if query.public == Some(false) {
        return Err(ApiError::forbidden());
    } else {
        Some(true)
    };

    let page = PageParams::new(query.page, query.limit)
        .map_err(|err| ApiError::bad_request("Invalid pagination", Some(err.to_string())))?;

    let filter = BookmarkQuery {
        tag: query.tag,
        q: query.q,
        public,
        page,
    };

    let page = state.bookmarks.list(&filter).await.map_err(bookmark_to_api)?;
    Ok(Json(list_response(page)))
}

pub async fn update_bookmark(
    State(state): State<ApiState>,
    Extension(identity): Extension<ApiIdentity>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBookmarkRequest>,
) -> Result<impl IntoResponse, ApiError> {
    identity
        .require_admin()
        .map_err(|_| ApiError::unauthorized())?;

    let cmd = UpdateBookmarkCommand {
        tags: payload.tags,
        notes: payload.notes,
        is_public: payload.is_public,
    };

    let updated = state
        .bookmarks
        .update(&id, cmd)
        .await
        .map_err(bookmark_to_api)?;

    match updated {
        Some(record) => Ok(Json(BookmarkPayload::from(record))),
        None => Err(ApiError::not_found("bookmark not found")),
    }
}

pub async fn delete_bookmark(
    State(state): State<ApiState>,
    Extension(identity): Extension<ApiIdentity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    identity
        .require_admin()
        .map_err(|_| ApiError::unauthorized())?;

    let deleted = state
        .bookmarks
        .delete(&id)
        .await
        .map_err(bookmark_to_api)?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("bookmark not found"))
    }
}

/// The tag vocabulary covers private bookmarks too, so it stays admin-only.
pub async fn list_tags(
    State(state): State<ApiState>,
    Extension(identity): Extension<ApiIdentity>,
) -> Result<impl IntoResponse, ApiError> {
    identity
        .require_admin()
        .map_err(|_| ApiError::unauthorized())?;

    let tags = state.bookmarks.all_tags().await.map_err(bookmark_to_api)?;
    Ok(Json(TagListResponse { tags }))
}

pub async fn export_bookmarks(
    State(state): State<ApiState>,
    Extension(identity): Extension<ApiIdentity>,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    identity
        .require_admin()
        .map_err(|_| ApiError::unauthorized())?;

    let format = match query.format.as_deref() {
        Some(raw) => raw
            .parse::<ExportFormat>()
            .map_err(|err| ApiError::bad_request("Unknown export format", Some(err.to_string())))?,
        None => ExportFormat::Json,
    };

    let records = state
        .bookmarks
        .export_all()
        .await
        .map_err(bookmark_to_api)?;
    let exported_at = OffsetDateTime::now_utc();

    let response = match format {
        ExportFormat::Json => Json(export_document(records, exported_at)).into_response(),
        ExportFormat::Markdown => (
            [(header::CONTENT_TYPE, format.content_type())],
            render_markdown(&records, exported_at),
        )
            .into_response(),
    };
    Ok(response)
}

pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// ----- Error conversions -----

pub(crate) fn bookmark_to_api(err: BookmarkError) -> ApiError {
    match err {
        BookmarkError::Domain(DomainError::Validation { message }) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid bookmark input",
            Some(message),
        ),
        BookmarkError::Domain(DomainError::NotFound { .. }) => {
            ApiError::not_found("bookmark not found")
        }
        BookmarkError::Pagination(err) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::BAD_REQUEST,
            "Invalid pagination",
            Some(err.to_string()),
        ),
        BookmarkError::Store(StoreError::Backend(message)) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::STORE_UNAVAILABLE,
            "Storage backend unavailable",
            Some(message),
        ),
        BookmarkError::Store(err) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::STORE,
            "Storage failure",
            Some(err.to_string()),
        ),
    }
}
