// Document CRUD, sharing, history and restore handlers. Not on the hot
// edit path; live editing goes through the socket layer.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use quillpad_core::document::{DocumentRecord, MAX_TITLE_LENGTH};
use quillpad_core::ids::{DocId, UserId};
use quillpad_core::roles::{AccessLevel, get_document_with_access, resolve_role};

use crate::{
    auth::authenticate_request,
    error::AppError,
    state::AppState,
    types::{
        CreateDocumentRequest, DocumentPayload, DocumentSummaryPayload, HistoryEntryPayload,
        RestoreRequest, ShareRequest,
    },
};

pub(crate) async fn list_documents_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DocumentSummaryPayload>>, AppError> {
    let user = authenticate_request(&state, &headers).await?;

    let records = state
        .document_store
        .find_shared_or_owned(&user.id)
        .await
        .map_err(AppError::from)?;

    let summaries = records
        .iter()
        .map(|record| DocumentSummaryPayload::from_record(record, resolve_role(record, &user.id)))
        .collect();
    Ok(Json(summaries))
}

pub(crate) async fn create_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateDocumentRequest>,
) -> Result<Response, AppError> {
    let user = authenticate_request(&state, &headers).await?;

    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled")
        .to_owned();
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(AppError::bad_request(format!(
            "title must be at most {MAX_TITLE_LENGTH} characters"
        )));
    }

    let record = DocumentRecord::new(
        DocId::new(Uuid::new_v4().to_string()),
        title,
        user.id.clone(),
    );
    state
        .document_store
        .create(record.clone())
        .await
        .map_err(AppError::from)?;

    let body = DocumentPayload::from_record(&record, resolve_role(&record, &user.id));
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

pub(crate) async fn get_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
) -> Result<Json<DocumentPayload>, AppError> {
    let user = authenticate_request(&state, &headers).await?;

    let (record, role) = get_document_with_access(
        state.document_store.as_ref(),
        &doc_id,
        &user.id,
        AccessLevel::Read,
    )
    .await?;

    Ok(Json(DocumentPayload::from_record(&record, role)))
}

pub(crate) async fn share_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
    Json(payload): Json<ShareRequest>,
) -> Result<Json<DocumentPayload>, AppError> {
    let user = authenticate_request(&state, &headers).await?;

    let (mut record, role) = get_document_with_access(
        state.document_store.as_ref(),
        &doc_id,
        &user.id,
        AccessLevel::Owner,
    )
    .await?;

    if payload.user_id == record.owner {
        return Err(AppError::bad_request("the owner cannot be a share target"));
    }
    state
        .user_store
        .find_by_id(&payload.user_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::not_found(format!("User {} not found.", payload.user_id)))?;

    record.shares.insert(payload.user_id, payload.role);
    record.updated_at = chrono::Utc::now();
    state
        .document_store
        .save(record.clone())
        .await
        .map_err(AppError::from)?;

    Ok(Json(DocumentPayload::from_record(&record, role)))
}

pub(crate) async fn revoke_share_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((doc_id, target)): Path<(DocId, UserId)>,
) -> Result<Json<DocumentPayload>, AppError> {
    let user = authenticate_request(&state, &headers).await?;

    let (mut record, role) = get_document_with_access(
        state.document_store.as_ref(),
        &doc_id,
        &user.id,
        AccessLevel::Owner,
    )
    .await?;

    if record.shares.remove(&target).is_none() {
        return Err(AppError::not_found(format!(
            "Document {doc_id} is not shared with user {target}."
        )));
    }
    record.updated_at = chrono::Utc::now();
    state
        .document_store
        .save(record.clone())
        .await
        .map_err(AppError::from)?;

    Ok(Json(DocumentPayload::from_record(&record, role)))
}

pub(crate) async fn delete_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
) -> Result<StatusCode, AppError> {
    let user = authenticate_request(&state, &headers).await?;

    get_document_with_access(
        state.document_store.as_ref(),
        &doc_id,
        &user.id,
        AccessLevel::Owner,
    )
    .await?;

    if !state
        .document_store
        .delete(&doc_id)
        .await
        .map_err(AppError::from)?
    {
        return Err(AppError::doc_not_found(doc_id.as_str()));
    }

    state.engine.discard(&doc_id);
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn document_history_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
) -> Result<Json<Vec<HistoryEntryPayload>>, AppError> {
    let user = authenticate_request(&state, &headers).await?;

    let (record, _) = get_document_with_access(
        state.document_store.as_ref(),
        &doc_id,
        &user.id,
        AccessLevel::Read,
    )
    .await?;

    let entries = record.history.iter().map(HistoryEntryPayload::from).collect();
    Ok(Json(entries))
}

pub(crate) async fn restore_document_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(doc_id): Path<DocId>,
    Json(payload): Json<RestoreRequest>,
) -> Result<Json<DocumentPayload>, AppError> {
    let user = authenticate_request(&state, &headers).await?;

    let (_, role) = get_document_with_access(
        state.document_store.as_ref(),
        &doc_id,
        &user.id,
        AccessLevel::Owner,
    )
    .await?;

    let record = state
        .engine
        .restore_version(&doc_id, payload.version, &user.id)
        .await?;

    Ok(Json(DocumentPayload::from_record(&record, role)))
}
