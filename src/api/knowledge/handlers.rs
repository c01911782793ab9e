use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::auth::CallerIdentity;
use crate::api::changes::{ChangeType, ResourceType, notify};
use crate::error::ApiError;
use crate::knowledge::KnowledgeDoc;

pub(crate) async fn list_docs(
    State(state): State<AppState>,
    _caller: CallerIdentity,
) -> Json<Value> {
    let mut docs = state.knowledge_repo.list().await;
    docs.sort_by(|a, b| a.title.cmp(&b.title));

    let summaries: Vec<Value> = docs
        .iter()
        .map(|d| {
            json!({
                "id": d.id,
                "title": d.title,
                "parent_id": d.parent_id,
                "created_at": d.created_at,
                "updated_at": d.updated_at,
            })
        })
        .collect();

    Json(json!({ "documents": summaries }))
}

pub(crate) async fn get_doc(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let doc = state
        .knowledge_repo
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("document not found".to_string()))?;

    Ok(Json(serde_json::to_value(&doc).map_err(anyhow::Error::from)?))
}

#[derive(Deserialize)]
pub(crate) struct CreateDocRequest {
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    parent_id: Option<String>,
}

pub(crate) async fn create_doc(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Json(body): Json<CreateDocRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::Validation("document title must not be empty".to_string()));
    }

    let now = Utc::now();
    let doc = KnowledgeDoc {
        id: Uuid::new_v4().to_string(),
        title: body.title,
        content: body.content,
        parent_id: body.parent_id.filter(|p| !p.is_empty()),
        created_at: now,
        updated_at: now,
    };

    let id = doc.id.clone();
    state
        .knowledge_repo
        .save(doc)
        .await
        .map_err(|e| ApiError::Internal(e.context("failed to save document")))?;

    notify(&state, ResourceType::Knowledge, ChangeType::Created, id.clone());
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

#[derive(Deserialize)]
pub(crate) struct UpdateDocRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    /// Double Option: outer absent = untouched, inner None = moved to root.
    #[serde(default)]
    parent_id: Option<Option<String>>,
}

pub(crate) async fn update_doc(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<String>,
    Json(body): Json<UpdateDocRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut doc = state
        .knowledge_repo
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("document not found".to_string()))?;

    if let Some(title) = body.title {
        if title.trim().is_empty() {
            return Err(ApiError::Validation("document title must not be empty".to_string()));
        }
        doc.title = title;
    }
    if let Some(content) = body.content {
        doc.content = content;
    }
    if let Some(parent_id) = body.parent_id {
        if parent_id.as_deref() == Some(id.as_str()) {
            return Err(ApiError::Validation("document cannot be its own parent".to_string()));
        }
        doc.parent_id = parent_id.filter(|p| !p.is_empty());
    }
    doc.updated_at = Utc::now();

    state
        .knowledge_repo
        .save(doc.clone())
        .await
        .map_err(|e| ApiError::Internal(e.context("failed to save document")))?;

    notify(&state, ResourceType::Knowledge, ChangeType::Updated, id);
    Ok(Json(serde_json::to_value(&doc).map_err(anyhow::Error::from)?))
}

pub(crate) async fn delete_doc(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let existed = state
        .knowledge_repo
        .delete(&id)
        .await
        .map_err(|e| ApiError::Internal(e.context("failed to delete document")))?;

    if !existed {
        return Err(ApiError::NotFound("document not found".to_string()));
    }

    notify(&state, ResourceType::Knowledge, ChangeType::Deleted, id);
    Ok(Json(json!({ "deleted": true })))
}
