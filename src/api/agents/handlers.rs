use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::agents::Agent;
use crate::api::AppState;
use crate::api::auth::CallerIdentity;
use crate::api::changes::{ChangeType, ResourceType, notify};
use crate::error::ApiError;

pub(crate) async fn list_agents(
    State(state): State<AppState>,
    _caller: CallerIdentity,
) -> Json<Value> {
    let mut agents = state.agent_repo.list().await;
    agents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    let summaries: Vec<Value> = agents
        .iter()
        .map(|a| {
            json!({
                "id": a.id,
                "name": a.name,
                "description": a.description,
                "model": a.model,
                "is_active": a.is_active,
                "has_assistant": a.assistant_id.is_some(),
                "created_at": a.created_at,
                "updated_at": a.updated_at,
            })
        })
        .collect();

    Json(json!({ "agents": summaries }))
}

pub(crate) async fn get_agent(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let agent = state
        .agent_repo
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("agent not found".to_string()))?;

    Ok(Json(serde_json::to_value(&agent).map_err(anyhow::Error::from)?))
}

#[derive(Deserialize)]
pub(crate) struct CreateAgentRequest {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    instructions: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    assistant_id: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
}

pub(crate) async fn create_agent(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Json(body): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::Validation("agent name must not be empty".to_string()));
    }

    let now = Utc::now();
    let agent = Agent {
        id: Uuid::new_v4().to_string(),
        name: body.name,
        description: body.description,
        instructions: body.instructions,
        model: body.model,
        assistant_id: body.assistant_id.filter(|s| !s.is_empty()),
        is_active: body.is_active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    let id = agent.id.clone();
    state
        .agent_repo
        .save(agent)
        .await
        .map_err(|e| ApiError::Internal(e.context("failed to save agent")))?;

    notify(&state, ResourceType::Agent, ChangeType::Created, id.clone());
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

#[derive(Deserialize)]
pub(crate) struct UpdateAgentRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    model: Option<String>,
    /// Double Option: outer absent = untouched, inner None = cleared.
    #[serde(default)]
    assistant_id: Option<Option<String>>,
    #[serde(default)]
    is_active: Option<bool>,
}

pub(crate) async fn update_agent(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<String>,
    Json(body): Json<UpdateAgentRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut agent = state
        .agent_repo
        .get(&id)
        .await
        .ok_or_else(|| ApiError::NotFound("agent not found".to_string()))?;

    if let Some(name) = body.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("agent name must not be empty".to_string()));
        }
        agent.name = name;
    }
    if let Some(description) = body.description {
        agent.description = description;
    }
    if let Some(instructions) = body.instructions {
        agent.instructions = instructions;
    }
    if let Some(model) = body.model {
        agent.model = model;
    }
    if let Some(assistant_id) = body.assistant_id {
        agent.assistant_id = assistant_id.filter(|s| !s.is_empty());
    }
    if let Some(is_active) = body.is_active {
        agent.is_active = is_active;
    }
    agent.updated_at = Utc::now();

    state
        .agent_repo
        .save(agent.clone())
        .await
        .map_err(|e| ApiError::Internal(e.context("failed to save agent")))?;

    notify(&state, ResourceType::Agent, ChangeType::Updated, id);
    Ok(Json(serde_json::to_value(&agent).map_err(anyhow::Error::from)?))
}

pub(crate) async fn delete_agent(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let existed = state
        .agent_repo
        .delete(&id)
        .await
        .map_err(|e| ApiError::Internal(e.context("failed to delete agent")))?;

    if !existed {
        return Err(ApiError::NotFound("agent not found".to_string()));
    }

    notify(&state, ResourceType::Agent, ChangeType::Deleted, id);
    Ok(Json(json!({ "deleted": true })))
}
