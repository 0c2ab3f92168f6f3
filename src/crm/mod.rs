use crate::shared::models::schema::leads;
use crate::shared::models::Lead;
use crate::shared::state::AppState;
use crate::shared::utils::api_error;
use crate::shared::tenant_from_headers;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use diesel::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Sales pipeline stages. Forward movement follows the chain; won/lost are
/// terminal and reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Proposal => "proposal",
            LeadStatus::Negotiation => "negotiation",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LeadStatus::Won | LeadStatus::Lost)
    }

    fn next_in_chain(&self) -> Option<LeadStatus> {
        match self {
            LeadStatus::New => Some(LeadStatus::Contacted),
            LeadStatus::Contacted => Some(LeadStatus::Qualified),
            LeadStatus::Qualified => Some(LeadStatus::Proposal),
            LeadStatus::Proposal => Some(LeadStatus::Negotiation),
            LeadStatus::Negotiation => None,
            LeadStatus::Won | LeadStatus::Lost => None,
        }
    }

    pub fn can_transition(&self, to: LeadStatus) -> bool {
        if self.is_terminal() || to == *self {
            return false;
        }
        if to.is_terminal() {
            return true;
        }
        self.next_in_chain() == Some(to)
    }
}

impl FromStr for LeadStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "proposal" => Ok(LeadStatus::Proposal),
            "negotiation" => Ok(LeadStatus::Negotiation),
            "won" => Ok(LeadStatus::Won),
            "lost" => Ok(LeadStatus::Lost),
            _ => Err(()),
        }
    }
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/crm/leads", get(list_leads).post(create_lead))
        .route(
            "/api/crm/leads/:id",
            get(get_lead).put(update_lead).delete(delete_lead),
        )
        .route("/api/crm/leads/stats", get(lead_stats))
}

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub estimated_value: Option<f64>,
    #[serde(default)]
    pub score: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLeadRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub score: Option<i32>,
    #[serde(default)]
    pub estimated_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ListLeadsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

async fn create_lead(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateLeadRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    if req.name.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Lead name is required"));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let now = Utc::now();
    let lead = Lead {
        id: Uuid::new_v4(),
        business_id: tenant.business_id,
        conversation_id: None,
        name: req.name,
        external_id: None,
        channel: None,
        status: LeadStatus::New.as_str().to_string(),
        score: req.score.unwrap_or(0),
        estimated_value: req.estimated_value,
        source: req.source.or_else(|| Some("manual".to_string())),
        first_contact_at: None,
        converted_at: None,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(leads::table)
        .values(&lead)
        .execute(&mut conn)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Insert error: {e}"),
            )
        })?;

    Ok(Json(json!({ "success": true, "lead": lead })))
}

async fn list_leads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListLeadsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut q = leads::table
        .filter(leads::business_id.eq(tenant.business_id))
        .into_boxed();

    if let Some(status) = &query.status {
        let status: LeadStatus = status
            .parse()
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Unknown status filter"))?;
        q = q.filter(leads::status.eq(status.as_str()));
    }

    if let Some(search) = &query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            leads::name
                .ilike(pattern.clone())
                .or(leads::external_id.ilike(pattern)),
        );
    }

    let rows: Vec<Lead> = q
        .order(leads::updated_at.desc())
        .limit(limit)
        .offset(offset)
        .load(&mut conn)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Query error: {e}"),
            )
        })?;

    Ok(Json(json!({ "success": true, "leads": rows })))
}

async fn get_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let lead: Lead = leads::table
        .filter(leads::id.eq(id))
        .filter(leads::business_id.eq(tenant.business_id))
        .first(&mut conn)
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Lead not found"))?;

    Ok(Json(json!({ "success": true, "lead": lead })))
}

async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<UpdateLeadRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let mut lead: Lead = leads::table
        .filter(leads::id.eq(id))
        .filter(leads::business_id.eq(tenant.business_id))
        .first(&mut conn)
        .map_err(|_| api_error(StatusCode::NOT_FOUND, "Lead not found"))?;

    let now = Utc::now();

    if let Some(status_str) = &req.status {
        let current: LeadStatus = lead
            .status
            .parse()
            .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Corrupt lead status"))?;
        let target: LeadStatus = status_str
            .parse()
            .map_err(|_| api_error(StatusCode::BAD_REQUEST, "Unknown status"))?;

        if !current.can_transition(target) {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                &format!(
                    "Invalid status transition {} -> {}",
                    current.as_str(),
                    target.as_str()
                ),
            ));
        }

        if current == LeadStatus::New {
            lead.first_contact_at = Some(now);
        }
        if target == LeadStatus::Won {
            lead.converted_at = Some(now);
        }
        lead.status = target.as_str().to_string();
        info!(
            "Lead {} moved {} -> {}",
            lead.id,
            current.as_str(),
            target.as_str()
        );
    }

    if let Some(name) = req.name {
        lead.name = name;
    }
    if let Some(score) = req.score {
        lead.score = score;
    }
    if let Some(value) = req.estimated_value {
        lead.estimated_value = Some(value);
    }
    lead.updated_at = now;

    diesel::update(leads::table.filter(leads::id.eq(lead.id)))
        .set(&lead)
        .execute(&mut conn)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Update error: {e}"),
            )
        })?;

    Ok(Json(json!({ "success": true, "lead": lead })))
}

async fn delete_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let deleted = diesel::delete(
        leads::table
            .filter(leads::id.eq(id))
            .filter(leads::business_id.eq(tenant.business_id)),
    )
    .execute(&mut conn)
    .map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Delete error: {e}"),
        )
    })?;

    if deleted == 0 {
        return Err(api_error(StatusCode::NOT_FOUND, "Lead not found"));
    }

    Ok(Json(json!({ "success": true })))
}

async fn lead_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenant = tenant_from_headers(&headers)?;
    let mut conn = state
        .conn
        .get()
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("DB error: {e}")))?;

    let rows: Vec<(String, Option<f64>)> = leads::table
        .filter(leads::business_id.eq(tenant.business_id))
        .select((leads::status, leads::estimated_value))
        .load(&mut conn)
        .map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Query error: {e}"),
            )
        })?;

    Ok(Json(json!({ "success": true, "stats": summarize_leads(&rows) })))
}

pub fn summarize_leads(rows: &[(String, Option<f64>)]) -> Value {
    let mut by_status: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
    let mut pipeline_value = 0.0f64;

    for (status, value) in rows {
        *by_status.entry(status.as_str()).or_insert(0) += 1;
        let terminal = matches!(status.as_str(), "won" | "lost");
        if !terminal {
            pipeline_value += value.unwrap_or(0.0);
        }
    }

    json!({
        "total": rows.len(),
        "by_status": by_status,
        "pipeline_value": pipeline_value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_chain_transitions() {
        assert!(LeadStatus::New.can_transition(LeadStatus::Contacted));
        assert!(LeadStatus::Contacted.can_transition(LeadStatus::Qualified));
        assert!(LeadStatus::Qualified.can_transition(LeadStatus::Proposal));
        assert!(LeadStatus::Proposal.can_transition(LeadStatus::Negotiation));
    }

    #[test]
    fn test_no_stage_skipping() {
        assert!(!LeadStatus::New.can_transition(LeadStatus::Qualified));
        assert!(!LeadStatus::Contacted.can_transition(LeadStatus::Negotiation));
        assert!(!LeadStatus::Qualified.can_transition(LeadStatus::Contacted));
    }

    #[test]
    fn test_terminal_reachable_from_any_active_stage() {
        for status in [
            LeadStatus::New,
            LeadStatus::Contacted,
            LeadStatus::Qualified,
            LeadStatus::Proposal,
            LeadStatus::Negotiation,
        ] {
            assert!(status.can_transition(LeadStatus::Won));
            assert!(status.can_transition(LeadStatus::Lost));
        }
    }

    #[test]
    fn test_terminal_states_immutable() {
        assert!(!LeadStatus::Won.can_transition(LeadStatus::Lost));
        assert!(!LeadStatus::Lost.can_transition(LeadStatus::New));
        assert!(!LeadStatus::Won.can_transition(LeadStatus::Contacted));
    }

    #[test]
    fn test_self_transition_rejected() {
        assert!(!LeadStatus::Qualified.can_transition(LeadStatus::Qualified));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            LeadStatus::New,
            LeadStatus::Contacted,
            LeadStatus::Qualified,
            LeadStatus::Proposal,
            LeadStatus::Negotiation,
            LeadStatus::Won,
            LeadStatus::Lost,
        ] {
            assert_eq!(status.as_str().parse::<LeadStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_summarize_leads() {
        let rows = vec![
            ("new".to_string(), Some(100.0)),
            ("qualified".to_string(), Some(250.0)),
            ("won".to_string(), Some(1000.0)),
            ("lost".to_string(), None),
        ];
        let stats = summarize_leads(&rows);
        assert_eq!(stats["total"], 4);
        assert_eq!(stats["by_status"]["new"], 1);
        assert_eq!(stats["pipeline_value"], 350.0);
    }
}
