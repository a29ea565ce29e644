pub mod lifecycle;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::shared::enums::{TicketCategory, TicketPriority, TicketStatus, UserRole};
use crate::shared::models::{load_user_refs, UserRef};
use crate::shared::schema::{ticket_attachments, ticket_comments, ticket_history, tickets};
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Queryable, Insertable)]
#[diesel(table_name = tickets)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_number: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub category: TicketCategory,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub tags: Vec<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Insertable)]
#[diesel(table_name = ticket_comments)]
#[serde(rename_all = "camelCase")]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Insertable)]
#[diesel(table_name = ticket_history)]
#[serde(rename_all = "camelCase")]
pub struct TicketHistoryEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub description: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Queryable, Insertable)]
#[diesel(table_name = ticket_attachments)]
#[serde(rename_all = "camelCase")]
pub struct TicketAttachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub name: String,
    pub url: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied by `PUT /api/tickets/:id`. Absent fields are left
/// untouched; provided fields overwrite.
#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = tickets)]
pub struct TicketChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category: Option<TicketCategory>,
    pub assigned_to: Option<Uuid>,
    pub tags: Option<Vec<String>>,
}

// ===== Request/Response Structures =====

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTicketRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePriorityRequest {
    pub priority: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub search: Option<String>,
}

/// Ticket with user references resolved to display fields, the shape every
/// ticket-returning endpoint serializes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPayload {
    pub id: Uuid,
    pub ticket_number: String,
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub category: TicketCategory,
    pub created_by: Option<UserRef>,
    pub assigned_to: Option<UserRef>,
    pub tags: Vec<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPayload {
    pub id: Uuid,
    pub content: String,
    pub author: Option<UserRef>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPayload {
    pub id: Uuid,
    pub description: String,
    pub user: Option<UserRef>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TicketDetailPayload {
    #[serde(flatten)]
    pub ticket: TicketPayload,
    pub comments: Vec<CommentPayload>,
    pub history: Vec<HistoryPayload>,
    pub attachments: Vec<TicketAttachment>,
}

#[derive(Debug, Serialize)]
pub struct TicketsResponse {
    pub status: &'static str,
    pub count: usize,
    pub tickets: Vec<TicketPayload>,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub status: &'static str,
    pub ticket: TicketPayload,
}

#[derive(Debug, Serialize)]
pub struct TicketDetailResponse {
    pub status: &'static str,
    pub ticket: TicketDetailPayload,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub status: &'static str,
    pub comment: CommentPayload,
}

#[derive(Debug, Serialize)]
pub struct CommentsResponse {
    pub status: &'static str,
    pub comments: Vec<CommentPayload>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: &'static str,
    pub message: String,
}

fn populate(ticket: Ticket, users: &HashMap<Uuid, UserRef>) -> TicketPayload {
    TicketPayload {
        created_by: users.get(&ticket.created_by).cloned(),
        assigned_to: ticket.assigned_to.and_then(|id| users.get(&id).cloned()),
        id: ticket.id,
        ticket_number: ticket.ticket_number,
        title: ticket.title,
        description: ticket.description,
        status: ticket.status,
        priority: ticket.priority,
        category: ticket.category,
        tags: ticket.tags,
        resolved_at: ticket.resolved_at,
        closed_at: ticket.closed_at,
        created_at: ticket.created_at,
        updated_at: ticket.updated_at,
    }
}

fn populate_one(conn: &mut PgConnection, ticket: Ticket) -> Result<TicketPayload> {
    let mut ids: Vec<Uuid> = vec![ticket.created_by];
    ids.extend(ticket.assigned_to);
    let users = load_user_refs(conn, &ids)?;
    Ok(populate(ticket, &users))
}

fn populate_all(
    conn: &mut PgConnection,
    rows: Vec<Ticket>,
) -> Result<Vec<TicketPayload>> {
    let mut ids: Vec<Uuid> = Vec::new();
    for ticket in &rows {
        ids.push(ticket.created_by);
        if let Some(assignee) = ticket.assigned_to {
            ids.push(assignee);
        }
    }
    ids.sort_unstable();
    ids.dedup();
    let users = load_user_refs(conn, &ids)?;
    Ok(rows.into_iter().map(|t| populate(t, &users)).collect())
}

fn parse_status(value: &str) -> Result<TicketStatus> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid status: {}", value)))
}

fn parse_priority(value: &str) -> Result<TicketPriority> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid priority: {}", value)))
}

fn parse_category(value: &str) -> Result<TicketCategory> {
    value
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid category: {}", value)))
}

// ===== API Handlers =====

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<TicketsResponse>> {
    let mut conn = state.conn.get()?;

    let mut q = tickets::table.into_boxed();

    if let Some(status) = query.status {
        q = q.filter(tickets::status.eq(status));
    }
    if let Some(priority) = query.priority {
        q = q.filter(tickets::priority.eq(priority));
    }
    if let Some(category) = query.category {
        q = q.filter(tickets::category.eq(category));
    }
    if let Some(assigned_to) = query.assigned_to {
        q = q.filter(tickets::assigned_to.eq(assigned_to));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{}%", search);
        q = q.filter(
            tickets::title
                .ilike(pattern.clone())
                .or(tickets::description.ilike(pattern.clone()))
                .or(tickets::ticket_number.ilike(pattern)),
        );
    }

    let rows: Vec<Ticket> = q.order(tickets::created_at.desc()).load(&mut conn)?;
    let payloads = populate_all(&mut conn, rows)?;

    Ok(Json(TicketsResponse {
        status: "success",
        count: payloads.len(),
        tickets: payloads,
    }))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketDetailResponse>> {
    let mut conn = state.conn.get()?;

    let ticket = lifecycle::find_ticket(&mut conn, id)?;

    let comments: Vec<TicketComment> = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(id))
        .order(ticket_comments::created_at.asc())
        .load(&mut conn)?;
    let history: Vec<TicketHistoryEntry> = ticket_history::table
        .filter(ticket_history::ticket_id.eq(id))
        .order(ticket_history::created_at.asc())
        .load(&mut conn)?;
    let attachments: Vec<TicketAttachment> = ticket_attachments::table
        .filter(ticket_attachments::ticket_id.eq(id))
        .order(ticket_attachments::created_at.asc())
        .load(&mut conn)?;

    let mut ids: Vec<Uuid> = vec![ticket.created_by];
    ids.extend(ticket.assigned_to);
    ids.extend(comments.iter().map(|c| c.author_id));
    ids.extend(history.iter().filter_map(|h| h.user_id));
    ids.sort_unstable();
    ids.dedup();
    let users = load_user_refs(&mut conn, &ids)?;

    let detail = TicketDetailPayload {
        ticket: populate(ticket, &users),
        comments: comments
            .into_iter()
            .map(|c| CommentPayload {
                id: c.id,
                content: c.content,
                author: users.get(&c.author_id).cloned(),
                created_at: c.created_at,
            })
            .collect(),
        history: history
            .into_iter()
            .map(|h| HistoryPayload {
                id: h.id,
                description: h.description,
                user: h.user_id.and_then(|id| users.get(&id).cloned()),
                created_at: h.created_at,
            })
            .collect(),
        attachments,
    };

    Ok(Json(TicketDetailResponse {
        status: "success",
        ticket: detail,
    }))
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<TicketResponse>)> {
    let category = match req.category.as_deref() {
        Some(value) => parse_category(value)?,
        None => return Err(Error::Validation("Category is required".into())),
    };
    let priority = req.priority.as_deref().map(parse_priority).transpose()?;

    let mut conn = state.conn.get()?;

    let input = lifecycle::NewTicketInput {
        title: req.title.unwrap_or_default(),
        description: req.description.unwrap_or_default(),
        category,
        priority,
        tags: req.tags.unwrap_or_default(),
        assigned_to: None,
        status: None,
    };
    let ticket = lifecycle::create_ticket(&mut conn, input, auth.id())?;
    let payload = populate_one(&mut conn, ticket)?;

    Ok((
        StatusCode::CREATED,
        Json(TicketResponse {
            status: "success",
            ticket: payload,
        }),
    ))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> Result<Json<TicketResponse>> {
    let changes = TicketChanges {
        title: req.title,
        description: req.description,
        status: req.status.as_deref().map(parse_status).transpose()?,
        priority: req.priority.as_deref().map(parse_priority).transpose()?,
        category: req.category.as_deref().map(parse_category).transpose()?,
        assigned_to: req.assigned_to,
        tags: req.tags,
    };

    let mut conn = state.conn.get()?;
    let ticket = lifecycle::find_ticket(&mut conn, id)?;
    let updated = lifecycle::apply_changes(&mut conn, &ticket, changes, auth.id())?;
    let payload = populate_one(&mut conn, updated)?;

    Ok(Json(TicketResponse {
        status: "success",
        ticket: payload,
    }))
}

pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    auth.require_role(&[UserRole::Admin])?;

    let mut conn = state.conn.get()?;
    lifecycle::delete_ticket(&mut conn, id)?;

    Ok(Json(MessageResponse {
        status: "success",
        message: "Ticket deleted successfully".to_string(),
    }))
}

pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTicketRequest>,
) -> Result<Json<TicketResponse>> {
    auth.require_role(&[UserRole::Agent, UserRole::Manager, UserRole::Admin])?;

    let mut conn = state.conn.get()?;
    let ticket = lifecycle::find_ticket(&mut conn, id)?;
    let updated = lifecycle::assign(&mut conn, &ticket, req.user_id, auth.id())?;
    let payload = populate_one(&mut conn, updated)?;

    Ok(Json(TicketResponse {
        status: "success",
        ticket: payload,
    }))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> Result<Json<TicketResponse>> {
    let next = parse_status(&req.status)?;

    let mut conn = state.conn.get()?;
    let ticket = lifecycle::find_ticket(&mut conn, id)?;
    let updated = lifecycle::set_status(&mut conn, &ticket, next, auth.id())?;
    let payload = populate_one(&mut conn, updated)?;

    Ok(Json(TicketResponse {
        status: "success",
        ticket: payload,
    }))
}

pub async fn change_priority(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangePriorityRequest>,
) -> Result<Json<TicketResponse>> {
    auth.require_role(&[UserRole::Agent, UserRole::Manager, UserRole::Admin])?;
    let next = parse_priority(&req.priority)?;

    let mut conn = state.conn.get()?;
    let ticket = lifecycle::find_ticket(&mut conn, id)?;
    let updated = lifecycle::set_priority(&mut conn, &ticket, next, auth.id())?;
    let payload = populate_one(&mut conn, updated)?;

    Ok(Json(TicketResponse {
        status: "success",
        ticket: payload,
    }))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>)> {
    let mut conn = state.conn.get()?;
    let ticket = lifecycle::find_ticket(&mut conn, id)?;
    let comment = lifecycle::add_comment(
        &mut conn,
        &ticket,
        req.content.as_deref().unwrap_or(""),
        auth.id(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(CommentResponse {
            status: "success",
            comment: CommentPayload {
                id: comment.id,
                content: comment.content,
                author: Some(UserRef::from(&auth.0)),
                created_at: comment.created_at,
            },
        }),
    ))
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CommentsResponse>> {
    let mut conn = state.conn.get()?;
    lifecycle::find_ticket(&mut conn, id)?;

    let comments: Vec<TicketComment> = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(id))
        .order(ticket_comments::created_at.asc())
        .load(&mut conn)?;

    let mut ids: Vec<Uuid> = comments.iter().map(|c| c.author_id).collect();
    ids.sort_unstable();
    ids.dedup();
    let users = load_user_refs(&mut conn, &ids)?;

    Ok(Json(CommentsResponse {
        status: "success",
        comments: comments
            .into_iter()
            .map(|c| CommentPayload {
                id: c.id,
                content: c.content,
                author: users.get(&c.author_id).cloned(),
                created_at: c.created_at,
            })
            .collect(),
    }))
}

pub async fn my_tickets(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<TicketsResponse>> {
    let mut conn = state.conn.get()?;

    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::created_by.eq(auth.id()))
        .order(tickets::created_at.desc())
        .load(&mut conn)?;
    let payloads = populate_all(&mut conn, rows)?;

    Ok(Json(TicketsResponse {
        status: "success",
        count: payloads.len(),
        tickets: payloads,
    }))
}

pub async fn assigned_tickets(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<TicketsResponse>> {
    auth.require_role(&[UserRole::Agent, UserRole::Manager, UserRole::Admin])?;

    let mut conn = state.conn.get()?;

    let rows: Vec<Ticket> = tickets::table
        .filter(tickets::assigned_to.eq(auth.id()))
        .order(tickets::created_at.desc())
        .load(&mut conn)?;
    let payloads = populate_all(&mut conn, rows)?;

    Ok(Json(TicketsResponse {
        status: "success",
        count: payloads.len(),
        tickets: payloads,
    }))
}

pub fn configure_tickets_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/my-tickets", get(my_tickets))
        .route("/api/tickets/assigned", get(assigned_tickets))
        .route(
            "/api/tickets/:id",
            get(get_ticket).put(update_ticket).delete(delete_ticket),
        )
        .route("/api/tickets/:id/assign", post(assign_ticket))
        .route("/api/tickets/:id/status", patch(change_status))
        .route("/api/tickets/:id/priority", patch(change_priority))
        .route(
            "/api/tickets/:id/comments",
            get(list_comments).post(add_comment),
        )
}
