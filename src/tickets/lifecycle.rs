//! Ticket lifecycle engine: creation, state transitions, assignment,
//! comments, and the append-only audit history every mutation feeds.
//!
//! Transition planning is separated from persistence: the `plan_*`
//! functions decide what a mutation does (history text, timestamp stamps)
//! and the store operations apply those decisions with diesel.

use chrono::{DateTime, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use diesel::PgConnection;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::shared::enums::{TicketCategory, TicketPriority, TicketStatus};
use crate::shared::models::find_user;
use crate::shared::schema::{ticket_comments, ticket_history, tickets};

use super::{Ticket, TicketComment, TicketChanges};

pub const TITLE_MAX_CHARS: usize = 200;

pub const CREATED_HISTORY: &str = "Ticket created";
pub const ASSIGNED_HISTORY: &str = "Ticket assigned";
pub const COMMENT_HISTORY: &str = "Comment added";

// ============================================================================
// Planning
// ============================================================================

/// Effects of a status transition: the audit line plus any timestamp the
/// new status stamps on entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub history: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Plans a status transition. Returns `None` when the status does not
/// change: no history entry, no timestamps touched. Every entry into
/// `resolved` restamps `resolved_at` (likewise `closed`/`closed_at`);
/// leaving those states never clears the timestamps.
pub fn plan_status_change(
    current: TicketStatus,
    next: TicketStatus,
    now: DateTime<Utc>,
) -> Option<StatusChange> {
    if current == next {
        return None;
    }
    Some(StatusChange {
        history: format!("Status changed from {} to {}", current, next),
        resolved_at: (next == TicketStatus::Resolved).then_some(now),
        closed_at: (next == TicketStatus::Closed).then_some(now),
    })
}

/// Plans a priority change, returning the audit line, or `None` when the
/// priority is unchanged.
pub fn plan_priority_change(
    current: TicketPriority,
    next: TicketPriority,
) -> Option<String> {
    (current != next).then(|| format!("Priority changed from {} to {}", current, next))
}

pub fn format_ticket_number(seq: i64) -> String {
    format!("TKT-{:06}", seq)
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(Error::Validation("Title is required".into()));
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(Error::Validation(
            "Title cannot exceed 200 characters".into(),
        ));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.trim().is_empty() {
        return Err(Error::Validation("Description is required".into()));
    }
    Ok(())
}

pub fn validate_comment(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::Validation("Comment content is required".into()));
    }
    Ok(())
}

// ============================================================================
// Store operations
// ============================================================================

/// Draws the next display number from the database sequence, so concurrent
/// creates cannot hand out the same number.
pub fn next_ticket_number(conn: &mut PgConnection) -> Result<String> {
    let seq: i64 = diesel::select(sql::<BigInt>("nextval('ticket_number_seq')"))
        .get_result(conn)?;
    Ok(format_ticket_number(seq))
}

pub fn find_ticket(conn: &mut PgConnection, id: Uuid) -> Result<Ticket> {
    tickets::table
        .filter(tickets::id.eq(id))
        .first(conn)
        .optional()?
        .ok_or_else(|| Error::NotFound("Ticket not found".into()))
}

/// Appends an audit entry. History rows are insert-only; nothing in the
/// crate updates or deletes them.
pub fn append_history(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    description: &str,
    user_id: Option<Uuid>,
) -> Result<()> {
    diesel::insert_into(ticket_history::table)
        .values((
            ticket_history::id.eq(Uuid::new_v4()),
            ticket_history::ticket_id.eq(ticket_id),
            ticket_history::description.eq(description),
            ticket_history::user_id.eq(user_id),
            ticket_history::created_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

pub struct NewTicketInput {
    pub title: String,
    pub description: String,
    pub category: TicketCategory,
    pub priority: Option<TicketPriority>,
    pub tags: Vec<String>,
    pub assigned_to: Option<Uuid>,
    pub status: Option<TicketStatus>,
}

pub fn create_ticket(
    conn: &mut PgConnection,
    input: NewTicketInput,
    created_by: Uuid,
) -> Result<Ticket> {
    validate_title(&input.title)?;
    validate_description(&input.description)?;

    if find_user(conn, created_by)?.is_none() {
        return Err(Error::NotFound("User not found".into()));
    }

    let now = Utc::now();
    let status = input.status.unwrap_or_default();
    let ticket = Ticket {
        id: Uuid::new_v4(),
        ticket_number: next_ticket_number(conn)?,
        title: input.title.trim().to_string(),
        description: input.description,
        status,
        priority: input.priority.unwrap_or_default(),
        category: input.category,
        created_by,
        assigned_to: input.assigned_to,
        tags: input.tags,
        resolved_at: (status == TicketStatus::Resolved).then_some(now),
        closed_at: (status == TicketStatus::Closed).then_some(now),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(tickets::table)
        .values(&ticket)
        .execute(conn)?;

    append_history(conn, ticket.id, CREATED_HISTORY, Some(created_by))?;

    Ok(ticket)
}

/// Applies a status transition, stamping `resolved_at`/`closed_at` on entry
/// and recording the audit line. Same-status calls are no-ops.
pub fn set_status(
    conn: &mut PgConnection,
    ticket: &Ticket,
    next: TicketStatus,
    acting_user: Uuid,
) -> Result<Ticket> {
    let now = Utc::now();
    let Some(change) = plan_status_change(ticket.status, next, now) else {
        return Ok(ticket.clone());
    };

    diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
        .set((tickets::status.eq(next), tickets::updated_at.eq(now)))
        .execute(conn)?;

    if let Some(resolved_at) = change.resolved_at {
        diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
            .set(tickets::resolved_at.eq(Some(resolved_at)))
            .execute(conn)?;
    }
    if let Some(closed_at) = change.closed_at {
        diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
            .set(tickets::closed_at.eq(Some(closed_at)))
            .execute(conn)?;
    }

    append_history(conn, ticket.id, &change.history, Some(acting_user))?;

    find_ticket(conn, ticket.id)
}

/// Applies a priority change with its audit line. Same-priority calls are
/// no-ops.
pub fn set_priority(
    conn: &mut PgConnection,
    ticket: &Ticket,
    next: TicketPriority,
    acting_user: Uuid,
) -> Result<Ticket> {
    let Some(history) = plan_priority_change(ticket.priority, next) else {
        return Ok(ticket.clone());
    };

    diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
        .set((tickets::priority.eq(next), tickets::updated_at.eq(Utc::now())))
        .execute(conn)?;

    append_history(conn, ticket.id, &history, Some(acting_user))?;

    find_ticket(conn, ticket.id)
}

/// Sets the assignee unconditionally and always records "Ticket assigned",
/// including when the assignee does not change.
pub fn assign(
    conn: &mut PgConnection,
    ticket: &Ticket,
    assignee: Uuid,
    acting_user: Uuid,
) -> Result<Ticket> {
    if find_user(conn, assignee)?.is_none() {
        return Err(Error::NotFound("User not found".into()));
    }

    diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
        .set((
            tickets::assigned_to.eq(Some(assignee)),
            tickets::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;

    append_history(conn, ticket.id, ASSIGNED_HISTORY, Some(acting_user))?;

    find_ticket(conn, ticket.id)
}

/// Bulk partial update. Status and priority deltas get the same history and
/// timestamp treatment as the dedicated operations; the remaining provided
/// fields overlay last-write-wins.
pub fn apply_changes(
    conn: &mut PgConnection,
    ticket: &Ticket,
    changes: TicketChanges,
    acting_user: Uuid,
) -> Result<Ticket> {
    if let Some(title) = &changes.title {
        validate_title(title)?;
    }
    if let Some(description) = &changes.description {
        validate_description(description)?;
    }

    let now = Utc::now();
    let status_change = changes
        .status
        .and_then(|next| plan_status_change(ticket.status, next, now));
    let priority_history = changes
        .priority
        .and_then(|next| plan_priority_change(ticket.priority, next));

    diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
        .set((&changes, tickets::updated_at.eq(now)))
        .execute(conn)?;

    if let Some(change) = &status_change {
        if let Some(resolved_at) = change.resolved_at {
            diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
                .set(tickets::resolved_at.eq(Some(resolved_at)))
                .execute(conn)?;
        }
        if let Some(closed_at) = change.closed_at {
            diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
                .set(tickets::closed_at.eq(Some(closed_at)))
                .execute(conn)?;
        }
    }

    if let Some(change) = status_change {
        append_history(conn, ticket.id, &change.history, Some(acting_user))?;
    }
    if let Some(history) = priority_history {
        append_history(conn, ticket.id, &history, Some(acting_user))?;
    }

    find_ticket(conn, ticket.id)
}

pub fn add_comment(
    conn: &mut PgConnection,
    ticket: &Ticket,
    content: &str,
    author: Uuid,
) -> Result<TicketComment> {
    validate_comment(content)?;

    let comment = TicketComment {
        id: Uuid::new_v4(),
        ticket_id: ticket.id,
        author_id: author,
        content: content.to_string(),
        created_at: Utc::now(),
    };

    diesel::insert_into(ticket_comments::table)
        .values(&comment)
        .execute(conn)?;

    append_history(conn, ticket.id, COMMENT_HISTORY, Some(author))?;

    diesel::update(tickets::table.filter(tickets::id.eq(ticket.id)))
        .set(tickets::updated_at.eq(Utc::now()))
        .execute(conn)?;

    Ok(comment)
}

pub fn delete_ticket(conn: &mut PgConnection, id: Uuid) -> Result<()> {
    let deleted = diesel::delete(tickets::table.filter(tickets::id.eq(id))).execute(conn)?;
    if deleted == 0 {
        return Err(Error::NotFound("Ticket not found".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_number_is_zero_padded() {
        assert_eq!(format_ticket_number(1), "TKT-000001");
        assert_eq!(format_ticket_number(42), "TKT-000042");
        assert_eq!(format_ticket_number(999_999), "TKT-999999");
        assert_eq!(format_ticket_number(1_000_000), "TKT-1000000");
    }

    #[test]
    fn same_status_is_a_no_op() {
        let now = Utc::now();
        assert!(plan_status_change(TicketStatus::Open, TicketStatus::Open, now).is_none());
        assert!(
            plan_status_change(TicketStatus::Resolved, TicketStatus::Resolved, now).is_none()
        );
    }

    #[test]
    fn entering_resolved_stamps_resolved_at() {
        let now = Utc::now();
        let change =
            plan_status_change(TicketStatus::Open, TicketStatus::Resolved, now).unwrap();
        assert_eq!(change.history, "Status changed from open to resolved");
        assert_eq!(change.resolved_at, Some(now));
        assert_eq!(change.closed_at, None);
    }

    #[test]
    fn entering_closed_stamps_closed_at() {
        let now = Utc::now();
        let change =
            plan_status_change(TicketStatus::InProgress, TicketStatus::Closed, now).unwrap();
        assert_eq!(change.history, "Status changed from in-progress to closed");
        assert_eq!(change.resolved_at, None);
        assert_eq!(change.closed_at, Some(now));
    }

    #[test]
    fn leaving_resolved_touches_no_timestamps() {
        let now = Utc::now();
        let change =
            plan_status_change(TicketStatus::Resolved, TicketStatus::Open, now).unwrap();
        assert_eq!(change.history, "Status changed from resolved to open");
        assert_eq!(change.resolved_at, None);
        assert_eq!(change.closed_at, None);
    }

    #[test]
    fn re_entering_resolved_restamps() {
        // resolved -> open -> resolved stamps a fresh timestamp on the
        // second entry.
        let later = Utc::now();
        let change =
            plan_status_change(TicketStatus::Open, TicketStatus::Resolved, later).unwrap();
        assert_eq!(change.resolved_at, Some(later));
    }

    #[test]
    fn any_status_is_reachable_from_any_other() {
        let all = [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Pending,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ];
        let now = Utc::now();
        for from in all {
            for to in all {
                if from != to {
                    assert!(plan_status_change(from, to, now).is_some());
                }
            }
        }
    }

    #[test]
    fn priority_change_history_text() {
        let history =
            plan_priority_change(TicketPriority::Medium, TicketPriority::Critical).unwrap();
        assert_eq!(history, "Priority changed from medium to critical");
        assert!(plan_priority_change(TicketPriority::Low, TicketPriority::Low).is_none());
    }

    #[test]
    fn title_validation() {
        assert!(validate_title("VPN issue").is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(200)).is_ok());
        assert!(validate_title(&"x".repeat(201)).is_err());
    }

    #[test]
    fn description_and_comment_validation() {
        assert!(validate_description("something broke").is_ok());
        assert!(validate_description("").is_err());
        assert!(validate_comment("on it").is_ok());
        assert!(validate_comment("  ").is_err());
    }
}
