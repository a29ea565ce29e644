//! End-to-end lifecycle checks against a live PostgreSQL. Skipped when
//! DATABASE_URL is not set or the database is unreachable.

use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use deskserver::shared::enums::{
    TicketCategory, TicketPriority, TicketStatus, UserRole, UserStatus,
};
use deskserver::shared::models::User;
use deskserver::shared::schema::{ticket_comments, ticket_history};
use deskserver::shared::utils::{create_conn, run_migrations};
use deskserver::tickets::lifecycle::{self, NewTicketInput};
use deskserver::tickets::{TicketComment, TicketHistoryEntry};

fn insert_test_user(conn: &mut PgConnection, role: UserRole) -> User {
    use deskserver::shared::schema::users;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: "Lifecycle Tester".to_string(),
        email: format!("lifecycle-{}@test.local", Uuid::new_v4()),
        password_hash: "not-a-real-hash".to_string(),
        role,
        department: "it".to_string(),
        status: UserStatus::Active,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(users::table)
        .values(&user)
        .execute(conn)
        .expect("insert test user");
    user
}

fn history_of(conn: &mut PgConnection, ticket_id: Uuid) -> Vec<TicketHistoryEntry> {
    ticket_history::table
        .filter(ticket_history::ticket_id.eq(ticket_id))
        .order(ticket_history::created_at.asc())
        .load(conn)
        .expect("load history")
}

#[test]
fn ticket_lifecycle_against_postgres() {
    dotenvy::dotenv().ok();

    let pool = match create_conn() {
        Ok(pool) => pool,
        Err(_) => {
            println!("Skipping test - PostgreSQL not available");
            return;
        }
    };
    if run_migrations(&pool).is_err() {
        println!("Skipping test - cannot run migrations");
        return;
    }
    let mut conn = match pool.get() {
        Ok(conn) => conn,
        Err(_) => {
            println!("Skipping test - cannot get connection");
            return;
        }
    };

    let creator = insert_test_user(&mut conn, UserRole::User);
    let agent = insert_test_user(&mut conn, UserRole::Agent);

    let ticket = lifecycle::create_ticket(
        &mut conn,
        NewTicketInput {
            title: "VPN issue".to_string(),
            description: "VPN keeps disconnecting.".to_string(),
            category: TicketCategory::ItSupport,
            priority: None,
            tags: vec!["network".to_string()],
            assigned_to: None,
            status: None,
        },
        creator.id,
    )
    .expect("create ticket");

    assert!(ticket.ticket_number.starts_with("TKT-"));
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(ticket.priority, TicketPriority::Medium);
    assert!(ticket.resolved_at.is_none());

    let history = history_of(&mut conn, ticket.id);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].description, "Ticket created");
    assert_eq!(history[0].user_id, Some(creator.id));

    // Numbers are strictly increasing across sequential creates.
    let second = lifecycle::create_ticket(
        &mut conn,
        NewTicketInput {
            title: "Second ticket".to_string(),
            description: "Another one.".to_string(),
            category: TicketCategory::Other,
            priority: Some(TicketPriority::Low),
            tags: Vec::new(),
            assigned_to: None,
            status: None,
        },
        creator.id,
    )
    .expect("create second ticket");
    assert!(second.ticket_number > ticket.ticket_number);

    // Resolving stamps resolved_at and records the transition.
    let resolved =
        lifecycle::set_status(&mut conn, &ticket, TicketStatus::Resolved, agent.id)
            .expect("resolve ticket");
    assert!(resolved.resolved_at.is_some());
    let history = history_of(&mut conn, ticket.id);
    assert_eq!(
        history.last().unwrap().description,
        "Status changed from open to resolved"
    );

    // Same-status update is a no-op: no new history entry.
    let before = history.len();
    lifecycle::set_status(&mut conn, &resolved, TicketStatus::Resolved, agent.id)
        .expect("no-op status");
    assert_eq!(history_of(&mut conn, ticket.id).len(), before);

    // Moving away from resolved leaves the timestamp in place.
    let reopened = lifecycle::set_status(&mut conn, &resolved, TicketStatus::Open, agent.id)
        .expect("reopen ticket");
    assert_eq!(reopened.resolved_at, resolved.resolved_at);

    // Assignment always logs, including same-assignee reassignment.
    let assigned =
        lifecycle::assign(&mut conn, &reopened, agent.id, agent.id).expect("assign");
    assert_eq!(assigned.assigned_to, Some(agent.id));
    let count_after_first = history_of(&mut conn, ticket.id)
        .iter()
        .filter(|h| h.description == "Ticket assigned")
        .count();
    lifecycle::assign(&mut conn, &assigned, agent.id, agent.id).expect("reassign");
    let count_after_second = history_of(&mut conn, ticket.id)
        .iter()
        .filter(|h| h.description == "Ticket assigned")
        .count();
    assert_eq!(count_after_second, count_after_first + 1);

    // Empty comments are rejected and leave no trace.
    let before = history_of(&mut conn, ticket.id).len();
    assert!(lifecycle::add_comment(&mut conn, &assigned, "  ", agent.id).is_err());
    assert_eq!(history_of(&mut conn, ticket.id).len(), before);

    let comment = lifecycle::add_comment(&mut conn, &assigned, "Looking into it", agent.id)
        .expect("add comment");
    assert_eq!(comment.content, "Looking into it");
    assert_eq!(
        history_of(&mut conn, ticket.id).last().unwrap().description,
        "Comment added"
    );

    // Deleting the ticket cascades its children.
    lifecycle::delete_ticket(&mut conn, ticket.id).expect("delete ticket");
    let orphans: Vec<TicketComment> = ticket_comments::table
        .filter(ticket_comments::ticket_id.eq(ticket.id))
        .load(&mut conn)
        .expect("load comments");
    assert!(orphans.is_empty());
    assert!(history_of(&mut conn, ticket.id).is_empty());

    // Unknown ids surface NotFound.
    assert!(lifecycle::find_ticket(&mut conn, Uuid::new_v4()).is_err());

    lifecycle::delete_ticket(&mut conn, second.id).ok();
}
