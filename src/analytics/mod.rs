//! Read-only derived statistics over the ticket store: dashboard counts,
//! mean time to resolution, SLA compliance, and per-agent performance.
//!
//! Every endpoint recomputes from the store's current contents; nothing is
//! cached. The numeric rules live in pure functions so the math is
//! testable without a database.

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::shared::enums::{TicketCategory, TicketStatus, UserRole};
use crate::shared::models::User;
use crate::shared::schema::{tickets, users};
use crate::shared::state::AppState;
use crate::tickets::Ticket;

/// Fixed service-level threshold: a resolved ticket is compliant when it
/// was resolved within this many hours of creation.
pub const SLA_THRESHOLD_HOURS: f64 = 24.0;

pub const RECENT_ACTIVITY_DAYS: i64 = 7;
pub const RECENT_ACTIVITY_LIMIT: i64 = 10;

// ============================================================================
// Pure computations
// ============================================================================

pub fn resolution_hours(created_at: DateTime<Utc>, resolved_at: DateTime<Utc>) -> f64 {
    (resolved_at - created_at).num_milliseconds() as f64 / (1000.0 * 60.0 * 60.0)
}

/// Arithmetic mean of resolution times in hours; 0 for an empty set.
pub fn mean_resolution_hours(spans: &[(DateTime<Utc>, DateTime<Utc>)]) -> f64 {
    if spans.is_empty() {
        return 0.0;
    }
    let total: f64 = spans
        .iter()
        .map(|(created, resolved)| resolution_hours(*created, *resolved))
        .sum();
    total / spans.len() as f64
}

pub fn format_hours(hours: f64) -> String {
    format!("{:.1}h", hours)
}

/// Integer percentage of the resolved set within the SLA threshold; 0 for
/// an empty set.
pub fn sla_compliance_percent(spans: &[(DateTime<Utc>, DateTime<Utc>)]) -> i64 {
    if spans.is_empty() {
        return 0;
    }
    let compliant = spans
        .iter()
        .filter(|(created, resolved)| {
            resolution_hours(*created, *resolved) <= SLA_THRESHOLD_HOURS
        })
        .count();
    ((compliant as f64 / spans.len() as f64) * 100.0).round() as i64
}

#[derive(Debug, Serialize)]
pub struct CategoryShare {
    pub name: TicketCategory,
    pub count: i64,
    pub percentage: i64,
}

/// Percentage share per category. The division is undefined for an empty
/// collection, so zero total maps every share to 0.
pub fn category_breakdown(counts: &[(TicketCategory, i64)], total: i64) -> Vec<CategoryShare> {
    counts
        .iter()
        .map(|(category, count)| CategoryShare {
            name: *category,
            count: *count,
            percentage: if total == 0 {
                0
            } else {
                ((*count as f64 / total as f64) * 100.0).round() as i64
            },
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: i64,
}

/// Counts per category sorted descending, names prettified for display.
pub fn sorted_category_counts(counts: &[(TicketCategory, i64)]) -> Vec<CategoryCount> {
    let mut rows: Vec<CategoryCount> = counts
        .iter()
        .map(|(category, count)| CategoryCount {
            name: category.display_name(),
            count: *count,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

pub fn recent_window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(RECENT_ACTIVITY_DAYS)
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RecentCreator {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentTicket {
    pub id: Uuid,
    pub title: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<RecentCreator>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub status: &'static str,
    pub total_tickets: i64,
    pub open_tickets: i64,
    pub in_progress_tickets: i64,
    pub resolved_tickets: i64,
    pub tickets_by_category: Vec<CategoryShare>,
    pub recent_activity: Vec<RecentTicket>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatsResponse {
    pub status: &'static str,
    pub mttr: String,
    pub sla_compliance: i64,
    pub total_resolved: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformance {
    pub name: String,
    pub assigned: i64,
    pub resolved: i64,
    pub avg_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformanceResponse {
    pub status: &'static str,
    pub agent_performance: Vec<AgentPerformance>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStatsResponse {
    pub status: &'static str,
    pub category_stats: Vec<CategoryCount>,
}

// ============================================================================
// Queries + handlers
// ============================================================================

fn count_by_status(conn: &mut PgConnection, status: TicketStatus) -> Result<i64> {
    let count = tickets::table
        .filter(tickets::status.eq(status))
        .count()
        .get_result(conn)?;
    Ok(count)
}

fn category_counts(conn: &mut PgConnection) -> Result<Vec<(TicketCategory, i64)>> {
    let counts = tickets::table
        .group_by(tickets::category)
        .select((tickets::category, count_star()))
        .load(conn)?;
    Ok(counts)
}

/// Resolution spans (created_at, resolved_at) over tickets that are
/// resolved and carry a resolution timestamp.
fn resolved_spans(
    conn: &mut PgConnection,
    assignee: Option<Uuid>,
) -> Result<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
    let mut q = tickets::table
        .filter(tickets::status.eq(TicketStatus::Resolved))
        .filter(tickets::resolved_at.is_not_null())
        .select((tickets::created_at, tickets::resolved_at))
        .into_boxed();
    if let Some(assignee) = assignee {
        q = q.filter(tickets::assigned_to.eq(assignee));
    }
    let rows: Vec<(DateTime<Utc>, Option<DateTime<Utc>>)> = q.load(conn)?;
    Ok(rows
        .into_iter()
        .filter_map(|(created, resolved)| resolved.map(|r| (created, r)))
        .collect())
}

pub async fn get_dashboard_stats(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
) -> Result<Json<DashboardResponse>> {
    let mut conn = state.conn.get()?;

    let total_tickets: i64 = tickets::table.count().get_result(&mut conn)?;
    let open_tickets = count_by_status(&mut conn, TicketStatus::Open)?;
    let in_progress_tickets = count_by_status(&mut conn, TicketStatus::InProgress)?;
    let resolved_tickets = count_by_status(&mut conn, TicketStatus::Resolved)?;

    let tickets_by_category = category_breakdown(&category_counts(&mut conn)?, total_tickets);

    let window_start = recent_window_start(Utc::now());
    let recent: Vec<Ticket> = tickets::table
        .filter(tickets::created_at.ge(window_start))
        .order(tickets::created_at.desc())
        .limit(RECENT_ACTIVITY_LIMIT)
        .load(&mut conn)?;

    let mut creator_ids: Vec<Uuid> = recent.iter().map(|t| t.created_by).collect();
    creator_ids.sort_unstable();
    creator_ids.dedup();
    let creators = crate::shared::models::load_user_refs(&mut conn, &creator_ids)?;

    let recent_activity = recent
        .into_iter()
        .map(|t| RecentTicket {
            id: t.id,
            title: t.title,
            status: t.status,
            created_at: t.created_at,
            created_by: creators.get(&t.created_by).map(|u| RecentCreator {
                id: u.id,
                name: u.name.clone(),
            }),
        })
        .collect();

    Ok(Json(DashboardResponse {
        status: "success",
        total_tickets,
        open_tickets,
        in_progress_tickets,
        resolved_tickets,
        tickets_by_category,
        recent_activity,
    }))
}

pub async fn get_ticket_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<TicketStatsResponse>> {
    auth.require_role(&[UserRole::Manager, UserRole::Admin])?;

    let mut conn = state.conn.get()?;
    let spans = resolved_spans(&mut conn, None)?;

    Ok(Json(TicketStatsResponse {
        status: "success",
        mttr: format_hours(mean_resolution_hours(&spans)),
        sla_compliance: sla_compliance_percent(&spans),
        total_resolved: spans.len(),
    }))
}

pub async fn get_agent_performance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AgentPerformanceResponse>> {
    auth.require_role(&[UserRole::Manager, UserRole::Admin])?;

    let mut conn = state.conn.get()?;

    let agents: Vec<User> = users::table
        .filter(users::role.eq_any([UserRole::Agent, UserRole::Manager]))
        .order(users::name.asc())
        .load(&mut conn)?;

    let mut agent_performance = Vec::with_capacity(agents.len());
    for agent in agents {
        let assigned: i64 = tickets::table
            .filter(tickets::assigned_to.eq(agent.id))
            .count()
            .get_result(&mut conn)?;
        let resolved: i64 = tickets::table
            .filter(tickets::assigned_to.eq(agent.id))
            .filter(tickets::status.eq(TicketStatus::Resolved))
            .count()
            .get_result(&mut conn)?;
        let spans = resolved_spans(&mut conn, Some(agent.id))?;

        agent_performance.push(AgentPerformance {
            name: agent.name,
            assigned,
            resolved,
            avg_time: format!("{:.1}", mean_resolution_hours(&spans)),
        });
    }

    Ok(Json(AgentPerformanceResponse {
        status: "success",
        agent_performance,
    }))
}

pub async fn get_category_stats(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<CategoryStatsResponse>> {
    auth.require_role(&[UserRole::Manager, UserRole::Admin])?;

    let mut conn = state.conn.get()?;
    let category_stats = sorted_category_counts(&category_counts(&mut conn)?);

    Ok(Json(CategoryStatsResponse {
        status: "success",
        category_stats,
    }))
}

pub fn configure_analytics_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/analytics/dashboard", get(get_dashboard_stats))
        .route("/api/analytics/tickets", get(get_ticket_stats))
        .route("/api/analytics/agents", get(get_agent_performance))
        .route("/api/analytics/categories", get(get_category_stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(hours: f64) -> (DateTime<Utc>, DateTime<Utc>) {
        let created = Utc::now();
        (
            created,
            created + Duration::milliseconds((hours * 3_600_000.0) as i64),
        )
    }

    #[test]
    fn mttr_of_single_five_hour_ticket() {
        let spans = vec![span(5.0)];
        let mttr = mean_resolution_hours(&spans);
        assert_eq!(format_hours(mttr), "5.0h");
        assert_eq!(sla_compliance_percent(&spans), 100);
    }

    #[test]
    fn thirty_hour_resolution_misses_sla() {
        let spans = vec![span(30.0)];
        assert_eq!(sla_compliance_percent(&spans), 0);
    }

    #[test]
    fn empty_resolved_set_yields_zeroes() {
        let spans: Vec<(DateTime<Utc>, DateTime<Utc>)> = vec![];
        assert_eq!(format_hours(mean_resolution_hours(&spans)), "0.0h");
        assert_eq!(sla_compliance_percent(&spans), 0);
    }

    #[test]
    fn mttr_is_the_arithmetic_mean() {
        let spans = vec![span(2.0), span(4.0), span(6.0)];
        let mttr = mean_resolution_hours(&spans);
        assert!((mttr - 4.0).abs() < 0.01);
        assert_eq!(format_hours(mttr), "4.0h");
    }

    #[test]
    fn sla_counts_boundary_as_compliant() {
        let spans = vec![span(24.0), span(24.1)];
        assert_eq!(sla_compliance_percent(&spans), 50);
    }

    #[test]
    fn category_percentages_sum_to_about_100() {
        let counts = vec![
            (TicketCategory::ItSupport, 1),
            (TicketCategory::Hr, 1),
            (TicketCategory::Facilities, 1),
        ];
        let shares = category_breakdown(&counts, 3);
        let sum: i64 = shares.iter().map(|s| s.percentage).sum();
        assert!((sum - 100).abs() <= 2, "sum was {}", sum);
    }

    #[test]
    fn zero_tickets_special_cases_percentage() {
        let counts: Vec<(TicketCategory, i64)> = vec![];
        assert!(category_breakdown(&counts, 0).is_empty());

        // A stale count row with a zero total must not divide by zero.
        let counts = vec![(TicketCategory::Other, 0)];
        let shares = category_breakdown(&counts, 0);
        assert_eq!(shares[0].percentage, 0);
    }

    #[test]
    fn category_stats_sort_descending_with_display_names() {
        let counts = vec![
            (TicketCategory::Hr, 2),
            (TicketCategory::ItSupport, 5),
            (TicketCategory::Finance, 3),
        ];
        let rows = sorted_category_counts(&counts);
        assert_eq!(rows[0].name, "It Support");
        assert_eq!(rows[0].count, 5);
        assert_eq!(rows[1].name, "Finance");
        assert_eq!(rows[2].name, "Hr");
    }

    #[test]
    fn recent_window_is_seven_days() {
        let now = Utc::now();
        assert_eq!(now - recent_window_start(now), Duration::days(7));
    }
}
