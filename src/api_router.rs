//! Comprehensive API Router
//!
//! Combines the API endpoints from all modules into a unified router.

use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

/// Configure all API routes from all modules
pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::auth::configure_auth_routes())
        .merge(crate::users::configure_users_routes())
        .merge(crate::tickets::configure_tickets_routes())
        .merge(crate::analytics::configure_analytics_routes())
}
