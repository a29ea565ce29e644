pub mod analytics;
pub mod api_router;
pub mod auth;
pub mod config;
pub mod error;
pub mod seed;
pub mod shared;
pub mod tickets;
pub mod users;
