use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use deskserver::api_router::configure_api_routes;
use deskserver::config::AppConfig;
use deskserver::seed;
use deskserver::shared::state::AppState;
use deskserver::shared::utils::{create_conn, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if let Some(command) = args.get(1) {
        match command.as_str() {
            "seed" => return seed::run(),
            "--help" | "-h" => {
                println!("Usage: deskserver [COMMAND]");
                println!();
                println!("Commands:");
                println!("  seed    Load demo users and tickets, replacing existing data");
                println!();
                println!("With no command the HTTP server starts.");
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}", command);
                eprintln!("Run 'deskserver --help' for usage information");
                anyhow::bail!("Unknown command: {}", command);
            }
        }
    }

    let config = AppConfig::from_env()?;
    let pool = create_conn()?;
    run_migrations(&pool)?;

    let state = Arc::new(AppState {
        conn: pool,
        config: config.clone(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = configure_api_routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    info!(
        "Starting HTTP server on {}:{}",
        config.server.host, config.server.port
    );
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
