//! # Tours Backend - Main Application Entry Point
//!
//! REST API over a collection of tours, built on Actix-web.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: The entire application is asynchronous
//! - **modules**: Code is organized into separate modules (mod statements)
//! - **Result<T, E>**: Every failure travels as a value, never as an exception
//! - **Traits**: The query builder works against any store implementing `DocumentQuery`
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML files + environment variables)
//! - **features**: Turns request query strings into filter/sort/projection/paging
//! - **store**: The document store contract and its in-memory implementation
//! - **models**: The tour schema and its validation rules
//! - **error**: Error classification and client-facing error responses
//! - **catch_async**: Funnels handler failures and panics into one error value
//! - **middleware**: Request logging and the global error handler
//! - **handlers**: HTTP request handlers for API endpoints
//! - **health**: Health check endpoint

// Module declarations - These tell Rust about our other source files
mod catch_async; // Handler failure and panic capture (catch_async.rs)
mod config;      // Configuration management (config.rs)
mod error;       // Error classification and responses (error.rs)
mod features;    // Query string → filter/sort/fields/pages (features/ directory)
mod handlers;    // HTTP request handlers (handlers/ directory)
mod health;      // Health check endpoint (health.rs)
mod middleware;  // Request logging and global error handler (middleware/ directory)
mod models;      // Tour schema and validation (models/ directory)
mod state;       // Application state shared by handlers (state.rs)
mod store;       // Document store contract and in-memory store (store/ directory)

// External crate imports - These are dependencies from Cargo.toml
use actix_cors::Cors;  // Cross-Origin Resource Sharing support
use actix_web::{middleware::Logger, web, App, HttpServer};  // Web framework
use anyhow::Result;    // Better error handling with context
use config::AppConfig; // Our custom configuration struct
use state::AppState;   // Our custom application state
use store::MemoryStore; // The tour collection
use tracing::{error, info};  // Structured logging
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};  // Logging setup

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging** for debugging and monitoring
/// 3. **Seeds the tour store** from the configured JSON file, if any
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** on SIGINT/SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Set up structured logging (tracing); `?` returns early on failure
    init_tracing()?;

    // Load application configuration from config.toml and environment variables
    let config = AppConfig::load()?;
    // Validate that the configuration makes sense (e.g., port isn't 0)
    config.validate()?;

    // Log startup information
    info!("Starting tours-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {} ({})",
        config.bind_address(),
        config.environment
    );

    // Fill the tour collection from the seed file, if one is configured
    let store = MemoryStore::new();
    if let Some(seed_file) = &config.store.seed_file {
        store.seed_from_file(seed_file).await?;
    }

    // Shared state every HTTP request can access
    let app_state = AppState::new(config.clone(), store);
    let bind_addr = config.bind_address();

    info!("Starting HTTP server on {}", bind_addr);

    // Create the HTTP server with all its configuration
    let server = HttpServer::new(move || {
        // Configure CORS to allow web browsers to connect
        let cors = Cors::default()
            .allow_any_origin()    // Allow requests from any domain
            .allow_any_method()    // Allow GET, POST, PATCH, DELETE, etc.
            .allow_any_header()    // Allow any HTTP headers
            .max_age(3600);        // Cache CORS settings for 1 hour

        // Middleware executes in reverse order of registration for requests
        App::new()
            // Share our application state with all request handlers
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::GlobalErrorHandler)  // Render every error response
            .wrap(middleware::RequestLogging)      // Custom request logging
            .wrap(Logger::default())               // Log HTTP requests
            .wrap(cors)                            // Handle CORS
            // API routes under /api/v1, plus /health
            .configure(handlers::configure)
            // Anything no route matched becomes a 404 through the error pipeline
            .default_service(web::to(handlers::unhandled_route))
    })
    .disable_signals()  // Shutdown is driven by shutdown_signal() below
    .bind(&bind_addr)?  // Bind to the configured host and port
    .run();             // Start the server (but don't block here)

    // Get a handle to control the server and spawn it in a separate task
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Wait for either the server to finish OR a shutdown signal
    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;  // Gracefully stop the server
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "tours_backend=trace")
/// - If not set, defaults to "tours_backend=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tours_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolves on the first SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
