//! # Application State Management
//!
//! Shared state handed to every request handler through `web::Data<AppState>`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Lets every worker thread hold the same configuration
//! - **Why no lock**: Configuration is read-only once the server is up, so a
//!   plain `Arc` is enough
//!
//! ### Cloning the store
//! - [`MemoryStore`] is itself a handle around `Arc<RwLock<..>>`; cloning it
//!   shares the same collection rather than copying it

use crate::config::{AppConfig, Environment};
use crate::store::MemoryStore;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// The tour collection
    pub store: MemoryStore,

    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, store: MemoryStore) -> Self {
        Self {
            config: Arc::new(config),
            store,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    pub fn get_config(&self) -> AppConfig {
        self.config.as_ref().clone()
    }

    /// The deployment environment, which decides error verbosity.
    pub fn environment(&self) -> Environment {
        self.config.environment
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
