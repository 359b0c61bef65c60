//! # Web Layer
//!
//! The upload page, media serving and the HTTP accept loop.

pub mod form;
pub mod handlers;
pub mod server;
pub mod templates;

use crate::classifier::GrainClassifier;
use crate::config::AppConfig;
use crate::storage::MediaStore;

/// Immutable state shared by all connections
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: MediaStore,
    pub classifier: GrainClassifier,
}

impl AppState {
    /// Build the state from a validated configuration
    pub fn new(config: AppConfig) -> Self {
        let store = MediaStore::new(config.media.root.clone());
        let classifier = GrainClassifier::new(config.classifier.clone(), store.clone());
        Self {
            config,
            store,
            classifier,
        }
    }
}

pub use handlers::handle_request;
pub use server::{spawn_web_server, start_web_server};
