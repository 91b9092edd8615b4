use std::sync::Arc;

use backend::Backend;
use config::Config;
use events::EventService;
use forum::ForumService;
use mentorship::MentorshipService;
use messaging::Messenger;
use preferences::PreferenceStore;
use reporting::ErrorReporter;
use verification::VerificationService;

pub mod backend;
pub mod badge;
pub mod config;
pub mod effects;
pub mod error;
pub mod events;
pub mod forum;
pub mod listing;
pub mod mentorship;
pub mod messaging;
pub mod middleware;
pub mod models;
pub mod preferences;
pub mod reconcile;
pub mod reporting;
pub mod routes;
pub mod session;
pub mod utils;
pub mod verification;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub reporter: Arc<dyn ErrorReporter>,
}

impl AppState {
    pub fn messenger(&self) -> Messenger {
        Messenger::new(
            self.backend.clone(),
            self.reporter.clone(),
            self.config.retry_policy(),
        )
    }

    pub fn mentorship(&self) -> MentorshipService {
        MentorshipService::new(
            self.backend.clone(),
            self.reporter.clone(),
            self.config.retry_policy(),
        )
    }

    pub fn forum(&self) -> ForumService {
        ForumService::new(
            self.backend.clone(),
            self.reporter.clone(),
            self.config.retry_policy(),
        )
    }

    pub fn events(&self) -> EventService {
        EventService::new(self.backend.clone())
    }

    pub fn verification(&self) -> VerificationService {
        VerificationService::new(
            self.backend.clone(),
            self.reporter.clone(),
            self.config.retry_policy(),
        )
    }
}
