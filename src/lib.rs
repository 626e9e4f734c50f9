//! Pedimento audit review
//!
//! Workflow core of the customs audit review application: users run AI audits
//! of their pedimento documents, escalate to a human administrator through a
//! support desk, and administrators correct the AI findings before they land
//! in the global report history.
//!
//! Every component shares one [`DocumentStore`]; sessions of different actors
//! only communicate through it.

pub mod audit;
pub mod auth;
pub mod config;
pub mod desk;
pub mod error;
pub mod history;
pub mod models;
pub mod review;
pub mod session;

use std::sync::Arc;

use aduana_review_functions::{AuditService, FunctionsClient};
use aduana_review_realtime::{DocumentStore, MemoryStore};
use reqwest::Client;

use crate::auth::UserDirectory;
use crate::config::{ReviewConfig, ReviewOptions};
use crate::desk::SupportDesk;
use crate::error::Result;
use crate::history::ReportHistory;
use crate::models::User;
use crate::review::Reviewer;
use crate::session::UserSession;

pub use aduana_review_functions as functions;
pub use aduana_review_realtime as realtime;

/// The main entry point of the review workflow
pub struct AduanaReview {
    store: Arc<dyn DocumentStore>,
    functions: Arc<dyn AuditService>,
    options: ReviewOptions,
    users: UserDirectory,
    desk: SupportDesk,
    history: Arc<ReportHistory>,
    reviewer: Reviewer,
}

impl AduanaReview {
    /// Build the workflow on an in-process store, talking to the hosted
    /// functions described by `config`.
    ///
    /// # Example
    ///
    /// ```
    /// use aduana_review::AduanaReview;
    /// use aduana_review::config::{ReviewConfig, ReviewOptions};
    ///
    /// let config = ReviewConfig::new("https://functions.example.com", "api-key").unwrap();
    /// let review = AduanaReview::new(config, ReviewOptions::default()).unwrap();
    /// ```
    pub fn new(config: ReviewConfig, options: ReviewOptions) -> Result<Self> {
        let functions = FunctionsClient::with_options(
            config.functions_url.as_str(),
            &config.api_key,
            Client::new(),
            options.function_options(),
        )?;
        Ok(Self::with_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(functions),
            options,
        ))
    }

    /// Build the workflow on any store and AI service.
    pub fn with_parts(
        store: Arc<dyn DocumentStore>,
        functions: Arc<dyn AuditService>,
        options: ReviewOptions,
    ) -> Self {
        let history = Arc::new(ReportHistory::new(store.clone()));
        Self {
            users: UserDirectory::new(store.clone(), options.clone()),
            desk: SupportDesk::new(store.clone(), history.clone()),
            reviewer: Reviewer::new(functions.clone(), history.clone()),
            history,
            functions,
            options,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn options(&self) -> &ReviewOptions {
        &self.options
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn desk(&self) -> &SupportDesk {
        &self.desk
    }

    pub fn history(&self) -> &ReportHistory {
        &self.history
    }

    pub fn reviewer(&self) -> &Reviewer {
        &self.reviewer
    }

    /// Open the live session of a signed-in user.
    pub async fn start_session(&self, user: User) -> Result<UserSession> {
        UserSession::start(self.store.clone(), user, self.functions.clone()).await
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::{ReviewConfig, ReviewOptions};
    pub use crate::error::{Error, Result};
    pub use crate::models::{
        AppNotification, AuditSnapshot, ChatMessage, ChatRole, Finding, FindingStatus,
        NotificationStatus, RevisionReport, User,
    };
    pub use crate::session::{Delivery, Route, UserSession};
    pub use crate::AduanaReview;
    pub use aduana_review_functions::{DocumentBundle, DocumentFile};
}
