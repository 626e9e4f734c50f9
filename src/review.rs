//! Running an audit and recording it in the history.

use aduana_review_functions::{AuditService, DocumentBundle};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::history::ReportHistory;
use crate::models::{AuditSnapshot, RevisionReport, User};

/// A recorded audit: the history entry and the snapshot shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRun {
    pub report: RevisionReport,
    pub snapshot: AuditSnapshot,
}

pub struct Reviewer {
    functions: Arc<dyn AuditService>,
    history: Arc<ReportHistory>,
}

impl Reviewer {
    pub fn new(functions: Arc<dyn AuditService>, history: Arc<ReportHistory>) -> Self {
        Self { functions, history }
    }

    /// Audit a bundle of documents. Nothing is recorded unless the service
    /// returns a usable result.
    pub async fn run_audit(&self, user: &User, bundle: &DocumentBundle) -> Result<AuditRun> {
        bundle.validate()?;
        let analysis = match self.functions.run_audit(bundle).await {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(user = %user.email, error = %err, "audit failed");
                return Err(err.into());
            }
        };
        let report = self.history.record(user, &analysis).await?;
        info!(
            user = %user.email,
            pedimento = %report.pedimento_number,
            findings = report.errors.len(),
            "audit completed"
        );
        let snapshot = AuditSnapshot::from_analysis(analysis, Some(report.id.clone()));
        Ok(AuditRun { report, snapshot })
    }
}
