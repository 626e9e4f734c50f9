//! Global report history

mod export;

use aduana_review_functions::AnalysisResult;
use aduana_review_realtime::DocumentStore;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit;
use crate::error::{Error, Result};
use crate::models::{fields, AuditSnapshot, RevisionReport, User, REPORTS, USERS};

pub use export::{error_stats, export_csv, final_status, to_ascii, ErrorStats};

/// Counters shown on the administrator dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistorySummary {
    pub audited: usize,
    pub conformes: usize,
    /// Reports with a NO CONFORME verdict
    pub risks: usize,
    pub users: usize,
}

/// Where a correction is written.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionTarget<'a> {
    /// Reviewer that produced the report
    pub user_name: &'a str,
}

pub struct ReportHistory {
    store: Arc<dyn DocumentStore>,
}

impl ReportHistory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Store the outcome of an audit run.
    pub async fn record(&self, user: &User, analysis: &AnalysisResult) -> Result<RevisionReport> {
        let report = RevisionReport {
            id: uuid::Uuid::new_v4().to_string(),
            pedimento_number: analysis.pedimento_number.clone(),
            user_name: user.name.clone(),
            date: Utc::now(),
            errors: analysis.validations.clone(),
            is_conforme: analysis.is_conforme,
            client_override: false,
            recommendations: analysis.recommendations.clone(),
            total_savings: analysis.total_savings.clone(),
            total_risk: analysis.total_risk.clone(),
        };
        self.store
            .set(REPORTS, &report.id, serde_json::to_value(&report)?)
            .await?;
        info!(
            report = %report.id,
            pedimento = %report.pedimento_number,
            conforme = report.is_conforme,
            "report recorded"
        );
        Ok(report)
    }

    /// Every report, newest first.
    pub async fn list(&self) -> Result<Vec<RevisionReport>> {
        let mut reports = self
            .store
            .list(REPORTS)
            .await?
            .iter()
            .map(|doc| doc.decode().map_err(Error::from))
            .collect::<Result<Vec<RevisionReport>>>()?;
        reports.reverse();
        Ok(reports)
    }

    pub async fn get(&self, id: &str) -> Result<Option<RevisionReport>> {
        match self.store.get(REPORTS, id).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Reports of a calendar month given as `YYYY-MM`.
    pub async fn for_month(&self, month: &str) -> Result<Vec<RevisionReport>> {
        if !is_month(month) {
            return Err(Error::validation(format!("invalid month '{}', expected YYYY-MM", month)));
        }
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.date.format("%Y-%m").to_string() == month)
            .collect())
    }

    /// Reports of a pedimento produced by a reviewer.
    pub async fn find(
        &self,
        pedimento_number: &str,
        user_name: &str,
    ) -> Result<Vec<RevisionReport>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.pedimento_number == pedimento_number && r.user_name == user_name)
            .collect())
    }

    /// Write an administrator-corrected snapshot into its report.
    ///
    /// The report is located by the snapshot's `reportId`; without one, the
    /// (pedimento, reviewer) pair must match exactly one report.
    pub async fn apply_correction(
        &self,
        target: CorrectionTarget<'_>,
        snapshot: &AuditSnapshot,
    ) -> Result<RevisionReport> {
        let report = match &snapshot.report_id {
            Some(id) => self
                .get(id)
                .await?
                .ok_or_else(|| Error::ReportNotFound(format!("report {}", id)))?,
            None => {
                let label = format!("{} / {}", snapshot.pedimento_number, target.user_name);
                let mut matches = self.find(&snapshot.pedimento_number, target.user_name).await?;
                match matches.len() {
                    0 => {
                        warn!(target = %label, "no report to correct");
                        return Err(Error::ReportNotFound(label));
                    }
                    1 => matches.remove(0),
                    n => {
                        warn!(target = %label, matches = n, "ambiguous correction target");
                        return Err(Error::AmbiguousReport { target: label, matches: n });
                    }
                }
            }
        };

        let corrected = audit::recompute(snapshot.clone());
        let doc = self
            .store
            .update(
                REPORTS,
                &report.id,
                fields(json!({
                    "errors": corrected.validations,
                    "isConforme": corrected.is_conforme,
                    "clientOverride": corrected.client_override,
                    "totalSavings": corrected.total_savings,
                    "totalRisk": corrected.total_risk,
                })),
            )
            .await?;
        debug!(report = %report.id, conforme = corrected.is_conforme, "report corrected");
        Ok(doc.decode()?)
    }

    pub async fn summary(&self) -> Result<HistorySummary> {
        let reports = self.list().await?;
        let conformes = reports.iter().filter(|r| r.is_conforme).count();
        Ok(HistorySummary {
            audited: reports.len(),
            conformes,
            risks: reports.len() - conformes,
            users: self.store.list(USERS).await?.len(),
        })
    }

    /// CSV of the reports of a month.
    pub async fn export_month(&self, month: &str) -> Result<String> {
        Ok(export_csv(&self.for_month(month).await?))
    }
}

fn is_month(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
        && matches!(
            &value[5..],
            "01" | "02" | "03" | "04" | "05" | "06" | "07" | "08" | "09" | "10" | "11" | "12"
        )
}
