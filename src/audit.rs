//! Administrator corrections of an audit result.
//!
//! Every operation returns a new snapshot; the caller writes it back as a
//! whole so subscribers never observe a half-applied edit.

use crate::error::{Error, Result};
use crate::models::{AuditSnapshot, FindingStatus, PedimentoError};

/// Monetary totals derived from the findings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    /// Sum of fines of findings in error
    pub risk: f64,
    /// Sum of savings of correct findings
    pub savings: f64,
}

/// Flip one finding between `error` and `correct`. A finding forced to
/// `correct` is flagged as manually corrected; flipping it back clears the
/// flag.
pub fn toggle_finding(snapshot: &AuditSnapshot, index: usize) -> Result<AuditSnapshot> {
    let len = snapshot.validations.len();
    let mut next = snapshot.clone();
    let finding = next
        .validations
        .get_mut(index)
        .ok_or(Error::FindingOutOfRange { index, len })?;
    finding.status = finding.status.flipped();
    finding.is_manually_corrected = finding.status == FindingStatus::Correct;
    Ok(recompute(next))
}

pub fn toggle_client_override(snapshot: &AuditSnapshot) -> AuditSnapshot {
    let mut next = snapshot.clone();
    next.client_override = !next.client_override;
    recompute(next)
}

/// Overall verdict. An empty list of findings is conforme.
pub fn is_conforme(validations: &[PedimentoError], client_override: bool) -> bool {
    client_override || validations.iter().all(|v| v.status == FindingStatus::Correct)
}

/// Refresh the verdict and totals after an edit.
pub fn recompute(mut snapshot: AuditSnapshot) -> AuditSnapshot {
    snapshot.is_conforme = is_conforme(&snapshot.validations, snapshot.client_override);
    let totals = totals(&snapshot.validations);
    snapshot.total_risk = Some(format_currency(totals.risk));
    snapshot.total_savings = Some(format_currency(totals.savings));
    snapshot
}

pub fn totals(validations: &[PedimentoError]) -> Totals {
    validations.iter().fold(Totals::default(), |mut acc, v| {
        match v.status {
            FindingStatus::Error => acc.risk += parse_currency(v.potential_fine.as_deref()),
            FindingStatus::Correct => acc.savings += parse_currency(v.savings.as_deref()),
        }
        acc
    })
}

/// Read an amount such as `USD $1,234.50`. Anything but digits, `.` and `-`
/// is dropped; unreadable input counts as zero.
pub fn parse_currency(value: Option<&str>) -> f64 {
    let cleaned: String = value
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// `USD $1,234.50`
pub fn format_currency(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("USD {}${}.{:02}", sign, grouped, cents % 100)
}
