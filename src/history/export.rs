//! Monthly CSV export of the report history.

use crate::models::{FindingStatus, RevisionReport};

const HEADERS: [&str; 9] = [
    "Numero de Pedimento",
    "Nombre del Elaborador",
    "Fecha",
    "Hora",
    "Total de Errores",
    "Campo con Mas Errores",
    "Error Mas Frecuente",
    "Estatus Final",
    "Mitigacion (IA)",
];

const NOT_AVAILABLE: &str = "N/A";

/// Error statistics of one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorStats {
    pub total: usize,
    pub top_field: String,
    pub top_error: String,
}

pub fn error_stats(report: &RevisionReport) -> ErrorStats {
    let errors: Vec<_> = report
        .errors
        .iter()
        .filter(|e| e.status == FindingStatus::Error)
        .collect();
    if errors.is_empty() {
        return ErrorStats {
            total: 0,
            top_field: NOT_AVAILABLE.to_string(),
            top_error: NOT_AVAILABLE.to_string(),
        };
    }
    ErrorStats {
        total: errors.len(),
        top_field: most_frequent(errors.iter().map(|e| e.field.as_str())),
        top_error: most_frequent(errors.iter().map(|e| e.error.as_str())),
    }
}

// Ties go to the value seen last among the first appearances.
fn most_frequent<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    counts
        .into_iter()
        .reduce(|best, next| if best.1 > next.1 { best } else { next })
        .map(|(v, _)| v.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Verdict as printed in exports.
pub fn final_status(report: &RevisionReport) -> &'static str {
    match (report.is_conforme, report.client_override) {
        (true, true) => "CONFORME (AUTORIZADO POR OVERRIDE DE CLIENTE)",
        (true, false) => "CONFORME",
        (false, _) => "NO CONFORME",
    }
}

/// Render reports as an ASCII CSV document, one row per report.
pub fn export_csv(reports: &[RevisionReport]) -> String {
    let mut lines = Vec::with_capacity(reports.len() + 1);
    lines.push(HEADERS.join(","));
    for report in reports {
        let stats = error_stats(report);
        let row = [
            report.pedimento_number.clone(),
            report.user_name.clone(),
            report.date.format("%d/%m/%Y").to_string(),
            report.date.format("%H:%M:%S").to_string(),
            stats.total.to_string(),
            stats.top_field,
            stats.top_error,
            final_status(report).to_string(),
            report
                .recommendations
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        ];
        let quoted: Vec<String> = row.iter().map(|field| quote(&to_ascii(field))).collect();
        lines.push(quoted.join(","));
    }
    lines.join("\n")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Replace accented Latin letters by their base letter and drop Spanish
/// inverted punctuation. Anything else outside ASCII becomes `?`.
pub fn to_ascii(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        let replacement = match c {
            'á' | 'à' | 'ä' | 'â' => "a",
            'é' | 'è' | 'ë' | 'ê' => "e",
            'í' | 'ì' | 'ï' | 'î' => "i",
            'ó' | 'ò' | 'ö' | 'ô' => "o",
            'ú' | 'ù' | 'ü' | 'û' => "u",
            'Á' | 'À' | 'Ä' | 'Â' => "A",
            'É' | 'È' | 'Ë' | 'Ê' => "E",
            'Í' | 'Ì' | 'Ï' | 'Î' => "I",
            'Ó' | 'Ò' | 'Ö' | 'Ô' => "O",
            'Ú' | 'Ù' | 'Ü' | 'Û' => "U",
            'ñ' => "n",
            'Ñ' => "N",
            'ç' => "c",
            'Ç' => "C",
            '¿' | '¡' => "",
            '\u{a0}' => " ",
            _ => "?",
        };
        out.push_str(replacement);
    }
    out
}
