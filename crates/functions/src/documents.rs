use crate::error::{FunctionsError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::path::Path;

/// An uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl DocumentFile {
    pub fn new(name: &str, mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            data,
        }
    }

    /// Read a file from disk, guessing the MIME type from its extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let mime_type = match extension.as_str() {
            "pdf" => "application/pdf",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "xml" => "application/xml",
            _ => "application/octet-stream",
        };
        Ok(Self::new(&name, mime_type, data))
    }
}

/// What a run audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMode {
    /// Cross-validation of pedimento, invoices and COVE.
    Full,
    /// Review of a certificate of origin on its own.
    CertificateOnly,
}

/// A document as sent to the audit function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedDocument {
    pub label: String,
    pub name: String,
    pub mime_type: String,
    /// Base64 content
    pub data: String,
}

/// Inputs of one audit run.
#[derive(Debug, Clone)]
pub struct DocumentBundle {
    mode: AuditMode,
    pedimento: Option<DocumentFile>,
    invoices: Vec<DocumentFile>,
    cove: Option<DocumentFile>,
    certificate: Option<DocumentFile>,
    include_certificate: bool,
}

impl DocumentBundle {
    /// Bundle for a full audit; the pedimento is required.
    pub fn audit() -> Self {
        Self {
            mode: AuditMode::Full,
            pedimento: None,
            invoices: Vec::new(),
            cove: None,
            certificate: None,
            include_certificate: false,
        }
    }

    /// Bundle reviewing only a certificate of origin.
    pub fn certificate_only(certificate: DocumentFile) -> Self {
        Self {
            mode: AuditMode::CertificateOnly,
            certificate: Some(certificate),
            include_certificate: true,
            ..Self::audit()
        }
    }

    pub fn pedimento(mut self, file: DocumentFile) -> Self {
        self.pedimento = Some(file);
        self
    }

    pub fn invoice(mut self, file: DocumentFile) -> Self {
        self.invoices.push(file);
        self
    }

    pub fn cove(mut self, file: DocumentFile) -> Self {
        self.cove = Some(file);
        self
    }

    /// Attach a certificate of origin. In a full audit it is only sent when
    /// [`DocumentBundle::include_certificate`] is on.
    pub fn certificate(mut self, file: DocumentFile) -> Self {
        self.certificate = Some(file);
        self
    }

    pub fn include_certificate(mut self, include: bool) -> Self {
        self.include_certificate = include;
        self
    }

    pub fn mode(&self) -> AuditMode {
        self.mode
    }

    /// Check required inputs before anything leaves the process.
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            AuditMode::Full if self.pedimento.is_none() => Err(FunctionsError::MissingDocument(
                "El Pedimento es obligatorio.".to_string(),
            )),
            AuditMode::CertificateOnly if self.certificate.is_none() => {
                Err(FunctionsError::MissingDocument(
                    "Por favor, carga el certificado de origen.".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// Labelled, base64 encoded documents in the order the prompt expects.
    pub fn encode(&self) -> Result<Vec<EncodedDocument>> {
        self.validate()?;
        let mut out = Vec::new();
        if self.mode == AuditMode::Full {
            if let Some(file) = &self.pedimento {
                out.push(encode_one("DOCUMENTO: PEDIMENTO", file));
            }
            for (i, file) in self.invoices.iter().enumerate() {
                out.push(encode_one(&format!("DOCUMENTO: FACTURA/EVIDENCIA {}", i + 1), file));
            }
            if let Some(file) = &self.cove {
                out.push(encode_one("DOCUMENTO: COVE", file));
            }
        }
        if self.include_certificate {
            if let Some(file) = &self.certificate {
                out.push(encode_one("DOCUMENTO: CERTIFICADO DE ORIGEN", file));
            }
        }
        Ok(out)
    }
}

fn encode_one(label: &str, file: &DocumentFile) -> EncodedDocument {
    EncodedDocument {
        label: label.to_string(),
        name: file.name.clone(),
        mime_type: file.mime_type.clone(),
        data: STANDARD.encode(&file.data),
    }
}
