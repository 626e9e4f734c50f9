//! Client for the hosted pedimento audit and expert chat functions.
//!
//! Functions are invoked with the callable envelope: the request body is
//! `{"data": ...}` and a successful answer is `{"result": ...}`.

mod client;
mod documents;
mod error;
mod response;
mod types;

pub use client::{
    AuditService, FunctionOptions, FunctionsClient, CHAT_FALLBACK_REPLY, CHAT_WITH_EXPERT,
    RUN_AUDIT,
};
pub use documents::{AuditMode, DocumentBundle, DocumentFile, EncodedDocument};
pub use error::{FunctionsError, Result};
pub use response::{clean_json_response, parse_analysis};
pub use types::{
    AnalysisResult, ExpertRole, ExpertTurn, Finding, FindingStatus, TextPart, UNKNOWN_PEDIMENTO,
};
