use crate::documents::DocumentBundle;
use crate::error::{FunctionsError, Result};
use crate::response::parse_analysis;
use crate::types::{AnalysisResult, ExpertTurn};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Reply used when the expert chat answers with nothing.
pub const CHAT_FALLBACK_REPLY: &str = "Lo siento, hubo un problema al procesar tu solicitud.";

pub const RUN_AUDIT: &str = "runAudit";
pub const CHAT_WITH_EXPERT: &str = "chatWithExpert";

/// Per-client call options.
#[derive(Debug, Clone)]
pub struct FunctionOptions {
    pub headers: Option<HashMap<String, String>>,
    /// Limit for a single attempt
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Wait before the first retry; doubles on every further retry
    pub retry_backoff: Duration,
}

impl Default for FunctionOptions {
    fn default() -> Self {
        Self {
            headers: None,
            timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl FunctionOptions {
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    status: Option<String>,
    message: String,
}

/// The two hosted operations the workflow depends on.
#[async_trait]
pub trait AuditService: Send + Sync {
    /// Cross-validate the documents of a bundle.
    async fn run_audit(&self, bundle: &DocumentBundle) -> Result<AnalysisResult>;

    /// Ask the expert assistant, given the prior conversation.
    async fn chat_with_expert(&self, history: &[ExpertTurn], message: &str) -> Result<String>;
}

/// Client for callable functions
pub struct FunctionsClient {
    base_url: Url,
    api_key: String,
    http_client: Client,
    options: FunctionOptions,
}

impl FunctionsClient {
    pub fn new(base_url: &str, api_key: &str, http_client: Client) -> Result<Self> {
        Self::with_options(base_url, api_key, http_client, FunctionOptions::default())
    }

    pub fn with_options(
        base_url: &str,
        api_key: &str,
        http_client: Client,
        options: FunctionOptions,
    ) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            api_key: api_key.to_string(),
            http_client,
            options,
        })
    }

    pub fn options(&self) -> &FunctionOptions {
        &self.options
    }

    fn function_url(&self, function_name: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FunctionsError::UrlError(url::ParseError::EmptyHost))?
            .pop_if_empty()
            .push(function_name);
        Ok(url)
    }

    /// Call a function with the callable envelope, retrying transient
    /// failures with exponential backoff.
    pub async fn invoke<T: Serialize, R: DeserializeOwned>(
        &self,
        function_name: &str,
        payload: &T,
    ) -> Result<R> {
        let attempts = self.options.max_retries + 1;
        let mut backoff = self.options.retry_backoff;
        let mut attempt = 1;
        loop {
            let call = self.invoke_once(function_name, payload);
            let outcome = match tokio::time::timeout(self.options.timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FunctionsError::Timeout(self.options.timeout)),
            };
            match outcome {
                Ok(result) => {
                    let body = result.to_string();
                    return serde_json::from_value(result)
                        .map_err(|e| FunctionsError::malformed(e.to_string(), body));
                }
                Err(e) if e.is_retryable() => {
                    if attempt >= attempts {
                        warn!("{} failed after {} attempt(s): {}", function_name, attempt, e);
                        return Err(FunctionsError::ServiceUnavailable {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                    warn!(
                        "{} attempt {}/{} failed, retrying in {:?}: {}",
                        function_name, attempt, attempts, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn invoke_once<T: Serialize>(&self, function_name: &str, payload: &T) -> Result<Value> {
        let url = self.function_url(function_name)?;
        debug!("invoking {}", url);

        let mut request = self
            .http_client
            .post(url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", &self.api_key));
        if let Some(headers) = &self.options.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let body = json!({ "data": serde_json::to_value(payload)? });
        let response = request.json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => match body.error.status {
                    Some(code) => format!("{}: {}", code, body.error.message),
                    None => body.error.message,
                },
                Err(_) => text,
            };
            return Err(FunctionsError::FunctionError {
                status: status.as_u16(),
                message,
            });
        }

        let mut envelope: Value = serde_json::from_str(&text).map_err(|e| {
            FunctionsError::malformed(format!("envelope is not JSON: {}", e), text.clone())
        })?;
        match envelope.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(FunctionsError::malformed("missing result field", text)),
        }
    }
}

#[async_trait]
impl AuditService for FunctionsClient {
    async fn run_audit(&self, bundle: &DocumentBundle) -> Result<AnalysisResult> {
        let files = bundle.encode()?;
        debug!("running audit over {} document(s)", files.len());
        let result: Value = self
            .invoke(RUN_AUDIT, &json!({ "mode": bundle.mode(), "files": files }))
            .await?;
        parse_analysis(result)
    }

    async fn chat_with_expert(&self, history: &[ExpertTurn], message: &str) -> Result<String> {
        if message.trim().is_empty() {
            return Err(FunctionsError::InvalidInput(
                "No se proporcionó ningún mensaje.".to_string(),
            ));
        }
        let result: Value = self
            .invoke(
                CHAT_WITH_EXPERT,
                &json!({ "history": history, "message": message }),
            )
            .await?;
        let reply = match &result {
            Value::String(text) => text.as_str(),
            Value::Object(map) => map.get("response").and_then(Value::as_str).unwrap_or(""),
            _ => "",
        };
        if reply.trim().is_empty() {
            return Ok(CHAT_FALLBACK_REPLY.to_string());
        }
        Ok(reply.to_string())
    }
}
