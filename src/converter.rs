use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;
use worker::wasm_bindgen::JsValue;
use worker::{Fetch, Headers, Method, Request, RequestInit};

use crate::document::ConvertedDocument;
use crate::error::ApiError;
use crate::page_query::PageRange;
use crate::upload_store::StoredUpload;

/// External document converter.
#[allow(async_fn_in_trait)]
pub trait Converter {
    /// Converts `source`, limited to `page_range` when one is given.
    async fn convert(
        &self,
        source: &StoredUpload,
        page_range: Option<PageRange>,
    ) -> Result<ConvertedDocument, ApiError>;
}

/// Client for a docling-serve `convert/source` endpoint.
#[derive(Debug, Clone)]
pub struct DoclingServeConverter {
    url: String,
    api_key: Option<String>,
}

impl DoclingServeConverter {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }
}

impl Converter for DoclingServeConverter {
    async fn convert(
        &self,
        source: &StoredUpload,
        page_range: Option<PageRange>,
    ) -> Result<ConvertedDocument, ApiError> {
        let url = Url::parse(&self.url)?;
        let body = serde_json::to_string(&conversion_request_body(source, page_range))?;

        let headers = Headers::new();
        headers.set("Content-Type", "application/json")?;
        headers.set("Accept", "application/json")?;
        if let Some(api_key) = &self.api_key {
            headers.set("X-Api-Key", api_key)?;
        }

        let mut init = RequestInit::new();
        init.with_method(Method::Post)
            .with_headers(headers)
            .with_body(Some(JsValue::from_str(&body)));
        let request = Request::new_with_init(url.as_str(), &init)?;

        let mut response = Fetch::Request(request).send().await?;
        let status = response.status_code();
        let text = response.text().await?;
        document_from_response(status, &text)
    }
}

/// JSON body asking for markdown and the lossless JSON document.
pub fn conversion_request_body(source: &StoredUpload, page_range: Option<PageRange>) -> Value {
    let mut options = json!({
        "to_formats": ["md", "json"],
    });
    if let Some(range) = page_range {
        options["page_range"] = json!([range.start, range.end]);
    }

    json!({
        "options": options,
        "sources": [{
            "kind": "file",
            "base64_string": STANDARD.encode(&source.bytes),
            "filename": source.filename,
        }],
    })
}

#[derive(Debug, Deserialize)]
struct ConvertResponse {
    #[serde(default)]
    document: Option<ExportedDocument>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ExportedDocument {
    #[serde(default)]
    md_content: Option<String>,
    #[serde(default)]
    json_content: Option<Value>,
}

/// Turns a converter reply into a document, or an error carrying whatever
/// message the converter gave.
pub fn document_from_response(status: u16, body: &str) -> Result<ConvertedDocument, ApiError> {
    if status >= 400 {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| value.get("detail").map(detail_text))
            .unwrap_or_else(|| body.trim().to_string());
        return Err(ApiError::Upstream(format!(
            "converter returned status {status}: {detail}"
        )));
    }

    let parsed = serde_json::from_str::<ConvertResponse>(body).map_err(|error| {
        ApiError::Upstream(format!("converter response is not valid JSON: {error}"))
    })?;

    let errors = parsed
        .errors
        .iter()
        .map(|error| {
            error
                .get("error_message")
                .map_or_else(|| detail_text(error), detail_text)
        })
        .collect::<Vec<_>>();

    if matches!(parsed.status.as_deref(), Some("failure" | "skipped")) {
        return Err(ApiError::Upstream(format!(
            "conversion failed: {}",
            if errors.is_empty() {
                "no details reported".to_string()
            } else {
                errors.join("; ")
            }
        )));
    }

    let document = parsed
        .document
        .ok_or_else(|| ApiError::Upstream("converter response has no document".to_string()))?;
    let graph = document.json_content.filter(|graph| !graph.is_null()).ok_or_else(|| {
        ApiError::Upstream("converter response has no JSON document export".to_string())
    })?;

    Ok(ConvertedDocument::new(graph, document.md_content))
}

fn detail_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
