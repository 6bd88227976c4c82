use serde::Serialize;
use worker::{
    Context, Cors, Env, FormEntry, Method, Request, Response, Result, RouteContext, Router,
};

use crate::config::AppConfig;
use crate::converter::DoclingServeConverter;
use crate::error::ApiError;
use crate::models::{HealthResponse, ParseRequest, ParseResponse, UploadedFile};
use crate::parse_pipeline;
use crate::upload_store::{CacheUploadStore, UploadStore};

pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
}

pub async fn handle(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    let cors = cors_policy();
    if req.method() == Method::Options {
        return Response::empty()?.with_status(204).with_cors(&cors);
    }

    let state = AppState {
        config: AppConfig::from_env(&env),
    };

    Router::with_data(state)
        .get_async("/health", health_route)
        .post_async("/upload", upload_route)
        .post_async("/parse", parse_route)
        .run(req, env)
        .await?
        .with_cors(&cors)
}

/// Development posture: any origin, method and header.
pub fn cors_policy() -> Cors {
    Cors::new()
        .with_origins(vec!["*"])
        .with_methods(Method::all())
        .with_allowed_headers(vec!["*"])
}

async fn health_route(_req: Request, _ctx: RouteContext<AppState>) -> Result<Response> {
    json_response(&HealthResponse {
        status: "ok".to_string(),
    })
}

async fn upload_route(mut req: Request, ctx: RouteContext<AppState>) -> Result<Response> {
    match upload_response(&mut req, &ctx.data).await {
        Ok(response) => json_response(&response),
        Err(error) => error.into_response(),
    }
}

async fn parse_route(mut req: Request, ctx: RouteContext<AppState>) -> Result<Response> {
    match parse_response(&mut req, &ctx.data).await {
        Ok(response) => json_response(&response),
        Err(error) => error.into_response(),
    }
}

async fn upload_response(req: &mut Request, state: &AppState) -> Result<UploadedFile, ApiError> {
    let form = req
        .form_data()
        .await
        .map_err(|error| ApiError::BadRequest(format!("invalid multipart body: {error}")))?;
    let Some(FormEntry::File(file)) = form.get(UPLOAD_FIELD) else {
        return Err(ApiError::BadRequest(format!(
            "multipart field '{UPLOAD_FIELD}' must contain a file"
        )));
    };

    let bytes = file.bytes().await?;
    let store = CacheUploadStore::new(state.config.upload_ttl_seconds);
    let uploaded = store.store(&bytes, &file.name()).await?;

    worker::console_log!(
        "stored upload {} ({} bytes)",
        uploaded.file_path,
        bytes.len()
    );
    Ok(uploaded)
}

async fn parse_response(req: &mut Request, state: &AppState) -> Result<ParseResponse, ApiError> {
    let body = req.text().await?;
    let request = serde_json::from_str::<ParseRequest>(&body)?;

    let store = CacheUploadStore::new(state.config.upload_ttl_seconds);
    let converter = DoclingServeConverter::new(
        state.config.converter_url.clone(),
        state.config.converter_api_key.clone(),
    );

    let outcome = match parse_pipeline::parse_document(&store, &converter, &request).await {
        Ok(outcome) => outcome,
        Err(error) => {
            worker::console_error!(
                "parse failed for {} (query {:?}): {error}",
                request.file_path,
                request.page_query
            );
            return Err(error);
        }
    };

    for warning in &outcome.warnings {
        worker::console_error!(
            "error converting table {} to CSV: {}",
            warning.table_id,
            warning.message
        );
    }
    worker::console_log!(
        "parsed {} (query {:?}): content_chars={}, tables={}",
        request.file_path,
        request.page_query,
        outcome.response.content.len(),
        outcome.response.tables.len()
    );

    Ok(outcome.response)
}

fn json_response<T>(payload: &T) -> Result<Response>
where
    T: Serialize,
{
    let mut response = Response::from_json(payload)?;
    response.headers_mut().set("Cache-Control", "no-store")?;
    Ok(response)
}
