pub mod config;
pub mod converter;
pub mod document;
pub mod error;
pub mod models;
pub mod page_query;
pub mod parse_pipeline;
pub mod routes;
pub mod table_export;
pub mod upload_store;

use worker::{Context, Env, Request, Response, Result, event};

#[event(fetch)]
async fn fetch(req: Request, env: Env, ctx: Context) -> Result<Response> {
    routes::handle(req, env, ctx).await
}
