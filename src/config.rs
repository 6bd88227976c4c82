use worker::Env;

use crate::models::{DEFAULT_CONVERTER_URL, DEFAULT_UPLOAD_TTL_SECONDS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub converter_url: String,
    pub converter_api_key: Option<String>,
    pub upload_ttl_seconds: u32,
}

impl AppConfig {
    pub fn from_env(env: &Env) -> Self {
        let var = |name: &str| env.var(name).ok().map(|value| value.to_string());

        Self {
            converter_url: non_empty(var("CONVERTER_URL"))
                .unwrap_or_else(|| DEFAULT_CONVERTER_URL.to_string()),
            converter_api_key: non_empty(
                env.secret("CONVERTER_API_KEY")
                    .ok()
                    .map(|value| value.to_string()),
            ),
            upload_ttl_seconds: parse_ttl(var("UPLOAD_TTL_SECONDS").as_deref()),
        }
    }
}

/// Upload lifetime in seconds; missing, zero, or malformed values fall back
/// to the default.
pub fn parse_ttl(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|ttl| *ttl > 0)
        .unwrap_or(DEFAULT_UPLOAD_TTL_SECONDS)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
