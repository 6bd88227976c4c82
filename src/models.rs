use serde::{Deserialize, Serialize};

pub const DEFAULT_CONVERTER_URL: &str = "http://127.0.0.1:5001/v1/convert/source";
pub const UPLOAD_KEY_PREFIX: &str = "uploads/";
pub const DEFAULT_UPLOAD_TTL_SECONDS: u32 = 60 * 60;
pub const PAGE_SEPARATOR: &str = "\n\n---\n\n";
pub const PREVIEW_ROWS: usize = 5;
pub const UNKNOWN_PAGE: i64 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_path: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParseRequest {
    pub file_path: String,
    #[serde(default)]
    pub page_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedTable {
    pub id: usize,
    pub page: i64,
    pub csv: String,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParseResponse {
    pub content: String,
    pub tables: Vec<ExtractedTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
