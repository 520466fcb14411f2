use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named parameter of an endpoint (path segment, query field or header).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiParameter {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
}

/// One endpoint's documentation payload, produced by an external extractor
/// and read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDefinition {
    pub title: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub path_params: Vec<ApiParameter>,
    #[serde(default)]
    pub query_params: Vec<ApiParameter>,
    #[serde(default)]
    pub headers: Vec<ApiParameter>,
    #[serde(default)]
    pub request_body_type: Option<String>,
    #[serde(default)]
    pub request_body: Option<serde_json::Value>,
    #[serde(default)]
    pub response_body: Option<serde_json::Value>,
    #[serde(default = "default_done")]
    pub done: bool,
}

fn default_done() -> bool {
    true
}

impl ApiDefinition {
    /// `METHOD /path` label used in progress text and failure records.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Read an ordered list of API definitions from a JSON array file.
pub fn load_definitions(path: &Path) -> AppResult<Vec<ApiDefinition>> {
    let raw = fs::read_to_string(path)?;
    let definitions: Vec<ApiDefinition> = serde_json::from_str(&raw)?;

    for definition in &definitions {
        if !definition.path.starts_with('/') {
            return Err(AppError::validation(
                "path",
                &format!(
                    "API path must start with '/': {} {}",
                    definition.method, definition.path
                ),
            ));
        }
    }

    Ok(definitions)
}
