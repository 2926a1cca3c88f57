//! HTTP methods and their declared responses

use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Any,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ANY" => Ok(Self::Any),
            "DELETE" => Ok(Self::Delete),
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH" => Ok(Self::Patch),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            other => Err(format!("unknown HTTP method: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MethodResponse {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub response_models: BTreeMap<String, String>,
    pub status_code: String,
}

impl MethodResponse {
    pub fn new(status_code: impl Into<String>) -> Self {
        Self {
            response_models: BTreeMap::new(),
            status_code: status_code.into(),
        }
    }

    /// Declare the body model for a content type (`Empty`, `Error`, or a custom model name)
    pub fn model(mut self, content_type: impl Into<String>, model: impl Into<String>) -> Self {
        self.response_models.insert(content_type.into(), model.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodOptions {
    pub method_responses: Vec<MethodResponse>,
    /// Require an API key on requests
    pub api_key_required: bool,
}

impl MethodOptions {
    pub fn response(mut self, response: MethodResponse) -> Self {
        self.method_responses.push(response);
        self
    }
}
