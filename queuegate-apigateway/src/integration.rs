//! Method integrations: how a request reaches a backend

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use queuegate_core::{ErrorCode, ValidationError};
use queuegate_template::{Expr, Pseudo};

static STATUS_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-5]\d{2}$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationType {
    Aws,
    AwsProxy,
    Http,
    HttpProxy,
    Mock,
}

/// What happens to a request whose content type has no request template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PassthroughBehavior {
    /// Forward unmapped content types unchanged
    WhenNoMatch,
    /// Reject unmapped content types with 415
    Never,
    /// Forward only when no templates are defined at all
    WhenNoTemplates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IntegrationResponse {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub response_templates: BTreeMap<String, String>,
    /// Regex over the backend status or error message selecting this response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_pattern: Option<String>,
    pub status_code: String,
}

impl IntegrationResponse {
    pub fn new(status_code: impl Into<String>) -> Self {
        Self {
            response_templates: BTreeMap::new(),
            selection_pattern: None,
            status_code: status_code.into(),
        }
    }

    pub fn template(mut self, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        self.response_templates
            .insert(content_type.into(), body.into());
        self
    }

    pub fn selection_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.selection_pattern = Some(pattern.into());
        self
    }
}

/// Backend of a method, rendered as the method's `Integration` property
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Integration {
    #[serde(skip_serializing_if = "Option::is_none")]
    credentials: Option<Expr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    integration_http_method: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    integration_responses: Vec<IntegrationResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    passthrough_behavior: Option<PassthroughBehavior>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    request_parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    request_templates: BTreeMap<String, String>,
    #[serde(rename = "Type")]
    integration_type: IntegrationType,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<Expr>,
}

impl Integration {
    /// Answer from API Gateway itself, no backend
    pub fn mock() -> Self {
        Self {
            credentials: None,
            integration_http_method: None,
            integration_responses: Vec::new(),
            passthrough_behavior: None,
            request_parameters: BTreeMap::new(),
            request_templates: BTreeMap::new(),
            integration_type: IntegrationType::Mock,
            uri: None,
        }
    }

    /// Call an AWS service API directly.
    ///
    /// `path` is appended to `arn:<partition>:apigateway:<region>:<service>:path/`.
    pub fn aws(service: &str, region: Expr, path: Expr) -> Self {
        let uri = Expr::concat([
            Expr::from("arn:"),
            Expr::Pseudo(Pseudo::Partition),
            Expr::from(":apigateway:"),
            region,
            Expr::Str(format!(":{service}:path/")),
            path,
        ]);
        Self {
            integration_http_method: Some("POST".to_string()),
            integration_type: IntegrationType::Aws,
            uri: Some(uri),
            ..Self::mock()
        }
    }

    /// Role API Gateway assumes to call the backend
    pub fn credentials(mut self, role_arn: Expr) -> Self {
        self.credentials = Some(role_arn);
        self
    }

    pub fn passthrough(mut self, behavior: PassthroughBehavior) -> Self {
        self.passthrough_behavior = Some(behavior);
        self
    }

    pub fn request_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_parameters.insert(name.into(), value.into());
        self
    }

    pub fn request_template(
        mut self,
        content_type: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        self.request_templates
            .insert(content_type.into(), template.into());
        self
    }

    pub fn response(mut self, response: IntegrationResponse) -> Self {
        self.integration_responses.push(response);
        self
    }

    pub fn integration_type(&self) -> IntegrationType {
        self.integration_type
    }

    pub fn responses(&self) -> &[IntegrationResponse] {
        &self.integration_responses
    }

    pub fn request_templates(&self) -> &BTreeMap<String, String> {
        &self.request_templates
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.integration_type != IntegrationType::Mock && self.uri.is_none() {
            return Err(ValidationError::invalid_parameter(format!(
                "{:?} integration requires a URI",
                self.integration_type
            )));
        }
        for response in &self.integration_responses {
            if !STATUS_CODE.is_match(&response.status_code) {
                return Err(ValidationError::invalid_parameter(format!(
                    "'{}' is not an HTTP status code",
                    response.status_code
                )));
            }
            if let Some(pattern) = &response.selection_pattern {
                if let Err(e) = Regex::new(pattern) {
                    return Err(ValidationError::invalid_parameter(format!(
                        "invalid selection pattern '{pattern}': {e}"
                    )));
                }
            }
        }
        if let Some(name) = self
            .request_parameters
            .keys()
            .find(|k| !k.starts_with("integration.request."))
        {
            return Err(ValidationError::invalid_parameter(format!(
                "request parameter '{name}' must target integration.request.*"
            )));
        }
        if self.passthrough_behavior == Some(PassthroughBehavior::Never)
            && self.request_templates.is_empty()
        {
            return Err(ValidationError::new(
                ErrorCode::IncompatibleSettings,
                "passthrough NEVER without request templates rejects every request",
            ));
        }
        Ok(())
    }
}

/// Preview the backend request body a template produces for `body`.
///
/// Only `$input.body` and `$util.urlEncode($input.body)` are understood;
/// everything else in the template is copied as is.
pub fn render_request_template(template: &str, body: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(body.as_bytes()).collect();
    template
        .replace("$util.urlEncode($input.body)", &encoded)
        .replace("$input.body", body)
}
