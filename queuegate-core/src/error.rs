//! Validation error types and formatting

use serde::Serialize;
use thiserror::Error;

/// Codes for the checks a provisioning engine would otherwise fail at deploy time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    // Common
    InvalidParameterValue,
    InvalidName,
    DuplicateConstruct,

    // Template wiring
    UnresolvedReference,
    DependencyCycle,

    // IAM
    MalformedPolicyDocument,

    // Cross-resource
    IncompatibleSettings,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidParameterValue => "InvalidParameterValue",
            Self::InvalidName => "InvalidName",
            Self::DuplicateConstruct => "DuplicateConstruct",
            Self::UnresolvedReference => "UnresolvedReference",
            Self::DependencyCycle => "DependencyCycle",
            Self::MalformedPolicyDocument => "MalformedPolicyDocument",
            Self::IncompatibleSettings => "IncompatibleSettings",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declaration that the provisioning engine would reject
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
    pub resource: Option<String>,
}

impl ValidationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            resource: None,
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParameterValue, message)
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Format as a single-line JSON report entry
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct JsonError<'a> {
            code: &'a str,
            message: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            resource: Option<&'a str>,
        }

        let error = JsonError {
            code: self.code.as_str(),
            message: &self.message,
            resource: self.resource.as_deref(),
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"code":"{}","message":"{}"}}"#, self.code.as_str(), self.message)
        })
    }
}

/// Check that `value` lies in `min..=max`, naming the property in the error
pub fn check_range(property: &str, value: u64, min: u64, max: u64) -> Result<(), ValidationError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::invalid_parameter(format!(
            "{property} must be between {min} and {max}, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ValidationError::invalid_parameter("VisibilityTimeout out of range")
            .with_resource("Queue4A7E3555");

        assert_eq!(
            error.to_string(),
            "InvalidParameterValue: VisibilityTimeout out of range"
        );
        assert_eq!(error.resource.as_deref(), Some("Queue4A7E3555"));
    }

    #[test]
    fn test_error_json_format() {
        let error = ValidationError::new(ErrorCode::UnresolvedReference, "Ref to Missing")
            .with_resource("Method");

        let json = error.to_json();
        assert!(json.contains(r#""code":"UnresolvedReference""#));
        assert!(json.contains(r#""resource":"Method""#));
    }

    #[test]
    fn test_check_range() {
        assert!(check_range("VisibilityTimeout", 300, 0, 43_200).is_ok());
        assert!(check_range("VisibilityTimeout", 0, 0, 43_200).is_ok());

        let err = check_range("VisibilityTimeout", 50_000, 0, 43_200).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameterValue);
        assert!(err.message.contains("50000"));
    }
}
