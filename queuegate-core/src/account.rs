//! Account and region the stack is declared for

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ValidationError};

static ACCOUNT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{12}$").expect("valid regex"));
static REGION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}(-gov|-iso[a-z]?)?-[a-z]+-\d$").expect("valid regex"));

/// Target environment of a stack.
///
/// Either field may be left unset, in which case the template refers to the
/// `AWS::AccountId` / `AWS::Region` pseudo parameters and the stack stays
/// environment-agnostic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl Environment {
    pub fn new(account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            region: Some(region.into()),
        }
    }

    /// Environment resolved by the provisioning engine at deploy time
    pub fn agnostic() -> Self {
        Self::default()
    }

    pub fn is_agnostic(&self) -> bool {
        self.account_id.is_none() && self.region.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(account) = &self.account_id {
            if !ACCOUNT_ID.is_match(account) {
                return Err(ValidationError::new(
                    ErrorCode::InvalidParameterValue,
                    format!("account id must be 12 digits, got '{account}'"),
                ));
            }
        }
        if let Some(region) = &self.region {
            if !REGION.is_match(region) {
                return Err(ValidationError::new(
                    ErrorCode::InvalidParameterValue,
                    format!("'{region}' is not a region name"),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "aws://{}/{}",
            self.account_id.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )
    }
}
