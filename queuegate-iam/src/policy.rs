//! Policy documents

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};

use queuegate_core::{ErrorCode, ValidationError};
use queuegate_template::Expr;

pub const POLICY_VERSION: &str = "2012-10-17";

static ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\*|[a-z0-9-]+:[A-Za-z0-9*]+)$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a trust policy lets assume the role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    #[serde(rename = "Service")]
    pub service: String,
}

impl Principal {
    pub fn service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(serialize_with = "one_or_many")]
    pub action: Vec<String>,
    pub effect: Effect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "one_or_many")]
    pub resource: Vec<Expr>,
}

impl Statement {
    pub fn allow() -> Self {
        Self {
            action: Vec::new(),
            effect: Effect::Allow,
            principal: None,
            resource: Vec::new(),
        }
    }

    /// Trust statement letting `principal` call `sts:AssumeRole`
    pub fn assume_role(principal: Principal) -> Self {
        Self::allow().action("sts:AssumeRole").principal(principal)
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action.push(action.into());
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn resource(mut self, resource: Expr) -> Self {
        self.resource.push(resource);
        self
    }

    fn same_target(&self, other: &Self) -> bool {
        self.effect == other.effect
            && self.principal == other.principal
            && self.resource == other.resource
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.action.is_empty() {
            return Err(ValidationError::new(
                ErrorCode::MalformedPolicyDocument,
                "policy statement must name at least one action",
            ));
        }
        if let Some(bad) = self.action.iter().find(|a| !ACTION.is_match(a)) {
            return Err(ValidationError::new(
                ErrorCode::MalformedPolicyDocument,
                format!("'{bad}' is not a valid action"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub statement: Vec<Statement>,
    pub version: String,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            statement: Vec::new(),
            version: POLICY_VERSION.to_string(),
        }
    }
}

impl PolicyDocument {
    pub fn new(statements: impl IntoIterator<Item = Statement>) -> Self {
        let mut doc = Self::default();
        for statement in statements {
            doc.add_statement(statement);
        }
        doc
    }

    pub fn is_empty(&self) -> bool {
        self.statement.is_empty()
    }

    /// Add a statement, folding its actions into an existing statement with
    /// the same effect, principal and resources.
    pub fn add_statement(&mut self, statement: Statement) {
        if let Some(existing) = self.statement.iter_mut().find(|s| s.same_target(&statement)) {
            existing.action.extend(statement.action);
            existing.action.sort();
            existing.action.dedup();
            return;
        }
        let mut statement = statement;
        statement.action.sort();
        statement.action.dedup();
        self.statement.push(statement);
    }

    /// Whether some Allow statement grants `action`, directly or through a wildcard
    pub fn allows(&self, action: &str) -> bool {
        let (service, _) = action.split_once(':').unwrap_or((action, ""));
        self.statement
            .iter()
            .filter(|s| s.effect == Effect::Allow)
            .flat_map(|s| s.action.iter())
            .any(|a| a == "*" || a == action || *a == format!("{service}:*"))
    }

    /// Rules for a policy attached to an identity
    pub fn validate_identity(&self) -> Result<(), ValidationError> {
        self.validate_common()?;
        if let Some(s) = self.statement.iter().find(|s| s.principal.is_some()) {
            return Err(ValidationError::new(
                ErrorCode::MalformedPolicyDocument,
                format!("identity policy statement for {:?} must not name a principal", s.action),
            ));
        }
        if self.statement.iter().any(|s| s.resource.is_empty()) {
            return Err(ValidationError::new(
                ErrorCode::MalformedPolicyDocument,
                "identity policy statements must name at least one resource",
            ));
        }
        Ok(())
    }

    /// Rules for a role's trust policy
    pub fn validate_trust(&self) -> Result<(), ValidationError> {
        self.validate_common()?;
        if self.statement.iter().any(|s| s.principal.is_none()) {
            return Err(ValidationError::new(
                ErrorCode::MalformedPolicyDocument,
                "trust policy statements must name a principal",
            ));
        }
        Ok(())
    }

    fn validate_common(&self) -> Result<(), ValidationError> {
        if self.statement.is_empty() {
            return Err(ValidationError::new(
                ErrorCode::MalformedPolicyDocument,
                "policy document has no statements",
            ));
        }
        self.statement.iter().try_for_each(Statement::validate)
    }
}

/// A single element renders as a scalar, several as a list
#[allow(clippy::ptr_arg)]
fn one_or_many<T: Serialize, S: Serializer>(
    items: &Vec<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match items.as_slice() {
        [single] => single.serialize(serializer),
        many => many.serialize(serializer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuegate_core::LogicalId;
    use serde_json::json;

    #[test]
    fn test_trust_policy_layout() {
        let doc = PolicyDocument::new([Statement::assume_role(Principal::service(
            "apigateway.amazonaws.com",
        ))]);

        assert!(doc.validate_trust().is_ok());
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({
                "Statement": [{
                    "Action": "sts:AssumeRole",
                    "Effect": "Allow",
                    "Principal": {"Service": "apigateway.amazonaws.com"}
                }],
                "Version": "2012-10-17"
            })
        );
    }

    #[test]
    fn test_statements_with_same_resource_merge() {
        let queue = Expr::get_att(&LogicalId::new("Queue"), "Arn");
        let mut doc = PolicyDocument::default();
        doc.add_statement(Statement::allow().action("sqs:SendMessage").resource(queue.clone()));
        doc.add_statement(
            Statement::allow()
                .actions(["sqs:GetQueueUrl", "sqs:SendMessage"])
                .resource(queue),
        );

        assert_eq!(doc.statement.len(), 1);
        assert_eq!(doc.statement[0].action, vec!["sqs:GetQueueUrl", "sqs:SendMessage"]);
        assert!(doc.validate_identity().is_ok());

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value["Statement"][0]["Resource"],
            json!({"Fn::GetAtt": ["Queue", "Arn"]})
        );
    }

    #[test]
    fn test_allows_wildcards() {
        let doc = PolicyDocument::new([Statement::allow().action("sqs:*").resource("*".into())]);
        assert!(doc.allows("sqs:SendMessage"));
        assert!(!doc.allows("sns:Publish"));
    }

    #[test]
    fn test_validation_failures() {
        assert!(PolicyDocument::default().validate_identity().is_err());

        let no_resource = PolicyDocument::new([Statement::allow().action("sqs:SendMessage")]);
        assert!(no_resource.validate_identity().is_err());

        let bad_action =
            PolicyDocument::new([Statement::allow().action("SendMessage").resource("*".into())]);
        let err = bad_action.validate_identity().unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedPolicyDocument);

        let no_principal = PolicyDocument::new([Statement::allow().action("sts:AssumeRole")]);
        assert!(no_principal.validate_trust().is_err());
    }
}
