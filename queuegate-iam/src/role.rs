//! Role declarations

use serde::Serialize;
use tracing::{debug, info};

use queuegate_core::{LogicalId, ValidationError};
use queuegate_template::{CfnResource, Expr, Pseudo, Stack, TemplateError};

use crate::policy::{PolicyDocument, Principal, Statement};

/// IAM errors
#[derive(Debug, thiserror::Error)]
pub enum IamError {
    #[error("Malformed policy: {0}")]
    MalformedPolicy(#[from] ValidationError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// A policy maintained by AWS, referenced by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedPolicy {
    pub name: String,
}

impl ManagedPolicy {
    pub fn aws_managed(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// `arn:<partition>:iam::aws:policy/<name>`
    pub fn arn(&self) -> Expr {
        Expr::concat([
            Expr::from("arn:"),
            Expr::Pseudo(Pseudo::Partition),
            Expr::Str(format!(":iam::aws:policy/{}", self.name)),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct RoleProps {
    pub assumed_by: Principal,
    pub managed_policies: Vec<ManagedPolicy>,
    pub description: Option<String>,
}

impl RoleProps {
    pub fn assumed_by(principal: Principal) -> Self {
        Self {
            assumed_by: principal,
            managed_policies: Vec::new(),
            description: None,
        }
    }

    pub fn managed_policy(mut self, policy: ManagedPolicy) -> Self {
        self.managed_policies.push(policy);
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnRole {
    assume_role_policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "ManagedPolicyArns", skip_serializing_if = "Vec::is_empty")]
    managed_policy_arns: Vec<Expr>,
}

impl CfnResource for CfnRole {
    const TYPE: &'static str = "AWS::IAM::Role";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnPolicy {
    policy_document: PolicyDocument,
    policy_name: String,
    roles: Vec<Expr>,
}

impl CfnResource for CfnPolicy {
    const TYPE: &'static str = "AWS::IAM::Policy";
}

/// A declared role
///
/// Grants accumulate in the role's default policy until
/// [`Role::attach_default_policy`] writes it to the stack.
#[derive(Debug)]
pub struct Role {
    path: Vec<String>,
    logical_id: LogicalId,
    assumed_by: Principal,
    managed_policies: Vec<ManagedPolicy>,
    default_policy: PolicyDocument,
    default_policy_id: Option<LogicalId>,
}

impl Role {
    /// Declare a role at `path` (the resource itself lands at `<path>/Resource`)
    pub fn declare(stack: &mut Stack, path: &[&str], props: RoleProps) -> Result<Self, IamError> {
        let trust = PolicyDocument::new([Statement::assume_role(props.assumed_by.clone())]);
        trust.validate_trust()?;

        let resource_path: Vec<&str> = path.iter().copied().chain(["Resource"]).collect();
        let logical_id = stack.add(
            &resource_path,
            &CfnRole {
                assume_role_policy_document: trust,
                description: props.description,
                managed_policy_arns: props
                    .managed_policies
                    .iter()
                    .map(ManagedPolicy::arn)
                    .collect(),
            },
        )?;

        info!(
            role = %logical_id,
            principal = %props.assumed_by.service,
            managed_policies = props.managed_policies.len(),
            "Declared role"
        );

        Ok(Self {
            path: path.iter().map(|s| (*s).to_string()).collect(),
            logical_id,
            assumed_by: props.assumed_by,
            managed_policies: props.managed_policies,
            default_policy: PolicyDocument::default(),
            default_policy_id: None,
        })
    }

    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    pub fn arn(&self) -> Expr {
        Expr::get_att(&self.logical_id, "Arn")
    }

    pub fn assumed_by(&self) -> &Principal {
        &self.assumed_by
    }

    pub fn managed_policies(&self) -> &[ManagedPolicy] {
        &self.managed_policies
    }

    /// Statements granted so far
    pub fn default_policy(&self) -> &PolicyDocument {
        &self.default_policy
    }

    pub fn default_policy_id(&self) -> Option<&LogicalId> {
        self.default_policy_id.as_ref()
    }

    pub fn add_to_policy(&mut self, statement: Statement) -> Result<(), IamError> {
        if self.default_policy_id.is_some() {
            return Err(IamError::InvalidInput(format!(
                "default policy of {} was already written",
                self.logical_id
            )));
        }
        debug!(role = %self.logical_id, actions = ?statement.action, "Granting");
        self.default_policy.add_statement(statement);
        Ok(())
    }

    /// Write the accumulated grants as `<path>/DefaultPolicy/Resource`.
    /// Returns `None` when nothing was granted.
    pub fn attach_default_policy(
        &mut self,
        stack: &mut Stack,
    ) -> Result<Option<LogicalId>, IamError> {
        if let Some(id) = &self.default_policy_id {
            return Ok(Some(id.clone()));
        }
        if self.default_policy.is_empty() {
            return Ok(None);
        }
        self.default_policy.validate_identity()?;

        let mut policy_path: Vec<&str> = self.path.iter().map(String::as_str).collect();
        policy_path.push("DefaultPolicy");
        let policy_name = LogicalId::from_path(&policy_path).to_string();
        policy_path.push("Resource");

        let id = stack.add(
            &policy_path,
            &CfnPolicy {
                policy_document: self.default_policy.clone(),
                policy_name,
                roles: vec![Expr::reference(&self.logical_id)],
            },
        )?;

        info!(
            role = %self.logical_id,
            policy = %id,
            statements = self.default_policy.statement.len(),
            "Attached default policy"
        );
        self.default_policy_id = Some(id.clone());
        Ok(Some(id))
    }
}
