//! Stack: the unit of declaration
//!
//! Declaration crates add typed resources under construct paths; the stack
//! allocates logical ids, records explicit dependencies and finally
//! synthesizes a validated [`Template`].

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use queuegate_core::{Environment, ErrorCode, LogicalId, ValidationError};

use crate::expr::{Expr, Pseudo};
use crate::template::{Output, RemovalPolicy, ResourceEntry, Template, TemplateError};
use crate::validate;

/// A resource type that can be declared in a stack
pub trait CfnResource: Serialize {
    /// CloudFormation type name, e.g. `AWS::SQS::Queue`
    const TYPE: &'static str;
}

#[derive(Debug)]
pub struct Stack {
    name: String,
    env: Environment,
    description: Option<String>,
    resources: BTreeMap<LogicalId, ResourceEntry>,
    outputs: BTreeMap<LogicalId, Output>,
    /// Construct paths already taken, keyed by `/`-joined path
    paths: BTreeSet<String>,
}

impl Stack {
    pub fn new(name: impl Into<String>, env: Environment) -> Self {
        Self {
            name: name.into(),
            env,
            description: None,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            paths: BTreeSet::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Account id, literal when the environment pins it
    pub fn account(&self) -> Expr {
        match &self.env.account_id {
            Some(account) => Expr::Str(account.clone()),
            None => Expr::Pseudo(Pseudo::AccountId),
        }
    }

    pub fn region(&self) -> Expr {
        match &self.env.region {
            Some(region) => Expr::Str(region.clone()),
            None => Expr::Pseudo(Pseudo::Region),
        }
    }

    /// Declare a resource at `path`
    pub fn add<R: CfnResource>(
        &mut self,
        path: &[&str],
        resource: &R,
    ) -> Result<LogicalId, TemplateError> {
        self.add_with_id(path, LogicalId::from_path(path), resource)
    }

    /// Declare a resource at `path` under an explicitly chosen logical id
    pub fn add_with_id<R: CfnResource>(
        &mut self,
        path: &[&str],
        logical_id: LogicalId,
        resource: &R,
    ) -> Result<LogicalId, TemplateError> {
        let key = path.join("/");
        if self.paths.contains(&key) {
            return Err(ValidationError::new(
                ErrorCode::DuplicateConstruct,
                format!("a construct already exists at path '{key}'"),
            )
            .into());
        }

        if self.resources.contains_key(&logical_id) || self.outputs.contains_key(&logical_id) {
            return Err(ValidationError::new(
                ErrorCode::DuplicateConstruct,
                format!("logical id {logical_id} allocated twice"),
            )
            .with_resource(key)
            .into());
        }

        let properties = serde_json::to_value(resource)?;
        debug!(path = %key, logical_id = %logical_id, resource_type = R::TYPE, "Declared resource");

        self.paths.insert(key);
        self.resources
            .insert(logical_id.clone(), ResourceEntry::new(R::TYPE, properties));
        Ok(logical_id)
    }

    /// Make `from` wait for `on` even where no reference links them
    pub fn add_dependency(
        &mut self,
        from: &LogicalId,
        on: &LogicalId,
    ) -> Result<(), TemplateError> {
        if !self.resources.contains_key(on) {
            return Err(TemplateError::UnknownResource(on.to_string()));
        }
        let entry = self
            .resources
            .get_mut(from)
            .ok_or_else(|| TemplateError::UnknownResource(from.to_string()))?;

        let on = on.to_string();
        if !entry.depends_on.contains(&on) {
            entry.depends_on.push(on);
            entry.depends_on.sort();
        }
        Ok(())
    }

    pub fn set_removal_policy(
        &mut self,
        id: &LogicalId,
        policy: RemovalPolicy,
    ) -> Result<(), TemplateError> {
        let entry = self
            .resources
            .get_mut(id)
            .ok_or_else(|| TemplateError::UnknownResource(id.to_string()))?;
        entry.update_replace_policy = Some(policy);
        entry.deletion_policy = Some(policy);
        Ok(())
    }

    pub fn add_output(
        &mut self,
        path: &[&str],
        value: &Expr,
        description: Option<String>,
    ) -> Result<LogicalId, TemplateError> {
        let logical_id = LogicalId::from_path(path);
        if self.resources.contains_key(&logical_id) || self.outputs.contains_key(&logical_id) {
            return Err(ValidationError::new(
                ErrorCode::DuplicateConstruct,
                format!("logical id {logical_id} allocated twice"),
            )
            .into());
        }
        let output = Output {
            value: serde_json::to_value(value)?,
            description,
        };
        self.outputs.insert(logical_id.clone(), output);
        Ok(logical_id)
    }

    pub fn resource(&self, id: &LogicalId) -> Option<&ResourceEntry> {
        self.resources.get(id)
    }

    /// Produce the validated template
    pub fn synth(&self) -> Result<Template, TemplateError> {
        self.env
            .validate()
            .map_err(|e| e.with_resource(self.name.clone()))?;

        let template = Template {
            description: self.description.clone(),
            resources: self
                .resources
                .iter()
                .map(|(id, entry)| (id.to_string(), entry.clone()))
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|(id, output)| (id.to_string(), output.clone()))
                .collect(),
            ..Template::default()
        };

        validate::validate(&template)?;

        info!(
            stack = %self.name,
            env = %self.env,
            resources = template.resources.len(),
            outputs = template.outputs.len(),
            "Synthesized stack"
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct TestQueue {
        visibility_timeout: u32,
    }

    impl CfnResource for TestQueue {
        const TYPE: &'static str = "AWS::SQS::Queue";
    }

    #[derive(Serialize)]
    #[serde(rename_all = "PascalCase")]
    struct TestPolicy {
        resource: Expr,
    }

    impl CfnResource for TestPolicy {
        const TYPE: &'static str = "AWS::IAM::Policy";
    }

    fn stack() -> Stack {
        Stack::new("TestStack", Environment::agnostic())
    }

    #[test]
    fn test_add_and_synth() {
        let mut stack = stack();
        let queue = stack
            .add(
                &["Queue", "Resource"],
                &TestQueue {
                    visibility_timeout: 300,
                },
            )
            .unwrap();
        let policy = stack
            .add(
                &["Policy", "Resource"],
                &TestPolicy {
                    resource: Expr::get_att(&queue, "Arn"),
                },
            )
            .unwrap();
        stack.set_removal_policy(&queue, RemovalPolicy::Delete).unwrap();

        let template = stack.synth().unwrap();
        let entry = template.resource(queue.as_str()).unwrap();
        assert_eq!(entry.properties, json!({"VisibilityTimeout": 300}));
        assert_eq!(entry.deletion_policy, Some(RemovalPolicy::Delete));
        assert_eq!(
            template.resource(policy.as_str()).unwrap().properties["Resource"],
            json!({"Fn::GetAtt": [queue.as_str(), "Arn"]})
        );
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut stack = stack();
        let queue = TestQueue {
            visibility_timeout: 30,
        };
        stack.add(&["Queue"], &queue).unwrap();

        let err = stack.add(&["Queue"], &queue).unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Validation(ValidationError {
                code: ErrorCode::DuplicateConstruct,
                ..
            })
        ));
    }

    #[test]
    fn test_dangling_reference_fails_synth() {
        let mut stack = stack();
        stack
            .add(
                &["Policy"],
                &TestPolicy {
                    resource: Expr::get_att(&LogicalId::new("Ghost"), "Arn"),
                },
            )
            .unwrap();

        let err = stack.synth().unwrap_err();
        assert!(matches!(
            err,
            TemplateError::Validation(ValidationError {
                code: ErrorCode::UnresolvedReference,
                ..
            })
        ));
    }

    #[test]
    fn test_dependencies_deduplicated() {
        let mut stack = stack();
        let queue = TestQueue {
            visibility_timeout: 1,
        };
        let a = stack.add(&["A"], &queue).unwrap();
        let b = stack.add(&["B"], &queue).unwrap();
        stack.add_dependency(&a, &b).unwrap();
        stack.add_dependency(&a, &b).unwrap();

        assert_eq!(stack.resource(&a).unwrap().depends_on, vec!["B".to_string()]);
        assert!(stack.add_dependency(&a, &LogicalId::new("C")).is_err());
    }

    #[test]
    fn test_account_and_region() {
        let agnostic = stack();
        assert_eq!(agnostic.account(), Expr::Pseudo(Pseudo::AccountId));

        let pinned = Stack::new("Pinned", Environment::new("123456789012", "eu-west-1"));
        assert_eq!(pinned.account(), Expr::from("123456789012"));
        assert_eq!(pinned.region(), Expr::from("eu-west-1"));
    }

    #[test]
    fn test_invalid_environment_fails_synth() {
        let stack = Stack::new("Bad", Environment::new("12", "us-east-1"));
        assert!(stack.synth().is_err());
    }
}
