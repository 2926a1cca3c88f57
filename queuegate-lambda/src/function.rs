//! Lambda function declaration

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use queuegate_core::error::check_range;
use queuegate_core::{LogicalId, ValidationError};
use queuegate_iam::{IamError, ManagedPolicy, Principal, Role, RoleProps};
use queuegate_sqs::SqsError;
use queuegate_template::{CfnResource, Expr, Stack, TemplateError};

use crate::asset::{Asset, BOOTSTRAP_BUCKET};
use crate::runtime::Runtime;

/// Timeout the service applies when none is declared
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

static HANDLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-/.]+\.[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid regex")
});

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid regex"));

#[derive(Error, Debug)]
pub enum LambdaError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] ValidationError),
    #[error("Invalid handler: {0}")]
    InvalidHandler(String),
    #[error("Asset directory not found: {}", .0.display())]
    AssetNotFound(PathBuf),
    #[error("Asset directory is empty: {}", .0.display())]
    EmptyAsset(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Iam(#[from] IamError),
    #[error(transparent)]
    Sqs(#[from] SqsError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Debug, Clone)]
pub struct FunctionProps {
    pub runtime: Runtime,
    /// `<module>.<function>`
    pub handler: String,
    /// Directory packaged as the function's code
    pub code: PathBuf,
    pub timeout: Option<Duration>,
    /// MB
    pub memory_size: Option<u32>,
    pub environment: BTreeMap<String, String>,
    pub description: Option<String>,
}

impl Default for FunctionProps {
    fn default() -> Self {
        Self {
            runtime: Runtime::Python39,
            handler: "lambda-handler.handler".to_string(),
            code: PathBuf::from("lambda"),
            timeout: None,
            memory_size: None,
            environment: BTreeMap::new(),
            description: None,
        }
    }
}

impl FunctionProps {
    pub fn validate(&self) -> Result<(), LambdaError> {
        if let Some(timeout) = self.timeout {
            check_range("Timeout", timeout.as_secs(), 1, 900)?;
        }
        if let Some(memory) = self.memory_size {
            check_range("MemorySize", u64::from(memory), 128, 10_240)?;
        }
        if self.runtime.handler_extension().is_some() && !HANDLER.is_match(&self.handler) {
            return Err(LambdaError::InvalidHandler(format!(
                "'{}' must have the form <module>.<function>",
                self.handler
            )));
        }
        if let Some(key) = self.environment.keys().find(|k| !ENV_VAR.is_match(k)) {
            return Err(ValidationError::invalid_parameter(format!(
                "environment variable name '{key}' is invalid"
            ))
            .into());
        }
        Ok(())
    }

    /// File the runtime loads the handler from, relative to the code directory
    pub fn handler_file(&self) -> Option<String> {
        let extension = self.runtime.handler_extension()?;
        let (module, _) = self.handler.rsplit_once('.')?;
        let module = match extension {
            "py" => module.replace('.', "/"),
            _ => module.to_string(),
        };
        Some(format!("{module}.{extension}"))
    }
}

#[derive(Serialize)]
struct CfnCode {
    #[serde(rename = "S3Bucket")]
    s3_bucket: Expr,
    #[serde(rename = "S3Key")]
    s3_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnEnvironment {
    variables: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnFunction {
    code: CfnCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<CfnEnvironment>,
    handler: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory_size: Option<u32>,
    role: Expr,
    runtime: Runtime,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

impl CfnResource for CfnFunction {
    const TYPE: &'static str = "AWS::Lambda::Function";
}

/// A declared function and its execution role
#[derive(Debug)]
pub struct Function {
    id: String,
    logical_id: LogicalId,
    role: Role,
    asset: Asset,
    runtime: Runtime,
    timeout: Duration,
}

impl Function {
    pub fn declare(stack: &mut Stack, id: &str, props: FunctionProps) -> Result<Self, LambdaError> {
        props.validate().map_err(|e| match e {
            LambdaError::InvalidParameter(e) => LambdaError::InvalidParameter(e.with_resource(id)),
            other => other,
        })?;

        let asset = Asset::from_dir(&props.code)?;
        if let Some(file) = props.handler_file() {
            if !asset.contains(&file) {
                return Err(LambdaError::InvalidHandler(format!(
                    "handler '{}' needs {file} in {}",
                    props.handler,
                    asset.source().display()
                )));
            }
        }

        let role = Role::declare(
            stack,
            &[id, "ServiceRole"],
            RoleProps::assumed_by(Principal::service("lambda.amazonaws.com")).managed_policy(
                ManagedPolicy::aws_managed("service-role/AWSLambdaBasicExecutionRole"),
            ),
        )?;

        let logical_id = stack.add(
            &[id, "Resource"],
            &CfnFunction {
                code: CfnCode {
                    s3_bucket: Expr::Sub(BOOTSTRAP_BUCKET.to_string()),
                    s3_key: asset.object_key(),
                },
                description: props.description,
                environment: (!props.environment.is_empty()).then(|| CfnEnvironment {
                    variables: props.environment,
                }),
                handler: props.handler,
                memory_size: props.memory_size,
                role: role.arn(),
                runtime: props.runtime,
                timeout: props.timeout.map(|t| t.as_secs()),
            },
        )?;
        stack.add_dependency(&logical_id, role.logical_id())?;

        info!(
            function = %logical_id,
            runtime = %props.runtime,
            asset = %asset.hash(),
            "Declared function"
        );

        Ok(Self {
            id: id.to_string(),
            logical_id,
            role,
            asset,
            runtime: props.runtime,
            timeout: props.timeout.unwrap_or(DEFAULT_TIMEOUT),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    pub fn arn(&self) -> Expr {
        Expr::get_att(&self.logical_id, "Arn")
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Grants to the execution role go through here
    pub fn role_mut(&mut self) -> &mut Role {
        &mut self.role
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime
    }

    /// Effective timeout, including the service default
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Write the execution role's default policy and make the function wait for it.
    /// Call once every grant has been made.
    pub fn attach_role_policy(
        &mut self,
        stack: &mut Stack,
    ) -> Result<Option<LogicalId>, LambdaError> {
        let policy = self.role.attach_default_policy(stack)?;
        if let Some(policy) = &policy {
            stack.add_dependency(&self.logical_id, policy)?;
        }
        Ok(policy)
    }
}
