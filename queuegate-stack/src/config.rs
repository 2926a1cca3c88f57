//! Stack configuration
//!
//! Every field has a default reproducing the reference topology, so an empty
//! configuration file synthesizes the standard stack.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use queuegate_core::Environment;
use queuegate_lambda::{FunctionProps, Runtime, SqsEventSource};
use queuegate_sqs::QueueProps;
use queuegate_template::RemovalPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default = "default_stack_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Target account; the template stays environment-agnostic when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub role: RoleConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub function: FunctionConfig,

    #[serde(default)]
    pub event_source: EventSourceConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            name: default_stack_name(),
            description: None,
            account: None,
            region: None,
            queue: QueueConfig::default(),
            role: RoleConfig::default(),
            api: ApiConfig::default(),
            function: FunctionConfig::default(),
            event_source: EventSourceConfig::default(),
        }
    }
}

impl StackConfig {
    pub fn environment(&self) -> Environment {
        Environment {
            account_id: self.account.clone(),
            region: self.region.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,

    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_period_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_wait_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_delay_secs: Option<u64>,

    #[serde(default)]
    pub fifo: bool,

    /// Keep the queue (and its messages) when the stack is deleted
    #[serde(default)]
    pub retain: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: None,
            visibility_timeout_secs: default_visibility_timeout(),
            retention_period_secs: None,
            receive_wait_secs: None,
            delivery_delay_secs: None,
            fifo: false,
            retain: false,
        }
    }
}

impl QueueConfig {
    pub fn props(&self) -> QueueProps {
        QueueProps {
            queue_name: self.queue_name.clone(),
            visibility_timeout: Some(Duration::from_secs(self.visibility_timeout_secs)),
            retention_period: self.retention_period_secs.map(Duration::from_secs),
            receive_message_wait_time: self.receive_wait_secs.map(Duration::from_secs),
            delivery_delay: self.delivery_delay_secs.map(Duration::from_secs),
            fifo: self.fifo,
            removal_policy: if self.retain {
                RemovalPolicy::Retain
            } else {
                RemovalPolicy::Delete
            },
        }
    }
}

/// Queue access granted to the gateway's role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueAccess {
    /// Send actions on this queue only
    #[default]
    SendOnly,
    /// The AWS-managed `AmazonSQSFullAccess` policy
    Full,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub access: QueueAccess,
}

/// What the API's root resource answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootMethod {
    /// `ANY /` with a mock integration
    #[default]
    Mock,
    /// No method on `/`
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_name")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_stage")]
    pub stage: String,

    /// Path part of the resource forwarding into the queue
    #[serde(default = "default_resource_path")]
    pub resource_path: String,

    #[serde(default)]
    pub root_method: RootMethod,

    /// Map backend 4xx/5xx answers to 400/500 with a JSON message
    #[serde(default = "default_true")]
    pub error_responses: bool,

    #[serde(default)]
    pub api_key_required: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            name: default_api_name(),
            description: None,
            stage: default_stage(),
            resource_path: default_resource_path(),
            root_method: RootMethod::default(),
            error_responses: true,
            api_key_required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    #[serde(default)]
    pub runtime: Runtime,

    #[serde(default = "default_handler")]
    pub handler: String,

    /// Directory packaged as the function's code
    #[serde(default = "default_code_dir")]
    pub code_dir: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            runtime: Runtime::default(),
            handler: default_handler(),
            code_dir: default_code_dir(),
            timeout_secs: None,
            memory_mb: None,
            description: None,
            environment: BTreeMap::new(),
        }
    }
}

impl FunctionConfig {
    pub fn props(&self) -> FunctionProps {
        FunctionProps {
            runtime: self.runtime,
            handler: self.handler.clone(),
            code: self.code_dir.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
            memory_size: self.memory_mb,
            environment: self.environment.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batching_window_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub report_batch_item_failures: bool,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            max_batching_window_secs: None,
            enabled: true,
            report_batch_item_failures: false,
        }
    }
}

impl EventSourceConfig {
    pub fn source(&self) -> SqsEventSource {
        SqsEventSource {
            batch_size: self.batch_size,
            max_batching_window: self.max_batching_window_secs.map(Duration::from_secs),
            enabled: self.enabled,
            report_batch_item_failures: self.report_batch_item_failures,
        }
    }
}

fn default_stack_name() -> String {
    "ApiGatewaySqsLambdaStack".to_string()
}

fn default_visibility_timeout() -> u64 {
    300
}

fn default_api_name() -> String {
    "SqsApi".to_string()
}

fn default_stage() -> String {
    "prod".to_string()
}

fn default_resource_path() -> String {
    "example".to_string()
}

fn default_handler() -> String {
    "lambda-handler.handler".to_string()
}

fn default_code_dir() -> PathBuf {
    PathBuf::from("lambda")
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config: StackConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StackConfig::default());
        assert_eq!(config.queue.visibility_timeout_secs, 300);
        assert_eq!(config.role.access, QueueAccess::SendOnly);
        assert_eq!(config.api.root_method, RootMethod::Mock);
        assert_eq!(config.function.runtime, Runtime::Python39);
        assert!(config.environment().is_agnostic());
    }

    #[test]
    fn test_partial_sections() {
        let config: StackConfig = serde_json::from_value(serde_json::json!({
            "role": {"access": "full"},
            "api": {"root_method": "none", "stage": "dev"},
            "queue": {"retain": true}
        }))
        .unwrap();

        assert_eq!(config.role.access, QueueAccess::Full);
        assert_eq!(config.api.root_method, RootMethod::None);
        assert_eq!(config.api.stage, "dev");
        assert_eq!(config.api.name, "SqsApi");
        assert_eq!(config.queue.props().removal_policy, RemovalPolicy::Retain);
        assert_eq!(
            config.queue.props().visibility_timeout,
            Some(Duration::from_secs(300))
        );
    }
}
