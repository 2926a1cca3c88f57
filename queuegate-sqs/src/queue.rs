//! Queue declaration

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use queuegate_core::error::check_range;
use queuegate_core::{LogicalId, ValidationError};
use queuegate_iam::{IamError, Role, Statement};
use queuegate_template::{CfnResource, Expr, RemovalPolicy, Stack, TemplateError};

/// Visibility timeout the queue service applies when none is declared
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

pub const SEND_ACTIONS: &[&str] = &["sqs:SendMessage", "sqs:GetQueueAttributes", "sqs:GetQueueUrl"];

pub const CONSUME_ACTIONS: &[&str] = &[
    "sqs:ReceiveMessage",
    "sqs:ChangeMessageVisibility",
    "sqs:GetQueueUrl",
    "sqs:DeleteMessage",
    "sqs:GetQueueAttributes",
];

static QUEUE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,80}$").expect("valid regex"));

#[derive(Error, Debug)]
pub enum SqsError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] ValidationError),
    #[error("Invalid queue name: {0}")]
    InvalidQueueName(String),
    #[error(transparent)]
    Grant(#[from] IamError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Debug, Clone)]
pub struct QueueProps {
    /// Physical name; generated by the provisioning engine when unset
    pub queue_name: Option<String>,
    pub visibility_timeout: Option<Duration>,
    pub retention_period: Option<Duration>,
    pub receive_message_wait_time: Option<Duration>,
    pub delivery_delay: Option<Duration>,
    pub fifo: bool,
    pub removal_policy: RemovalPolicy,
}

impl Default for QueueProps {
    fn default() -> Self {
        Self {
            queue_name: None,
            visibility_timeout: None,
            retention_period: None,
            receive_message_wait_time: None,
            delivery_delay: None,
            fifo: false,
            removal_policy: RemovalPolicy::Delete,
        }
    }
}

impl QueueProps {
    pub fn validate(&self) -> Result<(), SqsError> {
        if let Some(t) = self.visibility_timeout {
            check_range("VisibilityTimeout", t.as_secs(), 0, 43_200)?;
        }
        if let Some(t) = self.retention_period {
            check_range("MessageRetentionPeriod", t.as_secs(), 60, 1_209_600)?;
        }
        if let Some(t) = self.receive_message_wait_time {
            check_range("ReceiveMessageWaitTimeSeconds", t.as_secs(), 0, 20)?;
        }
        if let Some(t) = self.delivery_delay {
            check_range("DelaySeconds", t.as_secs(), 0, 900)?;
        }
        if let Some(name) = &self.queue_name {
            let base = match (self.fifo, name.strip_suffix(".fifo")) {
                (true, Some(base)) if name.len() <= 80 => base,
                (true, _) => {
                    return Err(SqsError::InvalidQueueName(format!(
                        "FIFO queue name '{name}' must end in .fifo and be at most 80 characters"
                    )))
                }
                (false, Some(_)) => {
                    return Err(SqsError::InvalidQueueName(format!(
                        "'{name}' ends in .fifo but the queue is not FIFO"
                    )))
                }
                (false, None) => name.as_str(),
            };
            if !QUEUE_NAME.is_match(base) {
                return Err(SqsError::InvalidQueueName(format!(
                    "'{name}' may only contain alphanumerics, hyphens and underscores (1-80)"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnQueue {
    #[serde(skip_serializing_if = "Option::is_none")]
    delay_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fifo_queue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_retention_period: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    receive_message_wait_time_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility_timeout: Option<u64>,
}

impl CfnResource for CfnQueue {
    const TYPE: &'static str = "AWS::SQS::Queue";
}

/// A declared queue
#[derive(Debug, Clone)]
pub struct Queue {
    id: String,
    logical_id: LogicalId,
    visibility_timeout: Duration,
    fifo: bool,
}

impl Queue {
    pub fn declare(stack: &mut Stack, id: &str, props: QueueProps) -> Result<Self, SqsError> {
        props
            .validate()
            .map_err(|e| with_resource(e, id))?;

        let logical_id = stack.add(
            &[id, "Resource"],
            &CfnQueue {
                delay_seconds: props.delivery_delay.map(|d| d.as_secs()),
                fifo_queue: props.fifo.then_some(true),
                message_retention_period: props.retention_period.map(|d| d.as_secs()),
                queue_name: props.queue_name.clone(),
                receive_message_wait_time_seconds: props
                    .receive_message_wait_time
                    .map(|d| d.as_secs()),
                visibility_timeout: props.visibility_timeout.map(|d| d.as_secs()),
            },
        )?;
        stack.set_removal_policy(&logical_id, props.removal_policy)?;

        let visibility_timeout = props.visibility_timeout.unwrap_or(DEFAULT_VISIBILITY_TIMEOUT);
        info!(
            queue = %logical_id,
            visibility_timeout = visibility_timeout.as_secs(),
            fifo = props.fifo,
            "Declared queue"
        );

        Ok(Self {
            id: id.to_string(),
            logical_id,
            visibility_timeout,
            fifo: props.fifo,
        })
    }

    /// Construct id the queue was declared under
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    pub fn arn(&self) -> Expr {
        Expr::get_att(&self.logical_id, "Arn")
    }

    pub fn queue_name(&self) -> Expr {
        Expr::get_att(&self.logical_id, "QueueName")
    }

    /// Effective visibility timeout, including the service default
    pub fn visibility_timeout(&self) -> Duration {
        self.visibility_timeout
    }

    pub fn is_fifo(&self) -> bool {
        self.fifo
    }

    pub fn grant_send_messages(&self, grantee: &mut Role) -> Result<(), SqsError> {
        grantee.add_to_policy(
            Statement::allow()
                .actions(SEND_ACTIONS.iter().copied())
                .resource(self.arn()),
        )?;
        Ok(())
    }

    pub fn grant_consume_messages(&self, grantee: &mut Role) -> Result<(), SqsError> {
        grantee.add_to_policy(
            Statement::allow()
                .actions(CONSUME_ACTIONS.iter().copied())
                .resource(self.arn()),
        )?;
        Ok(())
    }
}

fn with_resource(error: SqsError, id: &str) -> SqsError {
    match error {
        SqsError::InvalidParameter(e) => SqsError::InvalidParameter(e.with_resource(id)),
        other => other,
    }
}
