//! Queue event source binding

use serde::Serialize;
use std::time::Duration;
use tracing::info;

use queuegate_core::error::check_range;
use queuegate_core::{ErrorCode, LogicalId, ValidationError};
use queuegate_sqs::Queue;
use queuegate_template::{CfnResource, Expr, Stack};

use crate::function::{Function, LambdaError};

/// Largest batch accepted without a batching window
const MAX_UNBATCHED_SIZE: u32 = 10;

/// Pull-based binding of a queue to a function
#[derive(Debug, Clone)]
pub struct SqsEventSource {
    pub batch_size: Option<u32>,
    pub max_batching_window: Option<Duration>,
    pub enabled: bool,
    /// Let the function report partial batch failures
    pub report_batch_item_failures: bool,
}

impl Default for SqsEventSource {
    fn default() -> Self {
        Self {
            batch_size: None,
            max_batching_window: None,
            enabled: true,
            report_batch_item_failures: false,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnEventSourceMapping {
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    event_source_arn: Expr,
    function_name: Expr,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    function_response_types: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_batching_window_in_seconds: Option<u64>,
}

impl CfnResource for CfnEventSourceMapping {
    const TYPE: &'static str = "AWS::Lambda::EventSourceMapping";
}

impl SqsEventSource {
    pub fn validate(&self, queue: &Queue) -> Result<(), ValidationError> {
        if let Some(size) = self.batch_size {
            check_range("BatchSize", u64::from(size), 1, 10_000)?;
        }
        if let Some(window) = self.max_batching_window {
            check_range("MaximumBatchingWindowInSeconds", window.as_secs(), 0, 300)?;
        }
        let size = self.batch_size.unwrap_or(MAX_UNBATCHED_SIZE);
        if queue.is_fifo() {
            if size > MAX_UNBATCHED_SIZE {
                return Err(ValidationError::new(
                    ErrorCode::IncompatibleSettings,
                    format!("batch size {size} exceeds {MAX_UNBATCHED_SIZE} for a FIFO queue"),
                ));
            }
            if self.max_batching_window.is_some() {
                return Err(ValidationError::new(
                    ErrorCode::IncompatibleSettings,
                    "FIFO queues do not support a batching window",
                ));
            }
        } else if size > MAX_UNBATCHED_SIZE && self.max_batching_window.is_none() {
            return Err(ValidationError::new(
                ErrorCode::IncompatibleSettings,
                format!("batch size {size} above {MAX_UNBATCHED_SIZE} requires a batching window"),
            ));
        }
        Ok(())
    }

    /// Grant the function's role consume access and declare the mapping
    pub fn bind(
        self,
        stack: &mut Stack,
        function: &mut Function,
        queue: &Queue,
    ) -> Result<EventSourceMapping, LambdaError> {
        let resource = format!("{}/{}", function.id(), queue.id());
        self.validate(queue)
            .map_err(|e| e.with_resource(resource.clone()))?;

        if queue.visibility_timeout() < function.timeout() {
            return Err(ValidationError::new(
                ErrorCode::IncompatibleSettings,
                format!(
                    "queue visibility timeout ({}s) is shorter than the function timeout ({}s)",
                    queue.visibility_timeout().as_secs(),
                    function.timeout().as_secs()
                ),
            )
            .with_resource(resource)
            .into());
        }

        queue.grant_consume_messages(function.role_mut())?;

        let construct = format!("SqsEventSource:{}", queue.id());
        let logical_id = stack.add(
            &[function.id(), construct.as_str(), "Resource"],
            &CfnEventSourceMapping {
                batch_size: self.batch_size,
                enabled: (!self.enabled).then_some(false),
                event_source_arn: queue.arn(),
                function_name: Expr::reference(function.logical_id()),
                function_response_types: if self.report_batch_item_failures {
                    vec!["ReportBatchItemFailures"]
                } else {
                    Vec::new()
                },
                maximum_batching_window_in_seconds: self.max_batching_window.map(|w| w.as_secs()),
            },
        )?;

        info!(
            mapping = %logical_id,
            queue = %queue.logical_id(),
            function = %function.logical_id(),
            batch_size = ?self.batch_size,
            "Bound queue event source"
        );

        Ok(EventSourceMapping {
            logical_id,
            queue: queue.logical_id().clone(),
            function: function.logical_id().clone(),
        })
    }
}

/// A declared event source mapping
#[derive(Debug, Clone)]
pub struct EventSourceMapping {
    logical_id: LogicalId,
    queue: LogicalId,
    function: LogicalId,
}

impl EventSourceMapping {
    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    pub fn queue(&self) -> &LogicalId {
        &self.queue
    }

    pub fn function(&self) -> &LogicalId {
        &self.function
    }
}
