//! Stack composition errors

use thiserror::Error;

use queuegate_apigateway::ApiGatewayError;
use queuegate_iam::IamError;
use queuegate_lambda::LambdaError;
use queuegate_sqs::SqsError;
use queuegate_template::TemplateError;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Queue: {0}")]
    Queue(#[from] SqsError),
    #[error("Role: {0}")]
    Role(#[from] IamError),
    #[error("API: {0}")]
    Api(#[from] ApiGatewayError),
    #[error("Function: {0}")]
    Function(#[from] LambdaError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
