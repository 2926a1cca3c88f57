//! API Gateway REST API declarations for queuegate
//!
//! Builds a resource tree with methods and their backend integrations in
//! memory, then declares the API, its resources and methods, a deployment
//! fingerprinted by the API definition, and a stage.

pub mod integration;
pub mod method;
mod rest_api;

pub use integration::{
    render_request_template, Integration, IntegrationResponse, IntegrationType,
    PassthroughBehavior,
};
pub use method::{HttpMethod, MethodOptions, MethodResponse};
pub use rest_api::{ApiGatewayError, DeclaredRestApi, ResourceHandle, RestApi, RestApiProps};
