//! The API Gateway to SQS to Lambda topology
//!
//! Declarations run in dependency order: the queue first, then the gateway's
//! role (its policy needs the queue ARN), then the REST API (needs the queue and
//! the role), and finally the function bound to the queue.

use tracing::info;

use queuegate_apigateway::{
    DeclaredRestApi, HttpMethod, Integration, IntegrationResponse, MethodOptions,
    MethodResponse, PassthroughBehavior, RestApi, RestApiProps,
};
use queuegate_iam::{ManagedPolicy, Principal, Role, RoleProps};
use queuegate_lambda::{EventSourceMapping, Function};
use queuegate_sqs::Queue;
use queuegate_template::{Expr, Stack, Template};

use crate::config::{QueueAccess, RootMethod, StackConfig};
use crate::error::StackError;

pub const QUEUE_ID: &str = "ApiGatewaySqsLambdaQueue";
pub const ROLE_ID: &str = "RestApiRole";
pub const API_ID: &str = "ApiGateway";
pub const FUNCTION_ID: &str = "SqsTriggerLambda";

/// Form body the gateway posts to the queue service
pub const SEND_MESSAGE_TEMPLATE: &str = "Action=SendMessage&MessageBody=$input.body";

const CLIENT_ERROR_TEMPLATE: &str =
    r#"{"message": "The queue service rejected the request", "requestId": "$context.requestId"}"#;
const SERVER_ERROR_TEMPLATE: &str =
    r#"{"message": "The queue service is unavailable", "requestId": "$context.requestId"}"#;

/// Everything declared for one configuration
#[derive(Debug)]
pub struct Topology {
    stack: Stack,
    queue: Queue,
    role: Role,
    api: DeclaredRestApi,
    function: Function,
    mapping: EventSourceMapping,
}

impl Topology {
    pub fn build(config: &StackConfig) -> Result<Self, StackError> {
        let mut stack = Stack::new(config.name.clone(), config.environment());
        if let Some(description) = &config.description {
            stack = stack.with_description(description.clone());
        }

        let queue = Queue::declare(&mut stack, QUEUE_ID, config.queue.props())?;
        let role = declare_role(&mut stack, config, &queue)?;
        let api = declare_api(&mut stack, config, &queue, &role)?;

        let mut function = Function::declare(&mut stack, FUNCTION_ID, config.function.props())?;
        let mapping = config
            .event_source
            .source()
            .bind(&mut stack, &mut function, &queue)?;
        function.attach_role_policy(&mut stack)?;

        info!(
            stack = %stack.name(),
            queue = %queue.logical_id(),
            api = %api.rest_api_id(),
            function = %function.logical_id(),
            "Composed topology"
        );

        Ok(Self {
            stack,
            queue,
            role,
            api,
            function,
            mapping,
        })
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Role the gateway assumes to reach the queue
    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn api(&self) -> &DeclaredRestApi {
        &self.api
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn mapping(&self) -> &EventSourceMapping {
        &self.mapping
    }

    pub fn synth(&self) -> Result<Template, StackError> {
        Ok(self.stack.synth()?)
    }
}

fn declare_role(
    stack: &mut Stack,
    config: &StackConfig,
    queue: &Queue,
) -> Result<Role, StackError> {
    let mut props = RoleProps::assumed_by(Principal::service("apigateway.amazonaws.com"));
    if config.role.access == QueueAccess::Full {
        props = props.managed_policy(ManagedPolicy::aws_managed("AmazonSQSFullAccess"));
    }

    let mut role = Role::declare(stack, &[ROLE_ID], props)?;
    if config.role.access == QueueAccess::SendOnly {
        queue.grant_send_messages(&mut role)?;
    }
    role.attach_default_policy(stack)?;
    Ok(role)
}

fn declare_api(
    stack: &mut Stack,
    config: &StackConfig,
    queue: &Queue,
    role: &Role,
) -> Result<DeclaredRestApi, StackError> {
    let mut api = RestApi::new(
        API_ID,
        RestApiProps {
            rest_api_name: config.api.name.clone(),
            description: config.api.description.clone(),
            stage_name: config.api.stage.clone(),
        },
    );

    let root = api.root();
    if config.api.root_method == RootMethod::Mock {
        api.add_method(root, HttpMethod::Any, Integration::mock(), MethodOptions::default())?;
    }

    let resource = api.add_resource(root, &config.api.resource_path)?;
    let queue_path = Expr::concat([stack.account(), Expr::from("/"), queue.queue_name()]);

    let mut integration = Integration::aws("sqs", stack.region(), queue_path)
        .credentials(role.arn())
        .passthrough(PassthroughBehavior::Never)
        .request_parameter(
            "integration.request.header.Content-Type",
            "'application/x-www-form-urlencoded'",
        )
        .request_template("application/json", SEND_MESSAGE_TEMPLATE)
        .response(IntegrationResponse::new("200").template("application/json", ""));
    let mut options = MethodOptions {
        api_key_required: config.api.api_key_required,
        ..MethodOptions::default()
    }
    .response(MethodResponse::new("200"));

    if config.api.error_responses {
        integration = integration
            .response(
                IntegrationResponse::new("400")
                    .selection_pattern(r"4\d{2}")
                    .template("application/json", CLIENT_ERROR_TEMPLATE),
            )
            .response(
                IntegrationResponse::new("500")
                    .selection_pattern(r"5\d{2}")
                    .template("application/json", SERVER_ERROR_TEMPLATE),
            );
        options = options
            .response(MethodResponse::new("400").model("application/json", "Error"))
            .response(MethodResponse::new("500").model("application/json", "Error"));
    }

    api.add_method(resource, HttpMethod::Post, integration, options)?;
    let resource_path = api.path_of(resource);
    let declared = api.declare(stack)?;

    // The stage must not go live before the gateway may send to the queue
    if let Some(policy) = role.default_policy_id() {
        if let Some(method) = declared.method_id(&resource_path, HttpMethod::Post) {
            stack.add_dependency(method, policy)?;
        }
        stack.add_dependency(declared.deployment_id(), policy)?;
    }
    Ok(declared)
}
