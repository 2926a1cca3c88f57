//! Properties of the synthesized API Gateway to SQS to Lambda stack

use serde_json::{json, Value};
use std::collections::BTreeMap;

use queuegate_apigateway::render_request_template;
use queuegate_stack::{QueueAccess, RootMethod, StackConfig, Topology};
use queuegate_template::{deployment_order, diff, RemovalPolicy, ResourceChange, Template};
use queuegate_test::{CodeDir, TemplateAssertions};

const METHOD: &str = "AWS::ApiGateway::Method";

fn synth(code: &CodeDir, configure: impl FnOnce(&mut StackConfig)) -> (Topology, Template) {
    queuegate_test::init_tracing();
    let mut config = StackConfig::default();
    config.function.code_dir = code.path().to_path_buf();
    configure(&mut config);

    let topology = Topology::build(&config).unwrap();
    let template = topology.synth().unwrap();
    (topology, template)
}

fn default_stack() -> (CodeDir, Topology, Template) {
    let code = CodeDir::python_handler();
    let (topology, template) = synth(&code, |_| {});
    (code, topology, template)
}

/// The POST method on the `example` resource
fn post_method(template: &Template) -> &Value {
    let assert = TemplateAssertions::new(template);
    let (resource_id, _) = assert.only("AWS::ApiGateway::Resource");
    let methods = assert.find_resources(METHOD, &json!({"ResourceId": {"Ref": resource_id}}));
    assert_eq!(methods.len(), 1);
    &template.resource(methods[0]).unwrap().properties
}

#[test]
fn test_queue_visibility_timeout() {
    let (_code, topology, template) = default_stack();
    let assert = TemplateAssertions::new(&template);

    assert.resource_count_is("AWS::SQS::Queue", 1);
    assert.has_resource_properties("AWS::SQS::Queue", &json!({"VisibilityTimeout": 300}));

    let queue = template.resource(topology.queue().logical_id().as_str()).unwrap();
    assert_eq!(queue.deletion_policy, Some(RemovalPolicy::Delete));
}

#[test]
fn test_role_trusts_only_api_gateway() {
    let (_code, topology, template) = default_stack();
    let role = template.resource(topology.role().logical_id().as_str()).unwrap();

    let statements = role.properties["AssumeRolePolicyDocument"]["Statement"]
        .as_array()
        .unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0]["Action"], "sts:AssumeRole");
    assert_eq!(
        statements[0]["Principal"],
        json!({"Service": "apigateway.amazonaws.com"})
    );
}

#[test]
fn test_role_policy_grants_send_on_queue() {
    let (_code, topology, template) = default_stack();
    let assert = TemplateAssertions::new(&template);

    let policies = assert.find_resources(
        "AWS::IAM::Policy",
        &json!({"Roles": [{"Ref": topology.role().logical_id().as_str()}]}),
    );
    assert_eq!(policies.len(), 1);

    let policy = &template.resource(policies[0]).unwrap().properties;
    let statement = &policy["PolicyDocument"]["Statement"][0];
    assert_eq!(statement["Effect"], "Allow");
    assert_eq!(
        statement["Resource"],
        json!({"Fn::GetAtt": [topology.queue().logical_id().as_str(), "Arn"]})
    );
    let actions: Vec<&str> = statement["Action"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(actions.contains(&"sqs:SendMessage"));
    assert!(!actions.contains(&"sqs:DeleteMessage"));
}

#[test]
fn test_full_access_attaches_managed_policy() {
    let code = CodeDir::python_handler();
    let (topology, template) = synth(&code, |c| c.role.access = QueueAccess::Full);

    let role = template.resource(topology.role().logical_id().as_str()).unwrap();
    assert_eq!(
        role.properties["ManagedPolicyArns"],
        json!([{"Fn::Join": ["", [
            "arn:",
            {"Ref": "AWS::Partition"},
            ":iam::aws:policy/AmazonSQSFullAccess"
        ]]}])
    );
    TemplateAssertions::new(&template).resource_count_is("AWS::IAM::Policy", 1);
}

#[test]
fn test_single_example_resource_with_single_post() {
    let (_code, _topology, template) = default_stack();
    let assert = TemplateAssertions::new(&template);

    let (_, resource) = assert.only("AWS::ApiGateway::Resource");
    assert_eq!(resource.properties["PathPart"], "example");

    let method = post_method(&template);
    assert_eq!(method["HttpMethod"], "POST");
    assert_eq!(method["AuthorizationType"], "NONE");
}

#[test]
fn test_post_integration_targets_queue_service() {
    let (_code, topology, template) = default_stack();
    let integration = &post_method(&template)["Integration"];

    assert_eq!(integration["Type"], "AWS");
    assert_eq!(integration["IntegrationHttpMethod"], "POST");
    assert_eq!(integration["PassthroughBehavior"], "NEVER");
    assert_eq!(
        integration["Credentials"],
        json!({"Fn::GetAtt": [topology.role().logical_id().as_str(), "Arn"]})
    );
    assert_eq!(
        integration["RequestParameters"]["integration.request.header.Content-Type"],
        "'application/x-www-form-urlencoded'"
    );
    assert_eq!(
        integration["Uri"],
        json!({"Fn::Join": ["", [
            "arn:",
            {"Ref": "AWS::Partition"},
            ":apigateway:",
            {"Ref": "AWS::Region"},
            ":sqs:path/",
            {"Ref": "AWS::AccountId"},
            "/",
            {"Fn::GetAtt": [topology.queue().logical_id().as_str(), "QueueName"]}
        ]]})
    );
}

#[test]
fn test_pinned_environment_reaches_uri_and_endpoint() {
    let code = CodeDir::python_handler();
    let (topology, template) = synth(&code, |c| {
        c.account = Some("123456789012".to_string());
        c.region = Some("eu-west-1".to_string());
    });

    assert_eq!(
        post_method(&template)["Integration"]["Uri"],
        json!({"Fn::Join": ["", [
            "arn:",
            {"Ref": "AWS::Partition"},
            ":apigateway:eu-west-1:sqs:path/123456789012/",
            {"Fn::GetAtt": [topology.queue().logical_id().as_str(), "QueueName"]}
        ]]})
    );

    let endpoint = &template.outputs[topology.api().url_output_id().as_str()];
    assert_eq!(
        endpoint.value,
        json!({"Fn::Join": ["", [
            "https://",
            {"Ref": topology.api().rest_api_id().as_str()},
            ".execute-api.eu-west-1.",
            {"Ref": "AWS::URLSuffix"},
            "/",
            {"Ref": topology.api().stage_id().as_str()},
            "/"
        ]]})
    );
}

#[test]
fn test_invalid_stage_name_rejected() {
    let code = CodeDir::python_handler();
    let mut config = StackConfig::default();
    config.function.code_dir = code.path().to_path_buf();
    config.api.stage = "prod v2".to_string();

    let err = Topology::build(&config).unwrap_err();
    assert!(err.to_string().contains("prod v2"), "{err}");
}

#[test]
fn test_request_template_literal() {
    let (_code, _topology, template) = default_stack();
    assert_eq!(
        post_method(&template)["Integration"]["RequestTemplates"],
        json!({"application/json": "Action=SendMessage&MessageBody=$input.body"})
    );
}

#[test]
fn test_success_response_is_200_with_empty_body() {
    let (_code, _topology, template) = default_stack();
    let method = post_method(&template);

    let success = method["Integration"]["IntegrationResponses"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r.get("SelectionPattern").is_none())
        .unwrap();
    assert_eq!(success["StatusCode"], "200");
    assert_eq!(success["ResponseTemplates"], json!({"application/json": ""}));

    let statuses: Vec<&str> = method["MethodResponses"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|r| r["StatusCode"].as_str())
        .collect();
    assert_eq!(statuses, ["200", "400", "500"]);
}

#[test]
fn test_error_statuses_are_mapped() {
    let (_code, _topology, template) = default_stack();
    let method = post_method(&template);

    let integration_response = |status: &str| {
        method["Integration"]["IntegrationResponses"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["StatusCode"] == status)
            .unwrap()
            .clone()
    };
    for (status, pattern) in [("400", r"4\d{2}"), ("500", r"5\d{2}")] {
        let response = integration_response(status);
        assert_eq!(response["SelectionPattern"], pattern);

        let body = response["ResponseTemplates"]["application/json"]
            .as_str()
            .unwrap();
        let rendered: Value = serde_json::from_str(body).unwrap();
        assert_eq!(rendered["requestId"], "$context.requestId");
        assert!(rendered["message"].is_string());
    }

    let method_responses: BTreeMap<&str, &Value> = method["MethodResponses"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| (r["StatusCode"].as_str().unwrap(), &r["ResponseModels"]))
        .collect();
    assert_eq!(method_responses["400"], &json!({"application/json": "Error"}));
    assert_eq!(method_responses["500"], &json!({"application/json": "Error"}));
    assert_eq!(method_responses["200"], &Value::Null);
}

#[test]
fn test_error_mapping_can_be_disabled() {
    let code = CodeDir::python_handler();
    let (_topology, template) = synth(&code, |c| c.api.error_responses = false);
    let method = post_method(&template);

    assert_eq!(
        method["Integration"]["IntegrationResponses"],
        json!([{"ResponseTemplates": {"application/json": ""}, "StatusCode": "200"}])
    );
    assert_eq!(method["MethodResponses"], json!([{"StatusCode": "200"}]));
}

#[test]
fn test_root_method() {
    let (_code, _topology, template) = default_stack();
    TemplateAssertions::new(&template).has_resource_properties(
        METHOD,
        &json!({"HttpMethod": "ANY", "Integration": {"Type": "MOCK"}}),
    );

    let code = CodeDir::python_handler();
    let (_topology, template) = synth(&code, |c| c.api.root_method = RootMethod::None);
    let assert = TemplateAssertions::new(&template);
    assert.resource_count_is(METHOD, 1);
    assert!(assert.find_resources(METHOD, &json!({"HttpMethod": "ANY"})).is_empty());
}

#[test]
fn test_single_event_source_mapping_on_queue() {
    let (_code, topology, template) = default_stack();
    let assert = TemplateAssertions::new(&template);

    let (_, mapping) = assert.only("AWS::Lambda::EventSourceMapping");
    assert_eq!(
        mapping.properties["EventSourceArn"],
        json!({"Fn::GetAtt": [topology.queue().logical_id().as_str(), "Arn"]})
    );
    assert_eq!(
        mapping.properties["FunctionName"],
        json!({"Ref": topology.function().logical_id().as_str()})
    );
}

#[test]
fn test_function_defaults() {
    let (_code, topology, template) = default_stack();
    let function = template.resource(topology.function().logical_id().as_str()).unwrap();

    assert_eq!(function.properties["Runtime"], "python3.9");
    assert_eq!(function.properties["Handler"], "lambda-handler.handler");
    assert_eq!(
        function.properties["Code"]["S3Key"],
        topology.function().asset().object_key()
    );

    let execution_role = topology.function().role();
    assert!(execution_role.default_policy().allows("sqs:ReceiveMessage"));
    let policy = execution_role.default_policy_id().unwrap();
    assert!(function.depends_on.contains(&policy.to_string()));
}

#[test]
fn test_request_template_preview() {
    let (_code, _topology, template) = default_stack();
    let templates = &post_method(&template)["Integration"]["RequestTemplates"];
    let request_template = templates["application/json"].as_str().unwrap();

    let body = render_request_template(request_template, "hello");
    let form: BTreeMap<String, String> = form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect();
    assert_eq!(form["Action"], "SendMessage");
    assert_eq!(form["MessageBody"], "hello");
}

#[test]
fn test_synthesis_is_idempotent() {
    let code = CodeDir::python_handler();
    let (_, first) = synth(&code, |_| {});
    let (_, second) = synth(&code, |_| {});

    assert!(diff(&first, &second).is_empty());
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

#[test]
fn test_visibility_change_is_in_place() {
    let code = CodeDir::python_handler();
    let (topology, before) = synth(&code, |_| {});
    let (_, after) = synth(&code, |c| c.queue.visibility_timeout_secs = 600);

    let changes = diff(&before, &after);
    assert_eq!(changes.resources.len(), 1);
    match &changes.resources[topology.queue().logical_id().as_str()] {
        ResourceChange::Modified {
            requires_replacement,
            ..
        } => assert!(!requires_replacement),
        other => panic!("unexpected change {other:?}"),
    }
}

#[test]
fn test_integration_change_redeploys_api() {
    let code = CodeDir::python_handler();
    let (topology, before) = synth(&code, |_| {});
    let (changed, after) = synth(&code, |c| c.api.error_responses = false);

    assert_ne!(topology.api().deployment_id(), changed.api().deployment_id());
    let changes = diff(&before, &after);
    assert!(matches!(
        changes.resources[topology.api().deployment_id().as_str()],
        ResourceChange::Removed { .. }
    ));
    assert!(matches!(
        changes.resources[changed.api().deployment_id().as_str()],
        ResourceChange::Added { .. }
    ));
}

#[test]
fn test_deployment_order() {
    let (_code, topology, template) = default_stack();
    let order = deployment_order(&template).unwrap();
    let position = |id: &str| order.iter().position(|o| o == id).unwrap();

    let queue = position(topology.queue().logical_id().as_str());
    let policy = position(topology.role().default_policy_id().unwrap().as_str());
    let method = position(
        topology
            .api()
            .method_id("/example", queuegate_apigateway::HttpMethod::Post)
            .unwrap()
            .as_str(),
    );
    let mapping = position(topology.mapping().logical_id().as_str());

    let deployment = position(topology.api().deployment_id().as_str());
    let stage = position(topology.api().stage_id().as_str());

    assert!(queue < policy);
    assert!(queue < method);
    assert!(queue < mapping);
    assert!(policy < method);
    assert!(policy < deployment);
    assert!(method < deployment);
    assert!(deployment < stage);
}

#[test]
fn test_visibility_shorter_than_function_timeout_rejected() {
    let code = CodeDir::python_handler();
    let mut config = StackConfig::default();
    config.function.code_dir = code.path().to_path_buf();
    config.queue.visibility_timeout_secs = 10;
    config.function.timeout_secs = Some(30);

    assert!(Topology::build(&config).is_err());
}
