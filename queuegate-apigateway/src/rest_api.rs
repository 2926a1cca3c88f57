//! REST API resource tree and its declaration

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use queuegate_core::logical_id::short_hash;
use queuegate_core::{LogicalId, ValidationError};
use queuegate_template::{CfnResource, Expr, Pseudo, Stack, TemplateError};

use crate::integration::Integration;
use crate::method::{HttpMethod, MethodOptions, MethodResponse};

static PATH_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\{[A-Za-z0-9_]+\+?\}|[A-Za-z0-9._~:@!$&'()*+,;=-]+)$").expect("valid regex")
});

static STAGE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid regex"));

#[derive(Debug, Error)]
pub enum ApiGatewayError {
    #[error("Invalid path part: {0}")]
    InvalidPathPart(String),
    #[error("Invalid stage name: {0}")]
    InvalidStageName(String),
    #[error("Resource already exists: {0}")]
    DuplicateResource(String),
    #[error("Method {method} already defined on {path}")]
    DuplicateMethod { path: String, method: HttpMethod },
    #[error("Unknown resource handle")]
    UnknownResource,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[derive(Debug, Clone)]
pub struct RestApiProps {
    pub rest_api_name: String,
    pub description: Option<String>,
    pub stage_name: String,
}

impl RestApiProps {
    pub fn named(rest_api_name: impl Into<String>) -> Self {
        Self {
            rest_api_name: rest_api_name.into(),
            description: None,
            stage_name: "prod".to_string(),
        }
    }

    /// Stage names are limited to letters, digits, `_` and `-`
    pub fn validate(&self) -> Result<(), ApiGatewayError> {
        if !STAGE_NAME.is_match(&self.stage_name) {
            return Err(ApiGatewayError::InvalidStageName(self.stage_name.clone()));
        }
        Ok(())
    }
}

/// Position of a resource in the API's tree; the root is always present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHandle(usize);

#[derive(Debug, Clone)]
struct MethodDef {
    integration: Integration,
    options: MethodOptions,
}

#[derive(Debug, Clone)]
struct ResourceNode {
    /// `None` for the root
    path_part: Option<String>,
    parent: Option<usize>,
    methods: BTreeMap<HttpMethod, MethodDef>,
}

/// An API under construction
#[derive(Debug, Clone)]
pub struct RestApi {
    id: String,
    props: RestApiProps,
    nodes: Vec<ResourceNode>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnRestApi {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    name: String,
}

impl CfnResource for CfnRestApi {
    const TYPE: &'static str = "AWS::ApiGateway::RestApi";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnApiResource {
    parent_id: Expr,
    path_part: String,
    rest_api_id: Expr,
}

impl CfnResource for CfnApiResource {
    const TYPE: &'static str = "AWS::ApiGateway::Resource";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnMethod<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key_required: Option<bool>,
    authorization_type: &'static str,
    http_method: HttpMethod,
    integration: &'a Integration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    method_responses: Vec<MethodResponse>,
    resource_id: Expr,
    rest_api_id: Expr,
}

impl CfnResource for CfnMethod<'_> {
    const TYPE: &'static str = "AWS::ApiGateway::Method";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnDeployment {
    description: String,
    rest_api_id: Expr,
}

impl CfnResource for CfnDeployment {
    const TYPE: &'static str = "AWS::ApiGateway::Deployment";
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CfnStage {
    deployment_id: Expr,
    rest_api_id: Expr,
    stage_name: String,
}

impl CfnResource for CfnStage {
    const TYPE: &'static str = "AWS::ApiGateway::Stage";
}

impl RestApi {
    pub fn new(id: impl Into<String>, props: RestApiProps) -> Self {
        Self {
            id: id.into(),
            props,
            nodes: vec![ResourceNode {
                path_part: None,
                parent: None,
                methods: BTreeMap::new(),
            }],
        }
    }

    pub fn root(&self) -> ResourceHandle {
        ResourceHandle(0)
    }

    pub fn add_resource(
        &mut self,
        parent: ResourceHandle,
        path_part: &str,
    ) -> Result<ResourceHandle, ApiGatewayError> {
        self.node(parent)?;
        if !PATH_PART.is_match(path_part) {
            return Err(ApiGatewayError::InvalidPathPart(path_part.to_string()));
        }
        let taken = self
            .nodes
            .iter()
            .any(|n| n.parent == Some(parent.0) && n.path_part.as_deref() == Some(path_part));
        if taken {
            return Err(ApiGatewayError::DuplicateResource(format!(
                "{}/{}",
                self.path_of(parent).trim_end_matches('/'),
                path_part
            )));
        }

        self.nodes.push(ResourceNode {
            path_part: Some(path_part.to_string()),
            parent: Some(parent.0),
            methods: BTreeMap::new(),
        });
        Ok(ResourceHandle(self.nodes.len() - 1))
    }

    pub fn add_method(
        &mut self,
        resource: ResourceHandle,
        method: HttpMethod,
        integration: Integration,
        options: MethodOptions,
    ) -> Result<(), ApiGatewayError> {
        let path = self.path_of(resource);
        integration
            .validate()
            .map_err(|e| e.with_resource(format!("{method} {path}")))?;

        if let Some(missing) = integration.responses().iter().find(|r| {
            !options
                .method_responses
                .iter()
                .any(|m| m.status_code == r.status_code)
        }) {
            return Err(ValidationError::invalid_parameter(format!(
                "integration response {} of {method} {path} has no matching method response",
                missing.status_code
            ))
            .into());
        }

        let node = self
            .nodes
            .get_mut(resource.0)
            .ok_or(ApiGatewayError::UnknownResource)?;
        if node.methods.contains_key(&method) {
            return Err(ApiGatewayError::DuplicateMethod { path, method });
        }
        node.methods.insert(
            method,
            MethodDef {
                integration,
                options,
            },
        );
        debug!(api = %self.id, %method, %path, "Added method");
        Ok(())
    }

    /// Request path of a resource, e.g. `/` or `/example`
    pub fn path_of(&self, handle: ResourceHandle) -> String {
        let parts = self.parts_of(handle.0);
        format!("/{}", parts.join("/"))
    }

    /// Every (path, method) pair, in declaration order of resources
    pub fn routes(&self) -> Vec<(String, HttpMethod)> {
        (0..self.nodes.len())
            .flat_map(|i| {
                let path = self.path_of(ResourceHandle(i));
                self.nodes[i]
                    .methods
                    .keys()
                    .map(move |m| (path.clone(), *m))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn node(&self, handle: ResourceHandle) -> Result<&ResourceNode, ApiGatewayError> {
        self.nodes.get(handle.0).ok_or(ApiGatewayError::UnknownResource)
    }

    fn parts_of(&self, index: usize) -> Vec<&str> {
        let mut parts = Vec::new();
        let mut current = Some(index);
        while let Some(i) = current {
            let node = &self.nodes[i];
            if let Some(part) = &node.path_part {
                parts.push(part.as_str());
            }
            current = node.parent;
        }
        parts.reverse();
        parts
    }

    /// Construct path of a node: `<id>/Default/<parts...>`
    fn construct_path(&self, index: usize) -> Vec<&str> {
        let mut path = vec![self.id.as_str(), "Default"];
        path.extend(self.parts_of(index));
        path
    }

    /// Write the API to the stack
    pub fn declare(self, stack: &mut Stack) -> Result<DeclaredRestApi, ApiGatewayError> {
        self.props.validate()?;

        let rest_api_id = stack.add(
            &[self.id.as_str(), "Resource"],
            &CfnRestApi {
                description: self.props.description.clone(),
                name: self.props.rest_api_name.clone(),
            },
        )?;
        let rest_api_ref = Expr::reference(&rest_api_id);

        // Node index -> resource id expression; the root comes from the API itself
        let mut resource_ids: Vec<Expr> = Vec::with_capacity(self.nodes.len());
        let mut resources = BTreeMap::new();
        let mut members: Vec<LogicalId> = Vec::new();

        for (index, node) in self.nodes.iter().enumerate() {
            let (Some(parent), Some(part)) = (node.parent, &node.path_part) else {
                resource_ids.push(Expr::get_att(&rest_api_id, "RootResourceId"));
                continue;
            };
            let mut path = self.construct_path(index);
            path.push("Resource");
            let id = stack.add(
                &path,
                &CfnApiResource {
                    parent_id: resource_ids[parent].clone(),
                    path_part: part.clone(),
                    rest_api_id: rest_api_ref.clone(),
                },
            )?;
            resource_ids.push(Expr::reference(&id));
            resources.insert(self.path_of(ResourceHandle(index)), id.clone());
            members.push(id);
        }

        let mut methods = BTreeMap::new();
        for (index, node) in self.nodes.iter().enumerate() {
            for (method, def) in &node.methods {
                let mut path = self.construct_path(index);
                path.push(method.as_str());
                path.push("Resource");
                let id = stack.add(
                    &path,
                    &CfnMethod {
                        api_key_required: def.options.api_key_required.then_some(true),
                        authorization_type: "NONE",
                        http_method: *method,
                        integration: &def.integration,
                        method_responses: def.options.method_responses.clone(),
                        resource_id: resource_ids[index].clone(),
                        rest_api_id: rest_api_ref.clone(),
                    },
                )?;
                methods.insert((self.path_of(ResourceHandle(index)), *method), id.clone());
                members.push(id);
            }
        }

        // A new deployment is needed whenever the API definition changes, so the
        // definition's hash is part of the deployment's logical id.
        let mut definition = Vec::new();
        for id in &members {
            if let Some(entry) = stack.resource(id) {
                let properties =
                    serde_json::to_vec(&entry.properties).map_err(TemplateError::from)?;
                definition.extend(properties);
            }
        }
        let deployment_path = [self.id.as_str(), "Deployment", "Resource"];
        let deployment_id = LogicalId::new(format!(
            "{}{}",
            LogicalId::from_path(&deployment_path),
            short_hash(&definition)
        ));
        let deployment_id = stack.add_with_id(
            &deployment_path,
            deployment_id,
            &CfnDeployment {
                description: format!("Deployment of {}", self.props.rest_api_name),
                rest_api_id: rest_api_ref.clone(),
            },
        )?;
        for member in &members {
            stack.add_dependency(&deployment_id, member)?;
        }

        let stage_construct = format!("DeploymentStage.{}", self.props.stage_name);
        let stage_id = stack.add(
            &[self.id.as_str(), stage_construct.as_str(), "Resource"],
            &CfnStage {
                deployment_id: Expr::reference(&deployment_id),
                rest_api_id: rest_api_ref.clone(),
                stage_name: self.props.stage_name.clone(),
            },
        )?;

        let url = Expr::concat([
            Expr::from("https://"),
            rest_api_ref,
            Expr::from(".execute-api."),
            stack.region(),
            Expr::from("."),
            Expr::Pseudo(Pseudo::UrlSuffix),
            Expr::from("/"),
            Expr::reference(&stage_id),
            Expr::from("/"),
        ]);
        let url_output_id = stack.add_output(
            &[self.id.as_str(), "Endpoint"],
            &url,
            Some(format!("Invoke URL of {}", self.props.rest_api_name)),
        )?;

        info!(
            api = %rest_api_id,
            name = %self.props.rest_api_name,
            resources = resources.len(),
            methods = methods.len(),
            deployment = %deployment_id,
            stage = %self.props.stage_name,
            "Declared REST API"
        );

        Ok(DeclaredRestApi {
            rest_api_id,
            resources,
            methods,
            deployment_id,
            stage_id,
            url_output_id,
        })
    }
}

/// Logical ids of everything a [`RestApi`] declared
#[derive(Debug, Clone)]
pub struct DeclaredRestApi {
    rest_api_id: LogicalId,
    resources: BTreeMap<String, LogicalId>,
    methods: BTreeMap<(String, HttpMethod), LogicalId>,
    deployment_id: LogicalId,
    stage_id: LogicalId,
    url_output_id: LogicalId,
}

impl DeclaredRestApi {
    pub fn rest_api_id(&self) -> &LogicalId {
        &self.rest_api_id
    }

    /// Resource declared for a request path such as `/example`
    pub fn resource_id(&self, path: &str) -> Option<&LogicalId> {
        self.resources.get(path)
    }

    pub fn method_id(&self, path: &str, method: HttpMethod) -> Option<&LogicalId> {
        self.methods.get(&(path.to_string(), method))
    }

    pub fn deployment_id(&self) -> &LogicalId {
        &self.deployment_id
    }

    pub fn stage_id(&self) -> &LogicalId {
        &self.stage_id
    }

    pub fn url_output_id(&self) -> &LogicalId {
        &self.url_output_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::{IntegrationResponse, PassthroughBehavior};
    use queuegate_core::Environment;
    use serde_json::json;

    fn api() -> RestApi {
        RestApi::new("Api", RestApiProps::named("SqsApi"))
    }

    fn sqs_post() -> (Integration, MethodOptions) {
        let integration = Integration::aws("sqs", Expr::Pseudo(Pseudo::Region), Expr::from("q"))
            .passthrough(PassthroughBehavior::Never)
            .request_template("application/json", "Action=SendMessage&MessageBody=$input.body")
            .response(IntegrationResponse::new("200").template("application/json", ""));
        let options = MethodOptions::default().response(MethodResponse::new("200"));
        (integration, options)
    }

    #[test]
    fn test_paths_and_routes() {
        let mut api = api();
        let root = api.root();
        let example = api.add_resource(root, "example").unwrap();
        let item = api.add_resource(example, "{id}").unwrap();

        api.add_method(root, HttpMethod::Any, Integration::mock(), MethodOptions::default())
            .unwrap();
        let (integration, options) = sqs_post();
        api.add_method(example, HttpMethod::Post, integration, options).unwrap();

        assert_eq!(api.path_of(root), "/");
        assert_eq!(api.path_of(example), "/example");
        assert_eq!(api.path_of(item), "/example/{id}");
        assert_eq!(
            api.routes(),
            vec![("/".to_string(), HttpMethod::Any), ("/example".to_string(), HttpMethod::Post)]
        );
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut api = api();
        let root = api.root();
        api.add_resource(root, "example").unwrap();
        assert!(matches!(
            api.add_resource(root, "example"),
            Err(ApiGatewayError::DuplicateResource(_))
        ));
        assert!(matches!(
            api.add_resource(root, "bad path"),
            Err(ApiGatewayError::InvalidPathPart(_))
        ));

        api.add_method(root, HttpMethod::Get, Integration::mock(), MethodOptions::default())
            .unwrap();
        assert!(matches!(
            api.add_method(root, HttpMethod::Get, Integration::mock(), MethodOptions::default()),
            Err(ApiGatewayError::DuplicateMethod { .. })
        ));
    }

    #[test]
    fn test_integration_response_needs_method_response() {
        let mut api = api();
        let root = api.root();
        let (integration, _) = sqs_post();
        let err = api
            .add_method(root, HttpMethod::Post, integration, MethodOptions::default())
            .unwrap_err();
        assert!(matches!(err, ApiGatewayError::Invalid(_)));
    }

    #[test]
    fn test_declare() {
        let mut stack = Stack::new("ApiTest", Environment::agnostic());
        let mut api = api();
        let example = api.add_resource(api.root(), "example").unwrap();
        let (integration, options) = sqs_post();
        api.add_method(example, HttpMethod::Post, integration, options).unwrap();

        let declared = api.declare(&mut stack).unwrap();
        let template = stack.synth().unwrap();

        let rest_api = template.resource(declared.rest_api_id().as_str()).unwrap();
        assert_eq!(rest_api.properties, json!({"Name": "SqsApi"}));

        let resource_id = declared.resource_id("/example").unwrap();
        let resource = template.resource(resource_id.as_str()).unwrap();
        assert_eq!(resource.properties["PathPart"], "example");
        assert_eq!(
            resource.properties["ParentId"],
            json!({"Fn::GetAtt": [declared.rest_api_id().as_str(), "RootResourceId"]})
        );

        let method_id = declared.method_id("/example", HttpMethod::Post).unwrap();
        let method = template.resource(method_id.as_str()).unwrap();
        assert_eq!(method.properties["HttpMethod"], "POST");
        assert_eq!(method.properties["AuthorizationType"], "NONE");
        assert_eq!(method.properties["ResourceId"], json!({"Ref": resource_id.as_str()}));
        assert_eq!(method.properties["MethodResponses"], json!([{"StatusCode": "200"}]));

        let deployment = template.resource(declared.deployment_id().as_str()).unwrap();
        assert!(deployment.depends_on.contains(&method_id.to_string()));
        assert!(deployment.depends_on.contains(&resource_id.to_string()));

        let stage = template.resource(declared.stage_id().as_str()).unwrap();
        assert_eq!(stage.properties["StageName"], "prod");
        assert!(template
            .outputs
            .contains_key(declared.url_output_id().as_str()));
    }

    #[test]
    fn test_deployment_id_tracks_definition() {
        let declare = |template: &str| {
            let mut stack = Stack::new("ApiTest", Environment::agnostic());
            let mut api = api();
            let root = api.root();
            let integration = Integration::aws("sqs", Expr::Pseudo(Pseudo::Region), Expr::from("q"))
                .request_template("application/json", template);
            api.add_method(root, HttpMethod::Post, integration, MethodOptions::default())
                .unwrap();
            api.declare(&mut stack).unwrap().deployment_id().clone()
        };

        assert_eq!(declare("a"), declare("a"));
        assert_ne!(declare("a"), declare("b"));
    }

    #[test]
    fn test_stage_name_validated() {
        assert!(RestApiProps::named("SqsApi").validate().is_ok());
        for stage in ["", "prod v2", "prod/v2", "préprod"] {
            let props = RestApiProps {
                stage_name: stage.to_string(),
                ..RestApiProps::named("SqsApi")
            };
            assert!(matches!(
                props.validate(),
                Err(ApiGatewayError::InvalidStageName(_))
            ));
        }

        let mut stack = Stack::new("ApiTest", Environment::agnostic());
        let api = RestApi::new(
            "Api",
            RestApiProps {
                stage_name: "bad stage".to_string(),
                ..RestApiProps::named("SqsApi")
            },
        );
        assert!(api.declare(&mut stack).is_err());
    }
}
