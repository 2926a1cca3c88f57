//! Synthesized template document

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use queuegate_core::ValidationError;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

/// What the provisioning engine does with a resource removed from the template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    Delete,
    Retain,
    Snapshot,
}

/// One entry of the `Resources` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceEntry {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,
}

impl ResourceEntry {
    pub fn new(resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: Vec::new(),
            update_replace_policy: None,
            deletion_policy: None,
        }
    }

    /// Look up a top-level property
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// One entry of the `Outputs` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A complete deployment plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion", default = "default_format_version")]
    pub format_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            format_version: default_format_version(),
            description: None,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

fn default_format_version() -> String {
    FORMAT_VERSION.to_string()
}

impl Template {
    pub fn resource(&self, logical_id: &str) -> Result<&ResourceEntry, TemplateError> {
        self.resources
            .get(logical_id)
            .ok_or_else(|| TemplateError::UnknownResource(logical_id.to_string()))
    }

    /// Resources of one type, in logical id order
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a ResourceEntry)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
            .map(|(id, r)| (id.as_str(), r))
    }

    pub fn to_json(&self) -> Result<String, TemplateError> {
        let mut out = serde_json::to_string_pretty(self)?;
        out.push('\n');
        Ok(out)
    }

    pub fn to_yaml(&self) -> Result<String, TemplateError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, TemplateError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_yaml(s: &str) -> Result<Self, TemplateError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Load a template, choosing the format by file extension
    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }
}

/// `DependsOn` may be a single id or a list
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(id) => vec![id],
        OneOrMany::Many(ids) => ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn sample() -> Template {
        let mut template = Template::default();
        let mut queue = ResourceEntry::new("AWS::SQS::Queue", json!({"VisibilityTimeout": 300}));
        queue.deletion_policy = Some(RemovalPolicy::Delete);
        template.resources.insert("Queue".into(), queue);
        template
    }

    #[test]
    fn test_json_layout() {
        let json: Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(json["Resources"]["Queue"]["Type"], "AWS::SQS::Queue");
        assert_eq!(json["Resources"]["Queue"]["DeletionPolicy"], "Delete");
        assert!(json["Resources"]["Queue"].get("DependsOn").is_none());
        assert!(json.get("Outputs").is_none());
    }

    #[test]
    fn test_yaml_reload() {
        let template = sample();
        let yaml = template.to_yaml().unwrap();
        assert_eq!(Template::from_yaml(&yaml).unwrap(), template);
    }

    #[test]
    fn test_depends_on_accepts_single_string() {
        let template = Template::from_json(
            r#"{"Resources": {"A": {"Type": "AWS::SQS::Queue", "DependsOn": "B"},
                              "B": {"Type": "AWS::SQS::Queue"}}}"#,
        )
        .unwrap();
        assert_eq!(template.resources["A"].depends_on, vec!["B".to_string()]);
        assert_eq!(template.format_version, FORMAT_VERSION);
    }

    #[test]
    fn test_from_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(sample().to_yaml().unwrap().as_bytes()).unwrap();

        let loaded = Template::from_file(file.path()).unwrap();
        assert_eq!(loaded.resources_of_type("AWS::SQS::Queue").count(), 1);
    }

    #[test]
    fn test_unknown_resource() {
        assert!(matches!(
            sample().resource("Missing"),
            Err(TemplateError::UnknownResource(_))
        ));
    }
}
