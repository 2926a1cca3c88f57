//! Assertions over synthesized templates

use serde_json::Value;

use queuegate_template::{ResourceEntry, Template};

/// Wraps a template for assertion-style checks. Failures panic with the
/// offending resources in the message.
pub struct TemplateAssertions<'a> {
    template: &'a Template,
}

impl<'a> TemplateAssertions<'a> {
    pub fn new(template: &'a Template) -> Self {
        Self { template }
    }

    pub fn resources_of_type(&self, resource_type: &'a str) -> Vec<(&'a str, &'a ResourceEntry)> {
        self.template.resources_of_type(resource_type).collect()
    }

    /// Logical ids of resources of `resource_type` whose properties contain `properties`
    pub fn find_resources(&self, resource_type: &'a str, properties: &Value) -> Vec<&'a str> {
        self.template
            .resources_of_type(resource_type)
            .filter(|(_, entry)| is_subset(properties, &entry.properties))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn resource_count_is(&self, resource_type: &'a str, count: usize) {
        let found = self.resources_of_type(resource_type);
        assert_eq!(
            found.len(),
            count,
            "expected {count} {resource_type}, found {:?}",
            found.iter().map(|(id, _)| *id).collect::<Vec<_>>()
        );
    }

    /// The single resource of a type; panics unless exactly one exists
    pub fn only(&self, resource_type: &'a str) -> (&'a str, &'a ResourceEntry) {
        self.resource_count_is(resource_type, 1);
        self.resources_of_type(resource_type)[0]
    }

    pub fn has_resource_properties(&self, resource_type: &'a str, properties: &Value) {
        assert!(
            !self.find_resources(resource_type, properties).is_empty(),
            "no {resource_type} has properties {properties}"
        );
    }

    pub fn has_output(&self, value: &Value) {
        assert!(
            self.template
                .outputs
                .values()
                .any(|o| is_subset(value, &o.value)),
            "no output has value {value}"
        );
    }
}

/// Objects match when every expected key matches; arrays and scalars must be equal
pub fn is_subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => expected
            .iter()
            .all(|(k, v)| actual.get(k).is_some_and(|a| is_subset(v, a))),
        (Value::Array(expected), Value::Array(actual)) => {
            expected.len() == actual.len()
                && expected.iter().zip(actual).all(|(e, a)| is_subset(e, a))
        }
        _ => expected == actual,
    }
}
