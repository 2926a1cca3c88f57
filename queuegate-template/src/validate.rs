//! Reference integrity and dependency ordering

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use queuegate_core::{ErrorCode, ValidationError};

use crate::template::Template;

static LOGICAL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{1,255}$").expect("valid regex"));
static SUB_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^!}][^}]*)\}").expect("valid regex"));

/// Check what the provisioning engine checks before creating anything
pub fn validate(template: &Template) -> Result<(), ValidationError> {
    for (id, resource) in &template.resources {
        if !LOGICAL_ID.is_match(id) {
            return Err(ValidationError::new(
                ErrorCode::InvalidName,
                format!("logical id '{id}' must be alphanumeric"),
            ));
        }

        for target in references(&resource.properties) {
            if !template.resources.contains_key(&target) {
                return Err(ValidationError::new(
                    ErrorCode::UnresolvedReference,
                    format!("{id} references unknown resource {target}"),
                )
                .with_resource(id.clone()));
            }
        }

        for target in &resource.depends_on {
            if !template.resources.contains_key(target) {
                return Err(ValidationError::new(
                    ErrorCode::UnresolvedReference,
                    format!("{id} depends on unknown resource {target}"),
                )
                .with_resource(id.clone()));
            }
        }
    }

    for (id, output) in &template.outputs {
        for target in references(&output.value) {
            if !template.resources.contains_key(&target) {
                return Err(ValidationError::new(
                    ErrorCode::UnresolvedReference,
                    format!("output {id} references unknown resource {target}"),
                )
                .with_resource(id.clone()));
            }
        }
    }

    deployment_order(template).map(|_| ())
}

/// Logical ids a property tree refers to through `Ref`, `Fn::GetAtt` or `Fn::Sub`.
/// Pseudo parameters (`AWS::*`) are not included.
pub fn references(value: &Value) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_references(value, &mut out);
    out
}

fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) if map.len() == 1 => {
            let Some((key, inner)) = map.iter().next() else {
                return;
            };
            match (key.as_str(), inner) {
                ("Ref", Value::String(target)) => add_target(target, out),
                ("Fn::GetAtt", Value::Array(parts)) => {
                    if let Some(Value::String(target)) = parts.first() {
                        add_target(target, out);
                    }
                }
                ("Fn::GetAtt", Value::String(dotted)) => {
                    if let Some((target, _)) = dotted.split_once('.') {
                        add_target(target, out);
                    }
                }
                ("Fn::Sub", Value::String(template)) => collect_sub(template, out),
                _ => collect_references(inner, out),
            }
        }
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        _ => {}
    }
}

fn collect_sub(template: &str, out: &mut BTreeSet<String>) {
    for capture in SUB_VARIABLE.captures_iter(template) {
        let variable = &capture[1];
        let target = variable.split('.').next().unwrap_or(variable);
        add_target(target, out);
    }
}

fn add_target(target: &str, out: &mut BTreeSet<String>) {
    if !target.starts_with("AWS::") {
        out.insert(target.to_string());
    }
}

/// Edges from each resource to the resources it needs first
pub fn dependency_graph(template: &Template) -> BTreeMap<String, BTreeSet<String>> {
    template
        .resources
        .iter()
        .map(|(id, resource)| {
            let mut needs = references(&resource.properties);
            needs.extend(resource.depends_on.iter().cloned());
            needs.remove(id);
            (id.clone(), needs)
        })
        .collect()
}

/// Resources in an order the provisioning engine could create them,
/// dependencies first and ties broken by logical id.
pub fn deployment_order(template: &Template) -> Result<Vec<String>, ValidationError> {
    let graph = dependency_graph(template);

    let mut remaining: BTreeMap<&str, usize> = graph
        .iter()
        .map(|(id, needs)| {
            let known = needs.iter().filter(|n| graph.contains_key(*n)).count();
            (id.as_str(), known)
        })
        .collect();

    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (id, needs) in &graph {
        for need in needs {
            dependents.entry(need.as_str()).or_default().push(id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(graph.len());
    while let Some(id) = ready.pop_first() {
        remaining.remove(id);
        order.push(id.to_string());

        for &dependent in dependents.get(id).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if !remaining.is_empty() {
        let cycle: Vec<&str> = remaining.keys().copied().collect();
        return Err(ValidationError::new(
            ErrorCode::DependencyCycle,
            format!("circular dependency between {}", cycle.join(", ")),
        ));
    }

    Ok(order)
}
