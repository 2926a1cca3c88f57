//! Change sets between a deployed template and a freshly synthesized one

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::template::{ResourceEntry, Template};

/// Properties whose change makes the provisioning engine replace the resource
fn replacement_properties(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "AWS::SQS::Queue" => &["QueueName", "FifoQueue"],
        "AWS::IAM::Role" => &["RoleName", "Path"],
        "AWS::Lambda::Function" => &["FunctionName"],
        "AWS::Lambda::EventSourceMapping" => &["EventSourceArn", "StartingPosition"],
        "AWS::ApiGateway::Resource" => &["ParentId", "PathPart", "RestApiId"],
        "AWS::ApiGateway::Method" => &["HttpMethod", "ResourceId", "RestApiId"],
        "AWS::ApiGateway::Deployment" => &["RestApiId"],
        "AWS::ApiGateway::Stage" => &["RestApiId", "StageName"],
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Dotted path below the resource, e.g. `Properties.VisibilityTimeout`
    pub path: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceChange {
    Added {
        resource_type: String,
    },
    Removed {
        resource_type: String,
    },
    Modified {
        resource_type: String,
        changes: Vec<PropertyChange>,
        requires_replacement: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub resources: BTreeMap<String, ResourceChange>,
    /// Output ids whose value was added, removed or changed
    pub outputs: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }

    pub fn replacements(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().filter_map(|(id, change)| match change {
            ResourceChange::Modified {
                requires_replacement: true,
                ..
            } => Some(id.as_str()),
            _ => None,
        })
    }
}

/// Compute what applying `new` over `old` would change
pub fn diff(old: &Template, new: &Template) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (id, before) in &old.resources {
        match new.resources.get(id) {
            None => {
                changes.resources.insert(
                    id.clone(),
                    ResourceChange::Removed {
                        resource_type: before.resource_type.clone(),
                    },
                );
            }
            Some(after) => {
                if let Some(change) = diff_resource(before, after) {
                    changes.resources.insert(id.clone(), change);
                }
            }
        }
    }

    for (id, after) in &new.resources {
        if !old.resources.contains_key(id) {
            changes.resources.insert(
                id.clone(),
                ResourceChange::Added {
                    resource_type: after.resource_type.clone(),
                },
            );
        }
    }

    let output_ids: BTreeSet<&String> = old.outputs.keys().chain(new.outputs.keys()).collect();
    for id in output_ids {
        if old.outputs.get(id) != new.outputs.get(id) {
            changes.outputs.insert(id.clone());
        }
    }

    changes
}

fn diff_resource(before: &ResourceEntry, after: &ResourceEntry) -> Option<ResourceChange> {
    if before.resource_type != after.resource_type {
        return Some(ResourceChange::Modified {
            resource_type: after.resource_type.clone(),
            changes: vec![PropertyChange {
                path: "Type".to_string(),
                old: Some(Value::String(before.resource_type.clone())),
                new: Some(Value::String(after.resource_type.clone())),
            }],
            requires_replacement: true,
        });
    }

    let mut changes = Vec::new();
    diff_value("Properties", &before.properties, &after.properties, &mut changes);

    let mut before_deps = before.depends_on.clone();
    let mut after_deps = after.depends_on.clone();
    before_deps.sort();
    after_deps.sort();
    if before_deps != after_deps {
        changes.push(PropertyChange {
            path: "DependsOn".to_string(),
            old: Some(Value::from(before_deps)),
            new: Some(Value::from(after_deps)),
        });
    }
    for (path, old, new) in [
        ("DeletionPolicy", before.deletion_policy, after.deletion_policy),
        (
            "UpdateReplacePolicy",
            before.update_replace_policy,
            after.update_replace_policy,
        ),
    ] {
        if old != new {
            changes.push(PropertyChange {
                path: path.to_string(),
                old: old.map(|p| Value::String(format!("{p:?}"))),
                new: new.map(|p| Value::String(format!("{p:?}"))),
            });
        }
    }

    if changes.is_empty() {
        return None;
    }

    let immutable = replacement_properties(&after.resource_type);
    let requires_replacement = changes.iter().any(|c| {
        c.path
            .strip_prefix("Properties.")
            .map(|rest| rest.split('.').next().unwrap_or(rest))
            .is_some_and(|top| immutable.contains(&top))
    });

    Some(ResourceChange::Modified {
        resource_type: after.resource_type.clone(),
        changes,
        requires_replacement,
    })
}

/// Objects are compared key by key; anything else is compared whole
fn diff_value(path: &str, before: &Value, after: &Value, out: &mut Vec<PropertyChange>) {
    match (before, after) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let child = format!("{path}.{key}");
                match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) => diff_value(&child, x, y, out),
                    (x, y) => out.push(PropertyChange {
                        path: child,
                        old: x.cloned(),
                        new: y.cloned(),
                    }),
                }
            }
        }
        (a, b) if a == b => {}
        (a, b) => out.push(PropertyChange {
            path: path.to_string(),
            old: (!a.is_null()).then(|| a.clone()),
            new: (!b.is_null()).then(|| b.clone()),
        }),
    }
}

fn render(value: Option<&Value>) -> String {
    value.map_or_else(|| "(absent)".to_string(), Value::to_string)
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "There were no differences");
        }

        for (id, change) in &self.resources {
            match change {
                ResourceChange::Added { resource_type } => {
                    writeln!(f, "[+] {resource_type} {id}")?;
                }
                ResourceChange::Removed { resource_type } => {
                    writeln!(f, "[-] {resource_type} {id}")?;
                }
                ResourceChange::Modified {
                    resource_type,
                    changes,
                    requires_replacement,
                } => {
                    let note = if *requires_replacement {
                        " (requires replacement)"
                    } else {
                        ""
                    };
                    writeln!(f, "[~] {resource_type} {id}{note}")?;
                    for change in changes {
                        writeln!(
                            f,
                            "    {}: {} -> {}",
                            change.path,
                            render(change.old.as_ref()),
                            render(change.new.as_ref())
                        )?;
                    }
                }
            }
        }

        for id in &self.outputs {
            writeln!(f, "[~] Output {id}")?;
        }
        Ok(())
    }
}
