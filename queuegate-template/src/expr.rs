//! Intrinsic function expressions

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use queuegate_core::LogicalId;

/// Pseudo parameters resolved by the provisioning engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    AccountId,
    Region,
    Partition,
    UrlSuffix,
    StackName,
}

impl Pseudo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountId => "AWS::AccountId",
            Self::Region => "AWS::Region",
            Self::Partition => "AWS::Partition",
            Self::UrlSuffix => "AWS::URLSuffix",
            Self::StackName => "AWS::StackName",
        }
    }
}

/// A property value that may only be known at deploy time
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Ref(LogicalId),
    Pseudo(Pseudo),
    GetAtt(LogicalId, String),
    Join(String, Vec<Expr>),
    Sub(String),
}

impl Expr {
    pub fn reference(id: &LogicalId) -> Self {
        Self::Ref(id.clone())
    }

    pub fn get_att(id: &LogicalId, attribute: impl Into<String>) -> Self {
        Self::GetAtt(id.clone(), attribute.into())
    }

    /// `Fn::Join` with an empty separator, collapsing adjacent literals and
    /// splicing in nested empty-separator joins
    pub fn concat(parts: impl IntoIterator<Item = Expr>) -> Self {
        let mut out: Vec<Expr> = Vec::new();
        let flattened = parts.into_iter().flat_map(|part| match part {
            Expr::Join(separator, inner) if separator.is_empty() => inner,
            other => vec![other],
        });
        for part in flattened {
            if let (Some(Expr::Str(prev)), Expr::Str(next)) = (out.last_mut(), &part) {
                prev.push_str(next);
                continue;
            }
            out.push(part);
        }
        if out.len() == 1 && matches!(out[0], Expr::Str(_)) {
            return out.remove(0);
        }
        Self::Join(String::new(), out)
    }

    /// ARN in the stack's partition: `arn:<partition>:<service>:<region>:<account>:<resource>`
    pub fn arn(service: &str, region: Expr, account: Expr, resource: &str) -> Self {
        Self::concat([
            Expr::Str("arn:".into()),
            Expr::Pseudo(Pseudo::Partition),
            Expr::Str(format!(":{service}:")),
            region,
            Expr::Str(":".into()),
            account,
            Expr::Str(format!(":{resource}")),
        ])
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Ref(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Ref", id.as_str())?;
                map.end()
            }
            Self::Pseudo(p) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Ref", p.as_str())?;
                map.end()
            }
            Self::GetAtt(id, attribute) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::GetAtt", &[id.as_str(), attribute.as_str()])?;
                map.end()
            }
            Self::Join(separator, parts) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::Join", &(separator, parts))?;
                map.end()
            }
            Self::Sub(template) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Fn::Sub", template)?;
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ref_and_get_att() {
        let id = LogicalId::new("Queue4A7E3555");
        assert_eq!(
            serde_json::to_value(Expr::reference(&id)).unwrap(),
            json!({"Ref": "Queue4A7E3555"})
        );
        assert_eq!(
            serde_json::to_value(Expr::get_att(&id, "Arn")).unwrap(),
            json!({"Fn::GetAtt": ["Queue4A7E3555", "Arn"]})
        );
    }

    #[test]
    fn test_concat_collapses_literals() {
        let expr = Expr::concat([
            Expr::from("a"),
            Expr::from("b"),
            Expr::Pseudo(Pseudo::Region),
            Expr::from("c"),
        ]);
        assert_eq!(
            serde_json::to_value(expr).unwrap(),
            json!({"Fn::Join": ["", ["ab", {"Ref": "AWS::Region"}, "c"]]})
        );

        assert_eq!(
            Expr::concat([Expr::from("a"), Expr::from("b")]),
            Expr::Str("ab".into())
        );
    }

    #[test]
    fn test_concat_splices_nested_joins() {
        let inner = Expr::concat([Expr::Pseudo(Pseudo::AccountId), Expr::from("/q")]);
        let expr = Expr::concat([Expr::from("path/"), inner]);
        assert_eq!(
            serde_json::to_value(expr).unwrap(),
            json!({"Fn::Join": ["", ["path/", {"Ref": "AWS::AccountId"}, "/q"]]})
        );
    }

    #[test]
    fn test_arn() {
        let expr = Expr::arn(
            "sqs",
            Expr::Pseudo(Pseudo::Region),
            Expr::from("123456789012"),
            "jobs",
        );
        assert_eq!(
            serde_json::to_value(expr).unwrap(),
            json!({"Fn::Join": ["", [
                "arn:",
                {"Ref": "AWS::Partition"},
                ":sqs:",
                {"Ref": "AWS::Region"},
                ":123456789012:jobs"
            ]]})
        );
    }
}
