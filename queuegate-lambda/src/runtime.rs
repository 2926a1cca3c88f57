//! Lambda runtimes

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported Lambda runtimes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Runtime {
    #[default]
    #[serde(rename = "python3.9")]
    Python39,
    #[serde(rename = "python3.10")]
    Python310,
    #[serde(rename = "python3.11")]
    Python311,
    #[serde(rename = "python3.12")]
    Python312,
    #[serde(rename = "nodejs18.x")]
    Nodejs18,
    #[serde(rename = "nodejs20.x")]
    Nodejs20,
    #[serde(rename = "provided.al2")]
    ProvidedAl2,
    #[serde(rename = "provided.al2023")]
    ProvidedAl2023,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python39 => "python3.9",
            Self::Python310 => "python3.10",
            Self::Python311 => "python3.11",
            Self::Python312 => "python3.12",
            Self::Nodejs18 => "nodejs18.x",
            Self::Nodejs20 => "nodejs20.x",
            Self::ProvidedAl2 => "provided.al2",
            Self::ProvidedAl2023 => "provided.al2023",
        }
    }

    /// File extension of the handler module, for runtimes that load one
    pub fn handler_extension(&self) -> Option<&'static str> {
        match self {
            Self::Python39 | Self::Python310 | Self::Python311 | Self::Python312 => Some("py"),
            Self::Nodejs18 | Self::Nodejs20 => Some("js"),
            Self::ProvidedAl2 | Self::ProvidedAl2023 => None,
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python3.9" => Ok(Self::Python39),
            "python3.10" => Ok(Self::Python310),
            "python3.11" => Ok(Self::Python311),
            "python3.12" => Ok(Self::Python312),
            "nodejs18.x" => Ok(Self::Nodejs18),
            "nodejs20.x" => Ok(Self::Nodejs20),
            "provided.al2" => Ok(Self::ProvidedAl2),
            "provided.al2023" => Ok(Self::ProvidedAl2023),
            other => Err(format!("unsupported runtime: {other}")),
        }
    }
}
