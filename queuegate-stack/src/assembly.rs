//! Cloud assembly output
//!
//! Writes what the provisioning engine consumes: the template, an asset
//! manifest describing where each asset goes, and the packaged assets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use queuegate_lambda::{Asset, BOOTSTRAP_BUCKET};
use queuegate_template::Template;

use crate::error::StackError;

const MANIFEST_VERSION: &str = "36.0.0";

/// Destination key for assets published to the deploying account and region
const CURRENT_ENVIRONMENT: &str = "current_account-current_region";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    pub fn render(&self, template: &Template) -> Result<String, StackError> {
        Ok(match self {
            Self::Json => template.to_json()?,
            Self::Yaml => template.to_yaml()?,
        })
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSource {
    /// Directory the asset was built from
    pub path: PathBuf,
    pub packaging: String,
    /// Archive written next to the template
    pub packaged_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDestination {
    pub bucket_name: String,
    pub object_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAsset {
    pub source: AssetSource,
    pub destinations: BTreeMap<String, AssetDestination>,
}

/// `<Stack>.assets.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub version: String,
    /// Keyed by asset hash
    pub files: BTreeMap<String, FileAsset>,
}

impl AssetManifest {
    pub fn from_assets<'a>(assets: impl IntoIterator<Item = &'a Asset>) -> Self {
        let files = assets
            .into_iter()
            .map(|asset| {
                let destination = AssetDestination {
                    bucket_name: BOOTSTRAP_BUCKET.to_string(),
                    object_key: asset.object_key(),
                };
                let file = FileAsset {
                    source: AssetSource {
                        path: asset.source().to_path_buf(),
                        packaging: "zip".to_string(),
                        packaged_file: asset.packaged_file_name(),
                    },
                    destinations: BTreeMap::from([(CURRENT_ENVIRONMENT.to_string(), destination)]),
                };
                (asset.hash().to_string(), file)
            })
            .collect();

        Self {
            version: MANIFEST_VERSION.to_string(),
            files,
        }
    }
}

/// Files written by [`write_assembly`]
#[derive(Debug, Clone)]
pub struct Assembly {
    pub template: PathBuf,
    pub asset_manifest: PathBuf,
    pub packaged_assets: Vec<PathBuf>,
}

pub fn template_file_name(stack_name: &str, format: OutputFormat) -> String {
    format!("{stack_name}.template.{}", format.extension())
}

pub fn write_assembly(
    out_dir: &Path,
    stack_name: &str,
    template: &Template,
    assets: &[&Asset],
    format: OutputFormat,
) -> Result<Assembly, StackError> {
    fs::create_dir_all(out_dir)?;

    let template_path = out_dir.join(template_file_name(stack_name, format));
    fs::write(&template_path, format.render(template)?)?;

    let manifest = AssetManifest::from_assets(assets.iter().copied());
    let asset_manifest = out_dir.join(format!("{stack_name}.assets.json"));
    let mut manifest_json = serde_json::to_string_pretty(&manifest)?;
    manifest_json.push('\n');
    fs::write(&asset_manifest, manifest_json)?;

    let packaged_assets = assets
        .iter()
        .map(|asset| asset.write_zip(out_dir))
        .collect::<Result<Vec<_>, _>>()
        .map_err(StackError::Function)?;

    info!(
        out_dir = %out_dir.display(),
        template = %template_path.display(),
        assets = packaged_assets.len(),
        "Wrote cloud assembly"
    );

    Ok(Assembly {
        template: template_path,
        asset_manifest,
        packaged_assets,
    })
}
