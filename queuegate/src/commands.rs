//! Subcommand implementations

use anyhow::{bail, Context};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use queuegate_stack::{write_assembly, Topology};
use queuegate_template::{deployment_order, diff as diff_templates, Template};

use crate::config::Config;

fn build(config: &Config) -> anyhow::Result<(Topology, Template)> {
    let topology = Topology::build(&config.stack)
        .with_context(|| format!("failed to declare stack {}", config.stack.name))?;
    let template = topology
        .synth()
        .with_context(|| format!("failed to synthesize stack {}", config.stack.name))?;
    Ok((topology, template))
}

pub fn synth(config: &Config, stdout: bool) -> anyhow::Result<()> {
    let (topology, template) = build(config)?;
    let format = config.output.format;

    if stdout {
        print!("{}", format.render(&template)?);
        return Ok(());
    }

    let assembly = write_assembly(
        &config.output.dir,
        topology.stack().name(),
        &template,
        &[topology.function().asset()],
        format,
    )
    .with_context(|| format!("failed to write {}", config.output.dir.display()))?;

    println!("Synthesized {} to {}", topology.stack().name(), assembly.template.display());
    println!("Asset manifest: {}", assembly.asset_manifest.display());
    for asset in &assembly.packaged_assets {
        println!("Packaged asset: {}", asset.display());
    }
    Ok(())
}

/// Print the change set against a deployed template; returns whether anything changed
pub fn diff(config: &Config, against: &Path) -> anyhow::Result<bool> {
    let deployed = Template::from_file(against)
        .with_context(|| format!("failed to read {}", against.display()))?;
    let (_, template) = build(config)?;

    let changes = diff_templates(&deployed, &template);
    println!("Stack {}", config.stack.name);
    print!("{changes}");

    let replacements: Vec<&str> = changes.replacements().collect();
    if !replacements.is_empty() {
        warn!(resources = ?replacements, "Changes require resource replacement");
    }

    Ok(!changes.is_empty())
}

pub fn validate(config: &Config) -> anyhow::Result<()> {
    let (_, template) = build(config)?;
    println!(
        "{}: valid ({} resources, {} outputs)",
        config.stack.name,
        template.resources.len(),
        template.outputs.len()
    );
    Ok(())
}

pub fn order(config: &Config) -> anyhow::Result<()> {
    let (_, template) = build(config)?;
    let order = deployment_order(&template)?;

    for (position, id) in order.iter().enumerate() {
        let resource_type = template.resource(id).map(|r| r.resource_type.as_str())?;
        println!("{:>3}. {id} ({resource_type})", position + 1);
    }
    Ok(())
}

pub fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    fs::write(path, Config::starter_toml()?)
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(path = %path.display(), "Wrote starter configuration");
    println!("Wrote {}", path.display());
    Ok(())
}
