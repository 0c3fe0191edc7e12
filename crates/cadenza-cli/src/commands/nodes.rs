//! Node kind listing command.

#![allow(clippy::print_literal)] // Table headers use literal strings

use clap::Args;
use cadenza_core::NodeParams;

use crate::nodes::registry;

#[derive(Args)]
pub struct NodesArgs {
    /// Show ports and parameters for one kind
    #[arg(value_name = "KIND")]
    kind: Option<String>,
}

pub fn run(args: NodesArgs) -> anyhow::Result<()> {
    let registry = registry();

    let Some(kind) = &args.kind else {
        println!("Available Node Kinds");
        println!("====================\n");
        for descriptor in registry.kinds() {
            println!("  {:12}  {}", descriptor.kind, descriptor.description);
        }
        println!();
        println!("Use 'cadenza nodes <KIND>' for ports and parameters.");
        return Ok(());
    };

    let descriptor = registry
        .get(kind)
        .ok_or_else(|| anyhow::anyhow!("Unknown node kind: {}", kind))?;
    let node = registry.create(kind, &"probe".into(), &NodeParams::new())?;
    let desc = node.description();

    println!("{}", descriptor.kind);
    println!("{}", "=".repeat(descriptor.kind.len()));
    println!();
    println!("{}", descriptor.description);
    println!();

    println!("Ports:");
    println!("  {:12}  {:8}  {}", "Name", "Dir", "Kind");
    println!("  {:12}  {:8}  {}", "----", "---", "----");
    for port in &desc.ports {
        println!("  {:12}  {:8}  {}", port.name, port.direction.to_string(), port.kind);
    }
    println!();

    if !desc.parameters.is_empty() {
        println!("Parameters:");
        println!("  {:12}  {}", "Name", "Default");
        println!("  {:12}  {}", "----", "-------");
        for param in &desc.parameters {
            println!("  {:12}  {}", param.name, param.default);
        }
    }
    Ok(())
}
