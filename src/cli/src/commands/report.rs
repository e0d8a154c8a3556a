//! Access matrix and hierarchy views.

use anyhow::Result;
use clap::Args;

use warden_core::policy::{HierarchyReporter, LeafRule, Relation};

use super::Context;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct MatrixArgs {
    /// Action to check [default: policy.default_action]
    #[arg(short, long)]
    pub action: Option<String>,

    /// Treat names with this prefix as leaf resources [default: hierarchy.leaf_prefix]
    #[arg(long)]
    pub leaf_prefix: Option<String>,
}

#[derive(Args)]
pub struct TreeArgs {
    /// Show the membership hierarchy (g) instead of resources (g2)
    #[arg(long)]
    pub principals: bool,

    /// Show every top-level node, ignoring hierarchy.root_contains
    #[arg(long)]
    pub all: bool,
}

pub fn matrix(args: MatrixArgs, ctx: &Context) -> Result<()> {
    let action = ctx.action(args.action);
    let leaf_rule = match args.leaf_prefix {
        Some(prefix) => LeafRule::Prefix(prefix),
        None => ctx.config.hierarchy.leaf_rule(),
    };

    let matrix = ctx.enforcer.access_matrix(&action, &leaf_rule)?;

    match ctx.format {
        OutputFormat::Table => {
            if matrix.principals.is_empty() || matrix.resources.is_empty() {
                output::print_info("No principals or leaf resources in the policy.");
                return Ok(());
            }
            output::print_header(&format!("Access matrix ({})", matrix.action));
            let header = std::iter::once("API Key".to_string())
                .chain(matrix.resources.iter().map(|r| r.to_string()))
                .collect();
            let rows = matrix
                .rows()
                .map(|(principal, cells)| {
                    std::iter::once(principal.to_string())
                        .chain(cells.iter().map(|&c| output::mark(c)))
                        .collect()
                })
                .collect();
            output::print_grid(header, rows);
        }
        format => output::print_item(&matrix, format)?,
    }
    Ok(())
}

pub fn tree(args: TreeArgs, ctx: &Context) -> Result<()> {
    let mut reporter = HierarchyReporter::from_config(&ctx.config.hierarchy);
    if args.all {
        reporter = reporter.with_root_filter(Default::default());
    }
    let relation = if args.principals {
        Relation::Principal
    } else {
        Relation::Resource
    };

    let tree = ctx.enforcer.hierarchy(relation, &reporter)?;
    let nested = tree.to_nested_json();

    match ctx.format {
        OutputFormat::Table => {
            output::print_item(&nested, OutputFormat::Json)?;
            if !tree.detached.is_empty() {
                let names: Vec<String> = tree.detached.iter().map(|d| d.to_string()).collect();
                output::print_info(&format!("Filtered top-level nodes: {}", names.join(", ")));
            }
        }
        format => output::print_item(&nested, format)?,
    }
    Ok(())
}
