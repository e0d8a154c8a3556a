//! Membership and containment edits.

use anyhow::Result;
use clap::{Args, Subcommand};

use warden_core::policy::{GroupingTuple, Relation};

use super::Context;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Add a principal to a group, or a resource to a container
    Add(GroupArgs),

    /// Remove a membership or containment
    Remove(GroupArgs),
}

#[derive(Args)]
pub struct GroupArgs {
    /// Member principal, or contained resource with --resource
    pub child: String,

    /// Group, or container with --resource
    pub parent: String,

    /// Edit resource containment (g2) instead of membership (g)
    #[arg(short, long)]
    pub resource: bool,
}

impl GroupArgs {
    fn tuple(self) -> GroupingTuple {
        let relation = if self.resource {
            Relation::Resource
        } else {
            Relation::Principal
        };
        GroupingTuple::new(relation, self.child, self.parent)
    }
}

pub fn execute(cmd: GroupCommands, ctx: &Context) -> Result<()> {
    let (tuple, changed, done, unchanged) = match cmd {
        GroupCommands::Add(args) => {
            let tuple = args.tuple();
            let changed = ctx
                .enforcer
                .add_grouping(tuple.relation, &tuple.child, &tuple.parent)?;
            (tuple, changed, "added", "already present")
        }
        GroupCommands::Remove(args) => {
            let tuple = args.tuple();
            let changed = ctx
                .enforcer
                .remove_grouping(tuple.relation, &tuple.child, &tuple.parent)?;
            (tuple, changed, "removed", "not present")
        }
    };

    match ctx.format {
        OutputFormat::Table if changed => output::print_success(&format!("{} ({})", tuple, done)),
        OutputFormat::Table => output::print_info(&format!("{} ({})", tuple, unchanged)),
        format => output::print_item(
            &serde_json::json!({ "rule": tuple, "changed": changed }),
            format,
        )?,
    }
    Ok(())
}
