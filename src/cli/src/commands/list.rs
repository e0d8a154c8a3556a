//! Rule listings.

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use warden_core::policy::{GroupingTuple, Identifier, PermissionTuple, Relation};

use super::Context;
use crate::output;

#[derive(Subcommand)]
pub enum ListCommands {
    /// Memberships (g), or containment (g2) with --resource
    Groupings {
        /// List resource containment instead of membership
        #[arg(short, long)]
        resource: bool,

        /// Only tuples whose child is this identifier
        #[arg(short, long)]
        child: Option<String>,
    },

    /// Direct grants (p)
    Permissions {
        /// Only grants held by this subject
        #[arg(short, long)]
        subject: Option<String>,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct GroupingRow {
    #[tabled(rename = "Relation")]
    relation: String,
    #[tabled(rename = "Child")]
    child: String,
    #[tabled(rename = "Parent")]
    parent: String,
}

impl From<GroupingTuple> for GroupingRow {
    fn from(t: GroupingTuple) -> Self {
        Self {
            relation: t.relation.to_string(),
            child: t.child.to_string(),
            parent: t.parent.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct PermissionRow {
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Action")]
    action: String,
}

impl From<PermissionTuple> for PermissionRow {
    fn from(t: PermissionTuple) -> Self {
        Self {
            subject: t.subject.to_string(),
            resource: t.resource.to_string(),
            action: t.action.to_string(),
        }
    }
}

pub fn execute(cmd: ListCommands, ctx: &Context) -> Result<()> {
    match cmd {
        ListCommands::Groupings { resource, child } => {
            let relation = if resource {
                Relation::Resource
            } else {
                Relation::Principal
            };
            let tuples = match child {
                Some(child) => ctx
                    .enforcer
                    .list_groupings_for(relation, &Identifier::new(child)),
                None => ctx.enforcer.list_groupings(relation),
            };
            let rows: Vec<GroupingRow> = tuples.into_iter().map(GroupingRow::from).collect();
            output::print_list(&rows, ctx.format)
        }
        ListCommands::Permissions { subject } => {
            let tuples = match subject {
                Some(subject) => ctx
                    .enforcer
                    .list_permissions_for(&Identifier::new(subject)),
                None => ctx.enforcer.list_permissions(),
            };
            let rows: Vec<PermissionRow> = tuples.into_iter().map(PermissionRow::from).collect();
            output::print_list(&rows, ctx.format)
        }
    }
}
