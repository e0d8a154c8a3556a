//! Grant and revoke permissions.

use anyhow::Result;
use clap::Args;

use warden_core::policy::PermissionTuple;

use super::Context;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct GrantArgs {
    /// Group or principal receiving the permission
    pub subject: String,

    /// Resource (or container) the permission applies to
    pub resource: String,

    /// Action [default: policy.default_action]
    #[arg(short, long)]
    pub action: Option<String>,
}

pub fn grant(args: GrantArgs, ctx: &Context) -> Result<()> {
    let action = ctx.action(args.action);
    let tuple = PermissionTuple::new(args.subject, args.resource, action);
    let changed = ctx
        .enforcer
        .add_permission(&tuple.subject, &tuple.resource, &tuple.action)?;
    report(&tuple, changed, "granted", "already granted", ctx.format)
}

pub fn revoke(args: GrantArgs, ctx: &Context) -> Result<()> {
    let action = ctx.action(args.action);
    let tuple = PermissionTuple::new(args.subject, args.resource, action);
    let changed = ctx
        .enforcer
        .remove_permission(&tuple.subject, &tuple.resource, &tuple.action)?;
    report(&tuple, changed, "revoked", "was not granted", ctx.format)
}

fn report(
    tuple: &PermissionTuple,
    changed: bool,
    done: &str,
    unchanged: &str,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table if changed => output::print_success(&format!("{} ({})", tuple, done)),
        OutputFormat::Table => output::print_info(&format!("{} ({})", tuple, unchanged)),
        format => output::print_item(
            &serde_json::json!({ "rule": tuple, "changed": changed }),
            format,
        )?,
    }
    Ok(())
}
