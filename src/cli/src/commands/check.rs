//! Single authorization check.

use anyhow::Result;
use clap::Args;
use colored::*;
use serde::Serialize;

use warden_core::policy::{Action, Decision, Identifier, PermissionTuple};

use super::Context;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CheckArgs {
    /// Principal (API key) making the request
    pub principal: String,

    /// Resource being accessed, e.g. a tool name
    pub resource: String,

    /// Action to check [default: policy.default_action]
    #[arg(short, long)]
    pub action: Option<String>,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    principal: Identifier,
    resource: Identifier,
    action: Action,
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    grant: Option<PermissionTuple>,
}

pub fn execute(args: CheckArgs, ctx: &Context) -> Result<()> {
    let principal = Identifier::new(args.principal);
    let resource = Identifier::new(args.resource);
    let action = ctx.action(args.action);

    let decision = ctx.enforcer.enforce_ex(&principal, &resource, &action)?;
    let report = CheckReport {
        allowed: decision.is_allowed(),
        grant: match decision {
            Decision::Allow { grant } => Some(grant),
            Decision::Deny => None,
        },
        principal,
        resource,
        action,
    };

    match ctx.format {
        OutputFormat::Table => {
            let verdict = if report.allowed {
                "ALLOW".green().bold()
            } else {
                "DENY".red().bold()
            };
            println!(
                "{} {} {} {}",
                verdict, report.principal, report.action, report.resource
            );
            match &report.grant {
                Some(grant) => output::print_detail("granted by", &grant.to_string()),
                None => output::print_detail("reason", "no grant on the resource or its containers"),
            }
        }
        format => output::print_item(&report, format)?,
    }
    Ok(())
}
