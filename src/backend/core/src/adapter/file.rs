//! Policy file adapter.
//!
//! One rule per line, comma separated:
//!
//! ```text
//! # permissions
//! p, qa-group, mcp11, call
//! # principal → group
//! g, bob, qa-group
//! # resource child → resource parent
//! g2, tool111, mcp11
//! ```
//!
//! Blank lines and `#` comments are ignored. Fields are not quoted, so a
//! rule whose fields contain a comma or a line break is refused on write
//! rather than stored in a form that would not load back. Writes go to a temporary file in
//! the same directory which is then renamed over the original, so a reader
//! never sees a half-written policy.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use super::{AdapterError, PolicyAdapter};
use crate::policy::model::{GroupingTuple, PermissionTuple, PolicyChange, PolicyRule, Relation};

/// Adapter backed by a policy file on disk.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    path: PathBuf,
}

impl FileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a whole policy document.
    pub fn parse(contents: &str) -> Result<Vec<PolicyRule>, AdapterError> {
        let mut rules = Vec::new();
        for (number, line) in contents.lines().enumerate() {
            if let Some(rule) = parse_line(line, number + 1)? {
                rules.push(rule);
            }
        }
        Ok(rules)
    }

    /// Check that every field of `rule` survives a render/parse cycle.
    pub fn check_storable(rule: &PolicyRule) -> Result<(), AdapterError> {
        let fields: Vec<&str> = match rule {
            PolicyRule::Grouping(t) => vec![t.child.as_str(), t.parent.as_str()],
            PolicyRule::Permission(t) => {
                vec![t.subject.as_str(), t.resource.as_str(), t.action.as_str()]
            }
        };
        match fields
            .into_iter()
            .find(|f| f.contains([',', '\n', '\r']) || f.trim() != *f)
        {
            Some(field) => Err(AdapterError::Rejected(format!(
                "field {:?} cannot be stored in a policy file",
                field
            ))),
            None => Ok(()),
        }
    }

    /// Render rules back into the file format.
    pub fn render(rules: &[PolicyRule]) -> String {
        let mut out = String::new();
        for rule in rules {
            out.push_str(&rule.to_string());
            out.push('\n');
        }
        out
    }
}

fn parse_line(line: &str, number: usize) -> Result<Option<PolicyRule>, AdapterError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let malformed = |reason: String| AdapterError::Malformed {
        line: number,
        reason,
    };

    if fields.iter().any(|f| f.is_empty()) {
        return Err(malformed("empty field".to_string()));
    }

    let rule = match fields.as_slice() {
        ["p", subject, resource, action] => {
            PolicyRule::Permission(PermissionTuple::new(*subject, *resource, *action))
        }
        [kind @ ("g" | "g2"), child, parent] => {
            let relation: Relation = kind
                .parse()
                .map_err(|_| malformed(format!("unknown relation '{}'", kind)))?;
            PolicyRule::Grouping(GroupingTuple::new(relation, *child, *parent))
        }
        ["p", ..] => return Err(malformed("permission rules take 3 fields".to_string())),
        ["g" | "g2", ..] => return Err(malformed("grouping rules take 2 fields".to_string())),
        [other, ..] => return Err(malformed(format!("unknown rule type '{}'", other))),
        [] => return Ok(None),
    };
    Ok(Some(rule))
}

impl PolicyAdapter for FileAdapter {
    fn name(&self) -> &'static str {
        "file"
    }

    fn load_policy(&self) -> Result<Vec<PolicyRule>, AdapterError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Policy file absent, starting empty");
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        Self::parse(&contents)
    }

    fn persist(&self, change: &PolicyChange, rules: &[PolicyRule]) -> Result<(), AdapterError> {
        for rule in rules {
            Self::check_storable(rule)?;
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(Self::render(rules).as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| AdapterError::Io(e.error))?;

        debug!(path = %self.path.display(), change = %change, rules = rules.len(), "Policy file written");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
