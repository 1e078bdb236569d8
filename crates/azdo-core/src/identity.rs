use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::runner::{CommandRunner, EnvOverrides};
use crate::work_item::FIELD_ASSIGNED_TO;

/// Returns the signed-in `az` account name, or `None` when no identity is configured.
///
/// Resolved on every call: the ambient login can change while the server runs.
pub async fn who_am_i(runner: &dyn CommandRunner) -> Result<Option<String>> {
    let args = ["account", "show", "--query", "user.name", "-o", "tsv"]
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>();
    let output = runner.run(&args, &EnvOverrides::new()).await?;
    let name = output.stdout.trim();
    Ok(if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    })
}

/// Value of `System.AssignedTo`, which the service returns either as a plain name or as
/// an identity object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AssignedIdentity {
    BareName(String),
    Identity {
        #[serde(rename = "uniqueName", default)]
        unique_name: Option<String>,
        #[serde(default)]
        mail: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(rename = "displayName", default)]
        display_name: Option<String>,
    },
}

impl AssignedIdentity {
    /// Reads the assignment from a work item snapshot. Never fails: unknown shapes are `None`.
    pub fn from_work_item(work_item: &Value) -> Option<Self> {
        let raw = work_item.get("fields")?.get(FIELD_ASSIGNED_TO)?;
        serde_json::from_value(raw.clone()).ok()
    }

    /// Best identifier, preferring unique name, then mail, email, display name.
    pub fn resolve(&self) -> Option<&str> {
        match self {
            AssignedIdentity::BareName(name) => non_blank(Some(name)),
            AssignedIdentity::Identity {
                unique_name,
                mail,
                email,
                display_name,
            } => non_blank(unique_name.as_ref())
                .or_else(|| non_blank(mail.as_ref()))
                .or_else(|| non_blank(email.as_ref()))
                .or_else(|| non_blank(display_name.as_ref())),
        }
    }

    /// Human-readable name for rendering.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            AssignedIdentity::BareName(name) => non_blank(Some(name)),
            AssignedIdentity::Identity { display_name, .. } => {
                non_blank(display_name.as_ref()).or_else(|| self.resolve())
            }
        }
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value
        .map(String::as_str)
        .filter(|value| !value.trim().is_empty())
}

/// Resolved assignee identifier of a work item snapshot.
pub fn assigned_identity(work_item: &Value) -> Option<String> {
    AssignedIdentity::from_work_item(work_item)?
        .resolve()
        .map(str::to_string)
}
