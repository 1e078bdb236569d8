use serde_json::Value;

use tracing::debug;

use crate::decode::decode_json;
use crate::error::Result;
use crate::iteration::current_iteration_path;
use crate::runner::{CommandRunner, EnvOverrides};
use crate::wiql::{build_list_query, ListFilter};
use crate::work_item::{Expand, WorkItemDraft, WorkItemUpdate};

pub const ORG_URL_ENV: &str = "AZURE_DEVOPS_EXT_ORG_SERVICE_URL";
pub const PROJECT_ENV: &str = "AZURE_DEVOPS_EXT_PROJECT";

/// Organisation/project context handed to the Azure DevOps CLI extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AzScope {
    pub org_url: Option<String>,
    pub project: Option<String>,
}

impl AzScope {
    pub fn new(org_url: Option<&str>, project: Option<&str>) -> Self {
        Self {
            org_url: non_empty(org_url),
            project: non_empty(project),
        }
    }

    pub fn env(&self) -> EnvOverrides {
        let mut env = EnvOverrides::new();
        if let Some(org_url) = &self.org_url {
            env.insert(ORG_URL_ENV.to_string(), org_url.clone());
        }
        if let Some(project) = &self.project {
            env.insert(PROJECT_ENV.to_string(), project.clone());
        }
        env
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) async fn run_json(
    runner: &dyn CommandRunner,
    args: Vec<String>,
    env: &EnvOverrides,
) -> Result<Option<Value>> {
    let output = runner.run(&args, env).await?;
    decode_json(&output.stdout)
}

pub async fn show_work_item(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    id: u32,
    expand: Expand,
) -> Result<Option<Value>> {
    let args = vec![
        "boards".to_string(),
        "work-item".to_string(),
        "show".to_string(),
        "--id".to_string(),
        id.to_string(),
        "--expand".to_string(),
        expand.as_str().to_string(),
        "-o".to_string(),
        "json".to_string(),
    ];
    run_json(runner, args, &scope.env()).await
}

/// Fetches only `fields` of a work item (no relations).
pub async fn show_work_item_fields(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    id: u32,
    fields: &[&str],
) -> Result<Option<Value>> {
    let mut args = vec![
        "boards".to_string(),
        "work-item".to_string(),
        "show".to_string(),
        "--id".to_string(),
        id.to_string(),
        "--expand".to_string(),
        Expand::None.as_str().to_string(),
        "-o".to_string(),
        "json".to_string(),
    ];
    if !fields.is_empty() {
        args.push("--fields".to_string());
        args.push(fields.join(","));
    }
    run_json(runner, args, &scope.env()).await
}

pub async fn update_work_item(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    update: &WorkItemUpdate,
) -> Result<Option<Value>> {
    run_json(runner, update.to_args(), &scope.env()).await
}

pub async fn create_work_item(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    draft: &WorkItemDraft,
) -> Result<Option<Value>> {
    run_json(runner, draft.to_args(), &scope.env()).await
}

/// Runs a WIQL query verbatim.
pub async fn query_wiql(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    wiql: &str,
) -> Result<Option<Value>> {
    let args = vec![
        "boards".to_string(),
        "query".to_string(),
        "--wiql".to_string(),
        wiql.to_string(),
        "-o".to_string(),
        "json".to_string(),
    ];
    run_json(runner, args, &scope.env()).await
}

/// Result of listing the caller's work items.
#[derive(Debug, Clone, PartialEq)]
pub struct MyWorkItems {
    pub wiql: String,
    pub iteration_path: Option<String>,
    pub items: Option<Value>,
}

/// Lists work items assigned to the caller, optionally scoped to the team's current sprint.
///
/// A team without a current sprint lists across all iterations.
pub async fn list_my_work_items(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    filter: &ListFilter,
) -> Result<MyWorkItems> {
    let iteration_path = if filter.current_iteration_only {
        current_iteration_path(runner, scope, filter.team.as_deref()).await?
    } else {
        None
    };
    let wiql = build_list_query(filter, iteration_path.as_deref());
    debug!(wiql = %wiql, "listing work items assigned to caller");
    let items = query_wiql(runner, scope, &wiql)
        .await?
        .map(|value| truncate_items(value, filter.limit));
    Ok(MyWorkItems {
        wiql,
        iteration_path,
        items,
    })
}

/// Keeps the first `limit` entries of a list result, preserving order. Non-lists pass through.
pub fn truncate_items(value: Value, limit: usize) -> Value {
    match value {
        Value::Array(mut items) => {
            items.truncate(limit);
            Value::Array(items)
        }
        other => other,
    }
}
