use serde_json::Value;
use tracing::debug;

use crate::boards::{run_json, AzScope};
use crate::error::Result;
use crate::runner::CommandRunner;

/// Lists the team's iterations whose timeframe is `Current`, as returned by the CLI.
pub async fn list_current_iterations(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    team: &str,
) -> Result<Option<Value>> {
    let args = vec![
        "boards".to_string(),
        "iteration".to_string(),
        "team".to_string(),
        "list".to_string(),
        "--team".to_string(),
        team.to_string(),
        "--timeframe".to_string(),
        "Current".to_string(),
        "-o".to_string(),
        "json".to_string(),
    ];
    run_json(runner, args, &scope.env()).await
}

/// Path of the team's current sprint.
///
/// No team, or no current iteration, is `Ok(None)` rather than an error. Recomputed on
/// every call since the current sprint rolls over while the server runs.
pub async fn current_iteration_path(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    team: Option<&str>,
) -> Result<Option<String>> {
    let Some(team) = team.map(str::trim).filter(|team| !team.is_empty()) else {
        return Ok(None);
    };
    let iterations = list_current_iterations(runner, scope, team).await?;
    let path = iterations
        .as_ref()
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(iteration_path);
    debug!(team, path = ?path, "resolved current iteration");
    Ok(path)
}

fn iteration_path(entry: &Value) -> Option<String> {
    entry
        .get("path")
        .and_then(Value::as_str)
        .or_else(|| entry.get("name").and_then(Value::as_str))
        .map(str::to_string)
}
