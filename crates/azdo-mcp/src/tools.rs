use std::sync::Arc;

use async_trait::async_trait;
use rust_mcp_sdk::macros::{mcp_tool, JsonSchema};
use rust_mcp_sdk::schema::{
    schema_utils::CallToolError, CallToolRequestParams, CallToolResult, ListToolsResult,
    PaginatedRequestParams, RpcError, TextContent,
};
use rust_mcp_sdk::tool_box;
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use azdo_core::boards::{
    create_work_item, list_my_work_items, query_wiql, show_work_item, update_work_item, AzScope,
};
use azdo_core::config::Settings;
use azdo_core::context::{collect_context, parse_work_item_link, render_markdown};
use azdo_core::error::AzdoError;
use azdo_core::guard::ensure_assigned_to_me;
use azdo_core::identity::who_am_i;
use azdo_core::iteration::{current_iteration_path, list_current_iterations};
use azdo_core::runner::CommandRunner;
use azdo_core::wiql::{
    ListFilter, DEFAULT_EXCLUDED_STATES, DEFAULT_INCLUDED_TYPES, DEFAULT_LIMIT, MAX_LIMIT,
};
use azdo_core::work_item::{
    Expand, FieldAssignment, FieldValue, WorkItemDraft, WorkItemKind, WorkItemUpdate,
};

use crate::version;

const CONFIRM_UPDATE: &str =
    "Confirmation required. Re-run with confirm=true to update the work item.";
const CONFIRM_CREATE: &str =
    "Confirmation required. Re-run with confirm=true to create the work item.";
const MISSING_TEAM: &str =
    "Missing team. Pass `team` or set env AZDO_TEAM (or `default_team` in the config file).";
const MISSING_WORK_ITEM: &str = "Missing work item. Pass `id` or a `link` to the work item.";

/// Shared by every tool call; built once at start-up.
#[derive(Clone)]
pub struct McpContext {
    pub runner: Arc<dyn CommandRunner>,
    pub settings: Arc<Settings>,
}

impl McpContext {
    fn scope(&self, org_url: Option<&str>, project: Option<&str>) -> AzScope {
        self.settings.scope(org_url, project)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum ListInput {
    String(String),
    List(Vec<String>),
}

/// Accepts `["a", "b"]`, `"a, b"` or `"[a, b]"`.
fn parse_list_input(value: ListInput) -> Vec<String> {
    let values = match value {
        ListInput::List(values) => values,
        ListInput::String(value) => {
            let raw = value.trim();
            let inner = raw
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .unwrap_or(raw);
            inner.split(',').map(str::to_string).collect()
        }
    };
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn list_or_default(value: Option<ListInput>, default: &[&str]) -> Vec<String> {
    match value {
        Some(value) => parse_list_input(value),
        None => default.iter().map(|value| value.to_string()).collect(),
    }
}

#[derive(Clone, Debug, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldInputValue {
    Flag(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

/// Objects and arrays are passed to `az` as compact JSON text; `null` becomes an empty value.
impl<'de> Deserialize<'de> for FieldInputValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Bool(value) => FieldInputValue::Flag(value),
            Value::Number(number) => match (number.as_i64(), number.as_f64()) {
                (Some(value), _) => FieldInputValue::Integer(value),
                (None, Some(value)) => FieldInputValue::Number(value),
                (None, None) => FieldInputValue::Text(number.to_string()),
            },
            Value::String(value) => FieldInputValue::Text(value),
            Value::Null => FieldInputValue::Text(String::new()),
            other => FieldInputValue::Text(other.to_string()),
        })
    }
}

/// Extra `name=value` pair, e.g. `Microsoft.VSTS.Scheduling.RemainingWork` = 4.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
pub struct FieldInput {
    pub name: String,
    pub value: FieldInputValue,
}

fn field_assignments(fields: &Option<Vec<FieldInput>>) -> Vec<FieldAssignment> {
    fields
        .iter()
        .flatten()
        .map(|field| {
            let value = match &field.value {
                FieldInputValue::Flag(value) => FieldValue::Flag(*value),
                FieldInputValue::Integer(value) => FieldValue::Integer(*value),
                FieldInputValue::Number(value) => FieldValue::Number(*value),
                FieldInputValue::Text(value) => FieldValue::Text(value.clone()),
            };
            FieldAssignment::new(field.name.trim(), value)
        })
        .collect()
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn ok_text(content: String) -> Result<CallToolResult, CallToolError> {
    Ok(CallToolResult::text_content(vec![TextContent::from(
        content,
    )]))
}

fn ok_json(value: Value) -> Result<CallToolResult, CallToolError> {
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| "null".to_string());
    ok_text(text)
}

/// Recoverable problems are reported as a normal result so the agent can simply retry.
fn advisory(message: &str) -> Result<CallToolResult, CallToolError> {
    ok_json(serde_json::json!({ "error": message }))
}

fn tool_error(err: AzdoError) -> CallToolError {
    CallToolError::from_message(format!("[{}] {}", err.code(), err))
}

fn invalid(message: impl Into<String>) -> CallToolError {
    tool_error(AzdoError::InvalidArgument(message.into()))
}

fn work_item_id(id: u32) -> Result<u32, CallToolError> {
    if id == 0 {
        return Err(invalid("work item id must be a positive integer"));
    }
    Ok(id)
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    "json".to_string()
}

#[mcp_tool(
    name = "azdo_work_item_show",
    description = "Show an Azure DevOps work item by id."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ShowWorkItemTool {
    /// Work item id.
    pub id: u32,
    /// Expansion level: none, relations, fields, links or all (default relations).
    pub expand: Option<String>,
    /// Organisation URL, e.g. https://dev.azure.com/contoso.
    pub org_url: Option<String>,
    /// Exact project name.
    pub project: Option<String>,
}

#[mcp_tool(
    name = "azdo_work_item_update",
    description = "Update a work item. Requires confirm=true; by default only items assigned to the caller can be updated."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct UpdateWorkItemTool {
    pub id: u32,
    /// Must be true to apply the update.
    #[serde(default)]
    pub confirm: bool,
    /// Refuse the update when the item is assigned to someone else (default true).
    #[serde(default = "default_true")]
    pub only_if_assigned_to_me: bool,
    /// New state, e.g. Active or Closed.
    pub state: Option<String>,
    pub title: Option<String>,
    /// New iteration path.
    pub iteration: Option<String>,
    /// Reason for the state change.
    pub reason: Option<String>,
    /// Comment added to the Discussion.
    pub discussion: Option<String>,
    /// Description (HTML or text).
    pub description: Option<String>,
    /// Additional fields, e.g. Microsoft.VSTS.Scheduling.RemainingWork.
    pub fields: Option<Vec<FieldInput>>,
    pub org_url: Option<String>,
    pub project: Option<String>,
}

#[mcp_tool(
    name = "azdo_work_item_create",
    description = "Create a Task or User Story. Requires confirm=true; defaults to the team's current sprint and assigns it to the caller."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct CreateWorkItemTool {
    pub title: String,
    /// Must be true to create the work item.
    #[serde(default)]
    pub confirm: bool,
    /// Assign the new item to the caller (default true).
    #[serde(default = "default_true")]
    pub only_assign_to_me: bool,
    /// Task or User Story (default Task).
    #[serde(rename = "type")]
    pub work_item_type: Option<String>,
    pub description: Option<String>,
    pub discussion: Option<String>,
    /// Iteration path; the team's current sprint when omitted.
    pub iteration: Option<String>,
    /// Team used to resolve the current sprint when `iteration` is omitted.
    pub team: Option<String>,
    pub fields: Option<Vec<FieldInput>>,
    pub org_url: Option<String>,
    pub project: Option<String>,
}

#[mcp_tool(name = "azdo_query_wiql", description = "Run a WIQL query verbatim.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct QueryWiqlTool {
    /// Complete WIQL query.
    pub wiql: String,
    pub org_url: Option<String>,
    pub project: Option<String>,
}

#[mcp_tool(
    name = "azdo_list_my_work_items",
    description = "List work items assigned to the caller, by default limited to the team's current sprint."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListMyWorkItemsTool {
    /// Team whose current sprint scopes the listing.
    pub team: Option<String>,
    /// Only items in the team's current sprint (default true).
    #[serde(default = "default_true")]
    pub only_current_sprint: bool,
    /// Maximum number of results, 1 to 200 (default 50).
    pub top: Option<u32>,
    /// States to exclude (default Done, Closed, Removed).
    pub states_not_in: Option<ListInput>,
    /// Types to include (default Task, Bug, User Story).
    pub work_item_types: Option<ListInput>,
    pub org_url: Option<String>,
    pub project: Option<String>,
}

#[mcp_tool(
    name = "azdo_current_iteration",
    description = "Show the team's current iteration (sprint)."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct CurrentIterationTool {
    pub team: Option<String>,
    pub org_url: Option<String>,
    pub project: Option<String>,
}

#[mcp_tool(
    name = "azdo_work_item_context",
    description = "Render a work item with its description, acceptance criteria, attachments and related items as Markdown."
)]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct WorkItemContextTool {
    pub id: Option<u32>,
    /// Work item URL (.../_workitems/edit/<id>), used when `id` is omitted.
    pub link: Option<String>,
    /// Fetch each related work item (default true).
    #[serde(default = "default_true")]
    pub include_related: bool,
    pub org_url: Option<String>,
    pub project: Option<String>,
}

#[mcp_tool(name = "version", description = "Return azdo-mcp version information.")]
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct VersionTool {
    /// json or text.
    #[serde(default = "default_format")]
    pub format: String,
}

// Generates enum AzdoTools with variants for each tool
tool_box!(
    AzdoTools,
    [
        ShowWorkItemTool,
        UpdateWorkItemTool,
        CreateWorkItemTool,
        QueryWiqlTool,
        ListMyWorkItemsTool,
        CurrentIterationTool,
        WorkItemContextTool,
        VersionTool
    ]
);

pub struct AzdoServerHandler {
    pub context: McpContext,
}

#[async_trait]
impl ServerHandler for AzdoServerHandler {
    async fn handle_list_tools_request(
        &self,
        _params: Option<PaginatedRequestParams>,
        _runtime: Arc<dyn McpServer>,
    ) -> Result<ListToolsResult, RpcError> {
        Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: AzdoTools::tools(),
        })
    }

    async fn handle_call_tool_request(
        &self,
        params: CallToolRequestParams,
        _runtime: Arc<dyn McpServer>,
    ) -> Result<CallToolResult, CallToolError> {
        let tool = AzdoTools::try_from(params).map_err(CallToolError::new)?;
        match tool {
            AzdoTools::ShowWorkItemTool(tool) => tool.call(&self.context).await,
            AzdoTools::UpdateWorkItemTool(tool) => tool.call(&self.context).await,
            AzdoTools::CreateWorkItemTool(tool) => tool.call(&self.context).await,
            AzdoTools::QueryWiqlTool(tool) => tool.call(&self.context).await,
            AzdoTools::ListMyWorkItemsTool(tool) => tool.call(&self.context).await,
            AzdoTools::CurrentIterationTool(tool) => tool.call(&self.context).await,
            AzdoTools::WorkItemContextTool(tool) => tool.call(&self.context).await,
            AzdoTools::VersionTool(tool) => tool.call(&self.context),
        }
    }
}

impl ShowWorkItemTool {
    async fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let id = work_item_id(self.id)?;
        let expand = match self.expand.as_deref() {
            Some(value) => value.parse::<Expand>().map_err(tool_error)?,
            None => Expand::default(),
        };
        let scope = context.scope(self.org_url.as_deref(), self.project.as_deref());
        let item = show_work_item(context.runner.as_ref(), &scope, id, expand)
            .await
            .map_err(tool_error)?;
        ok_json(item.unwrap_or(Value::Null))
    }
}

impl UpdateWorkItemTool {
    async fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        if !self.confirm {
            return advisory(CONFIRM_UPDATE);
        }
        let id = work_item_id(self.id)?;
        let runner = context.runner.as_ref();
        let scope = context.scope(self.org_url.as_deref(), self.project.as_deref());

        if self.only_if_assigned_to_me {
            ensure_assigned_to_me(runner, &scope, id)
                .await
                .map_err(tool_error)?;
        }

        let update = WorkItemUpdate {
            id,
            state: self.state.clone(),
            title: self.title.clone(),
            iteration: self.iteration.clone(),
            reason: self.reason.clone(),
            discussion: self.discussion.clone(),
            description: self.description.clone(),
            fields: field_assignments(&self.fields),
        };
        info!(id, fields = update.fields.len(), "updating work item");
        let updated = update_work_item(runner, &scope, &update)
            .await
            .map_err(tool_error)?;
        ok_json(updated.unwrap_or(Value::Null))
    }
}

impl CreateWorkItemTool {
    async fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        if !self.confirm {
            return advisory(CONFIRM_CREATE);
        }
        let title = self.title.trim();
        if title.is_empty() {
            return Err(invalid("title must not be empty"));
        }
        let kind = match self.work_item_type.as_deref() {
            Some(value) => value.parse::<WorkItemKind>().map_err(tool_error)?,
            None => WorkItemKind::default(),
        };
        let runner = context.runner.as_ref();
        let scope = context.scope(self.org_url.as_deref(), self.project.as_deref());

        let iteration = match non_blank(&self.iteration) {
            Some(path) => Some(path),
            None => {
                let team = context.settings.team(self.team.as_deref());
                current_iteration_path(runner, &scope, team.as_deref())
                    .await
                    .map_err(tool_error)?
            }
        };
        let assigned_to = if self.only_assign_to_me {
            who_am_i(runner).await.map_err(tool_error)?
        } else {
            None
        };

        let draft = WorkItemDraft {
            kind,
            title: title.to_string(),
            description: self.description.clone(),
            discussion: self.discussion.clone(),
            iteration,
            assigned_to,
            fields: field_assignments(&self.fields),
        };
        info!(
            kind = kind.as_str(),
            iteration = draft.iteration.as_deref().unwrap_or("-"),
            "creating work item"
        );
        let created = create_work_item(runner, &scope, &draft)
            .await
            .map_err(tool_error)?;
        ok_json(created.unwrap_or(Value::Null))
    }
}

impl QueryWiqlTool {
    async fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        if self.wiql.trim().is_empty() {
            return Err(invalid("wiql must not be empty"));
        }
        let scope = context.scope(self.org_url.as_deref(), self.project.as_deref());
        let result = query_wiql(context.runner.as_ref(), &scope, &self.wiql)
            .await
            .map_err(tool_error)?;
        ok_json(result.unwrap_or(Value::Null))
    }
}

impl ListMyWorkItemsTool {
    async fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let limit = self.top.unwrap_or(DEFAULT_LIMIT as u32) as usize;
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(invalid(format!(
                "top must be between 1 and {MAX_LIMIT}, got {limit}"
            )));
        }
        let filter = ListFilter {
            excluded_states: list_or_default(self.states_not_in.clone(), &DEFAULT_EXCLUDED_STATES),
            included_types: list_or_default(self.work_item_types.clone(), &DEFAULT_INCLUDED_TYPES),
            current_iteration_only: self.only_current_sprint,
            team: context.settings.team(self.team.as_deref()),
            limit,
        };
        let scope = context.scope(self.org_url.as_deref(), self.project.as_deref());
        let listed = list_my_work_items(context.runner.as_ref(), &scope, &filter)
            .await
            .map_err(tool_error)?;
        debug!(
            iteration = listed.iteration_path.as_deref().unwrap_or("-"),
            "listed work items"
        );
        ok_json(listed.items.unwrap_or(Value::Null))
    }
}

impl CurrentIterationTool {
    async fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let Some(team) = context.settings.team(self.team.as_deref()) else {
            return advisory(MISSING_TEAM);
        };
        let scope = context.scope(self.org_url.as_deref(), self.project.as_deref());
        let iterations = list_current_iterations(context.runner.as_ref(), &scope, &team)
            .await
            .map_err(tool_error)?;
        ok_json(iterations.unwrap_or(Value::Null))
    }
}

impl WorkItemContextTool {
    async fn call(&self, context: &McpContext) -> Result<CallToolResult, CallToolError> {
        let id = match (self.id, non_blank(&self.link)) {
            (Some(id), _) => work_item_id(id)?,
            (None, Some(link)) => match parse_work_item_link(&link) {
                Some(id) => work_item_id(id)?,
                None => return advisory(&format!("Could not find a work item id in link: {link}")),
            },
            (None, None) => return advisory(MISSING_WORK_ITEM),
        };
        let scope = context.scope(self.org_url.as_deref(), self.project.as_deref());
        let collected = collect_context(context.runner.as_ref(), &scope, id, self.include_related)
            .await
            .map_err(tool_error)?;
        ok_text(render_markdown(&collected))
    }
}

impl VersionTool {
    fn call(&self, _context: &McpContext) -> Result<CallToolResult, CallToolError> {
        if self.format == "text" {
            return ok_text(format!(
                "azdo-mcp {}\n{}\n",
                env!("CARGO_PKG_VERSION"),
                version::FULL
            ));
        }
        ok_json(serde_json::json!({
            "name": "azdo-mcp",
            "version": env!("CARGO_PKG_VERSION"),
            "full": version::FULL,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use azdo_core::error::Result as AzdoResult;
    use azdo_core::runner::{CommandOutput, EnvOverrides};
    use pretty_assertions::assert_eq;
    use serde::de::DeserializeOwned;
    use serde_json::json;

    use super::*;

    /// Answers by argument prefix and records every invocation.
    #[derive(Default)]
    struct ScriptedRunner {
        replies: Vec<(Vec<String>, String)>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn on(mut self, prefix: &[&str], stdout: &str) -> Self {
            let prefix = prefix.iter().map(|part| part.to_string()).collect();
            self.replies.push((prefix, stdout.to_string()));
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, args: &[String], _env: &EnvOverrides) -> AzdoResult<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            match self.replies.iter().find(|(prefix, _)| args.starts_with(prefix)) {
                Some((_, stdout)) => Ok(CommandOutput {
                    stdout: stdout.clone(),
                    stderr: String::new(),
                }),
                None => Err(AzdoError::CommandFailed {
                    command: format!("az {}", args.join(" ")),
                    code: Some(2),
                    stderr: "unexpected call".to_string(),
                }),
            }
        }
    }

    fn context(runner: &Arc<ScriptedRunner>, settings: Settings) -> McpContext {
        McpContext {
            runner: runner.clone(),
            settings: Arc::new(settings),
        }
    }

    fn tool<T: DeserializeOwned>(arguments: Value) -> T {
        serde_json::from_value(arguments).expect("tool arguments")
    }

    fn text_payload(result: CallToolResult) -> String {
        result
            .content
            .first()
            .expect("tool content")
            .as_text_content()
            .expect("text content")
            .text
            .clone()
    }

    fn json_payload(result: CallToolResult) -> Value {
        serde_json::from_str(&text_payload(result)).expect("json payload")
    }

    fn assigned_snapshot(assigned: &str) -> String {
        json!({"id": 42, "fields": {
            "System.AssignedTo": {"uniqueName": assigned},
            "System.Title": "Fix login",
            "System.WorkItemType": "Bug",
            "System.State": "Active"
        }})
        .to_string()
    }

    #[tokio::test]
    async fn update_without_confirm_is_advisory_and_runs_nothing() {
        let runner = Arc::new(ScriptedRunner::default());
        let update: UpdateWorkItemTool = tool(json!({"id": 42, "state": "Closed"}));
        assert!(!update.confirm);
        assert!(update.only_if_assigned_to_me);

        let payload = json_payload(
            update
                .call(&context(&runner, Settings::default()))
                .await
                .unwrap(),
        );
        assert_eq!(payload, json!({"error": CONFIRM_UPDATE}));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn update_refused_when_assigned_to_someone_else() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .on(&["account", "show"], "alice@example.com\n")
                .on(
                    &["boards", "work-item", "show"],
                    &assigned_snapshot("bob@example.com"),
                ),
        );
        let update: UpdateWorkItemTool =
            tool(json!({"id": 42, "confirm": true, "state": "Closed"}));

        let err = update
            .call(&context(&runner, Settings::default()))
            .await
            .expect_err("ownership mismatch");
        let message = err.to_string();
        assert!(message.contains("[NOT_ASSIGNED_TO_ME]"), "{message}");
        assert!(message.contains("bob@example.com"), "{message}");

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|call| !call.contains(&"update".to_string())));
    }

    #[tokio::test]
    async fn update_applies_shortcuts_and_fields_after_guard() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .on(&["account", "show"], "jdoe")
                .on(
                    &["boards", "work-item", "show"],
                    &assigned_snapshot("JDoe@example.com"),
                )
                .on(&["boards", "work-item", "update"], r#"{"id": 42, "rev": 7}"#),
        );
        let update: UpdateWorkItemTool = tool(json!({
            "id": 42,
            "confirm": true,
            "state": "Active",
            "discussion": "",
            "fields": [
                {"name": "Microsoft.VSTS.Scheduling.RemainingWork", "value": 3.5},
                {"name": "Custom.Blocked", "value": true},
                {"name": "Custom.Note", "value": "a=b"}
            ]
        }));

        let payload = json_payload(
            update
                .call(&context(&runner, Settings::default()))
                .await
                .unwrap(),
        );
        assert_eq!(payload["rev"], 7);
        let calls = runner.calls();
        assert_eq!(
            calls[2],
            vec![
                "boards",
                "work-item",
                "update",
                "--id",
                "42",
                "--state",
                "Active",
                "--fields",
                "Microsoft.VSTS.Scheduling.RemainingWork=3.5",
                "Custom.Blocked=true",
                "Custom.Note=a=b",
                "-o",
                "json",
            ]
        );
    }

    #[test]
    fn structured_field_values_are_passed_as_json_text() {
        let fields: Option<Vec<FieldInput>> = Some(tool(json!([
            {"name": "Custom.Tags", "value": ["ui", "checkout"]},
            {"name": "Custom.Meta", "value": {"owner": "web", "points": 3}},
            {"name": "Custom.Cleared", "value": null},
            {"name": "Custom.Big", "value": 18446744073709551615u64},
            {"name": "Microsoft.VSTS.Common.Priority", "value": 2}
        ])));
        assert_eq!(
            field_assignments(&fields),
            vec![
                FieldAssignment::new("Custom.Tags", FieldValue::Text(r#"["ui","checkout"]"#.to_string())),
                FieldAssignment::new(
                    "Custom.Meta",
                    FieldValue::Text(r#"{"owner":"web","points":3}"#.to_string())
                ),
                FieldAssignment::new("Custom.Cleared", FieldValue::Text(String::new())),
                FieldAssignment::new("Custom.Big", FieldValue::Number(18446744073709551615u64 as f64)),
                FieldAssignment::new("Microsoft.VSTS.Common.Priority", FieldValue::Integer(2)),
            ]
        );
    }

    #[tokio::test]
    async fn update_can_skip_ownership_check() {
        let runner = Arc::new(
            ScriptedRunner::default().on(&["boards", "work-item", "update"], r#"{"id": 42}"#),
        );
        let update: UpdateWorkItemTool = tool(json!({
            "id": 42,
            "confirm": true,
            "only_if_assigned_to_me": false,
            "title": "Renamed"
        }));
        update
            .call(&context(&runner, Settings::default()))
            .await
            .unwrap();
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn create_without_confirm_is_advisory() {
        let runner = Arc::new(ScriptedRunner::default());
        let create: CreateWorkItemTool = tool(json!({"title": "Write docs"}));
        let payload = json_payload(
            create
                .call(&context(&runner, Settings::default()))
                .await
                .unwrap(),
        );
        assert_eq!(payload, json!({"error": CONFIRM_CREATE}));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn create_resolves_sprint_then_assignee() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .on(&["boards", "iteration"], r#"[{"path": "Shop\\Sprint 7"}]"#)
                .on(&["account", "show"], "alice@example.com")
                .on(&["boards", "work-item", "create"], r#"{"id": 99}"#),
        );
        let settings = Settings {
            default_team: Some("Shop Team".to_string()),
            ..Settings::default()
        };
        let create: CreateWorkItemTool = tool(json!({
            "title": "Checkout flow",
            "type": "User Story",
            "confirm": true
        }));

        let payload = json_payload(create.call(&context(&runner, settings)).await.unwrap());
        assert_eq!(payload["id"], 99);

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].contains(&"Shop Team".to_string()));
        assert_eq!(calls[1][0], "account");
        assert_eq!(
            calls[2],
            vec![
                "boards",
                "work-item",
                "create",
                "--type",
                "User Story",
                "--title",
                "Checkout flow",
                "--iteration",
                "Shop\\Sprint 7",
                "--assigned-to",
                "alice@example.com",
                "-o",
                "json",
            ]
        );
    }

    #[tokio::test]
    async fn create_with_explicit_iteration_and_no_team_skips_lookups() {
        let runner = Arc::new(
            ScriptedRunner::default().on(&["boards", "work-item", "create"], r#"{"id": 5}"#),
        );
        let create: CreateWorkItemTool = tool(json!({
            "title": "Spike",
            "confirm": true,
            "only_assign_to_me": false,
            "iteration": "Shop\\Sprint 8"
        }));
        create
            .call(&context(&runner, Settings::default()))
            .await
            .unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][4], "Task");
        assert!(!calls[0].contains(&"--assigned-to".to_string()));
    }

    #[tokio::test]
    async fn create_rejects_unknown_type() {
        let runner = Arc::new(ScriptedRunner::default());
        let create: CreateWorkItemTool =
            tool(json!({"title": "Oops", "type": "Epic", "confirm": true}));
        let err = create
            .call(&context(&runner, Settings::default()))
            .await
            .expect_err("invalid type");
        assert!(err.to_string().contains("[INVALID_ARGUMENT]"));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn list_truncates_to_top_in_order() {
        let runner = Arc::new(ScriptedRunner::default().on(
            &["boards", "query"],
            r#"[{"id": 5}, {"id": 4}, {"id": 3}, {"id": 2}, {"id": 1}]"#,
        ));
        let list: ListMyWorkItemsTool = tool(json!({"top": 2, "only_current_sprint": false}));
        let payload = json_payload(
            list.call(&context(&runner, Settings::default()))
                .await
                .unwrap(),
        );
        assert_eq!(payload, json!([{"id": 5}, {"id": 4}]));
    }

    #[tokio::test]
    async fn list_uses_configured_team_and_custom_filters() {
        let runner = Arc::new(
            ScriptedRunner::default()
                .on(&["boards", "iteration"], r#"[{"name": "Sprint 2"}]"#)
                .on(&["boards", "query"], "[]"),
        );
        let settings = Settings {
            default_team: Some("Shop Team".to_string()),
            ..Settings::default()
        };
        let list: ListMyWorkItemsTool = tool(json!({
            "states_not_in": "Closed, Won't Fix",
            "work_item_types": ["Bug"]
        }));
        list.call(&context(&runner, settings)).await.unwrap();

        let calls = runner.calls();
        let wiql = &calls[1][3];
        assert!(wiql.contains("NOT IN ('Closed', 'Won''t Fix')"), "{wiql}");
        assert!(wiql.contains("[System.WorkItemType] IN ('Bug')"), "{wiql}");
        assert!(wiql.contains("[System.IterationPath] = 'Sprint 2'"), "{wiql}");
    }

    #[tokio::test]
    async fn list_rejects_top_out_of_range() {
        let runner = Arc::new(ScriptedRunner::default());
        for top in [0, 201] {
            let list: ListMyWorkItemsTool = tool(json!({"top": top}));
            let err = list
                .call(&context(&runner, Settings::default()))
                .await
                .expect_err("top out of range");
            assert!(err.to_string().contains("[INVALID_ARGUMENT]"));
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn current_iteration_without_team_is_advisory() {
        let runner = Arc::new(ScriptedRunner::default());
        let current: CurrentIterationTool = tool(json!({"team": "  "}));
        let payload = json_payload(
            current
                .call(&context(&runner, Settings::default()))
                .await
                .unwrap(),
        );
        assert_eq!(payload, json!({"error": MISSING_TEAM}));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn current_iteration_prefers_explicit_team() {
        let runner = Arc::new(
            ScriptedRunner::default().on(&["boards", "iteration"], r#"[{"path": "Ops\\S1"}]"#),
        );
        let settings = Settings {
            default_team: Some("Shop Team".to_string()),
            ..Settings::default()
        };
        let current: CurrentIterationTool = tool(json!({"team": "Ops"}));
        let payload = json_payload(current.call(&context(&runner, settings)).await.unwrap());
        assert_eq!(payload, json!([{"path": "Ops\\S1"}]));
        assert_eq!(runner.calls()[0][5], "Ops");
    }

    #[tokio::test]
    async fn show_rejects_zero_id_and_bad_expand() {
        let runner = Arc::new(ScriptedRunner::default());
        let zero: ShowWorkItemTool = tool(json!({"id": 0}));
        assert!(zero
            .call(&context(&runner, Settings::default()))
            .await
            .expect_err("zero id")
            .to_string()
            .contains("[INVALID_ARGUMENT]"));
        let deep: ShowWorkItemTool = tool(json!({"id": 3, "expand": "deep"}));
        assert!(deep
            .call(&context(&runner, Settings::default()))
            .await
            .is_err());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn command_failures_carry_their_code() {
        let runner = Arc::new(ScriptedRunner::default());
        let query: QueryWiqlTool = tool(json!({"wiql": "SELECT [System.Id] FROM WorkItems"}));
        let err = query
            .call(&context(&runner, Settings::default()))
            .await
            .expect_err("command failure");
        assert!(err.to_string().contains("[COMMAND_FAILED]"));
    }

    #[tokio::test]
    async fn context_accepts_a_link() {
        let runner = Arc::new(ScriptedRunner::default().on(
            &["boards", "work-item", "show", "--id", "25459"],
            r#"{"id": 25459, "fields": {"System.Title": "Export", "System.WorkItemType": "Task"}}"#,
        ));
        let context_tool: WorkItemContextTool = tool(json!({
            "link": "https://dev.azure.com/contoso/Shop/_workitems/edit/25459"
        }));
        let markdown = text_payload(
            context_tool.call(&context(&runner, Settings::default()))
                .await
                .unwrap(),
        );
        assert!(markdown.starts_with("# Task 25459: Export\n"));
    }

    #[tokio::test]
    async fn context_without_target_is_advisory() {
        let runner = Arc::new(ScriptedRunner::default());
        let context_tool: WorkItemContextTool = tool(json!({"link": "https://example.com"}));
        let payload = json_payload(
            context_tool.call(&context(&runner, Settings::default()))
                .await
                .unwrap(),
        );
        assert!(payload["error"].as_str().unwrap().contains("example.com"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn list_input_accepts_strings_and_lists() {
        assert_eq!(
            parse_list_input(ListInput::String("[Done, Closed]".to_string())),
            vec!["Done", "Closed"]
        );
        assert_eq!(
            parse_list_input(ListInput::List(vec![" Bug ".to_string(), String::new()])),
            vec!["Bug"]
        );
        assert!(parse_list_input(ListInput::String("[]".to_string())).is_empty());
    }

    #[test]
    fn version_tool_reports_full_version() {
        let runner = Arc::new(ScriptedRunner::default());
        let payload = json_payload(
            VersionTool {
                format: "json".to_string(),
            }
            .call(&context(&runner, Settings::default()))
            .unwrap(),
        );
        assert_eq!(payload["name"], "azdo-mcp");
        assert_eq!(payload["full"], version::FULL);
    }
}
