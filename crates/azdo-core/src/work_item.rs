use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::AzdoError;

pub const FIELD_ASSIGNED_TO: &str = "System.AssignedTo";
pub const FIELD_TITLE: &str = "System.Title";
pub const FIELD_WORK_ITEM_TYPE: &str = "System.WorkItemType";
pub const FIELD_STATE: &str = "System.State";

/// Fields fetched by the ownership guard.
pub const GUARD_FIELDS: [&str; 4] = [
    FIELD_ASSIGNED_TO,
    FIELD_TITLE,
    FIELD_WORK_ITEM_TYPE,
    FIELD_STATE,
];

/// `--expand` level for `az boards work-item show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expand {
    None,
    #[default]
    Relations,
    Fields,
    Links,
    All,
}

impl Expand {
    pub fn as_str(self) -> &'static str {
        match self {
            Expand::None => "none",
            Expand::Relations => "relations",
            Expand::Fields => "fields",
            Expand::Links => "links",
            Expand::All => "all",
        }
    }
}

impl FromStr for Expand {
    type Err = AzdoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Expand::None),
            "relations" => Ok(Expand::Relations),
            "fields" => Ok(Expand::Fields),
            "links" => Ok(Expand::Links),
            "all" => Ok(Expand::All),
            other => Err(AzdoError::InvalidArgument(format!(
                "unknown expand level `{other}` (expected none, relations, fields, links or all)"
            ))),
        }
    }
}

/// Work item types that may be created through the tool surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkItemKind {
    #[default]
    Task,
    UserStory,
}

impl WorkItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkItemKind::Task => "Task",
            WorkItemKind::UserStory => "User Story",
        }
    }
}

impl FromStr for WorkItemKind {
    type Err = AzdoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Task" => Ok(WorkItemKind::Task),
            "User Story" => Ok(WorkItemKind::UserStory),
            other => Err(AzdoError::InvalidArgument(format!(
                "unsupported work item type `{other}` (expected Task or User Story)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Flag(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Flag(value) => write!(f, "{value}"),
        }
    }
}

/// One `name=value` pair passed through `--fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAssignment {
    pub name: String,
    pub value: FieldValue,
}

impl FieldAssignment {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

fn push_fields(args: &mut Vec<String>, fields: &[FieldAssignment]) {
    let pairs: Vec<String> = fields
        .iter()
        .filter(|field| !field.name.trim().is_empty())
        .map(|field| format!("{}={}", field.name, field.value))
        .collect();
    if pairs.is_empty() {
        return;
    }
    args.push("--fields".to_string());
    args.extend(pairs);
}

fn push_opt(args: &mut Vec<String>, flag: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkItemUpdate {
    pub id: u32,
    pub state: Option<String>,
    pub title: Option<String>,
    pub iteration: Option<String>,
    pub reason: Option<String>,
    pub discussion: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<FieldAssignment>,
}

impl WorkItemUpdate {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "boards".to_string(),
            "work-item".to_string(),
            "update".to_string(),
            "--id".to_string(),
            self.id.to_string(),
        ];
        push_opt(&mut args, "--state", self.state.as_deref());
        push_opt(&mut args, "--title", self.title.as_deref());
        push_opt(&mut args, "--iteration", self.iteration.as_deref());
        push_opt(&mut args, "--reason", self.reason.as_deref());
        push_opt(&mut args, "--discussion", self.discussion.as_deref());
        push_opt(&mut args, "--description", self.description.as_deref());
        push_fields(&mut args, &self.fields);
        args.push("-o".to_string());
        args.push("json".to_string());
        args
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkItemDraft {
    pub kind: WorkItemKind,
    pub title: String,
    pub description: Option<String>,
    pub discussion: Option<String>,
    pub iteration: Option<String>,
    pub assigned_to: Option<String>,
    pub fields: Vec<FieldAssignment>,
}

impl WorkItemDraft {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "boards".to_string(),
            "work-item".to_string(),
            "create".to_string(),
            "--type".to_string(),
            self.kind.as_str().to_string(),
            "--title".to_string(),
            self.title.clone(),
        ];
        push_opt(&mut args, "--description", self.description.as_deref());
        push_opt(&mut args, "--discussion", self.discussion.as_deref());
        push_opt(&mut args, "--iteration", self.iteration.as_deref());
        push_opt(&mut args, "--assigned-to", self.assigned_to.as_deref());
        push_fields(&mut args, &self.fields);
        args.push("-o".to_string());
        args.push("json".to_string());
        args
    }
}

/// Reads a string field from a work item's `fields` map.
pub fn field_str<'a>(work_item: &'a Value, name: &str) -> Option<&'a str> {
    work_item.get("fields")?.get(name)?.as_str()
}
