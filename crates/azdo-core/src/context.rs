//! Gathers a work item together with its related items and renders it as Markdown
//! context for an agent.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::boards::{show_work_item, AzScope};
use crate::error::Result;
use crate::identity::AssignedIdentity;
use crate::runner::CommandRunner;
use crate::work_item::{field_str, Expand, FIELD_STATE, FIELD_TITLE, FIELD_WORK_ITEM_TYPE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedFailure {
    pub id: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemContext {
    pub id: u32,
    pub item: Value,
    pub related: Vec<Value>,
    pub unavailable: Vec<RelatedFailure>,
    pub attachments: Vec<Attachment>,
}

fn edit_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/_workitems/edit/(\d+)").expect("edit link regex must compile"))
}

fn relation_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/workItems/(\d+)$").expect("relation url regex must compile"))
}

/// Tag rewrites applied in order; anything left that looks like a tag is dropped last.
fn tag_rewrites() -> &'static [(Regex, &'static str)] {
    static REWRITES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    REWRITES.get_or_init(|| {
        [
            (r"(?i)<\s*br\s*/?>", "\n"),
            (r"(?i)</\s*p\s*>", "\n"),
            (r"(?i)</\s*div\s*>", "\n"),
            (r"(?i)<\s*li\b[^>]*>", "\n- "),
            (r"(?i)</\s*li\s*>", ""),
            (r"(?i)<\s*ul\b[^>]*>", "\n"),
            (r"(?i)</\s*ul\s*>", "\n"),
            (r"<[^>]+>", ""),
        ]
        .into_iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("tag regex must compile"),
                replacement,
            )
        })
        .collect()
    })
}

fn inline_space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\u{a0}]+").expect("space regex must compile"))
}

fn blank_lines_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n\s*\n\s*\n+").expect("blank line regex must compile"))
}

/// Extracts the id from a work item URL such as `.../_workitems/edit/25459`.
pub fn parse_work_item_link(link: &str) -> Option<u32> {
    edit_link_re().captures(link)?.get(1)?.as_str().parse().ok()
}

/// Related work item ids (sorted, unique) and attachments from an item's `relations`.
pub fn extract_relations(item: &Value) -> (Vec<u32>, Vec<Attachment>) {
    let mut ids = BTreeSet::new();
    let mut attachments = Vec::new();
    let relations = item
        .get("relations")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for relation in relations {
        let url = relation.get("url").and_then(Value::as_str).unwrap_or_default();
        if relation.get("rel").and_then(Value::as_str) == Some("AttachedFile") {
            if let Some(name) = relation
                .get("attributes")
                .and_then(|attributes| attributes.get("name"))
                .and_then(Value::as_str)
            {
                attachments.push(Attachment {
                    name: name.to_string(),
                    url: (!url.is_empty()).then(|| url.to_string()),
                });
            }
            continue;
        }
        if let Some(id) = relation_url_re()
            .captures(url)
            .and_then(|caps| caps.get(1))
            .and_then(|value| value.as_str().parse::<u32>().ok())
        {
            ids.insert(id);
        }
    }
    (ids.into_iter().collect(), attachments)
}

/// Fetches the item with relations and, when asked, each related item in turn.
///
/// A related item that cannot be fetched is recorded in `unavailable`; only the main
/// item's failure is an error.
pub async fn collect_context(
    runner: &dyn CommandRunner,
    scope: &AzScope,
    id: u32,
    include_related: bool,
) -> Result<WorkItemContext> {
    let item = show_work_item(runner, scope, id, Expand::Relations)
        .await?
        .unwrap_or(Value::Null);
    let (related_ids, attachments) = extract_relations(&item);

    let mut related = Vec::new();
    let mut unavailable = Vec::new();
    if include_related {
        for related_id in related_ids {
            match show_work_item(runner, scope, related_id, Expand::None).await {
                Ok(Some(value)) => related.push(value),
                Ok(None) => unavailable.push(RelatedFailure {
                    id: related_id,
                    reason: "empty response".to_string(),
                }),
                Err(err) => {
                    warn!(id, related_id, error = %err, "could not fetch related work item");
                    unavailable.push(RelatedFailure {
                        id: related_id,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    Ok(WorkItemContext {
        id,
        item,
        related,
        unavailable,
        attachments,
    })
}

/// Converts work item HTML (descriptions, acceptance criteria) to plain text.
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let mut text = html.replace('\r', "");
    for (re, replacement) in tag_rewrites() {
        text = re.replace_all(&text, *replacement).into_owned();
    }
    let text = html_escape::decode_html_entities(&text);
    let text = inline_space_re().replace_all(&text, " ");
    let text = blank_lines_re().replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn field_display(item: &Value, name: &str) -> Option<String> {
    match item.get("fields")?.get(name)? {
        Value::Null => None,
        Value::String(value) if value.is_empty() => None,
        Value::String(value) => Some(value.clone()),
        other => Some(other.to_string()),
    }
}

const METADATA_FIELDS: [(&str, &str); 9] = [
    ("Area", "System.AreaPath"),
    ("Iteration", "System.IterationPath"),
    ("Priority", "Microsoft.VSTS.Common.Priority"),
    ("Original estimate (h)", "Microsoft.VSTS.Scheduling.OriginalEstimate"),
    ("Created", "System.CreatedDate"),
    ("Activated", "Microsoft.VSTS.Common.ActivatedDate"),
    ("Changed", "System.ChangedDate"),
    ("State changed", "Microsoft.VSTS.Common.StateChangeDate"),
    ("Reason", "System.Reason"),
];

pub fn render_markdown(context: &WorkItemContext) -> String {
    let item = &context.item;
    let title = field_str(item, FIELD_TITLE).unwrap_or("?");
    let kind = field_str(item, FIELD_WORK_ITEM_TYPE).unwrap_or("Work item");
    let mut lines = vec![format!("# {kind} {}: {title}", context.id), String::new()];

    lines.push("## Metadata".to_string());
    lines.push(format!("- **Type**: {kind}"));
    lines.push(format!("- **Title**: {title}"));
    if let Some(state) = field_str(item, FIELD_STATE) {
        lines.push(format!("- **State**: {state}"));
    }
    for (label, name) in METADATA_FIELDS {
        if let Some(value) = field_display(item, name) {
            lines.push(format!("- **{label}**: {value}"));
        }
    }
    if let Some(assignee) = AssignedIdentity::from_work_item(item) {
        if let Some(name) = assignee.display_name() {
            lines.push(format!("- **Assigned to**: {name}"));
        }
    }

    lines.push(String::new());
    lines.push("## Description".to_string());
    lines.push(html_to_text(
        field_str(item, "System.Description").unwrap_or_default(),
    ));

    lines.push(String::new());
    lines.push("## Acceptance criteria".to_string());
    lines.push(html_to_text(
        field_str(item, "Microsoft.VSTS.Common.AcceptanceCriteria").unwrap_or_default(),
    ));

    lines.push(String::new());
    lines.push("## Attachments".to_string());
    if context.attachments.is_empty() {
        lines.push("- (none)".to_string());
    }
    for attachment in &context.attachments {
        lines.push(format!("- {}", attachment.name));
    }

    lines.push(String::new());
    lines.push("## Related work items".to_string());
    if context.related.is_empty() && context.unavailable.is_empty() {
        lines.push("- (none)".to_string());
    }
    for related in &context.related {
        lines.push(format!(
            "- #{}: {} ({}) - {}",
            related
                .get("id")
                .map(Value::to_string)
                .unwrap_or_else(|| "?".to_string()),
            field_str(related, FIELD_TITLE).unwrap_or("?"),
            field_str(related, FIELD_WORK_ITEM_TYPE).unwrap_or("?"),
            field_str(related, FIELD_STATE).unwrap_or("?")
        ));
    }
    for failure in &context.unavailable {
        lines.push(format!("- #{}: unavailable ({})", failure.id, failure.reason));
    }

    lines.join("\n") + "\n"
}
