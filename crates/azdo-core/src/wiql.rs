//! WIQL assembly for the "my work items" listing.
//!
//! Every string interpolated into a query goes through [`wiql_escape`] exactly once.

pub const DEFAULT_EXCLUDED_STATES: [&str; 3] = ["Done", "Closed", "Removed"];
pub const DEFAULT_INCLUDED_TYPES: [&str; 3] = ["Task", "Bug", "User Story"];
pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;

const SELECT_COLUMNS: &str = "SELECT [System.Id], [System.WorkItemType], [System.Title], [System.State], [System.ChangedDate]";

/// Doubles single quotes so the value cannot terminate a quoted WIQL literal.
///
/// Not idempotent: applying it twice doubles the quotes twice.
pub fn wiql_escape(value: &str) -> String {
    value.replace('\'', "''")
}

fn quoted(value: &str) -> String {
    format!("'{}'", wiql_escape(value))
}

fn quoted_list(values: &[String]) -> String {
    values
        .iter()
        .map(|value| quoted(value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Filters for listing the caller's own work items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub excluded_states: Vec<String>,
    pub included_types: Vec<String>,
    pub current_iteration_only: bool,
    pub team: Option<String>,
    pub limit: usize,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            excluded_states: DEFAULT_EXCLUDED_STATES
                .iter()
                .map(|value| value.to_string())
                .collect(),
            included_types: DEFAULT_INCLUDED_TYPES
                .iter()
                .map(|value| value.to_string())
                .collect(),
            current_iteration_only: true,
            team: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Builds the listing query. Clause order is fixed; empty state/type lists still yield
/// `NOT IN ()` / `IN ()`.
pub fn build_list_query(filter: &ListFilter, iteration_path: Option<&str>) -> String {
    let mut wiql = String::new();
    wiql.push_str(SELECT_COLUMNS);
    wiql.push_str(" FROM WorkItems");
    wiql.push_str(" WHERE [System.AssignedTo] = @Me");
    wiql.push_str(&format!(
        " AND [System.State] NOT IN ({})",
        quoted_list(&filter.excluded_states)
    ));
    wiql.push_str(&format!(
        " AND [System.WorkItemType] IN ({})",
        quoted_list(&filter.included_types)
    ));
    if let Some(path) = iteration_path {
        wiql.push_str(&format!(" AND [System.IterationPath] = {}", quoted(path)));
    }
    wiql.push_str(" ORDER BY [System.ChangedDate] DESC");
    wiql
}
