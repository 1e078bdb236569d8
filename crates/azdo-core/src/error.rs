use std::fmt;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AzdoError {
    #[error("Failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed with code {}\n{stderr}", display_code(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("{command} timed out after {timeout:?} and was terminated")]
    Timeout { command: String, timeout: Duration },
    #[error("Failed to parse az output as JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    NotAssignedToMe(Box<OwnershipMismatch>),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl AzdoError {
    /// Stable tag callers can match on without parsing the message.
    pub fn code(&self) -> &'static str {
        match self {
            AzdoError::Launch { .. } => "LAUNCH_FAILED",
            AzdoError::CommandFailed { .. } => "COMMAND_FAILED",
            AzdoError::Timeout { .. } => "TIMEOUT",
            AzdoError::Decode(_) => "DECODE_FAILED",
            AzdoError::NotAssignedToMe(_) => "NOT_ASSIGNED_TO_ME",
            AzdoError::InvalidArgument(_) => "INVALID_ARGUMENT",
        }
    }

    pub fn is_not_assigned_to_me(&self) -> bool {
        matches!(self, AzdoError::NotAssignedToMe(_))
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Details of a work item whose assignee does not match the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipMismatch {
    pub id: u32,
    pub assigned: String,
    pub caller: String,
    pub title: Option<String>,
    pub work_item_type: Option<String>,
    pub state: Option<String>,
}

impl fmt::Display for OwnershipMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Work item #{} is not assigned to @Me (no está asignado a @Me).",
            self.id
        )?;
        writeln!(f, "- AssignedTo: {}", self.assigned)?;
        write!(f, "- Me: {}", self.caller)?;
        if self.title.is_some() || self.work_item_type.is_some() || self.state.is_some() {
            write!(
                f,
                "\n- Work item: {} - {} ({})",
                self.work_item_type.as_deref().unwrap_or("?"),
                self.title.as_deref().unwrap_or("?"),
                self.state.as_deref().unwrap_or("?")
            )?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, AzdoError>;
