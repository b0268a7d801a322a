//! Append-time validation.
//!
//! Replay never validates; anything malformed has to be stopped here,
//! before it reaches the log.

use super::Event;
use crate::model::id;
use crate::model::issue::PRIORITY_LOWEST;

/// Why an event was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub reason: String,
}

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Pluggable schema check run by the stores before anything is written.
pub trait EventValidator: Send + Sync {
    /// # Errors
    ///
    /// A [`ValidationError`] describing the first rule the event breaks.
    fn validate(&self, event: &Event) -> Result<(), ValidationError>;
}

/// Rules every store enforces regardless of the configured validator.
///
/// # Errors
///
/// Rejects self-links.
pub fn check_append_boundary(event: &Event) -> Result<(), ValidationError> {
    if let Event::LinkAdded { link } = event {
        if link.is_self_link() {
            return Err(ValidationError::new(format!(
                "self-link {} -> {} ({}) is not allowed",
                link.from, link.to, link.link_type
            )));
        }
    }
    Ok(())
}

/// The built-in validator for the on-disk schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    fn check_id(field: &str, value: &str) -> Result<(), ValidationError> {
        id::validate(value).map_err(|e| ValidationError::new(format!("{field}: {e}")))
    }

    fn check_priority(priority: u8) -> Result<(), ValidationError> {
        if priority > PRIORITY_LOWEST {
            return Err(ValidationError::new(format!(
                "priority {priority} is out of range 0-{PRIORITY_LOWEST}"
            )));
        }
        Ok(())
    }
}

impl EventValidator for SchemaValidator {
    fn validate(&self, event: &Event) -> Result<(), ValidationError> {
        check_append_boundary(event)?;
        match event {
            Event::IssueCreated { issue } => {
                Self::check_id("id", &issue.id)?;
                if issue.title.trim().is_empty() {
                    return Err(ValidationError::new("title must not be empty"));
                }
                Self::check_priority(issue.priority)?;
                if issue.updated_at < issue.created_at {
                    return Err(ValidationError::new("updatedAt precedes createdAt"));
                }
            }
            Event::IssuePatched { id, patch, .. } => {
                Self::check_id("id", id)?;
                if patch.is_empty() {
                    return Err(ValidationError::new("patch has no fields"));
                }
                if let Some(title) = &patch.title {
                    if title.trim().is_empty() {
                        return Err(ValidationError::new("title must not be empty"));
                    }
                }
                if let Some(priority) = patch.priority {
                    Self::check_priority(priority)?;
                }
            }
            Event::IssueStatusSet { id, .. } => Self::check_id("id", id)?,
            Event::LinkAdded { link } => {
                Self::check_id("from", &link.from)?;
                Self::check_id("to", &link.to)?;
            }
            Event::LinkRemoved { from, to, .. } => {
                Self::check_id("from", from)?;
                Self::check_id("to", to)?;
            }
        }
        Ok(())
    }
}
