use std::borrow::Cow;
use validator::{ValidationError, ValidationErrors};

pub mod auth;
pub mod suggestion;
pub mod task;
pub mod task_list;
pub mod time_entry;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_util;

/// Identifier of a user, as issued by the identity provider
pub type UserId = String;
/// Identifier of a task, assigned by the store when the task is created
pub type TaskId = uuid::Uuid;
/// Identifier of a time entry, assigned once when the entry is created
pub type TimeEntryId = uuid::Uuid;

/// Builds a [ValidationErrors] containing a single problem with the given field
pub(crate) fn field_error(
    field: &'static str,
    code: &'static str,
    message: &'static str,
) -> ValidationErrors {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));

    let mut errors = ValidationErrors::new();
    errors.add(field, error);
    errors
}
