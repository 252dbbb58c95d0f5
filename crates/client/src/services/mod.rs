//! Typed wrappers over the backend's resource groups.
//!
//! Services hold no state of their own; they validate that required fields
//! are present and hand everything else to [`ApiClient`](crate::http::ApiClient).

mod branches;
mod checkins;
mod classes;
mod members;

pub use branches::BranchService;
pub use checkins::CheckInService;
pub use classes::{AttendanceMark, AvailableClassesQuery, ClassService};
pub use members::MemberService;

use crate::error::{AppError, AppResult};

pub(crate) fn require_id<'a>(id: &'a str, what: &str) -> AppResult<&'a str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::Validation(format!("{} is required", what)));
    }
    Ok(id)
}
