//! Session isolation rules.
//!
//! Every task operation receives the caller's session ID. When isolation is
//! enabled, a task bound to a session is only visible to that same session;
//! on mismatch the store answers `NotFound`, never revealing that the task
//! exists for someone else. Tasks created without a session are visible to
//! every caller.

/// Returns `true` if a caller with `caller_session` may see a task created
/// under `record_session`.
///
/// # Examples
///
/// ```
/// use pmcp_tasks_fs::security::session_can_access;
///
/// // Isolation enabled
/// assert!(session_can_access(Some("a"), Some("a"), true));
/// assert!(!session_can_access(Some("a"), Some("b"), true));
/// assert!(!session_can_access(Some("a"), None, true));
/// assert!(session_can_access(None, Some("b"), true));
///
/// // Isolation disabled: everything is visible
/// assert!(session_can_access(Some("a"), Some("b"), false));
/// ```
pub fn session_can_access(
    record_session: Option<&str>,
    caller_session: Option<&str>,
    isolation_enabled: bool,
) -> bool {
    if !isolation_enabled {
        return true;
    }
    match record_session {
        None => true,
        Some(owner) => caller_session == Some(owner),
    }
}
