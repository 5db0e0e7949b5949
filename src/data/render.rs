//! Status string rendering.
//!
//! Pure functions that turn the aggregate state into the one-line summary
//! shown as the bot's status, e.g. `"Garden: 1 | Forest: 3"`.

use super::AggregateState;

/// Separator between rendered sessions
pub const SEPARATOR: &str = " | ";

/// Strip the cosmetic tag from a display name and trim the result.
///
/// Every occurrence of `tag` is removed. An empty tag only trims.
pub fn clean_name(name: &str, tag: &str) -> String {
    if tag.is_empty() {
        return name.trim().to_string();
    }
    name.replace(tag, "").trim().to_string()
}

/// Render the active sessions of every host as a single status line.
///
/// Sessions without users are left out. The rest are ordered by ascending
/// user count; equal counts keep host order, then the order the host sent
/// them in.
pub fn render_status(state: &AggregateState, tag: &str) -> String {
    let mut active: Vec<_> = state.sessions().filter(|s| s.is_active()).collect();

    // sort_by_key is stable
    active.sort_by_key(|s| s.active_users);

    active
        .iter()
        .map(|s| format!("{}: {}", clean_name(&s.name, tag), s.active_users))
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}
