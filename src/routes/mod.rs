/// Router Module Index
///
/// Routes are grouped by who may call them. All groups sit behind the same gate; the
/// grouping documents intent, and `policy` enforces it.

/// Reachable anonymously (allow-listed).
pub mod public;

/// Requires an authenticated USER or ADMIN.
pub mod authenticated;

/// Requires ADMIN.
pub mod admin;
