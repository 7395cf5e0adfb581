//! Environment variable names used by this crate for convenient
//! configuration of hooks from services.
//!
//! These are purely helpers; the hook itself remains decoupled from
//! environment access.

/// Google Cloud project id, e.g. `my-project-1234`. Set by App Engine
/// and Cloud Run, conventional elsewhere.
pub const GOOGLE_CLOUD_PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// Read the project id from the conventional environment variable.
pub fn project_id_from_env() -> Option<String> {
    std::env::var(GOOGLE_CLOUD_PROJECT_ENV)
        .ok()
        .filter(|value| !value.is_empty())
}
