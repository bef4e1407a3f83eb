//! Interactive-prompt suppression marker.
//!
//! Any execution driven by the adapter (in-process or in a child) runs with
//! [`NO_INTERACTIVE_ENV`] set to `1`. Wrapped handlers consult
//! [`interactive_allowed`] before asking the user anything on a terminal.

/// Environment marker that disables interactive prompting for wrapped commands.
pub const NO_INTERACTIVE_ENV: &str = "CMDTREE_NO_INTERACTIVE";

/// False while an adapter-driven execution is in progress.
pub fn interactive_allowed() -> bool {
    !matches!(
        std::env::var(NO_INTERACTIVE_ENV).ok().as_deref(),
        Some("1") | Some("true")
    )
}
