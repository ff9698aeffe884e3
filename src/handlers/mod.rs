pub mod inline;
pub mod remember;
pub mod spoiler;

/// Trigger prefix for chat messages and the leading part of every caption.
pub const REMEMBER_PREFIX: &str = "#remember ";

pub fn remember_caption(query: &str) -> String {
    format!("{REMEMBER_PREFIX}{query}")
}
