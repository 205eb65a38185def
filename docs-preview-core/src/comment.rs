//! Preview-link comment template.

/// Substring that identifies a preview comment posted by an earlier run.
pub const PREVIEW_MARKER: &str = "Documentation preview";

/// Public URL of a preview: the Pages base URL followed by the preview key.
pub fn preview_url(base_url: &str, preview_path: &str) -> String {
    format!(
        "{}/{}/",
        base_url.trim_end_matches('/'),
        preview_path.trim_matches('/')
    )
}

pub fn comment_body(url: &str) -> String {
    format!("{PREVIEW_MARKER}\n\n{url}")
}

/// True if any existing comment already carries the marker.
pub fn already_posted<S: AsRef<str>>(comments: &[S]) -> bool {
    comments.iter().any(|c| c.as_ref().contains(PREVIEW_MARKER))
}
