//! README lookup and the presence heuristics derived from it.
//!
//! Only three facts about a README are kept: its size in bytes, whether it
//! mentions a raster image, and whether it mentions an SVG. Matching is a
//! case-insensitive substring test on file extensions.

use crate::transport::Transport;

const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];
const ICON_EXTENSIONS: [&str; 1] = [".svg"];

/// Metrics of a README that was successfully fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadmeMetrics {
    pub size: usize,
    pub has_images: bool,
    pub has_icons: bool,
}

impl ReadmeMetrics {
    pub fn from_body(body: &str) -> Self {
        let lowercase = body.to_lowercase();
        Self {
            size: body.len(),
            has_images: IMAGE_EXTENSIONS.iter().any(|ext| lowercase.contains(ext)),
            has_icons: ICON_EXTENSIONS.iter().any(|ext| lowercase.contains(ext)),
        }
    }
}

/// Raw-content URL of `README.md` on one branch.
pub fn readme_url(content_url: &str, owner: &str, repo: &str, branch: &str) -> String {
    format!(
        "{}/{}/{}/{}/README.md",
        content_url.trim_end_matches('/'),
        owner,
        repo,
        branch
    )
}

/// Try each branch in order and return the first README found.
///
/// Best effort: transport errors, non-2xx statuses and empty bodies all
/// count as "not on this branch".
pub async fn fetch_readme(
    transport: &dyn Transport,
    content_url: &str,
    owner: &str,
    repo: &str,
    branches: &[String],
) -> Option<String> {
    for branch in branches {
        let url = readme_url(content_url, owner, repo, branch);
        match transport.get(&url).await {
            Ok(response) if response.is_success() && !response.body.is_empty() => {
                return Some(response.body);
            }
            Ok(response) => {
                tracing::debug!(url = %url, status = response.status, "no README on branch");
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "README fetch failed");
            }
        }
    }
    None
}
