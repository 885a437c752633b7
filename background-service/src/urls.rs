//! Canonical post links: the URL embedded in every announcement and the
//! patterns used to find a post id again in chat message content.

use likewatch_core::CoreError;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct UrlFormat {
    host: String,
    canonical: Regex,
    trailing: Regex,
}

impl UrlFormat {
    pub fn new(host: &str) -> Result<Self, CoreError> {
        let host = host.trim().trim_end_matches('/').to_string();
        let canonical = Regex::new(&format!(
            r"https://{}/[^/\s]+/status/(\d+)",
            regex::escape(&host)
        ))
        .map_err(|e| CoreError::Internal {
            message: format!("invalid canonical url pattern: {e}"),
        })?;
        let trailing = Regex::new(r"/status/(\d+)$").map_err(|e| CoreError::Internal {
            message: format!("invalid status pattern: {e}"),
        })?;

        Ok(Self {
            host,
            canonical,
            trailing,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// `https://<host>/<handle>/status/<post_id>`
    pub fn canonical_url(&self, handle: &str, post_id: &str) -> String {
        format!("https://{}/{}/status/{}", self.host, handle, post_id)
    }

    /// Post id of the first canonical link in `content`.
    pub fn extract_post_id(&self, content: &str) -> Option<String> {
        self.canonical
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Post id of any status link the (trimmed) content ends with, whatever its host.
    pub fn trailing_status_id(&self, content: &str) -> Option<String> {
        self.trailing
            .captures(content.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}
