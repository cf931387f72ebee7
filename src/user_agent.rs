//! User-Agent string sent with every API and artifact request.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/napkin";

/// Default User-Agent for API traffic (identifies the tool and its version).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("napkin/{version} (visual-generation-client; +{PROJECT_UA_URL})")
}
