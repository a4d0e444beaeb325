//! Browser compatibility check, run once when a test starts.

use crate::core::violation::{ViolationCategory, ViolationEvent};
use crate::platform::BrowserInfo;
use chrono::{DateTime, Utc};
use serde_json::json;

/// Supported browser families and the substrings that identify them.
pub const SUPPORTED_BROWSERS: [(&str, &[&str]); 4] = [
    ("chrome", &["chrome", "chromium"]),
    ("firefox", &["firefox", "mozilla"]),
    ("edge", &["edge", "edg"]),
    ("safari", &["safari"]),
];

fn family_of(text: &str) -> Option<&'static str> {
    let text = text.to_lowercase();
    SUPPORTED_BROWSERS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| text.contains(p)))
        .map(|(family, _)| *family)
}

/// Supported family for `info`, matched on the name first, then the user agent.
pub fn supported_family(info: &BrowserInfo) -> Option<&'static str> {
    family_of(&info.browser_name).or_else(|| info.user_agent.as_deref().and_then(family_of))
}

pub fn is_supported(info: &BrowserInfo) -> bool {
    supported_family(info).is_some()
}

/// The violation to raise for an unsupported browser, if any.
pub fn compatibility_violation(info: &BrowserInfo, now: DateTime<Utc>) -> Option<ViolationEvent> {
    if is_supported(info) {
        return None;
    }
    Some(
        ViolationEvent::new(ViolationCategory::BrowserCompatibilityIssue, now)
            .with_detail("error_type", "unsupported_browser")
            .with_detail(
                "browser_info",
                json!({
                    "browser_name": info.browser_name,
                    "browser_version": info.browser_version,
                    "user_agent": info.user_agent,
                }),
            ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_by_name() {
        assert_eq!(supported_family(&BrowserInfo::new("Google Chrome")), Some("chrome"));
        assert_eq!(supported_family(&BrowserInfo::new("Microsoft Edge")), Some("edge"));
        assert_eq!(supported_family(&BrowserInfo::new("Safari")), Some("safari"));
        assert!(!is_supported(&BrowserInfo::new("Opera")));
    }

    #[test]
    fn test_user_agent_fallback() {
        let info = BrowserInfo::new("Unknown").with_user_agent("Mozilla/5.0 (X11) Firefox/121.0");
        assert_eq!(supported_family(&info), Some("firefox"));

        let info = BrowserInfo::new("Unknown").with_user_agent("Opera/9.80 (Windows NT 6.1) Presto");
        assert!(!is_supported(&info));
    }

    #[test]
    fn test_violation_details() {
        let info = BrowserInfo::new("Opera").with_version("12.1");
        let event = compatibility_violation(&info, Utc::now()).unwrap();
        assert_eq!(event.category(), ViolationCategory::BrowserCompatibilityIssue);
        assert_eq!(event.details()["error_type"], "unsupported_browser");
        assert_eq!(event.details()["browser_info"]["browser_name"], "Opera");
        assert_eq!(event.details()["browser_info"]["browser_version"], "12.1");

        assert!(compatibility_violation(&BrowserInfo::new("Firefox"), Utc::now()).is_none());
    }
}
