//! Secret masking for reasons that end up in logs or persisted records.

use std::sync::LazyLock;

use regex::Regex;

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\b(password|passwd|pwd|token|secret|api[_-]?key|access[_-]?key|cookie)(\s*[=:]\s*)("[^"]*"|'[^']*'|[^\s,;&]+)"#,
    )
    .expect("valid key/value redaction pattern")
});

static BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").expect("valid bearer redaction pattern")
});

static URL_USERINFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(https?|wss?)://[^/\s:@]+:[^/\s@]+@")
        .expect("valid userinfo redaction pattern")
});

pub const REDACTED: &str = "[REDACTED]";

/// Mask credential-looking fragments in free-form text.
pub fn redact_secrets(text: &str) -> String {
    let masked = URL_USERINFO.replace_all(text, format!("$1://{REDACTED}@").as_str());
    let masked = BEARER.replace_all(&masked, format!("Bearer {REDACTED}").as_str());
    KEY_VALUE
        .replace_all(&masked, format!("${{1}}${{2}}{REDACTED}").as_str())
        .into_owned()
}
