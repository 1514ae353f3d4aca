//! Credential inspection and redaction for diagnostics output

use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Claims of interest in a store API key issued as a JWT
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyClaims {
    pub role: Option<String>,
    pub iss: Option<String>,
    pub exp: Option<i64>,
}

impl KeyClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at().map(|at| Utc::now() >= at).unwrap_or(false)
    }
}

/// Whether `key` has the shape of a JWT (`eyJ...` header, three segments)
pub fn looks_like_jwt(key: &str) -> bool {
    key.starts_with("eyJ") && key.split('.').count() == 3
}

/// Decode the payload segment of a JWT. The signature is not verified.
pub fn parse_key_claims(key: &str) -> Option<KeyClaims> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    let decoded = BASE64_URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// Render a secret as `first20...last10`, or fully masked when short
pub fn redact_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 30 {
        let head: String = chars[..20].iter().collect();
        let tail: String = chars[chars.len() - 10..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        format!("<{} chars hidden>", chars.len())
    }
}

/// Truncate long URLs for display
pub fn display_url(url: &str) -> String {
    if url.chars().count() > 50 {
        format!("{}...", url.chars().take(50).collect::<String>())
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_jwt(payload: &str) -> String {
        format!(
            "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.{}.c2lnbmF0dXJl",
            BASE64_URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_parse_claims() {
        let key = make_jwt(r#"{"iss":"supabase","role":"anon","exp":4102444800}"#);

        assert!(looks_like_jwt(&key));
        let claims = parse_key_claims(&key).unwrap();
        assert_eq!(claims.role.as_deref(), Some("anon"));
        assert!(!claims.is_expired());
        assert_eq!(claims.expires_at().unwrap().timestamp(), 4102444800);
    }

    #[test]
    fn test_expired_claims() {
        let key = make_jwt(r#"{"role":"service_role","exp":1}"#);
        assert!(parse_key_claims(&key).unwrap().is_expired());
    }

    #[test]
    fn test_not_a_jwt() {
        assert!(!looks_like_jwt("sb_secret_abcdef"));
        assert!(parse_key_claims("sb_secret_abcdef").is_none());
    }

    #[test]
    fn test_redact_key() {
        let key = "a".repeat(20) + "middle-part-hidden" + &"z".repeat(10);
        assert_eq!(redact_key(&key), format!("{}...{}", "a".repeat(20), "z".repeat(10)));
        assert_eq!(redact_key("short"), "<5 chars hidden>");
    }

    #[test]
    fn test_display_url() {
        let long = format!("https://{}.supabase.co", "x".repeat(60));
        assert!(display_url(&long).ends_with("..."));
        assert_eq!(display_url("https://a.supabase.co"), "https://a.supabase.co");
    }
}
