/// Maximum length of an email address accepted by any endpoint.
pub const MAX_EMAIL_LEN: usize = 254;

/// Trims and lowercases an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic `local@domain.tld` shape check. Deliverability is the provider's problem.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return false;
    }
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

/// Truncates `value` to at most `max` characters after trimming.
pub fn clamp(value: &str, max: usize) -> String {
    value.trim().chars().take(max).collect()
}

/// Like [`clamp`], but maps blank input to `None`.
pub fn clamp_optional(value: Option<&str>, max: usize) -> Option<String> {
    value.map(|v| clamp(v, max)).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  New@ACME.com \n"), "new@acme.com");
    }

    #[test]
    fn test_valid_emails() {
        for email in ["new@acme.com", "a.b+tag@sub.example.co", "x@y.io"] {
            assert!(is_valid_email(email), "{email} should be valid");
        }
    }

    #[test]
    fn test_invalid_emails() {
        for email in [
            "",
            "plainaddress",
            "@acme.com",
            "user@",
            "user@acme",
            "user@acme.",
            "user@.com",
            "us er@acme.com",
            "a@b@c.com",
        ] {
            assert!(!is_valid_email(email), "{email} should be invalid");
        }

        let long = format!("{}@acme.com", "a".repeat(250));
        assert!(!is_valid_email(&long));
    }

    #[test]
    fn test_clamp_counts_chars_not_bytes() {
        assert_eq!(clamp("  héllo  ", 3), "hél");
        assert_eq!(clamp("short", 10), "short");
        assert_eq!(clamp_optional(Some("   "), 5), None);
        assert_eq!(clamp_optional(None, 5), None);
    }
}
