//! Field checks shared by the services

/// Absolute `http://` or `https://` URL with a host and no whitespace
pub fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            !rest.is_empty() && !rest.starts_with('/') && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Length in characters, not bytes
pub fn char_len(value: &str) -> usize {
    value.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("http://a.io"));
        assert!(is_http_url("https://cdn.example.com/img/cover.png"));
        assert!(!is_http_url("https://"));
        assert!(!is_http_url("https:///path"));
        assert!(!is_http_url("ftp://files.example.com"));
        assert!(!is_http_url("javascript:alert(1)"));
        assert!(!is_http_url("https://a.io/has space"));
    }

    #[test]
    fn test_char_len_counts_chars() {
        assert_eq!(char_len("héllo"), 5);
        assert_eq!(char_len("标题"), 2);
    }
}
