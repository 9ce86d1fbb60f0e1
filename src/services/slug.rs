//! URL slug generation

use anyhow::Result;
use std::future::Future;

/// Turn free text into a lowercase, hyphen-separated slug.
///
/// Letters, digits and underscores survive (non-ASCII letters included);
/// whitespace and hyphen runs collapse to one hyphen; other punctuation
/// is dropped, so "Don't Panic" becomes `dont-panic`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.trim().chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        }
    }

    slug.trim_matches(|c| c == '_' || c == '-').to_string()
}

/// Slugify, falling back to `fallback` when nothing usable remains
pub fn slugify_or(text: &str, fallback: &str) -> String {
    let slug = slugify(text);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// First free candidate among `base`, `base-2`, `base-3`, ...
pub async fn unique_slug<F, Fut>(base: &str, mut taken: F) -> Result<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    if !taken(base.to_string()).await? {
        return Ok(base.to_string());
    }

    let mut n = 2u32;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(candidate.clone()).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Rust  --  Async  "), "rust-async");
        assert_eq!(slugify("Don't Panic!"), "dont-panic");
        assert_eq!(slugify("Version 1.0 released"), "version-10-released");
        assert_eq!(slugify("snake_case title"), "snake_case-title");
        assert_eq!(slugify("Café Crème"), "café-crème");
        assert_eq!(slugify("中文 标题"), "中文-标题");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_slugify_or_fallback() {
        assert_eq!(slugify_or("???", "post"), "post");
        assert_eq!(slugify_or("Travel", "post"), "travel");
    }

    #[tokio::test]
    async fn test_unique_slug_appends_counter() {
        let existing = ["my-post".to_string(), "my-post-2".to_string()];
        let slug = unique_slug("my-post", |candidate| {
            let hit = existing.contains(&candidate);
            async move { Ok(hit) }
        })
        .await
        .unwrap();
        assert_eq!(slug, "my-post-3");

        let free = unique_slug("fresh", |_| async { Ok(false) }).await.unwrap();
        assert_eq!(free, "fresh");
    }

    proptest! {
        #[test]
        fn slug_has_no_edge_or_double_hyphens(text in "[ a-zA-Z0-9_.,!'-]{0,40}") {
            let slug = slugify(&text);
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert_eq!(slug.to_lowercase(), slug.clone());
        }
    }
}
