//! Destination filename derivation from URLs.

use std::collections::HashSet;

use url::Url;

/// Fallback when a URL has no usable last path segment.
const FALLBACK_FILENAME: &str = "download";

/// Derives a safe filename from the last path segment of a URL.
///
/// The query string and fragment are ignored; percent-encoding is left as-is.
/// Returns `"download"` when there is nothing usable.
#[must_use]
pub fn filename_from_url(url: &str) -> String {
    let segment = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => {
            let without_query = url.split(['?', '#']).next().unwrap_or_default();
            without_query.rsplit('/').next().map(str::to_string)
        }
    };

    match segment {
        Some(name) if !name.is_empty() => sanitize_filename(&name),
        _ => FALLBACK_FILENAME.to_string(),
    }
}

/// Returns `name`, or `stem-N.ext` with the smallest free `N`, and records
/// the result in `taken`.
///
/// Keeps two downloads in one directory from writing the same file.
pub fn unique_filename(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut n = 1_u32;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Replaces path separators, reserved characters, and control characters.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.chars().all(|c| c == '.') {
        return FALLBACK_FILENAME.to_string();
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url_last_segment() {
        assert_eq!(
            filename_from_url("https://example.com/releases/PrismLauncher-8.4.zip"),
            "PrismLauncher-8.4.zip"
        );
    }

    #[test]
    fn test_filename_from_url_ignores_query() {
        assert_eq!(
            filename_from_url("https://example.com/jre.tar.gz?token=abc&x=1"),
            "jre.tar.gz"
        );
        assert_eq!(filename_from_url("not a url/file.bin?x=1"), "file.bin");
    }

    #[test]
    fn test_filename_from_url_fallback() {
        assert_eq!(filename_from_url("https://example.com/"), "download");
        assert_eq!(filename_from_url("https://example.com"), "download");
        assert_eq!(filename_from_url(""), "download");
    }

    #[test]
    fn test_unique_filename_numbers_repeats() {
        let mut taken = HashSet::new();
        assert_eq!(unique_filename("client.jar", &mut taken), "client.jar");
        assert_eq!(unique_filename("client.jar", &mut taken), "client-1.jar");
        assert_eq!(unique_filename("client.jar", &mut taken), "client-2.jar");
        assert_eq!(unique_filename("download", &mut taken), "download");
        assert_eq!(unique_filename("download", &mut taken), "download-1");
        assert_eq!(unique_filename(".hidden", &mut taken), ".hidden");
        assert_eq!(unique_filename(".hidden", &mut taken), ".hidden-1");
    }

    #[test]
    fn test_sanitize_filename_removes_invalid_chars() {
        assert_eq!(sanitize_filename("file:name.zip"), "file_name.zip");
        assert_eq!(sanitize_filename("a<b>|c"), "a_b__c");
        assert_eq!(sanitize_filename(".."), "download");
    }
}
