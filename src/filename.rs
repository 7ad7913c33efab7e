//! Filename resolution and sanitization
//!
//! Downloaded bytes are named from, in order of precedence:
//! 1. the caller's explicit name
//! 2. the `Content-Disposition` header
//! 3. the last non-empty URL path segment
//! 4. a generic name with an extension derived from the content type
//!
//! Whatever the source, the result passes through [`sanitize_filename`], so
//! it is always a bare base name that cannot traverse directories.

use crate::content_type::extension_for;
use url::Url;

/// Stem used when no usable name can be derived
pub const GENERIC_STEM: &str = "downloaded_file";

/// Maximum length of a sanitized filename in bytes
pub const MAX_FILENAME_BYTES: usize = 255;

/// Derive a safe filename for a download
///
/// # Examples
///
/// ```
/// use fetch_guard::filename::resolve_filename;
/// use url::Url;
///
/// let url = Url::parse("https://example.com/files/report.pdf").unwrap();
/// assert_eq!(resolve_filename(None, &url, "application/pdf", None), "report.pdf");
///
/// let name = resolve_filename(
///     None,
///     &url,
///     "application/pdf",
///     Some(r#"attachment; filename="Q3 summary.pdf""#),
/// );
/// assert_eq!(name, "Q3 summary.pdf");
/// ```
pub fn resolve_filename(
    explicit: Option<&str>,
    url: &Url,
    content_type: &str,
    content_disposition: Option<&str>,
) -> String {
    let candidate = explicit
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| content_disposition.and_then(content_disposition_filename))
        .or_else(|| url_filename(url));

    match candidate {
        Some(name) => sanitize_filename(&name, content_type),
        None => generic_filename(content_type),
    }
}

/// Extract the filename from a `Content-Disposition` header value
///
/// RFC 5987 `filename*=charset'lang'value` is preferred over a plain
/// `filename=` when both are present. Surrounding quotes and whitespace are
/// trimmed. The result is *not* sanitized.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;

    for part in split_params(header) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().trim_matches(|c: char| c == '"' || c == '\'');

        if key == "filename*" {
            // Format is: charset'lang'encoded-filename
            let encoded = part
                .split_once('=')
                .map(|(_, raw)| raw.trim().trim_matches('"'))
                .and_then(|raw| raw.rfind('\'').map(|idx| &raw[idx + 1..]))
                .unwrap_or(value);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let decoded = decoded.trim();
                if !decoded.is_empty() {
                    return Some(decoded.to_string());
                }
            }
        } else if key == "filename" && plain.is_none() {
            let name = value.trim();
            if !name.is_empty() {
                plain = Some(name.to_string());
            }
        }
    }

    plain
}

/// Split header parameters on `;`, ignoring separators inside quotes
fn split_params(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (idx, c) in header.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                parts.push(&header[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&header[start..]);
    parts
}

/// Last non-empty, percent-decoded path segment of a URL
fn url_filename(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .next_back()?;

    let decoded = urlencoding::decode(segment)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    if decoded.trim().is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// Generic name for a content type, e.g. `downloaded_file.pdf`
pub fn generic_filename(content_type: &str) -> String {
    format!("{GENERIC_STEM}{}", extension_for(content_type))
}

/// Reduce an arbitrary name to a safe base name
///
/// - directory components are dropped (`/` and `\` both count)
/// - `:` (drive markers), `*?"<>|` and control characters become `_`
/// - a missing extension is filled in from the content type (`.bin` if unknown)
/// - the result is capped at [`MAX_FILENAME_BYTES`], shortening the stem only
pub fn sanitize_filename(name: &str, content_type: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let replaced: String = base
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = replaced.trim().trim_end_matches(['.', ' ']);

    if cleaned.is_empty() {
        return generic_filename(content_type);
    }

    let (stem, extension) = match split_extension(cleaned) {
        (stem, Some(extension)) => (stem, extension),
        (stem, None) => (stem, extension_for(content_type)),
    };

    cap_length(stem, extension)
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control()
}

/// Split `name.ext` into (`name`, `Some(".ext")`); dotfiles have no extension
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx..])),
        _ => (name, None),
    }
}

fn cap_length(stem: &str, extension: &str) -> String {
    if stem.len() + extension.len() <= MAX_FILENAME_BYTES {
        return format!("{stem}{extension}");
    }

    // A pathological extension cannot be preserved; cut the whole name instead
    if extension.len() >= MAX_FILENAME_BYTES {
        let whole = format!("{stem}{extension}");
        return truncate_at_boundary(&whole, MAX_FILENAME_BYTES).to_string();
    }

    let budget = MAX_FILENAME_BYTES - extension.len();
    format!("{}{extension}", truncate_at_boundary(stem, budget))
}

fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn explicit_name_takes_priority() {
        let name = resolve_filename(
            Some("mine.csv"),
            &url("https://example.com/theirs.pdf"),
            "application/pdf",
            Some("attachment; filename=header.pdf"),
        );
        assert_eq!(name, "mine.csv");
    }

    #[test]
    fn blank_explicit_name_is_ignored() {
        let name = resolve_filename(
            Some("   "),
            &url("https://example.com/theirs.pdf"),
            "application/pdf",
            None,
        );
        assert_eq!(name, "theirs.pdf");
    }

    #[test]
    fn content_disposition_beats_url() {
        let name = resolve_filename(
            None,
            &url("https://example.com/api/v1/download/generic-id"),
            "application/pdf",
            Some(r#"attachment; filename="Real Name.pdf""#),
        );
        assert_eq!(name, "Real Name.pdf");
    }

    #[test]
    fn url_segment_used_without_header() {
        let name = resolve_filename(
            None,
            &url("https://example.com/report.pdf"),
            "application/pdf",
            None,
        );
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn trailing_slash_uses_last_non_empty_segment() {
        let name = resolve_filename(None, &url("https://example.com/docs/"), "text/html", None);
        assert_eq!(name, "docs.html");
    }

    #[test]
    fn root_url_gets_generic_name() {
        let name = resolve_filename(None, &url("https://example.com/"), "image/png", None);
        assert_eq!(name, "downloaded_file.png");

        let name = resolve_filename(None, &url("https://example.com"), "application/x-foo", None);
        assert_eq!(name, "downloaded_file.bin");
    }

    #[test]
    fn url_segment_is_percent_decoded() {
        let name = resolve_filename(
            None,
            &url("https://example.com/files/annual%20report.pdf"),
            "application/pdf",
            None,
        );
        assert_eq!(name, "annual report.pdf");
    }

    #[test]
    fn encoded_slash_in_url_segment_cannot_traverse() {
        let name = resolve_filename(
            None,
            &url("https://example.com/x/..%2F..%2Fetc%2Fpasswd"),
            "text/plain",
            None,
        );
        assert_eq!(name, "passwd.txt");
    }

    #[test]
    fn content_disposition_variants() {
        assert_eq!(
            content_disposition_filename(r#"attachment; filename="file.nzb""#).as_deref(),
            Some("file.nzb")
        );
        assert_eq!(
            content_disposition_filename("attachment; filename=report.pdf").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(
            content_disposition_filename("attachment; filename=' spaced.txt '").as_deref(),
            Some("spaced.txt")
        );
        assert_eq!(
            content_disposition_filename("attachment; FILENAME=upper.txt").as_deref(),
            Some("upper.txt")
        );
        assert_eq!(content_disposition_filename("inline"), None);
        assert_eq!(content_disposition_filename(r#"attachment; filename="""#), None);
    }

    #[test]
    fn rfc5987_filename_is_decoded_and_preferred() {
        assert_eq!(
            content_disposition_filename("attachment; filename*=UTF-8''file%20name.nzb")
                .as_deref(),
            Some("file name.nzb")
        );
        assert_eq!(
            content_disposition_filename(
                r#"attachment; filename="fallback.txt"; filename*=UTF-8''r%C3%A9sum%C3%A9.txt"#
            )
            .as_deref(),
            Some("résumé.txt")
        );
    }

    #[test]
    fn semicolon_inside_quotes_stays_in_the_name() {
        assert_eq!(
            content_disposition_filename(r#"attachment; filename="a;b.pdf""#).as_deref(),
            Some("a;b.pdf")
        );
        assert_eq!(
            content_disposition_filename(
                r#"attachment; filename="q3; final.csv"; filename*=UTF-8''q3.csv"#
            )
            .as_deref(),
            Some("q3.csv")
        );
        assert_eq!(
            content_disposition_filename(r#"attachment; filename="x;y.txt"; size=10"#).as_deref(),
            Some("x;y.txt")
        );
    }

    #[test]
    fn traversal_inputs_never_survive() {
        let hostile = [
            "../../etc/passwd",
            "..\\..\\windows\\system32\\config",
            "/absolute/path/file.txt",
            "C:\\Users\\victim\\evil.exe",
            "C:evil.exe",
            "D:/drive/forward.txt",
            "..",
            "../",
            "..\\",
            "./.",
            "a/b\\c/../d",
            "\\\\server\\share\\file.doc",
            "name\0with\nnull.txt",
        ];

        for input in hostile {
            let out = sanitize_filename(input, "text/plain");
            assert!(!out.contains('/'), "{input:?} -> {out:?} contains '/'");
            assert!(!out.contains('\\'), "{input:?} -> {out:?} contains '\\'");
            assert!(!out.contains("../"), "{input:?} -> {out:?} contains '../'");
            assert!(!out.contains(':'), "{input:?} -> {out:?} contains drive marker");
            assert!(out != "." && out != "..", "{input:?} -> {out:?} is a dot entry");
            assert!(!out.chars().any(char::is_control), "{input:?} -> {out:?}");
            assert!(!out.is_empty());
        }
    }

    #[test]
    fn directory_components_are_stripped() {
        assert_eq!(sanitize_filename("../../etc/passwd", "text/plain"), "passwd.txt");
        assert_eq!(
            sanitize_filename("C:\\Users\\victim\\evil.exe", "text/plain"),
            "evil.exe"
        );
        assert_eq!(sanitize_filename("C:evil.exe", "text/plain"), "C_evil.exe");
        assert_eq!(sanitize_filename("..", "image/png"), "downloaded_file.png");
    }

    #[test]
    fn reserved_characters_become_underscores() {
        assert_eq!(
            sanitize_filename(r#"what*is?this"<>|.txt"#, "text/plain"),
            "what_is_this____.txt"
        );
    }

    #[test]
    fn missing_extension_is_appended() {
        assert_eq!(sanitize_filename("README", "text/plain"), "README.txt");
        assert_eq!(sanitize_filename("blob", "application/x-unknown"), "blob.bin");
        assert_eq!(sanitize_filename(".env", "text/plain"), ".env.txt");
        assert_eq!(sanitize_filename("trailing.", "application/pdf"), "trailing.pdf");
    }

    #[test]
    fn existing_extension_is_kept() {
        assert_eq!(sanitize_filename("archive.tar.gz", "text/plain"), "archive.tar.gz");
    }

    #[test]
    fn long_names_truncate_stem_not_extension() {
        let long = format!("{}.pdf", "a".repeat(400));
        let out = sanitize_filename(&long, "application/pdf");

        assert_eq!(out.len(), MAX_FILENAME_BYTES);
        assert!(out.ends_with(".pdf"));
        assert!(out.starts_with("aaaa"));
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let long = format!("{}.txt", "é".repeat(200));
        let out = sanitize_filename(&long, "text/plain");

        assert!(out.len() <= MAX_FILENAME_BYTES);
        assert!(out.ends_with(".txt"));
    }

    #[test]
    fn appended_extension_counts_toward_cap() {
        let long = "b".repeat(300);
        let out = sanitize_filename(&long, "application/pdf");

        assert_eq!(out.len(), MAX_FILENAME_BYTES);
        assert!(out.ends_with(".pdf"));
    }

    #[test]
    fn absurd_extension_truncates_whole_name() {
        let name = format!("x.{}", "y".repeat(300));
        let out = sanitize_filename(&name, "text/plain");

        assert_eq!(out.len(), MAX_FILENAME_BYTES);
        assert!(out.starts_with("x."));
    }
}
