//! Input validation: source URLs, PIN format and download filenames

use crate::error::{Error, Result};
use url::Url;

/// Hostnames a download URL may point at
pub const ALLOWED_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
    "www.youtu.be",
];

/// Filename stem used when a title sanitizes to nothing
pub const FALLBACK_TITLE: &str = "download";

const INVALID_URL_MESSAGE: &str =
    "Invalid YouTube URL. Only youtube.com and youtu.be links are accepted.";

/// Validate a user-supplied video URL against the acceptance policy
///
/// Accepts only `http`/`https` URLs on [`ALLOWED_HOSTS`]. Long-form
/// `youtube.com` links need a non-empty `v` query parameter or a
/// `/shorts/` or `/live/` path; `youtu.be` links need a non-root path.
///
/// Returns the parsed URL on success so callers hand the normalized form to
/// the extractor rather than the raw input.
pub fn validate_video_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("URL is required".to_string()));
    }

    let invalid = || Error::Validation(INVALID_URL_MESSAGE.to_string());

    let url = Url::parse(trimmed).map_err(|_| invalid())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }

    // Url lowercases hostnames during parsing
    let host = url.host_str().ok_or_else(invalid)?;
    if !ALLOWED_HOSTS.contains(&host) {
        return Err(invalid());
    }

    if host.ends_with("youtube.com") {
        let has_video_id = url
            .query_pairs()
            .any(|(key, value)| key == "v" && !value.is_empty());
        let path = url.path();
        if !has_video_id && !path.starts_with("/shorts/") && !path.starts_with("/live/") {
            return Err(invalid());
        }
    }

    if host.ends_with("youtu.be") && (url.path().is_empty() || url.path() == "/") {
        return Err(invalid());
    }

    Ok(url)
}

/// Whether `pin` is exactly four ASCII digits
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == 4 && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Reduce a video title to a safe filename stem
///
/// Keeps `[A-Za-z0-9 \-_().]`, collapses whitespace runs, trims, and falls
/// back to [`FALLBACK_TITLE`] when nothing is left. The result only ever
/// appears in a `Content-Disposition` header.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || "-_().".contains(*c))
        .collect();

    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        collapsed
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_supported_link_shapes() {
        for url in [
            "https://youtu.be/abc123",
            "https://youtube.com/shorts/abc123",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://m.youtube.com/watch?v=abc&t=42",
            "https://music.youtube.com/watch?v=abc",
            "https://www.youtube.com/live/abc123",
            "  https://youtu.be/abc123  ",
            "https://WWW.YouTube.com/watch?v=abc",
        ] {
            assert!(validate_video_url(url).is_ok(), "{url} should be accepted");
        }
    }

    #[test]
    fn rejects_everything_else() {
        for url in [
            "https://youtube.com/watch",
            "https://youtube.com/watch?v=",
            "ftp://youtube.com/watch?v=abc",
            "https://evil.com/youtube.com",
            "https://youtube.com.evil.com/watch?v=abc",
            "https://youtu.be/",
            "https://youtube.com/channel/xyz",
            "javascript:alert(1)",
            "not a url",
            "file:///etc/passwd",
        ] {
            assert!(validate_video_url(url).is_err(), "{url} should be rejected");
        }
    }

    #[test]
    fn empty_input_reports_missing_url() {
        match validate_video_url("   ") {
            Err(Error::Validation(message)) => assert_eq!(message, "URL is required"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn returns_normalized_url() {
        let url = validate_video_url("https://YOUTU.BE/abc123").unwrap();
        assert_eq!(url.as_str(), "https://youtu.be/abc123");
    }

    #[test]
    fn pin_format() {
        assert!(is_valid_pin("0000"));
        assert!(is_valid_pin("9876"));
        assert!(!is_valid_pin("123"));
        assert!(!is_valid_pin("12345"));
        assert!(!is_valid_pin("12a4"));
        assert!(!is_valid_pin("١٢٣٤"));
    }

    #[test]
    fn sanitize_strips_and_collapses() {
        assert_eq!(
            sanitize_title("  Artist — Song \"Live\" (2024)\t\n[HD]  "),
            "Artist Song Live (2024) HD"
        );
        assert_eq!(sanitize_title("a/b\\c:d"), "abcd");
        assert_eq!(sanitize_title("track_01-final.v2"), "track_01-final.v2");
    }

    #[test]
    fn sanitize_falls_back_when_empty() {
        assert_eq!(sanitize_title(""), FALLBACK_TITLE);
        assert_eq!(sanitize_title("日本語のタイトル"), FALLBACK_TITLE);
        assert_eq!(sanitize_title("   "), FALLBACK_TITLE);
    }
}
