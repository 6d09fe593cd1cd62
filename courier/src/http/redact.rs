//! Secret redaction for URLs placed in error and log output.

use url::{Position, Url};

/// Marker substituted for secret path segments.
const REDACTED: &str = "<redacted>";

/// Returns a form of `url` safe to include in errors and logs.
///
/// Incoming webhook URLs embed a bearer-equivalent token as the second path
/// segment after `webhooks`:
///
/// - `https://discord.com/api/webhooks/<id>/<token>`
/// - `https://discord.com/api/v10/webhooks/<id>/<token>`
///
/// That token segment is replaced with `<redacted>`. URLs without such a
/// path pass through unchanged.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let Some(segments) = url.path_segments() else {
        return url.to_string();
    };

    let mut segments: Vec<&str> = segments.collect();
    let Some(index) = segments.iter().position(|segment| *segment == "webhooks") else {
        return url.to_string();
    };

    match segments.get_mut(index + 2) {
        Some(token) => *token = REDACTED,
        None => return url.to_string(),
    }

    // Rebuilt by hand: Url::set_path would percent-encode the marker.
    format!(
        "{}/{}{}",
        &url[..Position::BeforePath],
        segments.join("/"),
        &url[Position::AfterPath..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn redacts_webhook_token() {
        let url = parse("https://discord.com/api/webhooks/123/SECRETTOKEN");
        assert_eq!(
            redact_url(&url),
            "https://discord.com/api/webhooks/123/<redacted>"
        );
    }

    #[test]
    fn redacts_versioned_webhook_path() {
        let url = parse("https://discord.com/api/v10/webhooks/123/SECRETTOKEN");
        assert_eq!(
            redact_url(&url),
            "https://discord.com/api/v10/webhooks/123/<redacted>"
        );
    }

    #[test]
    fn preserves_query_parameters() {
        let url = parse("https://discord.com/api/webhooks/123/SECRETTOKEN?wait=true");
        assert_eq!(
            redact_url(&url),
            "https://discord.com/api/webhooks/123/<redacted>?wait=true"
        );
    }

    #[test]
    fn leaves_other_urls_untouched() {
        let url = parse("https://app.all-hands.dev/api/conversations?limit=5");
        assert_eq!(
            redact_url(&url),
            "https://app.all-hands.dev/api/conversations?limit=5"
        );
    }

    #[test]
    fn leaves_webhook_path_without_token_untouched() {
        let url = parse("https://discord.com/api/webhooks/123");
        assert_eq!(redact_url(&url), "https://discord.com/api/webhooks/123");
    }
}
