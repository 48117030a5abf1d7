// Handle extraction from raw spreadsheet cells.

/// Profile URL prefixes we know how to strip.
const PROFILE_URL_PREFIXES: [&str; 2] = ["https://twitter.com/", "http://twitter.com/"];

/// Old-style fragment routing marker, e.g. `twitter.com/#!/foobar`.
const LEGACY_FRAGMENT_MARKER: &str = "#!/";

/// Extracts zero or more normalized handles from one cell's text.
///
/// A cell either holds a bare handle, or one or more comma-separated profile
/// URLs. Rules:
/// - blank input yields nothing;
/// - text without `://` is one handle, trimmed as-is (commas and all);
/// - otherwise each comma-separated piece is either a bare handle, or a URL
///   whose recognized prefix (and legacy `#!/` marker) gets stripped;
/// - URLs with an unrecognized prefix are silently dropped.
///
/// No deduplication here; the registry insert is idempotent by unique key.
pub fn extract(cell_text: &str) -> Vec<String> {
    let trimmed = cell_text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if !trimmed.contains("://") {
        return vec![trimmed.to_string()];
    }

    let mut handles = Vec::new();
    for piece in trimmed.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }

        if !piece.contains("://") {
            handles.push(piece.to_string());
            continue;
        }

        for prefix in PROFILE_URL_PREFIXES {
            if let Some(rest) = piece.strip_prefix(prefix) {
                let handle = rest.strip_prefix(LEGACY_FRAGMENT_MARKER).unwrap_or(rest);
                if !handle.is_empty() {
                    handles.push(handle.to_string());
                }
                break;
            }
        }
    }

    handles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_cell_yields_nothing() {
        assert!(extract("").is_empty());
        assert!(extract("   ").is_empty());
    }

    #[test]
    fn bare_handle_is_trimmed_and_kept() {
        assert_eq!(extract("foo"), vec!["foo"]);
        assert_eq!(extract("  foo  "), vec!["foo"]);
    }

    #[test]
    fn text_without_scheme_is_one_handle_even_with_commas() {
        assert_eq!(extract("foo, bar"), vec!["foo, bar"]);
    }

    #[test]
    fn url_prefix_is_stripped() {
        assert_eq!(extract("https://twitter.com/foo"), vec!["foo"]);
        assert_eq!(extract("http://twitter.com/foo"), vec!["foo"]);
    }

    #[test]
    fn legacy_fragment_marker_is_stripped() {
        assert_eq!(extract("http://twitter.com/#!/baz"), vec!["baz"]);
    }

    #[test]
    fn comma_separated_urls_each_yield_a_handle() {
        assert_eq!(
            extract("https://twitter.com/a, http://twitter.com/b"),
            vec!["a", "b"]
        );
    }

    #[test]
    fn url_cell_keeps_bare_handle_pieces() {
        assert_eq!(extract("https://twitter.com/foo, bar"), vec!["foo", "bar"]);
    }

    #[test]
    fn unrecognized_urls_are_dropped() {
        assert!(extract("https://facebook.com/x").is_empty());
        assert_eq!(
            extract("https://facebook.com/x, https://twitter.com/y"),
            vec!["y"]
        );
    }

    #[test]
    fn bare_profile_root_yields_nothing() {
        assert!(extract("https://twitter.com/").is_empty());
    }
}
