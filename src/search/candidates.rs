use serde_json::Value;
use url::Url;

const IMAGE_EXTENSIONS: [&str; 2] = [".jpg", ".jpeg"];

fn is_jpeg_url(content_url: &str) -> bool {
    match Url::parse(content_url) {
        Ok(parsed) => IMAGE_EXTENSIONS
            .iter()
            .any(|extension| parsed.path().ends_with(extension)),
        Err(_) => false,
    }
}

/// Pulls the `contentUrl` of every result that points at a JPEG, keeping the
/// order of the search results. Duplicates are kept.
pub fn extract_candidates(results: &[Value]) -> Vec<String> {
    results
        .iter()
        .filter_map(|result| result.get("contentUrl").and_then(Value::as_str))
        .filter(|content_url| is_jpeg_url(content_url))
        .map(str::to_string)
        .collect()
}
