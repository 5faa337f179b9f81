//! YouTube URL handling: video-id extraction and oEmbed title lookup.

use std::time::Duration;

const TITLE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Canonical video ids are exactly 11 characters of [A-Za-z0-9_-]
fn is_valid_video_id(candidate: &str) -> bool {
    candidate.len() == 11
        && candidate
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
}

/// Extract a video id from a watch URL, a youtu.be short URL, an embed
/// URL, or a bare 11-character id. Returns None for anything else.
pub fn extract_video_id(url: &str) -> Option<String> {
    let trimmed = url.trim();

    // youtu.be/VIDEO_ID
    if let Some(rest) = trimmed.split("youtu.be/").nth(1) {
        let candidate = rest.split(&['?', '&', '/'][..]).next().unwrap_or(rest);
        return is_valid_video_id(candidate).then(|| candidate.to_string());
    }

    // youtube.com/watch?v=VIDEO_ID
    if trimmed.contains("youtube.com/watch") {
        let query = trimmed.split('?').nth(1)?;
        for param in query.split('&') {
            if let Some(candidate) = param.strip_prefix("v=") {
                return is_valid_video_id(candidate).then(|| candidate.to_string());
            }
        }
        return None;
    }

    // youtube.com/embed/VIDEO_ID
    if let Some(rest) = trimmed.split("/embed/").nth(1) {
        let candidate = rest.split(&['?', '&', '/'][..]).next().unwrap_or(rest);
        return is_valid_video_id(candidate).then(|| candidate.to_string());
    }

    // Bare id
    is_valid_video_id(trimmed).then(|| trimmed.to_string())
}

#[derive(serde::Deserialize)]
struct OembedResponse {
    title: String,
}

/// Resolve a human-readable title for a video id via the oEmbed endpoint.
/// Degrades to the raw id on any failure; never an error.
pub async fn lookup_title(http: &reqwest::Client, video_id: &str) -> String {
    let url = format!(
        "https://www.youtube.com/oembed?url=https://www.youtube.com/watch?v={video_id}&format=json"
    );

    let response = http
        .get(&url)
        .timeout(TITLE_LOOKUP_TIMEOUT)
        .send()
        .await
        .and_then(|res| res.error_for_status());

    match response {
        Ok(res) => match res.json::<OembedResponse>().await {
            Ok(body) => body.title,
            Err(err) => {
                tracing::debug!("oEmbed body for {} unreadable: {}", video_id, err);
                video_id.to_string()
            }
        },
        Err(err) => {
            tracing::debug!("Title lookup for {} failed: {}", video_id, err);
            video_id.to_string()
        }
    }
}
