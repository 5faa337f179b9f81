//! Comments proxy: fetches video comments from Invidious-compatible
//! mirrors, trying each in order until one answers, with a short-lived
//! response cache so a room full of viewers doesn't hammer the mirrors.

use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ws::AppState;

const MIRRORS: &[&str] = &[
    "https://inv.nadeko.net",
    "https://invidious.nerdvpn.de",
    "https://yewtu.be",
];

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
pub struct CommentsCache {
    entries: DashMap<String, (Instant, Value)>,
}

impl CommentsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<Value> {
        let entry = self.entries.get(key)?;
        let (stored_at, body) = entry.value();
        if stored_at.elapsed() < CACHE_TTL {
            Some(body.clone())
        } else {
            drop(entry);
            self.entries.remove(key);
            None
        }
    }

    fn put(&self, key: String, body: Value) {
        self.entries.insert(key, (Instant::now(), body));
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentsQuery {
    sort_by: Option<String>,
    continuation: Option<String>,
}

pub async fn comments_endpoint(
    Path(video_id): Path<String>,
    Query(query): Query<CommentsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let sort_by = query.sort_by.as_deref().unwrap_or("top");
    let continuation = query.continuation.as_deref().unwrap_or("");
    let cache_key = format!("{video_id}|{sort_by}|{continuation}");

    if let Some(cached) = state.comments.get(&cache_key) {
        return (StatusCode::OK, Json(cached));
    }

    for mirror in MIRRORS {
        let mut url = format!("{mirror}/api/v1/comments/{video_id}?sort_by={sort_by}");
        if !continuation.is_empty() {
            url.push_str("&continuation=");
            url.push_str(continuation);
        }

        let response = state
            .http
            .get(&url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .and_then(|res| res.error_for_status());

        match response {
            Ok(res) => match res.json::<Value>().await {
                Ok(body) => {
                    state.comments.put(cache_key, body.clone());
                    return (StatusCode::OK, Json(body));
                }
                Err(err) => {
                    tracing::debug!("Mirror {} returned unreadable body: {}", mirror, err);
                }
            },
            Err(err) => {
                tracing::debug!("Mirror {} failed for {}: {}", mirror, video_id, err);
            }
        }
    }

    tracing::warn!("All comment mirrors failed for {}", video_id);
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": "Comments are unavailable right now" })),
    )
}
