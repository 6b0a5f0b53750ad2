//! Jikan (unofficial MyAnimeList) API provider
//!
//! A title is resolved with `GET {api_url}/anime?q={title}&limit=1` and the
//! first hit is taken as the match. Successful lookups are cached for a day.
//!
//! Jikan throttles clients to a few requests per second, so batch lookups
//! keep at most [`MAX_CONCURRENT_REQUESTS`] in flight and every request is
//! bounded by the configured timeout.
use std::time::Duration;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{AnimeDetails, JikanSearchResponse},
    services::metadata::MetadataProvider,
};
use reqwest::Client as HttpClient;

const DETAILS_CACHE_TTL: u64 = 86400; // 1 day

pub const MAX_CONCURRENT_REQUESTS: usize = 3;

#[derive(Clone)]
pub struct JikanProvider {
    http_client: HttpClient,
    api_url: String,
    cache: Option<Cache>,
}

impl JikanProvider {
    pub fn new(api_url: String, cache: Option<Cache>, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    fn search_url(&self) -> String {
        format!("{}/anime", self.api_url)
    }

    async fn search_first(&self, title: &str) -> AppResult<AnimeDetails> {
        let response = self
            .http_client
            .get(self.search_url())
            .query(&[("q", title), ("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Jikan API returned status {}: {}",
                status, body
            )));
        }

        let search: JikanSearchResponse = response.json().await?;
        first_match(search, title)
    }
}

fn first_match(search: JikanSearchResponse, title: &str) -> AppResult<AnimeDetails> {
    search
        .data
        .into_iter()
        .next()
        .map(AnimeDetails::from)
        .ok_or_else(|| AppError::NotFound(format!("No Jikan match for '{}'", title)))
}

#[async_trait::async_trait]
impl MetadataProvider for JikanProvider {
    async fn fetch_details(&self, title: &str) -> AppResult<AnimeDetails> {
        if title.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Anime title cannot be empty".to_string(),
            ));
        }

        cached!(
            self.cache.as_ref(),
            CacheKey::AnimeDetails(title.to_string()),
            DETAILS_CACHE_TTL,
            async move {
                let details = self.search_first(title).await?;
                tracing::debug!(title = %title, image = %details.image_url, "Fetched anime details from Jikan");
                Ok::<_, AppError>(details)
            }
        )
    }

    fn max_concurrent_requests(&self) -> usize {
        MAX_CONCURRENT_REQUESTS
    }

    fn name(&self) -> &'static str {
        "jikan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PLACEHOLDER_IMAGE_URL;

    fn provider(api_url: &str) -> JikanProvider {
        JikanProvider::new(api_url.to_string(), None, Duration::from_secs(5)).unwrap()
    }

    const SEARCH_BODY: &str = r#"{
        "pagination": {"last_visible_page": 1, "has_next_page": false},
        "data": [{
            "mal_id": 5114,
            "title": "Fullmetal Alchemist: Brotherhood",
            "images": {
                "jpg": {
                    "image_url": "https://cdn.myanimelist.net/images/anime/1223/96541.jpg",
                    "large_image_url": "https://cdn.myanimelist.net/images/anime/1223/96541l.jpg"
                }
            },
            "trailer": {"youtube_id": "--IcmZkvL0Q", "url": "https://www.youtube.com/watch?v=--IcmZkvL0Q"},
            "episodes": 64,
            "synopsis": "After a horrific alchemy experiment goes wrong...",
            "genres": [
                {"mal_id": 1, "name": "Action"},
                {"mal_id": 2, "name": "Adventure"}
            ]
        }]
    }"#;

    #[test]
    fn test_search_url_strips_trailing_slash() {
        let provider = provider("https://api.jikan.moe/v4/");
        assert_eq!(provider.search_url(), "https://api.jikan.moe/v4/anime");
    }

    #[test]
    fn test_first_match_maps_details() {
        let search: JikanSearchResponse = serde_json::from_str(SEARCH_BODY).unwrap();
        let details = first_match(search, "Fullmetal Alchemist: Brotherhood").unwrap();

        assert_eq!(
            details.image_url,
            "https://cdn.myanimelist.net/images/anime/1223/96541l.jpg"
        );
        assert_eq!(details.episodes, Some(64));
        assert_eq!(
            details.trailer_url.as_deref(),
            Some("https://www.youtube.com/watch?v=--IcmZkvL0Q")
        );
        assert_eq!(
            details.genres,
            Some(vec!["Action".to_string(), "Adventure".to_string()])
        );
    }

    #[test]
    fn test_first_match_missing_image_uses_placeholder() {
        let body = r#"{"data": [{"images": {"jpg": {"large_image_url": null}}, "trailer": {"url": null}}]}"#;
        let search: JikanSearchResponse = serde_json::from_str(body).unwrap();
        let details = first_match(search, "Obscure OVA").unwrap();

        assert_eq!(details.image_url, PLACEHOLDER_IMAGE_URL);
        assert_eq!(details.trailer_url, None);
        assert_eq!(details.synopsis, None);
    }

    #[test]
    fn test_first_match_no_results() {
        let search: JikanSearchResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        let result = first_match(search, "zzzz");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_empty_title_rejected() {
        let provider = provider("http://127.0.0.1:9");
        let result = provider.fetch_details("   ").await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_unreachable_api_falls_back_to_placeholder_image() {
        let provider = provider("http://127.0.0.1:9");
        assert_eq!(provider.fetch_image("Monster").await, PLACEHOLDER_IMAGE_URL);
    }

    #[tokio::test]
    async fn test_unresponsive_api_times_out() {
        // Accepts connections but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let provider = JikanProvider::new(
            format!("http://{}", addr),
            None,
            Duration::from_millis(200),
        )
        .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), provider.fetch_details("Monster"))
            .await
            .expect("request should time out on its own");
        assert!(matches!(result, Err(AppError::HttpClient(e)) if e.is_timeout()));
        drop(listener);
    }

    #[test]
    fn test_limits_concurrent_requests() {
        assert_eq!(provider("http://127.0.0.1:9").max_concurrent_requests(), 3);
    }

    #[tokio::test]
    #[ignore = "requires network access to api.jikan.moe"]
    async fn test_live_lookup() {
        let provider = provider("https://api.jikan.moe/v4");
        let details = provider.fetch_details("Cowboy Bebop").await.unwrap();
        assert!(details.image_url.starts_with("https://"));
    }
}
