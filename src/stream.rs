use chrono::Utc;
use url::Url;

use crate::types::LotId;

const STREAM_PATH: &str = "api/video-stream";
const TOKEN_PARAM: &str = "t";

/// Produces cache-busting tokens from the wall clock.
///
/// Tokens are epoch milliseconds, bumped by one whenever the clock has not
/// advanced since the previous token so that two reloads in the same
/// millisecond still get distinct URLs.
#[derive(Debug, Default)]
pub struct CacheBuster {
    last: i64,
}

impl CacheBuster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        self.last
    }
}

/// `<base>/api/video-stream?lot=<id>&t=<token>`
pub fn build_stream_url(base: &Url, lot: &LotId, token: i64) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("/{}", STREAM_PATH));
    url.query_pairs_mut()
        .clear()
        .append_pair("lot", lot.as_str())
        .append_pair(TOKEN_PARAM, &token.to_string());
    url
}

/// Swap the cache-busting token of an existing stream URL, keeping every
/// other query parameter in place.
pub fn refresh_token(url: &Url, token: i64) -> Url {
    let token = token.to_string();
    let mut replaced = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, value)| {
            if key != TOKEN_PARAM {
                return Some((key.into_owned(), value.into_owned()));
            }
            // Only the first `t` survives
            if replaced {
                return None;
            }
            replaced = true;
            Some((key.into_owned(), token.clone()))
        })
        .collect();

    let mut refreshed = url.clone();
    {
        let mut query = refreshed.query_pairs_mut();
        query.clear();
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
        if !replaced {
            query.append_pair(TOKEN_PARAM, &token);
        }
    }
    refreshed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:5000/details.html?lot=1").unwrap()
    }

    #[test]
    fn test_build_stream_url() {
        let url = build_stream_url(&base(), &LotId::new("2"), 1700000000123);
        assert_eq!(url.as_str(), "http://localhost:5000/api/video-stream?lot=2&t=1700000000123");
    }

    #[test]
    fn test_lot_is_query_encoded() {
        let url = build_stream_url(&base(), &LotId::new("a&t=0"), 5);
        assert_eq!(url.as_str(), "http://localhost:5000/api/video-stream?lot=a%26t%3D0&t=5");
        let lot = url.query_pairs().find(|(k, _)| k == "lot").unwrap().1.into_owned();
        assert_eq!(lot, "a&t=0");
    }

    #[test]
    fn test_tokens_are_strictly_increasing() {
        let mut buster = CacheBuster::new();
        let tokens: Vec<i64> = (0..100).map(|_| buster.next_token()).collect();
        assert!(tokens.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_refresh_token_replaces_only_token() {
        let url = Url::parse("http://cam.local/api/video-stream?lot=1&t=100&quality=low").unwrap();
        let refreshed = refresh_token(&url, 200);
        assert_eq!(refreshed.as_str(), "http://cam.local/api/video-stream?lot=1&t=200&quality=low");
    }

    #[test]
    fn test_refresh_token_survives_marker_in_other_values() {
        // A naive split on "&t=" would cut this URL at the lot value
        let url = build_stream_url(&base(), &LotId::new("x&t=y"), 1);
        let refreshed = refresh_token(&url, 2);
        let pairs: Vec<(String, String)> = refreshed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![("lot".to_string(), "x&t=y".to_string()), ("t".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_refresh_token_appends_when_missing() {
        let url = Url::parse("http://cam.local/api/video-stream?lot=3").unwrap();
        assert_eq!(refresh_token(&url, 9).as_str(), "http://cam.local/api/video-stream?lot=3&t=9");
    }

    #[test]
    fn test_refresh_token_collapses_duplicate_tokens() {
        let url = Url::parse("http://cam.local/api/video-stream?t=1&lot=3&t=2").unwrap();
        assert_eq!(refresh_token(&url, 9).as_str(), "http://cam.local/api/video-stream?t=9&lot=3");
    }
}
