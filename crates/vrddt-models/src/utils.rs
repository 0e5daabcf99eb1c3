//! URL helpers shared by the worker, the coordinator and the API.

use url::Url;

/// Marker prefix on the last path segment of a Reddit DASH stream.
pub const DASH_MARKER: &str = "DASH_";

/// Segment name of the audio rendition that accompanies a DASH video.
pub const DASH_AUDIO: &str = "DASH_audio";

/// Format a final (post-redirect) URL into its canonical form:
/// `scheme://host[:port]/path`, dropping query string and fragment.
///
/// Formatting an already canonical URL returns it unchanged.
pub fn format_canonical_url(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let path = url.path().trim_start_matches('/');
    match url.port() {
        Some(port) => format!("{}://{}:{}/{}", url.scheme(), host, port, path),
        None => format!("{}://{}/{}", url.scheme(), host, path),
    }
}

/// URL of the JSON metadata document for a canonical post URL.
pub fn metadata_url(canonical: &str) -> String {
    format!("{}.json", canonical.trim_end_matches('/'))
}

/// Derive the audio stream URL from a DASH video URL by substituting the
/// `DASH_<quality>` segment with `DASH_audio`, keeping any file extension.
///
/// Returns `None` when the URL carries no marker, meaning the post has no
/// separate audio track.
pub fn derive_audio_url(video_url: &str) -> Option<String> {
    let mut url = Url::parse(video_url).ok()?;

    let last = url.path_segments()?.next_back()?.to_string();
    if !last.starts_with(DASH_MARKER) {
        return None;
    }

    let replacement = match last.rfind('.') {
        Some(dot) => format!("{}{}", DASH_AUDIO, &last[dot..]),
        None => DASH_AUDIO.to_string(),
    };

    url.path_segments_mut().ok()?.pop().push(&replacement);
    url.set_query(None);
    url.set_fragment(None);
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(s: &str) -> String {
        format_canonical_url(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_canonical_drops_query_and_fragment() {
        assert_eq!(
            canonical("https://www.reddit.com/r/videos/comments/abc/title/?utm_source=share#top"),
            "https://www.reddit.com/r/videos/comments/abc/title/"
        );
        assert_eq!(canonical("http://localhost:8080/r/a?x=1"), "http://localhost:8080/r/a");
        assert_eq!(canonical("https://reddit.com"), "https://reddit.com/");
    }

    #[test]
    fn test_canonical_is_idempotent() {
        for raw in [
            "https://www.reddit.com/r/videos/comments/abc/title/?utm_source=share",
            "https://reddit.com",
            "http://127.0.0.1:9000/r/x/comments/y",
            "https://v.redd.it/abc123",
        ] {
            let once = canonical(raw);
            assert_eq!(canonical(&once), once, "not idempotent for {}", raw);
        }
    }

    #[test]
    fn test_metadata_url() {
        assert_eq!(
            metadata_url("https://www.reddit.com/r/videos/comments/abc/title/"),
            "https://www.reddit.com/r/videos/comments/abc/title.json"
        );
        assert_eq!(metadata_url("https://reddit.com/r/a"), "https://reddit.com/r/a.json");
    }

    #[test]
    fn test_derive_audio_url() {
        assert_eq!(
            derive_audio_url("https://v.redd.it/abc123/DASH_720.mp4?source=fallback").as_deref(),
            Some("https://v.redd.it/abc123/DASH_audio.mp4")
        );
        assert_eq!(
            derive_audio_url("https://v.redd.it/abc123/DASH_1080").as_deref(),
            Some("https://v.redd.it/abc123/DASH_audio")
        );
    }

    #[test]
    fn test_derive_audio_url_without_marker() {
        assert_eq!(derive_audio_url("https://v.redd.it/abc123/HLSPlaylist.m3u8"), None);
        assert_eq!(derive_audio_url("https://i.imgur.com/x.gifv"), None);
        assert_eq!(derive_audio_url("not a url"), None);
    }
}
