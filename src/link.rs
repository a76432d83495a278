//! Deep-link builder.
//!
//! Pure functions: a node id in, a canonical share URI out, and back
//! again. No storage or network access; the store's invariants do not
//! depend on this module, but the sharing workflow does.

use url::Url;
use uuid::Uuid;

use crate::error::StoreError;

/// Build the canonical deep link for a whisper.
///
/// The query carries the id and the detail-view marker; any query or
/// fragment already on the origin is dropped so the result is
/// deterministic for a given `(origin, id)` pair.
pub fn build_link(origin: &str, id: Uuid) -> Result<Url, StoreError> {
    let mut url = Url::parse(origin)
        .map_err(|e| StoreError::InvalidInput(format!("invalid origin {:?}: {}", origin, e)))?;
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair("id", &id.to_string())
        .append_pair("view", "detail");
    Ok(url)
}

/// Recover the node id from a deep link. Exact inverse of [`build_link`].
pub fn parse_link(url: &Url) -> Option<Uuid> {
    url.query_pairs()
        .find(|(key, _)| key == "id")
        .and_then(|(_, value)| Uuid::parse_str(&value).ok())
}

/// Copy-paste share snippet: the whisper text plus its remix link.
pub fn share_snippet(message: &str, link: &Url) -> String {
    format!("{}\nRemix here → {}", message, link)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_round_trips_the_id() {
        let id = Uuid::new_v4();
        let link = build_link("https://whispers.example.app", id).unwrap();
        assert_eq!(parse_link(&link), Some(id));
    }

    #[test]
    fn link_carries_detail_view_marker() {
        let id = Uuid::parse_str("7f2c1d4e-3b5a-4c6d-8e9f-0a1b2c3d4e5f").unwrap();
        let link = build_link("http://localhost:8501", id).unwrap();
        assert_eq!(
            link.as_str(),
            "http://localhost:8501/?id=7f2c1d4e-3b5a-4c6d-8e9f-0a1b2c3d4e5f&view=detail"
        );
    }

    #[test]
    fn origin_query_and_fragment_are_dropped() {
        let id = Uuid::new_v4();
        let link = build_link("https://example.app/hub?stale=1#frag", id).unwrap();
        assert_eq!(parse_link(&link), Some(id));
        assert!(link.as_str().starts_with("https://example.app/hub?id="));
        assert!(!link.as_str().contains("stale"));
    }

    #[test]
    fn bad_origin_is_invalid_input() {
        let err = build_link("not a url", Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn foreign_links_do_not_parse() {
        let url = Url::parse("https://example.app/?view=detail").unwrap();
        assert_eq!(parse_link(&url), None);
        let url = Url::parse("https://example.app/?id=not-a-uuid&view=detail").unwrap();
        assert_eq!(parse_link(&url), None);
    }

    #[test]
    fn snippet_includes_message_and_link() {
        let id = Uuid::new_v4();
        let link = build_link("https://example.app", id).unwrap();
        let snippet = share_snippet("🌱 Growth begins in silence.", &link);
        assert!(snippet.starts_with("🌱 Growth begins in silence.\nRemix here → https://"));
        assert!(snippet.contains(&id.to_string()));
    }
}
