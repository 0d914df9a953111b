//! URI utilities
//!
//! RFC 3986 base+reference resolution and fragment classification. Pointer
//! fragments (`#/a/b`) address nodes by JSON Pointer; anchor fragments
//! (`#name`) address nodes registered with `$anchor`/`$dynamicAnchor`.

use url::Url;

use crate::error::{Result, SchemaError};

/// Synthetic base URI used when a schema document declares no `$id`.
pub const DEFAULT_ROOT: &str = "http://__default__/";

pub(crate) fn default_root() -> Url {
    Url::parse(DEFAULT_ROOT).unwrap()
}

/// Resolve `reference` against `base`.
///
/// `urn:` schemes treat a `#anchor` suffix as literal concatenation,
/// because RFC 3986 resolution is undefined for non-hierarchical URNs.
pub(crate) fn resolve(base: &Url, reference: &str) -> Result<Url> {
    if base.scheme() == "urn" && reference.starts_with('#') {
        let glued = format!("{}{}", base, reference);
        return Url::parse(&glued).map_err(|source| SchemaError::InvalidUri { uri: glued, source });
    }
    base.join(reference).map_err(|source| SchemaError::InvalidUri {
        uri: format!("{} against {}", reference, base),
        source,
    })
}

/// The URI with its fragment removed; this is what gets fetched.
pub(crate) fn strip_fragment(uri: &Url) -> Url {
    let mut stripped = uri.clone();
    stripped.set_fragment(None);
    stripped
}

/// The fragment, if it is a JSON Pointer (`/`-prefixed).
pub(crate) fn pointer_fragment(uri: &Url) -> Option<&str> {
    uri.fragment().filter(|f| f.starts_with('/'))
}

/// The fragment, if it is a plain anchor (anything not `/`-prefixed).
pub(crate) fn anchor_fragment(uri: &Url) -> Option<&str> {
    uri.fragment().filter(|f| !f.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_references() {
        let base = Url::parse("https://example.com/schemas/root.json").unwrap();
        assert_eq!(
            resolve(&base, "item.json").unwrap().as_str(),
            "https://example.com/schemas/item.json"
        );
        assert_eq!(
            resolve(&base, "/other/thing.json").unwrap().as_str(),
            "https://example.com/other/thing.json"
        );
        assert_eq!(
            resolve(&base, "#anchor").unwrap().as_str(),
            "https://example.com/schemas/root.json#anchor"
        );
    }

    #[test]
    fn urn_anchors_concatenate() {
        let base = Url::parse("urn:example:schema").unwrap();
        assert_eq!(
            resolve(&base, "#node").unwrap().as_str(),
            "urn:example:schema#node"
        );
    }

    #[test]
    fn classifies_fragments() {
        let pointer = Url::parse("https://example.com/s.json#/$defs/a").unwrap();
        assert_eq!(pointer_fragment(&pointer), Some("/$defs/a"));
        assert_eq!(anchor_fragment(&pointer), None);

        let anchor = Url::parse("https://example.com/s.json#node").unwrap();
        assert_eq!(pointer_fragment(&anchor), None);
        assert_eq!(anchor_fragment(&anchor), Some("node"));

        let bare = Url::parse("https://example.com/s.json").unwrap();
        assert_eq!(pointer_fragment(&bare), None);
        assert_eq!(anchor_fragment(&bare), None);
        assert_eq!(strip_fragment(&pointer).as_str(), "https://example.com/s.json");
    }
}
