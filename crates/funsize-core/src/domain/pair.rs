//! Build pairs (from → to) and the chunks they are grouped into.

use serde::Serialize;

use super::event::Locale;

/// One delta artifact to produce: update `from_artifact_url` to `to_artifact_url`.
///
/// `history_index` is the 1-based recency rank of the historical release the
/// pair starts from (1 = most recent prior release).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPair {
    locale: Locale,
    from_artifact_url: String,
    to_artifact_url: String,
    history_index: u32,
}

impl BuildPair {
    /// Returns `None` for a self-pair (from == to), which has no delta to build.
    pub fn new(
        locale: Locale,
        from_artifact_url: impl Into<String>,
        to_artifact_url: impl Into<String>,
        history_index: u32,
    ) -> Option<Self> {
        let from_artifact_url = from_artifact_url.into();
        let to_artifact_url = to_artifact_url.into();
        if from_artifact_url == to_artifact_url {
            return None;
        }
        Some(Self {
            locale,
            from_artifact_url,
            to_artifact_url,
            history_index,
        })
    }

    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    pub fn from_artifact_url(&self) -> &str {
        &self.from_artifact_url
    }

    pub fn to_artifact_url(&self) -> &str {
        &self.to_artifact_url
    }

    pub fn history_index(&self) -> u32 {
        self.history_index
    }
}

/// Ordered, non-empty group of pairs sharing one `history_index`.
///
/// `subchunk_index` is only set when the history index was split into more
/// than one chunk; `None` means "the only chunk".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    history_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    subchunk_index: Option<u32>,
    pairs: Vec<BuildPair>,
}

impl Chunk {
    pub(crate) fn new(history_index: u32, subchunk_index: Option<u32>, pairs: Vec<BuildPair>) -> Self {
        Self {
            history_index,
            subchunk_index,
            pairs,
        }
    }

    pub fn history_index(&self) -> u32 {
        self.history_index
    }

    pub fn subchunk_index(&self) -> Option<u32> {
        self.subchunk_index
    }

    pub fn pairs(&self) -> &[BuildPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn locales(&self) -> impl Iterator<Item = &Locale> {
        self.pairs.iter().map(BuildPair::locale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_pair_is_rejected() {
        let pair = BuildPair::new("de".into(), "https://x/a.mar", "https://x/a.mar", 1);
        assert!(pair.is_none());
    }

    #[test]
    fn distinct_urls_form_a_pair() {
        let pair = BuildPair::new("de".into(), "https://x/a.mar", "https://x/b.mar", 2).unwrap();
        assert_eq!(pair.history_index(), 2);
        assert_eq!(pair.locale().as_str(), "de");
        assert_ne!(pair.from_artifact_url(), pair.to_artifact_url());
    }

    #[test]
    fn single_chunk_omits_subchunk_index_on_the_wire() {
        let pair = BuildPair::new("de".into(), "https://x/a.mar", "https://x/b.mar", 1).unwrap();
        let chunk = Chunk::new(1, None, vec![pair]);
        let json = serde_json::to_value(&chunk).unwrap();
        assert!(json.get("subchunkIndex").is_none());
        assert_eq!(json["historyIndex"], 1);
    }
}
