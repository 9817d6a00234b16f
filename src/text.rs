//! Text normalization and keyword indicator matching.
//!
//! Every classifier in the engine works on normalized text: lowercase, with
//! German umlauts and `ß` folded to their two-letter spellings so that
//! "würde" and "wuerde" or "groß" and "gross" hit the same indicator.
//! Indicator phrases are normalized the same way before compiling.

use regex::Regex;

/// Case-fold and fold umlaut/diacritic alternatives.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut out = String::with_capacity(lower.len() + 8);
    for ch in lower.chars() {
        match ch {
            'ß' => out.push_str("ss"),
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'à' | 'á' | 'â' => out.push('a'),
            'è' | 'é' | 'ê' => out.push('e'),
            'ô' | 'ó' => out.push('o'),
            '’' | '‘' => out.push('\''),
            _ => out.push(ch),
        }
    }
    out
}

/// A named list of keyword/phrase indicators for one category.
///
/// Each phrase compiles to its own word-bounded regex. Counting is
/// per-occurrence: a phrase appearing twice yields two matches, and
/// overlapping phrases from the same set each count.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    name: String,
    phrases: Vec<String>,
    patterns: Vec<Regex>,
}

impl IndicatorSet {
    /// Compile a set from raw phrases.
    pub fn new(name: impl Into<String>, phrases: &[&str]) -> Result<Self, regex::Error> {
        let mut normalized = Vec::with_capacity(phrases.len());
        let mut patterns = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            let phrase = normalize(phrase.trim());
            if phrase.is_empty() {
                continue;
            }
            patterns.push(Regex::new(&bounded_pattern(&phrase))?);
            normalized.push(phrase);
        }
        Ok(Self {
            name: name.into(),
            phrases: normalized,
            patterns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Total number of indicator occurrences in already-normalized text.
    pub fn count(&self, normalized: &str) -> usize {
        self.patterns
            .iter()
            .map(|re| re.find_iter(normalized).count())
            .sum()
    }

    /// Phrases that occur at least once in already-normalized text.
    pub fn matched_phrases(&self, normalized: &str) -> Vec<String> {
        self.phrases
            .iter()
            .zip(&self.patterns)
            .filter(|(_, re)| re.is_match(normalized))
            .map(|(phrase, _)| phrase.clone())
            .collect()
    }

    /// Whether any phrase occurs in already-normalized text.
    pub fn is_match(&self, normalized: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(normalized))
    }
}

/// Word boundaries only make sense next to word characters; a phrase that
/// starts or ends with punctuation is anchored on the other side only.
fn bounded_pattern(phrase: &str) -> String {
    let escaped = regex::escape(phrase);
    let starts_word = phrase.chars().next().is_some_and(char::is_alphanumeric);
    let ends_word = phrase.chars().last().is_some_and(char::is_alphanumeric);
    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}

/// A versioned table mapping category keys to indicator sets.
#[derive(Debug, Clone)]
pub struct IndicatorTable<K> {
    version: &'static str,
    sets: Vec<(K, IndicatorSet)>,
}

impl<K: Copy + PartialEq + std::fmt::Debug> IndicatorTable<K> {
    /// Compile a table from `(key, phrases)` entries, preserving their order.
    pub fn build(
        version: &'static str,
        entries: &[(K, &[&str])],
    ) -> Result<Self, regex::Error> {
        let sets = entries
            .iter()
            .map(|(key, phrases)| Ok((*key, IndicatorSet::new(format!("{key:?}"), phrases)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { version, sets })
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn get(&self, key: K) -> Option<&IndicatorSet> {
        self.sets.iter().find(|(k, _)| *k == key).map(|(_, set)| set)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &IndicatorSet)> {
        self.sets.iter().map(|(k, set)| (*k, set))
    }

    /// Occurrence count for `key`, 0 when the key has no set.
    pub fn count(&self, key: K, normalized: &str) -> usize {
        self.get(key).map(|set| set.count(normalized)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_umlauts_and_eszett() {
        assert_eq!(normalize("Größe"), "groesse");
        assert_eq!(normalize("WÜRDEST"), "wuerdest");
        assert_eq!(normalize("Straße"), normalize("strasse"));
        assert_eq!(normalize("don’t"), "don't");
    }

    #[test]
    fn counts_every_occurrence() {
        let set = IndicatorSet::new("test", &["ich will", "bald"]).unwrap();
        let text = normalize("Ich will das. Ich WILL es bald!");
        assert_eq!(set.count(&text), 3);
    }

    #[test]
    fn respects_word_boundaries() {
        let set = IndicatorSet::new("test", &["plan"]).unwrap();
        assert_eq!(set.count("planung und plan"), 1);
    }

    #[test]
    fn umlaut_phrases_match_ascii_spelling() {
        let set = IndicatorSet::new("test", &["überfordert"]).unwrap();
        assert_eq!(set.count(&normalize("ich bin ueberfordert")), 1);
        assert_eq!(set.count(&normalize("ich bin überfordert")), 1);
    }

    #[test]
    fn matched_phrases_lists_each_once() {
        let set = IndicatorSet::new("test", &["a b", "c"]).unwrap();
        let matched = set.matched_phrases("a b a b");
        assert_eq!(matched, vec!["a b".to_string()]);
    }

    #[test]
    fn empty_phrases_are_skipped() {
        let set = IndicatorSet::new("test", &["", "  ", "x"]).unwrap();
        assert_eq!(set.phrases().len(), 1);
    }

    #[test]
    fn table_preserves_order_and_version() {
        #[derive(Debug, Clone, Copy, PartialEq)]
        enum Key {
            A,
            B,
        }
        let table = IndicatorTable::build("v1", &[(Key::A, &["eins"]), (Key::B, &["zwei"])])
            .unwrap();
        assert_eq!(table.version(), "v1");
        let keys: Vec<Key> = table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Key::A, Key::B]);
        assert_eq!(table.count(Key::B, "zwei zwei"), 2);
    }
}
