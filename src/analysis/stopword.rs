use std::collections::HashSet;

/// Drops high-frequency ASCII words that carry no search signal.
#[derive(Debug)]
pub struct StopWordFilter {
    stop_words: HashSet<String>,
}

impl StopWordFilter {
    pub fn new(stop_words: Vec<String>) -> Self {
        StopWordFilter {
            stop_words: stop_words.into_iter().collect(),
        }
    }

    /// The built-in English list.
    pub fn english() -> Self {
        let words = vec![
            "a", "an", "and", "are", "as", "at", "be", "by", "for",
            "from", "has", "he", "in", "is", "it", "its", "of", "on",
            "that", "the", "to", "was", "will", "with",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        StopWordFilter::new(words)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    pub fn filter(&self, words: Vec<String>) -> Vec<String> {
        words
            .into_iter()
            .filter(|w| !self.stop_words.contains(w))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_list_drops_exactly_the_built_in_words() {
        let filter = StopWordFilter::english();
        for word in ["a", "the", "with", "will", "its"] {
            assert!(filter.contains(word), "{} should be a stop word", word);
        }
        assert!(!filter.contains("quick"));
        assert!(!filter.contains("你好"));
    }

    #[test]
    fn filter_preserves_order_of_survivors() {
        let filter = StopWordFilter::english();
        let words = vec!["the".into(), "quick".into(), "brown".into(), "is".into()];
        assert_eq!(filter.filter(words), vec!["quick", "brown"]);
    }
}
