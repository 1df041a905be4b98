use crate::analysis::stopword::StopWordFilter;

/// Mixed-script n-gram tokenizer.
///
/// Text is folded to lower case and split into words on whitespace,
/// punctuation and script boundaries. ASCII-alphanumeric words pass through
/// the stop-word filter and are emitted whole when no longer than `size`,
/// otherwise as sliding windows of `size` characters. Han-script words are
/// always emitted as character bigrams regardless of `size` (a lone Han
/// character is emitted by itself). Everything else is dropped.
#[derive(Debug)]
pub struct NGramTokenizer {
    size: usize,
    stop_words: StopWordFilter,
}

impl NGramTokenizer {
    pub fn new(size: usize) -> Self {
        NGramTokenizer {
            size,
            stop_words: StopWordFilter::english(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Emits n-grams in generation order; duplicates are kept so callers
    /// can weigh repeated terms.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        if self.size == 0 {
            return Vec::new();
        }

        let mut grams = Vec::new();
        for word in self.extract_words(text) {
            let chars: Vec<char> = word.chars().collect();
            if chars.first().map(|c| is_han(*c)).unwrap_or(false) {
                if chars.len() == 1 {
                    grams.push(word);
                } else {
                    for window in chars.windows(2) {
                        grams.push(window.iter().collect());
                    }
                }
            } else if chars.len() <= self.size {
                grams.push(word);
            } else {
                for window in chars.windows(self.size) {
                    grams.push(window.iter().collect());
                }
            }
        }
        grams
    }

    /// Lowercases and partitions into single-script words, dropping
    /// characters that are neither ASCII alphanumeric nor Han and filtering
    /// ASCII stop words.
    fn extract_words(&self, text: &str) -> Vec<String> {
        let mut words = Vec::new();
        let mut current = String::new();
        let mut current_han = false;

        for c in text.to_lowercase().chars() {
            let class = if c.is_ascii_alphanumeric() {
                Some(false)
            } else if is_han(c) {
                Some(true)
            } else {
                None
            };
            match class {
                None => {
                    self.push_word(&mut words, &mut current, current_han);
                }
                Some(han) => {
                    if !current.is_empty() && han != current_han {
                        self.push_word(&mut words, &mut current, current_han);
                    }
                    current_han = han;
                    current.push(c);
                }
            }
        }
        self.push_word(&mut words, &mut current, current_han);
        words
    }

    fn push_word(&self, words: &mut Vec<String>, current: &mut String, han: bool) {
        if current.is_empty() {
            return;
        }
        let word = std::mem::take(current);
        if han || !self.stop_words.contains(&word) {
            words.push(word);
        }
    }
}

/// Convenience wrapper for one-off tokenization.
pub fn ngram(input: &str, n: usize) -> Vec<String> {
    NGramTokenizer::new(n).tokenize(input)
}

fn is_han(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'      // CJK Unified Ideographs
        | '\u{3400}'..='\u{4DBF}'    // Extension A
        | '\u{F900}'..='\u{FAFF}')   // Compatibility Ideographs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_trigrams() {
        assert_eq!(
            ngram("hello world", 3),
            vec!["hel", "ell", "llo", "wor", "orl", "rld"]
        );
    }

    #[test]
    fn short_words_pass_whole_and_stop_words_drop() {
        assert_eq!(ngram("go is fun", 3), vec!["go", "fun"]);
        assert_eq!(
            ngram("the quick brown fox", 3),
            vec!["qui", "uic", "ick", "bro", "row", "own", "fox"]
        );
    }

    #[test]
    fn han_always_emits_bigrams() {
        assert_eq!(ngram("你好世界", 3), vec!["你好", "好世", "世界"]);
        assert_eq!(ngram("学习编程", 3), vec!["学习", "习编", "编程"]);
        assert_eq!(ngram("中国", 3), vec!["中国"]);
    }

    #[test]
    fn lone_han_character_is_kept() {
        assert_eq!(ngram("我", 3), vec!["我"]);
    }

    #[test]
    fn mixed_scripts_split_at_the_boundary() {
        assert_eq!(
            ngram("Hello 世界 programming", 3),
            vec![
                "hel", "ell", "llo", "世界", "pro", "rog", "ogr", "gra", "ram", "amm", "mmi",
                "min", "ing"
            ]
        );
    }

    #[test]
    fn degenerate_inputs_yield_nothing() {
        assert!(ngram("hello", 0).is_empty());
        assert!(ngram("", 3).is_empty());
        assert!(ngram("!@#$%", 3).is_empty());
        assert!(ngram("   ", 3).is_empty());
        assert!(ngram("a", 3).is_empty()); // stop word
        assert!(ngram("the is a", 3).is_empty());
    }

    #[test]
    fn punctuation_splits_words() {
        assert_eq!(
            ngram("hello, world!", 3),
            vec!["hel", "ell", "llo", "wor", "orl", "rld"]
        );
    }

    #[test]
    fn digits_stay_inside_ascii_words() {
        assert_eq!(ngram("test123", 4), vec!["test", "est1", "st12", "t123"]);
        assert_eq!(ngram("abc456", 7), vec!["abc456"]);
    }

    #[test]
    fn case_folds_before_tokenization() {
        assert_eq!(ngram("HELLO World", 5), vec!["hello", "world"]);
    }

    #[test]
    fn kana_and_hangul_are_not_han() {
        assert!(!is_han('あ'));
        assert!(!is_han('안'));
        assert!(is_han('風'));
        assert!(is_han('你'));
    }
}
