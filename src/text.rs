//! Source text tokenization and the normalization used for matching.

use std::ops::Range;

/// One word of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The word as written, punctuation included.
    pub text: String,
    /// Byte range of the word in the original text.
    pub range: Range<usize>,
}

/// The unit submitted for synthesis, split into word tokens.
///
/// Tokens are identified by position; the same word may appear many times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    text: String,
    tokens: Vec<Token>,
}

impl SourceText {
    /// Tokenize on whitespace.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut tokens = Vec::new();
        let mut start = None;

        for (idx, ch) in text.char_indices() {
            match (ch.is_whitespace(), start) {
                (true, Some(s)) => {
                    tokens.push(Token {
                        text: text[s..idx].to_string(),
                        range: s..idx,
                    });
                    start = None;
                }
                (false, None) => start = Some(idx),
                _ => {}
            }
        }
        if let Some(s) = start {
            tokens.push(Token {
                text: text[s..].to_string(),
                range: s..text.len(),
            });
        }

        Self { text, tokens }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Word strings in order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(|t| t.text.as_str())
    }
}

/// Lowercase alphanumeric core of a word: `"Don't,"` becomes `"dont"`.
///
/// Returns an empty string for pure punctuation.
pub fn normalize(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split a paragraph into sentences after `.`, `!` or `?` followed by
/// whitespace. Empty sentences are dropped.
pub fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = paragraph.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_idx, next)) = chars.peek() {
            if next.is_whitespace() {
                push_sentence(&mut sentences, &paragraph[start..next_idx]);
                start = next_idx;
            }
        } else {
            push_sentence(&mut sentences, &paragraph[start..idx + ch.len_utf8()]);
            start = paragraph.len();
        }
    }
    push_sentence(&mut sentences, &paragraph[start.min(paragraph.len())..]);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_with_byte_ranges() {
        let text = SourceText::new("  Hello,  wörld!\tAgain ");
        let words: Vec<_> = text.words().collect();
        assert_eq!(words, vec!["Hello,", "wörld!", "Again"]);

        let second = &text.tokens()[1];
        assert_eq!(&text.text()[second.range.clone()], "wörld!");
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert!(SourceText::new("   \n ").is_empty());
        assert_eq!(SourceText::new("").len(), 0);
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Don't,"), "dont");
        assert_eq!(normalize("well-known"), "wellknown");
        assert_eq!(normalize("\"Chapter"), "chapter");
        assert_eq!(normalize("—"), "");
        assert_eq!(normalize("1,000"), "1000");
    }

    #[test]
    fn splits_sentences_on_terminal_punctuation() {
        let sentences = split_sentences("Hello world. How are you?  Fine!No split here.");
        assert_eq!(
            sentences,
            vec!["Hello world.", "How are you?", "Fine!No split here."]
        );
    }

    #[test]
    fn keeps_trailing_fragment_without_punctuation() {
        assert_eq!(
            split_sentences("First one. trailing words"),
            vec!["First one.", "trailing words"]
        );
    }
}
