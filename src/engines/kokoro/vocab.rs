//! Phoneme vocabulary: IPA characters to model token IDs.

use std::collections::HashMap;
use std::path::Path;

use super::model::KokoroError;

/// Sentence punctuation the chunker prefers to split after.
const BOUNDARY_CHARS: [char; 6] = [';', ':', ',', '.', '!', '?'];

/// Mapping from IPA characters (and punctuation) to token IDs.
#[derive(Debug, Clone)]
pub struct Vocab {
    ids: HashMap<char, i64>,
}

impl Vocab {
    /// Read the `"vocab"` object from a Kokoro `config.json`.
    pub fn load(config_path: &Path) -> Result<Self, KokoroError> {
        let content = std::fs::read_to_string(config_path)?;
        Self::from_json(&content)
    }

    fn from_json(content: &str) -> Result<Self, KokoroError> {
        let json: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| KokoroError::Config(format!("Failed to parse JSON: {e}")))?;
        let entries = json
            .get("vocab")
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| KokoroError::Config("Missing 'vocab' object".to_string()))?;

        let mut ids = HashMap::with_capacity(entries.len());
        for (key, value) in entries {
            let mut chars = key.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                return Err(KokoroError::Config(format!(
                    "Vocab key {key:?} is not a single character"
                )));
            };
            let id = value
                .as_i64()
                .ok_or_else(|| KokoroError::Config(format!("Non-integer vocab value for {key:?}")))?;
            ids.insert(ch, id);
        }
        Ok(Self { ids })
    }

    /// Vocabulary shipped with Kokoro v1.0, used when no config.json is present.
    pub fn builtin() -> Self {
        Self {
            ids: BUILTIN.iter().copied().collect(),
        }
    }

    pub fn get(&self, ch: char) -> Option<i64> {
        self.ids.get(&ch).copied()
    }

    /// ID of the word separator espeak-ng emits between words.
    pub fn space(&self) -> Option<i64> {
        self.get(' ')
    }

    /// Whether `id` is sentence punctuation.
    pub fn is_boundary(&self, id: i64) -> bool {
        BOUNDARY_CHARS.iter().any(|&ch| self.get(ch) == Some(id))
    }

    /// Encode espeak-ng IPA output. Unknown characters and `_` ties are dropped.
    pub fn encode(&self, ipa: &str) -> Vec<i64> {
        ipa.lines()
            .map(str::trim)
            .flat_map(|line| line.chars())
            .filter(|&ch| ch != '_')
            .filter_map(|ch| self.get(ch))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

const BUILTIN: &[(char, i64)] = &[
    (';', 1),
    (':', 2),
    (',', 3),
    ('.', 4),
    ('!', 5),
    ('?', 6),
    ('—', 9),
    ('…', 10),
    ('"', 11),
    ('(', 12),
    (')', 13),
    ('\u{201c}', 14),
    ('\u{201d}', 15),
    (' ', 16),
    ('\u{0303}', 17),
    ('ʣ', 18),
    ('ʥ', 19),
    ('ʦ', 20),
    ('ʨ', 21),
    ('ᵝ', 22),
    ('ꭧ', 23),
    ('A', 24),
    ('I', 25),
    ('O', 31),
    ('Q', 33),
    ('S', 35),
    ('T', 36),
    ('W', 39),
    ('Y', 41),
    ('ᵊ', 42),
    ('a', 43),
    ('b', 44),
    ('c', 45),
    ('d', 46),
    ('e', 47),
    ('f', 48),
    ('h', 50),
    ('i', 51),
    ('j', 52),
    ('k', 53),
    ('l', 54),
    ('m', 55),
    ('n', 56),
    ('o', 57),
    ('p', 58),
    ('q', 59),
    ('r', 60),
    ('s', 61),
    ('t', 62),
    ('u', 63),
    ('v', 64),
    ('w', 65),
    ('x', 66),
    ('y', 67),
    ('z', 68),
    ('ɑ', 69),
    ('ɐ', 70),
    ('ɒ', 71),
    ('æ', 72),
    ('β', 75),
    ('ɔ', 76),
    ('ɕ', 77),
    ('ç', 78),
    ('ɖ', 80),
    ('ð', 81),
    ('ʤ', 82),
    ('ə', 83),
    ('ɚ', 85),
    ('ɛ', 86),
    ('ɜ', 87),
    ('ɟ', 90),
    ('ɡ', 92),
    ('ɥ', 99),
    ('ɨ', 101),
    ('ɪ', 102),
    ('ʝ', 103),
    ('ɯ', 110),
    ('ɰ', 111),
    ('ŋ', 112),
    ('ɳ', 113),
    ('ɲ', 114),
    ('ɴ', 115),
    ('ø', 116),
    ('ɸ', 118),
    ('θ', 119),
    ('œ', 120),
    ('ɹ', 123),
    ('ɾ', 125),
    ('ɻ', 126),
    ('ʁ', 128),
    ('ɽ', 129),
    ('ʂ', 130),
    ('ʃ', 131),
    ('ʈ', 132),
    ('ʧ', 133),
    ('ʊ', 135),
    ('ʋ', 136),
    ('ʌ', 138),
    ('ɣ', 139),
    ('ɤ', 140),
    ('χ', 142),
    ('ʎ', 143),
    ('ʒ', 147),
    ('ʔ', 148),
    ('ˈ', 156),
    ('ˌ', 157),
    ('ː', 158),
    ('ʰ', 162),
    ('ʲ', 164),
    ('↓', 169),
    ('→', 171),
    ('↗', 172),
    ('↘', 173),
    ('ᵻ', 177),
];
