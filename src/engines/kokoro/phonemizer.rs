use std::borrow::Cow;
use std::io::Write;
use std::ops::Range;
use std::process::Stdio;

use crate::engines::espeak::EspeakConfig;

use super::model::KokoroError;
use super::vocab::Vocab;

/// Map a voice name prefix to an espeak-ng language code.
///
/// Voice names follow the pattern `{prefix}_{name}` where the two-character
/// prefix encodes the language.
pub fn voice_lang(voice: &str) -> &'static str {
    let prefix = &voice[..voice.len().min(2)];
    match prefix {
        "af" | "am" => "en-us",
        "bf" | "bm" => "en-gb",
        "ef" | "em" => "es",
        "ff" => "fr",
        "hf" | "hm" => "hi",
        "if" | "im" => "it",
        "jf" | "jm" => "ja",
        "pf" | "pm" => "pt-br",
        "zf" | "zm" => "cmn",
        _ => "en-us",
    }
}

/// Phoneme token IDs for a piece of text, with the source part each run of
/// IDs came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Phonemes {
    pub ids: Vec<i64>,
    pub parts: Vec<PhonemePart>,
}

/// A text segment or punctuation mark and the range of `Phonemes::ids` it
/// produced. The range is empty when nothing mapped into the vocab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonemePart {
    pub kind: TextPart,
    pub ids: Range<usize>,
}

/// Convert text to Kokoro phoneme token IDs via espeak-ng.
///
/// # Arguments
/// - `text`: The input text to phonemize
/// - `lang`: espeak-ng language code (e.g. `"en-us"`, `"fr"`, `"ja"`, `"cmn"`)
/// - `vocab`: Mapping from IPA characters to token IDs
/// - `espeak`: Which espeak-ng binary and data directory to use
///
/// Characters not in the vocab are silently dropped.
pub fn phonemize(
    text: &str,
    lang: &str,
    vocab: &Vocab,
    espeak: &EspeakConfig,
) -> Result<Phonemes, KokoroError> {
    let parts = split_text_parts(text);
    if parts.is_empty() {
        return Ok(Phonemes::default());
    }

    let text_segments: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            TextPart::Text(segment) => Some(segment.as_str()),
            TextPart::Punct(_) => None,
        })
        .collect();

    let segment_ids = if text_segments.is_empty() {
        Vec::new()
    } else {
        phonemize_segments_batch(&text_segments, lang, vocab, espeak)?
    };

    let mut phonemes = Phonemes::default();
    let mut segment_index = 0usize;
    for part in parts {
        let start = phonemes.ids.len();
        match &part {
            TextPart::Text(_) => {
                if let Some(chunk) = segment_ids.get(segment_index) {
                    phonemes.ids.extend_from_slice(chunk);
                }
                segment_index += 1;
            }
            TextPart::Punct(ch) => {
                if let Some(id) = vocab.get(*ch) {
                    phonemes.ids.push(id);
                }
            }
        }
        let end = phonemes.ids.len();
        phonemes.parts.push(PhonemePart {
            kind: part,
            ids: start..end,
        });
    }

    Ok(phonemes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPart {
    Text(String),
    Punct(char),
}

fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        let ch_len = ch.len_utf8();
        if let Some(punct) = map_boundary_punctuation(ch) {
            if !is_numeric_connector_between_digits(text, idx, ch_len, ch) {
                flush_text_part(&mut parts, &mut current);
                parts.push(TextPart::Punct(punct));
                continue;
            }
        }

        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }

        current.push(ch);
    }

    flush_text_part(&mut parts, &mut current);
    parts
}

fn flush_text_part(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if trimmed.is_empty() {
        current.clear();
        return;
    }
    parts.push(TextPart::Text(trimmed.to_string()));
    current.clear();
}

fn map_boundary_punctuation(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

fn is_numeric_connector_between_digits(text: &str, idx: usize, ch_len: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }

    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch_len..].chars().next();

    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

fn phonemize_segments_batch(
    segments: &[&str],
    lang: &str,
    vocab: &Vocab,
    espeak: &EspeakConfig,
) -> Result<Vec<Vec<i64>>, KokoroError> {
    let batched_input = segments.join("\n");
    let output = run_espeak(&batched_input, lang, espeak)?;
    let lines: Vec<&str> = output.lines().collect();

    // espeak-ng should emit one line per input line for stdin mode.
    // If this assumption breaks, fall back to per-segment invocation.
    if lines.len() != segments.len() {
        return segments
            .iter()
            .map(|segment| {
                let output = run_espeak(segment, lang, espeak)?;
                Ok(vocab.encode(&output))
            })
            .collect();
    }

    Ok(lines.iter().map(|line| vocab.encode(line)).collect())
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, KokoroError> {
    let mut child = espeak
        .command()
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                KokoroError::EspeakNotFound
            } else {
                KokoroError::Io(e)
            }
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // Without a final newline espeak-ng may drop the last phoneme.
        let stdin_payload = canonicalize_espeak_stdin_payload(input);
        stdin
            .write_all(stdin_payload.as_bytes())
            .map_err(KokoroError::Io)?;
    }

    let output = child.wait_with_output().map_err(KokoroError::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(KokoroError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {stderr}",
            output.status.code()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn canonicalize_espeak_stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}
