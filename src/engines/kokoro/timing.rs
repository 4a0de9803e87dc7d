//! Word spans from Kokoro's per-token durations.
//!
//! espeak-ng separates words in its IPA output with spaces, which survive into
//! the token IDs. Within each text segment the tokens are grouped on the space
//! ID; when the group count matches the segment's word count every word gets
//! its own span, otherwise the whole segment is reported as one multi-word
//! observation and the timing calculator splits it.

use crate::timing::RawTimingObservation;

use super::phonemizer::{PhonemePart, TextPart};

pub fn word_observations(
    parts: &[PhonemePart],
    ids: &[i64],
    token_times: &[(f64, f64)],
    space_id: Option<i64>,
) -> Vec<RawTimingObservation> {
    let mut observations = Vec::new();

    for part in parts {
        let range = part.ids.clone();
        if range.is_empty() || range.end > token_times.len() || range.end > ids.len() {
            continue;
        }
        let span = (token_times[range.start].0, token_times[range.end - 1].1);

        match &part.kind {
            TextPart::Punct(ch) => {
                observations.push(RawTimingObservation::new(ch.to_string(), span.0, span.1));
            }
            TextPart::Text(segment) => {
                let words: Vec<&str> = segment.split_whitespace().collect();
                let groups = space_id
                    .map(|space| word_groups(&ids[range.clone()], space, range.start))
                    .unwrap_or_default();

                if groups.len() == words.len() && words.len() > 1 {
                    for (word, (first, last)) in words.into_iter().zip(groups) {
                        observations.push(RawTimingObservation::new(
                            word,
                            token_times[first].0,
                            token_times[last].1,
                        ));
                    }
                } else {
                    if words.len() > 1 {
                        log::debug!(
                            "Kokoro segment {segment:?}: {} phoneme groups for {} words",
                            groups.len(),
                            words.len()
                        );
                    }
                    observations.push(RawTimingObservation::new(segment.as_str(), span.0, span.1));
                }
            }
        }
    }

    observations
}

/// Inclusive token index ranges between space tokens, offset by `base`.
fn word_groups(ids: &[i64], space: i64, base: usize) -> Vec<(usize, usize)> {
    let mut groups = Vec::new();
    let mut start = None;

    for (i, &id) in ids.iter().enumerate() {
        match (id == space, start) {
            (true, Some(s)) => {
                groups.push((base + s, base + i - 1));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        groups.push((base + s, base + ids.len() - 1));
    }
    groups
}
