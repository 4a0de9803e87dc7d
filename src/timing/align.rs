//! Greedy alignment of engine segments onto source tokens.
//!
//! Engine segments are first flattened into single-word pieces: multi-word
//! segments are split across their span, pure punctuation is folded into the
//! previous piece. Pieces and tokens are then walked in order. A token matches
//! when its normalized form equals one piece, equals several consecutive pieces
//! joined together (`"well-known"` against `"well" "known"`), or when several
//! consecutive tokens joined together equal one piece.

use crate::config::{SplitRule, TimingConfig};
use crate::text::{normalize, Token};

use super::{AlignmentIssue, RawTimingObservation};

/// One engine word with its time span.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Piece {
    pub norm: String,
    pub start: f64,
    pub end: f64,
}

/// Drop observations that cannot be placed on the timeline.
///
/// Non-finite spans and segments starting before the previous kept segment
/// are reported and skipped; the tokens they would have covered fall back to
/// estimation.
pub(crate) fn sanitize(
    observations: &[RawTimingObservation],
    issues: &mut Vec<AlignmentIssue>,
) -> Vec<RawTimingObservation> {
    let mut kept: Vec<RawTimingObservation> = Vec::with_capacity(observations.len());
    let mut last_start = 0.0_f64;

    for obs in observations {
        if !obs.start.is_finite() || !obs.end.is_finite() {
            issues.push(AlignmentIssue::InvalidSpan {
                segment: obs.text.clone(),
            });
            continue;
        }
        let start = obs.start.max(0.0);
        let end = obs.end.max(start);
        if !kept.is_empty() && start < last_start {
            issues.push(AlignmentIssue::OutOfOrder {
                segment: obs.text.clone(),
                start,
            });
            continue;
        }
        last_start = start;
        kept.push(RawTimingObservation {
            text: obs.text.clone(),
            start,
            end,
        });
    }

    kept
}

/// Flatten observations into one piece per spoken word.
pub(crate) fn split_into_pieces(observations: &[RawTimingObservation], rule: SplitRule) -> Vec<Piece> {
    let mut pieces: Vec<Piece> = Vec::with_capacity(observations.len());

    for obs in observations {
        let words: Vec<String> = obs
            .text
            .split_whitespace()
            .map(normalize)
            .filter(|w| !w.is_empty())
            .collect();

        if words.is_empty() {
            // Trailing punctuation belongs to the word before it.
            if let Some(last) = pieces.last_mut() {
                last.end = last.end.max(obs.end);
            }
            continue;
        }

        let bounds = proportional_bounds(&words, obs.start, obs.end, rule);
        for (word, (start, end)) in words.into_iter().zip(bounds) {
            pieces.push(Piece {
                norm: word,
                start,
                end,
            });
        }
    }

    pieces
}

/// Split `[start, end]` between `words` according to `rule`.
///
/// The last share always ends at exactly `end`.
pub(crate) fn proportional_bounds<S: AsRef<str>>(
    words: &[S],
    start: f64,
    end: f64,
    rule: SplitRule,
) -> Vec<(f64, f64)> {
    let weights: Vec<f64> = words
        .iter()
        .map(|w| match rule {
            SplitRule::CharacterLength => w.as_ref().chars().count() as f64,
            SplitRule::Equal => 1.0,
        })
        .collect();
    let total: f64 = weights.iter().sum();
    let span = end - start;

    let mut bounds = Vec::with_capacity(words.len());
    let mut cumulative = 0.0;
    let mut cursor = start;
    for (i, weight) in weights.iter().enumerate() {
        cumulative += weight;
        let next = if i + 1 == weights.len() {
            end
        } else if total > 0.0 {
            start + span * cumulative / total
        } else {
            start + span * (i + 1) as f64 / weights.len() as f64
        };
        bounds.push((cursor, next));
        cursor = next;
    }
    bounds
}

/// Assign a span to every token a piece can be matched to.
///
/// `None` entries are tokens left for local estimation.
pub(crate) fn align(
    tokens: &[Token],
    pieces: &[Piece],
    config: &TimingConfig,
    issues: &mut Vec<AlignmentIssue>,
) -> Vec<Option<(f64, f64)>> {
    let norms: Vec<String> = tokens.iter().map(|t| normalize(&t.text)).collect();
    let lookahead = config.match_lookahead;
    let mut spans = vec![None; tokens.len()];
    let (mut i, mut j) = (0, 0);

    while i < norms.len() && j < pieces.len() {
        if norms[i].is_empty() {
            // Pure punctuation in the source is never spoken.
            i += 1;
            continue;
        }

        if let Some(matched) = match_at(&norms, i, pieces, j) {
            assign(&norms, &mut spans, i, pieces, j, matched, config.split_rule);
            i += matched.tokens;
            j += matched.pieces;
            continue;
        }

        // The engine skipped source words.
        let skip_tokens = (1..=lookahead).find(|&k| {
            i + k < norms.len() && !norms[i + k].is_empty() && match_at(&norms, i + k, pieces, j).is_some()
        });
        if let Some(k) = skip_tokens {
            for idx in i..i + k {
                report_unmatched(issues, tokens, &norms, idx);
            }
            i += k;
            continue;
        }

        // The engine spoke words the source does not have.
        let skip_pieces = (1..=lookahead)
            .find(|&k| j + k < pieces.len() && match_at(&norms, i, pieces, j + k).is_some());
        if let Some(k) = skip_pieces {
            for piece in &pieces[j..j + k] {
                issues.push(AlignmentIssue::ExtraSpeech {
                    segment: piece.norm.clone(),
                });
            }
            j += k;
            continue;
        }

        report_unmatched(issues, tokens, &norms, i);
        issues.push(AlignmentIssue::ExtraSpeech {
            segment: pieces[j].norm.clone(),
        });
        i += 1;
        j += 1;
    }

    for idx in i..norms.len() {
        report_unmatched(issues, tokens, &norms, idx);
    }
    for piece in pieces.iter().skip(j) {
        issues.push(AlignmentIssue::ExtraSpeech {
            segment: piece.norm.clone(),
        });
    }

    spans
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Match {
    tokens: usize,
    pieces: usize,
}

fn match_at(norms: &[String], i: usize, pieces: &[Piece], j: usize) -> Option<Match> {
    let token = norms[i].as_str();
    let piece = pieces[j].norm.as_str();

    if token == piece {
        return Some(Match { tokens: 1, pieces: 1 });
    }

    if token.starts_with(piece) {
        let mut joined = piece.to_string();
        for (offset, next) in pieces[j + 1..].iter().enumerate() {
            joined.push_str(&next.norm);
            if joined == token {
                return Some(Match {
                    tokens: 1,
                    pieces: offset + 2,
                });
            }
            if !token.starts_with(joined.as_str()) {
                break;
            }
        }
        return None;
    }

    if piece.starts_with(token) {
        let mut joined = token.to_string();
        for (offset, next) in norms[i + 1..].iter().enumerate() {
            joined.push_str(next);
            if joined == piece {
                return Some(Match {
                    tokens: offset + 2,
                    pieces: 1,
                });
            }
            if !piece.starts_with(joined.as_str()) {
                break;
            }
        }
    }

    None
}

fn assign(
    norms: &[String],
    spans: &mut [Option<(f64, f64)>],
    i: usize,
    pieces: &[Piece],
    j: usize,
    matched: Match,
    rule: SplitRule,
) {
    let first = &pieces[j];
    let last = &pieces[j + matched.pieces - 1];

    if matched.tokens == 1 {
        spans[i] = Some((first.start, last.end));
        return;
    }

    let words = &norms[i..i + matched.tokens];
    let bounds = proportional_bounds(words, first.start, first.end, rule);
    for (offset, bound) in bounds.into_iter().enumerate() {
        spans[i + offset] = Some(bound);
    }
}

fn report_unmatched(issues: &mut Vec<AlignmentIssue>, tokens: &[Token], norms: &[String], idx: usize) {
    if norms[idx].is_empty() {
        return;
    }
    issues.push(AlignmentIssue::Unmatched {
        word_index: idx,
        word: tokens[idx].text.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::SourceText;

    fn obs(text: &str, start: f64, end: f64) -> RawTimingObservation {
        RawTimingObservation::new(text, start, end)
    }

    fn run(text: &str, observations: &[RawTimingObservation]) -> (Vec<Option<(f64, f64)>>, Vec<AlignmentIssue>) {
        let source = SourceText::new(text);
        let config = TimingConfig::default();
        let mut issues = Vec::new();
        let kept = sanitize(observations, &mut issues);
        let pieces = split_into_pieces(&kept, config.split_rule);
        let spans = align(source.tokens(), &pieces, &config, &mut issues);
        (spans, issues)
    }

    #[test]
    fn matches_one_to_one_ignoring_case_and_punctuation() {
        let (spans, issues) = run(
            "Hello, World!",
            &[obs("hello", 0.0, 0.5), obs("world", 0.5, 1.0)],
        );
        assert_eq!(spans, vec![Some((0.0, 0.5)), Some((0.5, 1.0))]);
        assert!(issues.is_empty());
    }

    #[test]
    fn splits_multi_word_segment_by_character_length() {
        let (spans, _) = run("Chapter one", &[obs("Chapter one", 0.0, 1.0)]);
        // "chapter" has 7 characters, "one" has 3.
        assert_eq!(spans[0], Some((0.0, 0.7)));
        assert_eq!(spans[1], Some((0.7, 1.0)));
    }

    #[test]
    fn equal_split_rule_ignores_length() {
        let bounds = proportional_bounds(&["chapter", "one"], 0.0, 1.0, SplitRule::Equal);
        assert_eq!(bounds, vec![(0.0, 0.5), (0.5, 1.0)]);
    }

    #[test]
    fn equal_length_words_split_evenly() {
        let bounds = proportional_bounds(&["abc", "def"], 1.0, 2.0, SplitRule::CharacterLength);
        assert_eq!(bounds, vec![(1.0, 1.5), (1.5, 2.0)]);
    }

    #[test]
    fn punctuation_segment_extends_previous_word() {
        let pieces = split_into_pieces(
            &[obs("Hello", 0.0, 0.4), obs("world", 0.4, 0.9), obs(".", 0.9, 1.2)],
            SplitRule::CharacterLength,
        );
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[1].end, 1.2);
    }

    #[test]
    fn hyphenated_token_joins_engine_pieces() {
        let (spans, issues) = run(
            "a well-known fact",
            &[
                obs("a", 0.0, 0.1),
                obs("well", 0.1, 0.4),
                obs("known", 0.4, 0.8),
                obs("fact", 0.8, 1.2),
            ],
        );
        assert_eq!(spans, vec![Some((0.0, 0.1)), Some((0.1, 0.8)), Some((0.8, 1.2))]);
        assert!(issues.is_empty());
    }

    #[test]
    fn engine_piece_covering_several_tokens_is_split() {
        let (spans, _) = run("New York", &[obs("NewYork", 0.0, 0.7)]);
        let (first, second) = (spans[0].unwrap(), spans[1].unwrap());
        assert_eq!(first.0, 0.0);
        assert_eq!(first.1, second.0);
        assert_eq!(second.1, 0.7);
    }

    #[test]
    fn skipped_source_word_is_left_for_estimation() {
        let (spans, issues) = run(
            "the big red dog",
            &[obs("the", 0.0, 0.2), obs("red", 0.5, 0.8), obs("dog", 0.8, 1.1)],
        );
        assert_eq!(spans[1], None);
        assert_eq!(spans[2], Some((0.5, 0.8)));
        assert!(issues.contains(&AlignmentIssue::Unmatched {
            word_index: 1,
            word: "big".to_string()
        }));
    }

    #[test]
    fn expanded_number_is_estimated_and_extra_words_dropped() {
        let (spans, issues) = run(
            "1,000 users",
            &[obs("one", 0.0, 0.3), obs("thousand", 0.3, 0.8), obs("users", 0.8, 1.2)],
        );
        assert_eq!(spans, vec![None, Some((0.8, 1.2))]);
        assert!(issues.iter().any(|i| matches!(i, AlignmentIssue::ExtraSpeech { segment } if segment == "thousand")));
    }

    #[test]
    fn out_of_order_and_invalid_segments_are_dropped() {
        let mut issues = Vec::new();
        let kept = sanitize(
            &[
                obs("a", 0.5, 0.8),
                obs("b", 0.2, 0.4),
                obs("c", f64::NAN, 1.0),
                obs("d", 0.9, 0.7),
            ],
            &mut issues,
        );
        let texts: Vec<_> = kept.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "d"]);
        assert_eq!(kept[1].end, 0.9);
        assert_eq!(issues.len(), 2);
    }

    #[test]
    fn silent_source_tokens_do_not_consume_pieces() {
        let (spans, issues) = run(
            "wait — what",
            &[obs("wait", 0.0, 0.3), obs("what", 0.5, 0.9)],
        );
        assert_eq!(spans, vec![Some((0.0, 0.3)), None, Some((0.5, 0.9))]);
        assert!(issues.is_empty());
    }
}
