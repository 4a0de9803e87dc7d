//! Duration-only estimation: the whole-unit fallback and local gap filling.

use super::CanonicalWordTiming;

/// Spread `duration` evenly over `word_count` words.
///
/// Word `i` spans `[i * d / n, (i + 1) * d / n)` and the last word ends at
/// exactly `duration`. Deterministic: the same inputs always produce the same
/// timings.
pub fn uniform(word_count: usize, duration: f64) -> Vec<CanonicalWordTiming> {
    let duration = duration.max(0.0);
    (0..word_count)
        .map(|i| CanonicalWordTiming {
            word_index: i,
            start: boundary(i, word_count, 0.0, duration),
            end: if i + 1 == word_count {
                duration
            } else {
                boundary(i + 1, word_count, 0.0, duration)
            },
        })
        .collect()
}

/// Start times for every token, estimating the ones the aligner left empty.
///
/// A run of unmatched tokens shares the interval between the end of the
/// previous matched token (or 0) and the start of the next one (or `total`).
pub(crate) fn fill_unmatched(spans: &[Option<(f64, f64)>], total: f64) -> Vec<f64> {
    let n = spans.len();
    let mut starts = vec![0.0; n];
    let mut prev_end = 0.0_f64;
    let mut i = 0;

    while i < n {
        if let Some((start, end)) = spans[i] {
            starts[i] = start;
            prev_end = end;
            i += 1;
            continue;
        }

        let run_start = i;
        while i < n && spans[i].is_none() {
            i += 1;
        }
        let upper = match spans.get(i).copied().flatten() {
            Some((next_start, _)) => next_start,
            None => total,
        };
        let lower = prev_end;
        let upper = upper.max(lower);
        let count = i - run_start;
        for k in 0..count {
            starts[run_start + k] = boundary(k, count, lower, upper - lower);
        }
    }

    starts
}

fn boundary(k: usize, n: usize, offset: f64, span: f64) -> f64 {
    offset + span * k as f64 / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_matches_word_count_and_duration() {
        let timings = uniform(2, 2.0);
        assert_eq!(
            timings,
            vec![
                CanonicalWordTiming { word_index: 0, start: 0.0, end: 1.0 },
                CanonicalWordTiming { word_index: 1, start: 1.0, end: 2.0 },
            ]
        );
    }

    #[test]
    fn uniform_is_deterministic_and_continuous() {
        let a = uniform(7, 3.3);
        let b = uniform(7, 3.3);
        assert_eq!(a, b);
        for pair in a.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(a.last().map(|t| t.end), Some(3.3));
    }

    #[test]
    fn uniform_with_no_words_is_empty() {
        assert!(uniform(0, 5.0).is_empty());
    }

    #[test]
    fn fills_interior_run_between_neighbors() {
        let spans = [Some((0.0, 1.0)), None, None, Some((2.0, 3.0))];
        assert_eq!(fill_unmatched(&spans, 3.0), vec![0.0, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn fills_leading_and_trailing_runs() {
        let spans = [None, Some((1.0, 2.0)), None];
        assert_eq!(fill_unmatched(&spans, 4.0), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn collapses_run_when_neighbors_overlap() {
        let spans = [Some((0.0, 2.0)), None, Some((1.5, 3.0))];
        let starts = fill_unmatched(&spans, 3.0);
        assert_eq!(starts, vec![0.0, 2.0, 1.5]);
    }
}
