//! Gap and overlap removal.

use super::CanonicalWordTiming;

/// Turn per-token start times into a continuous timeline ending at `total`.
///
/// Starts are clamped into `[previous start, total]`, so out-of-order or
/// overshooting input collapses into zero-length words instead of going
/// backwards. Every non-final word then ends where the next one starts.
pub(crate) fn enforce(starts: &[f64], total: f64) -> Vec<CanonicalWordTiming> {
    let total = total.max(0.0);
    let mut clamped = Vec::with_capacity(starts.len());
    let mut prev = 0.0_f64;

    for &start in starts {
        let start = if start.is_finite() {
            start.max(prev).min(total)
        } else {
            prev
        };
        clamped.push(start);
        prev = start;
    }

    if clamped.len() == 1 {
        clamped[0] = 0.0;
    }

    (0..clamped.len())
        .map(|i| CanonicalWordTiming {
            word_index: i,
            start: clamped[i],
            end: clamped.get(i + 1).copied().unwrap_or(total),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(timings: &[CanonicalWordTiming]) -> Vec<(f64, f64)> {
        timings.iter().map(|t| (t.start, t.end)).collect()
    }

    #[test]
    fn closes_gaps_and_overlaps() {
        let timings = enforce(&[0.5, 1.5, 2.3], 3.0);
        assert_eq!(spans(&timings), vec![(0.5, 1.5), (1.5, 2.3), (2.3, 3.0)]);
    }

    #[test]
    fn backwards_start_collapses_to_previous() {
        let timings = enforce(&[0.0, 1.0, 0.8, 2.0], 2.5);
        assert_eq!(
            spans(&timings),
            vec![(0.0, 1.0), (1.0, 1.0), (1.0, 2.0), (2.0, 2.5)]
        );
    }

    #[test]
    fn clamps_starts_past_total() {
        let timings = enforce(&[0.0, 4.0], 3.0);
        assert_eq!(spans(&timings), vec![(0.0, 3.0), (3.0, 3.0)]);
    }

    #[test]
    fn single_word_spans_whole_clip() {
        let timings = enforce(&[0.4], 1.2);
        assert_eq!(spans(&timings), vec![(0.0, 1.2)]);
    }

    #[test]
    fn negative_and_nan_starts_are_repaired() {
        let timings = enforce(&[-1.0, f64::NAN, 1.0], 2.0);
        assert_eq!(spans(&timings), vec![(0.0, 0.0), (0.0, 1.0), (1.0, 2.0)]);
    }
}
