//! Confidence score for a finished analysis.
//!
//! ```text
//! score = 60 + min(history × 5, 20) + 3 × priced_web_results + (5 if deep)
//! ```
//!
//! capped at 95. The score never reaches 100: every verdict is an estimate.

const BASE: u32 = 60;
const PER_HISTORY: u32 = 5;
const HISTORY_CAP: u32 = 20;
const PER_PRICED_RESULT: u32 = 3;
const DEEP_BONUS: u32 = 5;
const CEILING: u32 = 95;

/// Score in `60..=95`.
pub fn score(history_len: usize, priced_results: usize, deep: bool) -> u8 {
    let history = (history_len as u32).saturating_mul(PER_HISTORY).min(HISTORY_CAP);
    let web = (priced_results as u32).saturating_mul(PER_PRICED_RESULT);
    let deep = if deep { DEEP_BONUS } else { 0 };
    BASE.saturating_add(history)
        .saturating_add(web)
        .saturating_add(deep)
        .min(CEILING) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(score(0, 0, false), 60);
        assert_eq!(score(2, 0, false), 70);
        assert_eq!(score(10, 0, false), 80);
        assert_eq!(score(0, 3, false), 69);
        assert_eq!(score(0, 0, true), 65);
        assert_eq!(score(1, 1, true), 73);
    }

    #[test]
    fn test_capped_at_95() {
        assert_eq!(score(100, 100, true), 95);
        assert_eq!(score(usize::MAX, usize::MAX, true), 95);
    }

    #[test]
    fn test_monotone_in_every_input() {
        for h in 0..10 {
            for w in 0..12 {
                let s = score(h, w, false);
                assert!(score(h + 1, w, false) >= s);
                assert!(score(h, w + 1, false) >= s);
                assert!(score(h, w, true) >= s);
                assert!((60..=95).contains(&s));
            }
        }
    }
}
