//! Run-range expressions.
//!
//! ```text
//! expr := term (',' term)*
//! term := INT | INT '-' INT
//! ```
//!
//! `a-b` expands to every run from `a` to `b` inclusive. Terms are
//! concatenated and the result is sorted ascending. Runs named by more than
//! one term are kept as many times as they are named.

use super::RunId;
use crate::error::RangeError;

/// Returns true if `value` should be read as a run or run range rather than
/// as a command name.
pub fn looks_like_range(value: &str) -> bool {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    value.contains(',') || value.contains('-')
}

/// Expands a run-range expression into an ascending list of runs.
pub fn parse_range(expr: &str) -> Result<Vec<RunId>, RangeError> {
    if expr.trim().is_empty() {
        return Err(RangeError::Empty);
    }

    let mut runs = Vec::new();
    for term in expr.split(',') {
        expand_term(term, &mut runs)?;
    }

    runs.sort();
    Ok(runs)
}

fn expand_term(term: &str, out: &mut Vec<RunId>) -> Result<(), RangeError> {
    let Some((start, stop)) = term.split_once('-') else {
        out.push(term.parse()?);
        return Ok(());
    };

    let start: RunId = start.parse()?;
    if stop.trim().is_empty() {
        return Err(RangeError::OpenEnded(term.trim().to_string()));
    }
    let stop: RunId = stop.parse()?;
    if stop < start {
        return Err(RangeError::Inverted {
            start: start.to_string(),
            stop: stop.to_string(),
        });
    }

    out.extend((start.number()..=stop.number()).map(RunId::new));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(runs: &[RunId]) -> Vec<String> {
        runs.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_inclusive_range() {
        let runs = parse_range("20001-20003").unwrap();
        assert_eq!(names(&runs), vec!["020001", "020002", "020003"]);
    }

    #[test]
    fn test_comma_joined_terms() {
        let runs = parse_range("20001,20005-20006").unwrap();
        assert_eq!(names(&runs), vec!["020001", "020005", "020006"]);
    }

    #[test]
    fn test_single_run() {
        assert_eq!(names(&parse_range("20005").unwrap()), vec!["020005"]);
    }

    #[test]
    fn test_degenerate_range_is_one_run() {
        assert_eq!(names(&parse_range("20005-20005").unwrap()), vec!["020005"]);
    }

    #[test]
    fn test_terms_are_sorted() {
        let runs = parse_range("20010,20002-20003").unwrap();
        assert_eq!(names(&runs), vec!["020002", "020003", "020010"]);
    }

    #[test]
    fn test_overlapping_terms_keep_duplicates() {
        let runs = parse_range("20001-20002,20002").unwrap();
        assert_eq!(names(&runs), vec!["020001", "020002", "020002"]);
    }

    #[test]
    fn test_whitespace_around_tokens() {
        let runs = parse_range(" 20001 , 20003 ").unwrap();
        assert_eq!(names(&runs), vec!["020001", "020003"]);
    }

    #[test]
    fn test_non_numeric_token_is_rejected() {
        assert!(matches!(
            parse_range("20001,abc"),
            Err(RangeError::InvalidToken(_))
        ));
        assert!(matches!(parse_range("x-3"), Err(RangeError::InvalidToken(_))));
        assert!(matches!(parse_range("1-2-3"), Err(RangeError::InvalidToken(_))));
    }

    #[test]
    fn test_runs_wider_than_six_digits_are_rejected() {
        assert!(matches!(
            parse_range("999999-1000000"),
            Err(RangeError::InvalidToken(_))
        ));
        assert!(matches!(
            parse_range("0-4000000000"),
            Err(RangeError::InvalidToken(_))
        ));
        assert_eq!(names(&parse_range("999998-999999").unwrap()), vec!["999998", "999999"]);
    }

    #[test]
    fn test_open_ended_range_is_rejected() {
        assert!(matches!(parse_range("20001-"), Err(RangeError::OpenEnded(_))));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        assert!(matches!(
            parse_range("20003-20001"),
            Err(RangeError::Inverted { .. })
        ));
    }

    #[test]
    fn test_empty_expression() {
        assert!(matches!(parse_range(""), Err(RangeError::Empty)));
        assert!(matches!(parse_range("20001,"), Err(RangeError::InvalidToken(_))));
    }

    #[test]
    fn test_every_range_expands_to_its_span() {
        for (a, b) in [(1u32, 1u32), (20001, 20010), (49990, 50001)] {
            let runs = parse_range(&format!("{}-{}", a, b)).unwrap();
            assert_eq!(runs.len() as u32, b - a + 1);
            assert_eq!(runs.first().unwrap().number(), a);
            assert_eq!(runs.last().unwrap().number(), b);
            assert!(runs.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_looks_like_range() {
        assert!(looks_like_range("20001"));
        assert!(looks_like_range("20001-20005"));
        assert!(looks_like_range("20001,20003"));
        assert!(!looks_like_range("status"));
        assert!(!looks_like_range(""));
    }
}
