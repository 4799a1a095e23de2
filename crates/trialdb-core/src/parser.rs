//! Trial log parser.
//!
//! A trial log holds one outcome line per attempt. A `Failed` attempt
//! contributes a row of NaN. An `OK` attempt is followed, possibly after
//! unrelated output, by a `Statistics` header and exactly three lines:
//!
//! ```text
//! packets 100 retrans 5 loss 2%
//! frags 3 frames 10 bytes 1500
//! time 120 (30)
//! ```

use serde::Deserialize;

use crate::error::{TrialError, TrialResult};
use crate::sample::{SampleMatrix, SampleRow, FAILED_ROW, METRIC_COUNT};

const STATISTICS_MARKER: &str = "Statistics";
const OUTCOME_OK: &str = "OK";
const OUTCOME_FAILED: &str = "Failed";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Prefix identifying a per-attempt outcome line.
    pub outcome_marker: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            outcome_marker: "APP: pmpd".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scan,
    StatsWait,
    StatsRead,
}

#[derive(Debug, Clone, Default)]
pub struct LogParser {
    config: ParserConfig,
}

impl LogParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse one trial's log. `Ok(None)` means no attempt was recognised.
    pub fn parse(&self, text: &str) -> TrialResult<Option<SampleMatrix>> {
        let lines: Vec<&str> = text.lines().collect();
        let mut rows: Vec<SampleRow> = Vec::new();
        let mut state = State::Scan;
        let mut pos = 0;

        while pos < lines.len() {
            match state {
                State::Scan => {
                    if let Some(outcome) = self.outcome_of(lines[pos]) {
                        match outcome {
                            OUTCOME_FAILED => rows.push(FAILED_ROW),
                            OUTCOME_OK => state = State::StatsWait,
                            other => {
                                return Err(malformed(
                                    pos,
                                    format!("unknown attempt outcome '{other}'"),
                                ))
                            }
                        }
                    }
                    pos += 1;
                }
                State::StatsWait => {
                    if lines[pos].contains(STATISTICS_MARKER) {
                        state = State::StatsRead;
                    }
                    pos += 1;
                }
                State::StatsRead => {
                    let block = lines.get(pos..pos + 3).ok_or_else(|| {
                        malformed(pos, "statistics block cut short".into())
                    })?;
                    rows.push(parse_statistics(block, pos)?);
                    pos += 3;
                    state = State::Scan;
                }
            }
        }

        match state {
            State::Scan => Ok(SampleMatrix::from_rows(rows)),
            State::StatsWait => Err(malformed(
                lines.len(),
                "attempt reported OK but no statistics block followed".into(),
            )),
            State::StatsRead => Err(malformed(
                lines.len(),
                "statistics block cut short".into(),
            )),
        }
    }

    /// Last token of an outcome line, or `None` for any other line.
    fn outcome_of<'a>(&self, line: &'a str) -> Option<&'a str> {
        let rest = line.trim().strip_prefix(self.config.outcome_marker.as_str())?;
        rest.split_whitespace().last()
    }
}

/// Parse with the default outcome marker.
pub fn parse_trial_log(text: &str) -> TrialResult<Option<SampleMatrix>> {
    LogParser::default().parse(text)
}

fn parse_statistics(block: &[&str], start: usize) -> TrialResult<SampleRow> {
    let mut row = [0.0; METRIC_COUNT];

    // packets N retrans N loss N%
    let counts = alternating_values(block[0], start, 3)?;
    row[0] = number(counts[0], start)?;
    row[1] = number(counts[1], start)?;
    row[2] = number(counts[2].trim_end_matches('%'), start)?;

    // frags N frames N bytes N
    let volume = alternating_values(block[1], start + 1, 3)?;
    for (i, token) in volume.iter().enumerate() {
        row[3 + i] = number(token, start + 1)?;
    }

    // time N (N)
    let timing: Vec<&str> = block[2].split_whitespace().skip(1).take(2).collect();
    if timing.len() < 2 {
        return Err(malformed(start + 2, "expected two timing values".into()));
    }
    row[6] = number(timing[0], start + 2)?;
    row[7] = number(timing[1].trim_matches(|c| c == '(' || c == ')'), start + 2)?;

    Ok(row)
}

/// Values at odd token positions (`label value label value ...`).
fn alternating_values(line: &str, index: usize, count: usize) -> TrialResult<Vec<&str>> {
    let values: Vec<&str> = line.split_whitespace().skip(1).step_by(2).collect();
    if values.len() < count {
        return Err(malformed(
            index,
            format!("expected {count} values, found {}", values.len()),
        ));
    }
    Ok(values)
}

fn number(token: &str, index: usize) -> TrialResult<f64> {
    token
        .parse::<f64>()
        .map_err(|_| malformed(index, format!("'{token}' is not a number")))
}

/// `index` is zero-based; reported lines are one-based.
fn malformed(index: usize, reason: String) -> TrialError {
    TrialError::MalformedLog {
        line: index + 1,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OK_ATTEMPT: &str = "\
APP: pmpd OK
Timing: start 1200
APP: sending 1 packet strlen buf 64
Statistics
packets 100 retrans 5 loss 2%
frags 3 frames 10 bytes 1500
time 120 (30)
";

    #[test]
    fn test_single_ok_attempt() {
        let m = parse_trial_log(OK_ATTEMPT).unwrap().unwrap();
        assert_eq!(m.rows(), &[[100.0, 5.0, 2.0, 3.0, 10.0, 1500.0, 120.0, 30.0]]);
    }

    #[test]
    fn test_failed_attempt_without_statistics() {
        let m = parse_trial_log("APP: pmpd Failed\n").unwrap().unwrap();
        assert_eq!(m.row_count(), 1);
        assert!(m.rows()[0].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_no_outcome_lines_is_absent() {
        let log = "Timing: start 10\nStatistics\npackets 1 retrans 0 loss 0%\n";
        assert!(parse_trial_log(log).unwrap().is_none());
        assert!(parse_trial_log("").unwrap().is_none());
    }

    #[test]
    fn test_interleaved_attempts_keep_log_order() {
        let log = format!("APP: pmpd Failed\n{OK_ATTEMPT}APP: pmpd Failed\n{OK_ATTEMPT}");
        let m = parse_trial_log(&log).unwrap().unwrap();
        assert_eq!(m.row_count(), 4);
        assert!(m.rows()[0][0].is_nan());
        assert_eq!(m.rows()[1][0], 100.0);
        assert!(m.rows()[2][0].is_nan());
        assert_eq!(m.rows()[3][7], 30.0);
    }

    #[test]
    fn test_unknown_outcome_is_error() {
        let err = parse_trial_log("noise\nAPP: pmpd Maybe\n").unwrap_err();
        assert!(matches!(err, TrialError::MalformedLog { line: 2, .. }));
    }

    #[test]
    fn test_ok_without_statistics_is_error() {
        let err = parse_trial_log("APP: pmpd OK\nTiming: end 99\n").unwrap_err();
        assert!(matches!(err, TrialError::MalformedLog { .. }));
    }

    #[test]
    fn test_truncated_statistics_is_error() {
        let log = "APP: pmpd OK\nStatistics\npackets 100 retrans 5 loss 2%\n";
        let err = parse_trial_log(log).unwrap_err();
        assert!(matches!(err, TrialError::MalformedLog { line: 3, .. }));
    }

    #[test]
    fn test_statistics_as_last_line_is_error() {
        assert!(parse_trial_log("APP: pmpd OK\nStatistics").is_err());
    }

    #[test]
    fn test_non_numeric_value_is_error() {
        let log = "APP: pmpd OK\nStatistics\npackets many retrans 5 loss 2%\n\
                   frags 3 frames 10 bytes 1500\ntime 120 (30)\n";
        let err = parse_trial_log(log).unwrap_err();
        assert!(matches!(err, TrialError::MalformedLog { line: 3, .. }));
    }

    #[test]
    fn test_short_timing_line_is_error() {
        let log = "APP: pmpd OK\nStatistics\npackets 1 retrans 0 loss 0%\n\
                   frags 1 frames 1 bytes 64\ntime 120\n";
        let err = parse_trial_log(log).unwrap_err();
        assert!(matches!(err, TrialError::MalformedLog { line: 5, .. }));
    }

    #[test]
    fn test_custom_outcome_marker() {
        let parser = LogParser::new(ParserConfig {
            outcome_marker: "RESULT:".into(),
        });
        let m = parser.parse("RESULT: Failed\nAPP: pmpd Maybe\n").unwrap().unwrap();
        assert_eq!(m.row_count(), 1);
    }

    #[test]
    fn test_fractional_values() {
        let log = "APP: pmpd OK\nStatistics\npackets 10 retrans 1 loss 12.5%\n\
                   frags 0 frames 10 bytes 640\ntime 98.25 (4.5)\n";
        let m = parse_trial_log(log).unwrap().unwrap();
        assert_eq!(m.rows()[0][2], 12.5);
        assert_eq!(m.rows()[0][6], 98.25);
        assert_eq!(m.rows()[0][7], 4.5);
    }
}
