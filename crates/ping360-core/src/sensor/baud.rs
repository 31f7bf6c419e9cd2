//! Automatic baud rate detection
//!
//! The Ping360 locks onto whatever rate the host talks at, so the host has to
//! find one that survives the cable. Each candidate gets one round of
//! `DEVICE_INFORMATION` probes; the round is scored by how many frames failed
//! to parse plus how many probes went unanswered. The first candidate with a
//! perfect score ends the search, otherwise the last (slowest) candidate is
//! used.

use crate::protocol::ParserCounters;

/// Candidate rates, tried in this order; the last one is the fallback
pub const DEFAULT_BAUD_RATES: [u32; 6] = [3_000_000, 2_000_000, 921_600, 500_000, 230_400, 115_200];

/// Probes issued per candidate before it is scored
pub const PROBES_PER_ROUND: u32 = 20;

/// Result of one scoring round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundOutcome {
    /// Move the link to this rate and probe it
    pub switch_to: Option<u32>,
    /// Search finished; move the link to this rate for good
    pub committed: Option<u32>,
}

/// What to do after a probe was answered or timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStep {
    /// Keep probing the current candidate
    Probe,
    /// The round is over
    Round(RoundOutcome),
    /// No detection in progress
    Idle,
}

/// State of one detection session
#[derive(Debug, Clone)]
pub struct BaudDetector {
    candidates: Vec<u32>,
    current_index: usize,
    /// Score per candidate index; `None` until the candidate has been scored
    error_by_baud: Vec<Option<i64>>,
    parser_errors_at_start: u64,
    parsed_msgs_at_start: u64,
    probes_per_round: u32,
    probes_remaining: u32,
    active: bool,
}

impl BaudDetector {
    pub fn new(candidates: Vec<u32>, probes_per_round: u32) -> Self {
        let probes_per_round = probes_per_round.max(1);
        Self {
            error_by_baud: vec![None; candidates.len()],
            active: !candidates.is_empty(),
            candidates,
            current_index: 0,
            parser_errors_at_start: 0,
            parsed_msgs_at_start: 0,
            probes_per_round,
            probes_remaining: probes_per_round,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn candidates(&self) -> &[u32] {
        &self.candidates
    }

    /// Recorded score of the candidate at `index`
    pub fn score(&self, index: usize) -> Option<i64> {
        self.error_by_baud.get(index).copied().flatten()
    }

    /// Count one probe cycle; every `probes_per_round` cycles run a round
    pub fn probe(&mut self, counters: ParserCounters) -> ProbeStep {
        if !self.active {
            return ProbeStep::Idle;
        }
        if self.probes_remaining > 1 {
            self.probes_remaining -= 1;
            return ProbeStep::Probe;
        }
        self.probes_remaining = self.probes_per_round;
        ProbeStep::Round(self.round(counters))
    }

    /// Score the previous candidate and move on to the next one
    pub fn round(&mut self, counters: ParserCounters) -> RoundOutcome {
        let mut outcome = RoundOutcome::default();
        if !self.active {
            return outcome;
        }

        let len = self.candidates.len();
        if self.current_index < len {
            outcome.switch_to = Some(self.candidates[self.current_index]);
        }

        let mut last_score = None;
        if self.current_index != 0 {
            let failed = counters.errors as i64 - self.parser_errors_at_start as i64;
            let answered = counters.parsed as i64 - self.parsed_msgs_at_start as i64;
            let score = failed + (self.probes_per_round as i64 - answered);
            self.error_by_baud[self.current_index - 1] = Some(score);
            last_score = Some(score);
            tracing::debug!(
                "Baud rate {} scored {score}",
                self.candidates[self.current_index - 1]
            );
        }

        self.parser_errors_at_start = counters.errors;
        self.parsed_msgs_at_start = counters.parsed;
        self.current_index += 1;

        let exhausted = self.current_index >= len;
        if exhausted || last_score == Some(0) {
            // Earliest perfect candidate wins, not necessarily the one that just scored
            let index = if exhausted {
                len - 1
            } else {
                self.error_by_baud
                    .iter()
                    .position(|score| *score == Some(0))
                    .unwrap_or(len - 1)
            };
            outcome.committed = Some(self.candidates[index]);
            self.active = false;
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counters that make the previous round score exactly `score`
    fn counters_for(previous: ParserCounters, score: i64) -> ParserCounters {
        ParserCounters {
            parsed: (previous.parsed as i64 + PROBES_PER_ROUND as i64 - score) as u64,
            errors: previous.errors,
        }
    }

    #[test]
    fn test_commits_lowest_zero_candidate() {
        let rates = vec![9600, 19200, 38400, 57600, 115200];
        let mut detector = BaudDetector::new(rates, PROBES_PER_ROUND);
        let mut counters = ParserCounters::default();

        let first = detector.round(counters);
        assert_eq!(first, RoundOutcome { switch_to: Some(9600), committed: None });

        let mut outcome = RoundOutcome::default();
        for score in [3, 0, 0, 2, 1] {
            counters = counters_for(counters, score);
            outcome = detector.round(counters);
            if outcome.committed.is_some() {
                break;
            }
        }

        assert_eq!(outcome.switch_to, Some(38400));
        assert_eq!(outcome.committed, Some(19200));
        assert_eq!(detector.current_index(), 3);
        assert_eq!(detector.score(0), Some(3));
        assert_eq!(detector.score(1), Some(0));
        assert!(!detector.is_active());
    }

    #[test]
    fn test_exhaustion_falls_back_to_last() {
        let mut detector = BaudDetector::new(vec![921_600, 500_000, 115_200], PROBES_PER_ROUND);
        let mut counters = ParserCounters::default();
        detector.round(counters);

        counters = counters_for(counters, 4);
        assert_eq!(detector.round(counters).committed, None);

        counters = counters_for(counters, 7);
        let outcome = detector.round(counters);
        assert_eq!(outcome.switch_to, Some(115_200));
        assert_eq!(outcome.committed, Some(115_200));
    }

    #[test]
    fn test_parser_errors_count_against_candidate() {
        let mut detector = BaudDetector::new(vec![921_600, 115_200, 9600], PROBES_PER_ROUND);
        detector.round(ParserCounters::default());

        // Every probe answered, but two corrupt frames on the wire
        let outcome = detector.round(ParserCounters {
            parsed: PROBES_PER_ROUND as u64,
            errors: 2,
        });
        assert_eq!(outcome.committed, None);
        assert_eq!(detector.score(0), Some(2));
    }

    #[test]
    fn test_probe_countdown() {
        let mut detector = BaudDetector::new(vec![115_200, 9600], 3);
        let counters = ParserCounters::default();

        assert_eq!(detector.probe(counters), ProbeStep::Probe);
        assert_eq!(detector.probe(counters), ProbeStep::Probe);
        assert!(matches!(detector.probe(counters), ProbeStep::Round(_)));
        assert_eq!(detector.probe(counters), ProbeStep::Probe);
    }

    #[test]
    fn test_inactive_is_noop() {
        let mut detector = BaudDetector::new(Vec::new(), PROBES_PER_ROUND);
        assert!(!detector.is_active());
        assert_eq!(detector.probe(ParserCounters::default()), ProbeStep::Idle);
        assert_eq!(detector.round(ParserCounters::default()), RoundOutcome::default());
    }
}
