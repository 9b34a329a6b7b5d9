//! Stderr classification for a running remux process (spec.md §4.5). Runs as
//! a dedicated task reading the child's stderr line-by-line, matching the
//! teacher's pattern of a background task owning one I/O stream per
//! subprocess (`other_examples/.../streaming-process.rs`'s stderr capture).

use crate::config::RecoveryConfig;

/// One classified signal extracted from a stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrSignal {
    DvError,
    HdrMetadataError,
    BitstreamError,
    InputError,
}

const IO_ERROR_MARKERS: &[&str] = &[
    "pipe closed",
    "broken pipe",
    "connection reset",
    "http error 4",
    "http error 5",
    "server returned 4",
    "server returned 5",
    "i/o timeout",
    "timed out",
];

/// Classify a single stderr line, if it matches a known failure pattern.
/// `"end of file"` alone is routine at stream end; it only counts as an
/// input error when not immediately followed by ffmpeg's own `"Discarding"`
/// recovery note (checked by the caller, since that spans two lines).
pub fn classify_line(line: &str) -> Option<StderrSignal> {
    let lower = line.to_lowercase();

    if lower.contains("could not parse rpu") || lower.contains("dolby vision rpu") {
        return Some(StderrSignal::DvError);
    }
    if lower.contains("hevc_metadata") && (lower.contains("error") || lower.contains("fail")) {
        return Some(StderrSignal::HdrMetadataError);
    }
    if lower.contains("error applying bitstream filters") {
        return Some(StderrSignal::BitstreamError);
    }
    if IO_ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(StderrSignal::InputError);
    }
    if lower.contains("end of file") && !lower.contains("discarding") {
        return Some(StderrSignal::InputError);
    }

    None
}

/// Accumulates classified signals across a run and decides when a threshold
/// has been crossed (spec.md §4.5: "≥ 3 occurrences").
#[derive(Debug, Default)]
pub struct SignalCounters {
    pub dv_errors: u32,
    pub hdr_errors: u32,
    pub bitstream_errors: u32,
    pub input_error_seen: bool,
}

/// Outcome of feeding one more classified line into the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierOutcome {
    /// Keep reading; no threshold crossed yet.
    Continue,
    /// Kill the process: `≥3` DV RPU parse failures.
    KillForDv,
    /// Kill the process: `≥3` hevc_metadata filter failures.
    KillForHdr,
    /// Kill the process: `≥3` bitstream filter errors — unrecoverable.
    KillForBitstream,
    /// Kill the process: an I/O-shaped error signals a transient input failure.
    KillForInputError,
}

impl SignalCounters {
    pub fn record(&mut self, signal: StderrSignal, config: &RecoveryConfig) -> ClassifierOutcome {
        match signal {
            StderrSignal::DvError => {
                self.dv_errors += 1;
                if self.dv_errors >= config.dv_error_threshold {
                    return ClassifierOutcome::KillForDv;
                }
            }
            StderrSignal::HdrMetadataError => {
                self.hdr_errors += 1;
                if self.hdr_errors >= config.hdr_error_threshold {
                    return ClassifierOutcome::KillForHdr;
                }
            }
            StderrSignal::BitstreamError => {
                self.bitstream_errors += 1;
                if self.bitstream_errors >= config.bitstream_error_threshold {
                    return ClassifierOutcome::KillForBitstream;
                }
            }
            StderrSignal::InputError => {
                self.input_error_seen = true;
                return ClassifierOutcome::KillForInputError;
            }
        }
        ClassifierOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_dv_failures_trigger_kill() {
        let config = RecoveryConfig::default();
        let mut counters = SignalCounters::default();
        assert_eq!(
            counters.record(StderrSignal::DvError, &config),
            ClassifierOutcome::Continue
        );
        assert_eq!(
            counters.record(StderrSignal::DvError, &config),
            ClassifierOutcome::Continue
        );
        assert_eq!(
            counters.record(StderrSignal::DvError, &config),
            ClassifierOutcome::KillForDv
        );
    }

    #[test]
    fn single_io_error_line_kills_immediately() {
        let config = RecoveryConfig::default();
        let mut counters = SignalCounters::default();
        assert_eq!(
            counters.record(StderrSignal::InputError, &config),
            ClassifierOutcome::KillForInputError
        );
    }

    #[test]
    fn classify_detects_bitstream_filter_errors() {
        assert_eq!(
            classify_line("Error applying bitstream filters"),
            Some(StderrSignal::BitstreamError)
        );
    }

    #[test]
    fn end_of_file_without_discarding_is_input_error() {
        assert_eq!(
            classify_line("some: End of file"),
            Some(StderrSignal::InputError)
        );
    }

    #[test]
    fn end_of_file_with_discarding_is_not_an_error() {
        assert_eq!(classify_line("End of file, Discarding remaining data"), None);
    }

    #[test]
    fn unrelated_lines_classify_as_none() {
        assert_eq!(classify_line("frame=  120 fps=30 q=-1.0"), None);
    }
}
