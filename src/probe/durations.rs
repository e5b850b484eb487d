//! Duration Deriver
//!
//! Turns a completed trace record into the five phase durations. A phase
//! whose bounding timestamps were never recorded is reported as zero.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::trace::TraceRecord;

/// Phase durations of one completed probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DerivedDurations {
    pub dns: Duration,
    pub connect: Duration,
    /// First response byte minus connection obtained
    pub server_processing: Duration,
    /// Response fully read minus first response byte
    pub content_transfer: Duration,
    /// Response fully read minus connection acquisition start
    pub total: Duration,
}

fn span(start: Option<Instant>, end: Option<Instant>) -> Duration {
    match (start, end) {
        (Some(start), Some(end)) => end.saturating_duration_since(start),
        _ => Duration::ZERO,
    }
}

impl DerivedDurations {
    /// Derive durations from `record`, with `completed_at` marking the end
    /// of content transfer.
    pub fn derive(record: &TraceRecord, completed_at: Instant) -> Self {
        let end = Some(completed_at);
        Self {
            dns: span(record.dns_start, record.dns_done),
            connect: span(record.connect_start, record.connect_done),
            server_processing: span(record.got_conn, record.first_response_byte),
            content_transfer: span(record.first_response_byte, end),
            total: span(record.get_conn, end),
        }
    }

    /// The same durations with the DNS phase zeroed.
    pub fn without_dns(self) -> Self {
        Self {
            dns: Duration::ZERO,
            ..self
        }
    }

    /// Total latency in whole milliseconds, truncated.
    pub fn total_ms(&self) -> u64 {
        self.total.as_millis() as u64
    }

    /// DNS duration in whole microseconds, truncated.
    pub fn dns_us(&self) -> u64 {
        self.dns.as_micros() as u64
    }

    pub fn connect_us(&self) -> u64 {
        self.connect.as_micros() as u64
    }

    pub fn server_processing_us(&self) -> u64 {
        self.server_processing.as_micros() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn full_record(t0: Instant) -> TraceRecord {
        TraceRecord {
            get_conn: Some(t0),
            dns_start: Some(t0 + ms(1)),
            dns_done: Some(t0 + ms(3)),
            connect_start: Some(t0 + ms(3)),
            connect_done: Some(t0 + ms(7)),
            got_conn: Some(t0 + ms(7)),
            wrote_request: Some(t0 + ms(8)),
            first_response_byte: Some(t0 + ms(20)),
        }
    }

    #[test]
    fn test_derive_full_record() {
        let t0 = Instant::now();
        let d = DerivedDurations::derive(&full_record(t0), t0 + ms(25));

        assert_eq!(d.dns, ms(2));
        assert_eq!(d.connect, ms(4));
        assert_eq!(d.server_processing, ms(13));
        assert_eq!(d.content_transfer, ms(5));
        assert_eq!(d.total, ms(25));
    }

    #[test]
    fn test_without_dns_keeps_other_phases() {
        let t0 = Instant::now();
        let d = DerivedDurations::derive(&full_record(t0), t0 + ms(25)).without_dns();

        assert_eq!(d.dns, Duration::ZERO);
        assert_eq!(d.dns_us(), 0);
        assert_eq!(d.connect, ms(4));
        assert_eq!(d.total, ms(25));
    }

    #[test]
    fn test_missing_timestamps_are_zero() {
        let t0 = Instant::now();
        let record = TraceRecord {
            get_conn: Some(t0),
            ..Default::default()
        };
        let d = DerivedDurations::derive(&record, t0 + ms(9));

        assert_eq!(d.dns, Duration::ZERO);
        assert_eq!(d.connect, Duration::ZERO);
        assert_eq!(d.server_processing, Duration::ZERO);
        assert_eq!(d.content_transfer, Duration::ZERO);
        assert_eq!(d.total, ms(9));
    }

    #[test]
    fn test_empty_record_is_all_zero() {
        let d = DerivedDurations::derive(&TraceRecord::default(), Instant::now());
        assert_eq!(d, DerivedDurations::default());
    }

    #[test]
    fn test_unit_truncation() {
        let d = DerivedDurations {
            dns: Duration::from_nanos(999),
            connect: Duration::from_micros(1500),
            server_processing: Duration::from_nanos(2_999),
            content_transfer: Duration::ZERO,
            total: Duration::from_micros(1_999),
        };

        assert_eq!(d.dns_us(), 0);
        assert_eq!(d.connect_us(), 1500);
        assert_eq!(d.server_processing_us(), 2);
        assert_eq!(d.total_ms(), 1);
    }

    proptest! {
        #[test]
        fn prop_total_bounds_phases(
            gaps in proptest::collection::vec(0u64..10_000, 8)
        ) {
            let t0 = Instant::now();
            let mut at = t0;
            let mut stamps = Vec::with_capacity(8);
            for gap in &gaps {
                at += Duration::from_micros(*gap);
                stamps.push(Some(at));
            }
            let record = TraceRecord {
                get_conn: stamps[0],
                dns_start: stamps[1],
                dns_done: stamps[2],
                connect_start: stamps[3],
                connect_done: stamps[4],
                got_conn: stamps[5],
                wrote_request: stamps[6],
                first_response_byte: stamps[7],
            };
            let d = DerivedDurations::derive(&record, at + Duration::from_micros(gaps[0]));

            prop_assert!(d.total >= d.server_processing);
            prop_assert!(d.total >= d.dns + d.connect);
            prop_assert!(d.total >= d.server_processing + d.content_transfer);
        }
    }
}
