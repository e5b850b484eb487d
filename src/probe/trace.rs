//! Trace Event Recorder
//!
//! Captures a timestamp at each lifecycle point of a single outbound probe
//! request. The recorder is shared between the connector (DNS and connect
//! events), the traced stream (write and first-byte events) and the
//! executor, so it lives behind an `Arc` with a short internal lock.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::debug;

/// Lifecycle points of one probe request, in the order they occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// Connection acquisition started
    GetConn,
    DnsStart,
    DnsDone,
    ConnectStart,
    ConnectDone,
    /// Connection ready for the request
    GotConn,
    /// Request fully written
    WroteRequest,
    GotFirstResponseByte,
}

/// Raw timestamps for one probe. Unreached events stay `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceRecord {
    pub get_conn: Option<Instant>,
    pub dns_start: Option<Instant>,
    pub dns_done: Option<Instant>,
    pub connect_start: Option<Instant>,
    pub connect_done: Option<Instant>,
    pub got_conn: Option<Instant>,
    pub wrote_request: Option<Instant>,
    pub first_response_byte: Option<Instant>,
}

impl TraceRecord {
    fn slot(&mut self, event: TraceEvent) -> &mut Option<Instant> {
        match event {
            TraceEvent::GetConn => &mut self.get_conn,
            TraceEvent::DnsStart => &mut self.dns_start,
            TraceEvent::DnsDone => &mut self.dns_done,
            TraceEvent::ConnectStart => &mut self.connect_start,
            TraceEvent::ConnectDone => &mut self.connect_done,
            TraceEvent::GotConn => &mut self.got_conn,
            TraceEvent::WroteRequest => &mut self.wrote_request,
            TraceEvent::GotFirstResponseByte => &mut self.first_response_byte,
        }
    }

    pub fn get(&self, event: TraceEvent) -> Option<Instant> {
        match event {
            TraceEvent::GetConn => self.get_conn,
            TraceEvent::DnsStart => self.dns_start,
            TraceEvent::DnsDone => self.dns_done,
            TraceEvent::ConnectStart => self.connect_start,
            TraceEvent::ConnectDone => self.connect_done,
            TraceEvent::GotConn => self.got_conn,
            TraceEvent::WroteRequest => self.wrote_request,
            TraceEvent::GotFirstResponseByte => self.first_response_byte,
        }
    }
}

/// Records trace events for exactly one probe.
#[derive(Debug)]
pub struct TraceRecorder {
    record: Mutex<TraceRecord>,
}

impl TraceRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            record: Mutex::new(TraceRecord::default()),
        })
    }

    /// Record `event` at the current instant.
    pub fn record(&self, event: TraceEvent) {
        self.record_at(event, Instant::now());
    }

    /// Record `event` at `at`.
    ///
    /// Every event keeps its first timestamp except `ConnectDone`, which
    /// keeps the last so a failed attempt followed by a good one measures
    /// from the first dial to the established connection.
    pub fn record_at(&self, event: TraceEvent, at: Instant) {
        let mut record = self.record.lock();
        let slot = record.slot(event);
        if slot.is_some() && event != TraceEvent::ConnectDone {
            return;
        }
        *slot = Some(at);
        let snapshot = *record;
        drop(record);

        log_phase(event, &snapshot);
    }

    /// Copy of the timestamps recorded so far.
    pub fn snapshot(&self) -> TraceRecord {
        *self.record.lock()
    }
}

fn log_phase(event: TraceEvent, r: &TraceRecord) {
    let since = |end: Option<Instant>, start: Option<Instant>| match (end, start) {
        (Some(end), Some(start)) => end.saturating_duration_since(start),
        _ => Default::default(),
    };

    match event {
        TraceEvent::GetConn => debug!("connection start"),
        TraceEvent::DnsDone => {
            debug!(latency = ?since(r.dns_done, r.dns_start), "latency dns")
        }
        TraceEvent::ConnectDone => {
            debug!(latency = ?since(r.connect_done, r.connect_start), "latency connection")
        }
        TraceEvent::WroteRequest => {
            debug!(latency = ?since(r.wrote_request, r.got_conn), "latency write request")
        }
        TraceEvent::GotFirstResponseByte => {
            debug!(
                latency = ?since(r.first_response_byte, r.got_conn),
                "latency server processing"
            )
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_events_are_recorded_once() {
        let recorder = TraceRecorder::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(5);

        recorder.record_at(TraceEvent::GetConn, t0);
        recorder.record_at(TraceEvent::GetConn, t1);

        assert_eq!(recorder.snapshot().get_conn, Some(t0));
    }

    #[test]
    fn test_connect_done_keeps_last() {
        let recorder = TraceRecorder::new();
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(3);

        recorder.record_at(TraceEvent::ConnectStart, t0);
        recorder.record_at(TraceEvent::ConnectDone, t0);
        recorder.record_at(TraceEvent::ConnectStart, t1);
        recorder.record_at(TraceEvent::ConnectDone, t1);

        let record = recorder.snapshot();
        assert_eq!(record.connect_start, Some(t0));
        assert_eq!(record.connect_done, Some(t1));
    }

    #[test]
    fn test_dns_events_are_traced() {
        let recorder = TraceRecorder::new();
        recorder.record(TraceEvent::DnsStart);
        recorder.record(TraceEvent::DnsDone);

        let record = recorder.snapshot();
        assert!(record.dns_start.is_some());
        assert!(record.dns_done >= record.dns_start);
    }

    #[test]
    fn test_unreached_events_stay_unset() {
        let recorder = TraceRecorder::new();
        recorder.record(TraceEvent::GetConn);
        recorder.record(TraceEvent::DnsStart);

        let record = recorder.snapshot();
        assert!(record.get(TraceEvent::GetConn).is_some());
        assert!(record.get(TraceEvent::ConnectStart).is_none());
        assert!(record.get(TraceEvent::GotFirstResponseByte).is_none());
    }
}
