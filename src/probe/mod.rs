//! Probe module
//!
//! One probe = one instrumented HTTP exchange with phase-level timings.
//!
//! ```text
//! Prober ──▶ Connector (DNS, connect) ──▶ TracedStream (write, first byte)
//!    │                 │                          │
//!    │                 └──────── TraceRecorder ◀──┘
//!    ▼
//! DerivedDurations ──▶ ProbeOutcome
//! ```

mod durations;
mod executor;
mod io;
mod trace;

pub use durations::DerivedDurations;
pub use executor::{
    Connector, ProbeConfig, ProbeOutcome, Prober, TcpConnector, DEFAULT_LOCAL_HOST, DEFAULT_PORT,
    DEFAULT_PROBE_TIMEOUT,
};
pub use io::TracedStream;
pub use trace::{TraceEvent, TraceRecord, TraceRecorder};
