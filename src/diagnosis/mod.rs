//! Compatibility diagnosis: session state, resistance correlation,
//! classification and reporting.

pub mod classifier;
pub mod correlator;
pub mod probe;
pub mod record;
pub mod report;
pub mod session;

pub use classifier::{classify, Classification, Verdict};
pub use correlator::{CorrelatorState, ResistanceChange, ResistanceCorrelator};
pub use probe::{DeviceProbe, ProbePath};
pub use record::{Anomaly, CommandOutcome, DeviceIdentity, ObservationRecord};
pub use report::{CompatibilityReport, ReportError};
pub use session::{run_session, ProbeEvent, ProbeSession};
