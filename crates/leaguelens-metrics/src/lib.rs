// Library root: the derived-metrics engine (lineup efficiency, expected
// wins, acquisition ROI, playoff odds) and the reports built on top of it.

pub mod assignment;
pub mod eligibility;
pub mod error;
pub mod expected_wins;
pub mod highlights;
pub mod history;
pub mod lineup;
pub mod pipeline;
pub mod playoffs;
pub mod roi;
pub mod standings;

pub use error::{Cancellation, EngineError, EngineResult};
pub use pipeline::{CycleReport, Engine};
pub use playoffs::SimulationOutcome;
