//! Domain types for spinneret: analysis reports, field specs, program
//! versions, and execution outcomes.

pub mod analysis;
pub mod error;
pub mod fields;
pub mod outcome;
pub mod program;

pub use analysis::{AnalysisReport, DataRegion, NavigationStrategy};
pub use error::{Result, SpinneretError};
pub use fields::{Field, FieldKind, FieldSpec};
pub use outcome::{classify_outcome, field_coverage, ExecutionResult, Outcome};
pub use program::{spider_name_from_url, GeneratedProgram, RepairRequest};
