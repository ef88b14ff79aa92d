//! Agent capabilities backing the pipeline.
//!
//! Each capability is a trait with one network-backed implementation:
//!
//! - [`navigator`]   — `SiteAnalyzer`: browse the target and emit an
//!   [`AnalysisReport`](crate::domain::AnalysisReport)
//! - [`synthesizer`] — `SpiderSynthesizer`: turn report + fields (+ repair
//!   feedback) into a [`GeneratedProgram`](crate::domain::GeneratedProgram)
//! - [`advisor`]     — `RepairAdvisor`: turn diagnostics into a correction
//!   directive

pub mod advisor;
pub mod navigator;
pub mod synthesizer;

pub use advisor::{HeuristicAdvisor, LlmAdvisor, RepairAdvisor};
pub use navigator::{LlmNavigator, NavigatorConfig, SiteAnalyzer};
pub use synthesizer::{LlmSynthesizer, SpiderSynthesizer};
