//! Planwise Conflict - Conflict detection and resolution
//!
//! Provides:
//! - Version-token based classification of pulled remote state
//! - Resolution planning for explicit, caller-chosen strategies
//!
//! Both halves are pure: they read and produce domain values and leave all
//! I/O to the reconciliation engine in `planwise-sync`.

pub mod detector;
pub mod error;
pub mod resolver;

pub use detector::{ConflictDetector, DetectionResult};
pub use error::ConflictError;
pub use resolver::{ConflictResolver, ResolutionPlan};
