//! Feedback handling for Teamflow artifacts.
//!
//! Free-text feedback on a finished artifact is classified into a
//! [`ChangeRequest`] by the [`FeedbackRouter`], and the [`TargetedUpdater`]
//! then regenerates only the affected field(s), mirroring every change into
//! the rendered content.

/// Change types and change requests.
pub mod change;
/// Heuristic feedback classifier.
pub mod router;
/// Field-level artifact regeneration.
pub mod updater;

pub use change::{ChangeRequest, ChangeType};
pub use router::{FeedbackRouter, ScoringWeights};
pub use updater::{TargetedUpdater, UpdateOutcome};
