pub mod attempt;
pub mod entry;
pub mod staged;

pub use attempt::{Attempt, AttemptList, AttemptOutcome};
pub use entry::{Entry, EntryStatus, ExplanationLevel, ExplanationSet};
pub use staged::StagedImage;
