//! Data models for ivrm-explorer

pub mod call_record;
pub mod dial;
pub mod menu_option;
pub mod queue_item;
pub mod sequence;
pub mod target;

pub use call_record::CallAttemptRecord;
pub use dial::{DialPayload, DialStep, Digit, DigitPath};
pub use menu_option::{DigitMap, DigitMapEntry, MenuOption, OptionSource};
pub use queue_item::{QueueItem, QueueStatus};
pub use sequence::{Sequence, SequenceCandidate};
pub use target::{Target, TargetStatus};
