pub mod error;
pub mod event;
pub mod recorder;

pub use error::UsageError;
pub use event::{month_key, MonthlyUsage, UsageDelta, UsageEvent, UsageEventInput};
pub use recorder::{RecordedUsage, UsageRecorder};
