pub mod engine;
pub mod recorder;
pub mod selector;

pub use engine::{Clock, EngineSettings, ManualExecution, TickEngine};
pub use recorder::ResultRecorder;
pub use selector::DueTaskSelector;
