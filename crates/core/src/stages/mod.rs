//! The four pipeline stages. Each one owns only the collaborators it calls.

pub mod analysis;
pub mod media;
pub mod narration;
pub mod scripting;

pub use analysis::AnalysisStage;
pub use media::MediaStage;
pub use narration::NarrationStage;
pub use scripting::ScriptingStage;
