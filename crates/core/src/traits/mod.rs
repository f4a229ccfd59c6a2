pub mod alert_sink;
pub mod analysis_module;
pub mod repository;

pub use alert_sink::AlertSink;
pub use analysis_module::{
    AnalysisContext, AnalysisModule, ModuleFactory, ParamMetadata, ParamType, SeverityMetadata,
    SeverityThreshold,
};
pub use repository::{ModuleConfigRepository, ModuleRunRepository, StatsRepository};
