pub mod alert;
pub mod module;
pub mod run;
pub mod stats;

pub use alert::{AlertRecord, ChartSeries, ChartSpec, ChartType, Severity};
pub use module::{ModuleConfig, ModuleConfigPatch, ModuleMetadata, ModuleParams, ModulePriority};
pub use run::{AnalysisOutput, ModuleRunRecord, ModuleRunResult, ModuleRunStatus};
pub use stats::{CampaignDailyStat, OfferDailyStat, StatTotals};
