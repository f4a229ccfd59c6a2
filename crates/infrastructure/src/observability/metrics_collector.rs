//! Metrics collector for module runs and the scheduler
//!
//! 只负责记录，导出器由宿主进程自行安装；未安装时所有记录都是空操作。

use analytics_core::models::ModuleRunResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Metrics collector for the analytics framework
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    enabled: bool,
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            describe_counter!("module_runs_total", "模块运行次数");
            describe_histogram!("module_run_duration_seconds", "模块运行耗时");
            describe_counter!("module_cache_hits_total", "分析结果缓存命中次数");
            describe_counter!("scheduler_jobs_misfired_total", "超过宽限期而跳过的调度");
            describe_counter!("scheduler_jobs_skipped_total", "因上次运行未结束而跳过的调度");
        }
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a finished module run
    pub fn record_run(&self, result: &ModuleRunResult) {
        if !self.enabled {
            return;
        }
        counter!(
            "module_runs_total",
            "module" => result.module_id.clone(),
            "status" => result.status.as_str()
        )
        .increment(1);
        histogram!("module_run_duration_seconds", "module" => result.module_id.clone())
            .record(result.duration_seconds);
    }

    pub fn record_cache_hit(&self, module_id: &str) {
        if self.enabled {
            counter!("module_cache_hits_total", "module" => module_id.to_string()).increment(1);
        }
    }

    pub fn record_misfire(&self, job_id: &str) {
        if self.enabled {
            counter!("scheduler_jobs_misfired_total", "job" => job_id.to_string()).increment(1);
        }
    }

    pub fn record_skipped(&self, job_id: &str) {
        if self.enabled {
            counter!("scheduler_jobs_skipped_total", "job" => job_id.to_string()).increment(1);
        }
    }
}
