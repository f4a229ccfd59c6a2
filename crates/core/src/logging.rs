//! Structured logging utilities
//!
//! 模块注册、运行和调度各生命周期事件的结构化日志。

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, error, info, warn};

use crate::models::{ModuleMetadata, ModuleRunResult, ModuleRunStatus};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_module_registered(metadata: &ModuleMetadata) {
        debug!(
            event = "module_registered",
            module.id = %metadata.id,
            module.category = %metadata.category,
            module.version = %metadata.version,
            "Module registered"
        );
    }

    pub fn log_run_started(module_id: &str, scheduled: bool, use_cache: bool) {
        info!(
            event = "module_run_started",
            module.id = module_id,
            run.scheduled = scheduled,
            run.use_cache = use_cache,
            "Module run started"
        );
    }

    pub fn log_run_finished(result: &ModuleRunResult) {
        match result.status {
            ModuleRunStatus::Success => info!(
                event = "module_run_finished",
                module.id = %result.module_id,
                run.status = result.status.as_str(),
                run.duration_seconds = result.duration_seconds,
                run.used_cache = result.used_cache,
                run.alert_count = result.alerts.len(),
                "Module run finished"
            ),
            ModuleRunStatus::Failed | ModuleRunStatus::Timeout => error!(
                event = "module_run_failed",
                module.id = %result.module_id,
                run.status = result.status.as_str(),
                run.duration_seconds = result.duration_seconds,
                error = result.error.as_deref().unwrap_or_default(),
                "Module run failed"
            ),
        }
    }

    pub fn log_cache_hit(module_id: &str, cached_at: DateTime<Utc>, ttl_seconds: u64) {
        debug!(
            event = "module_cache_hit",
            module.id = module_id,
            cache.cached_at = %cached_at,
            cache.ttl_seconds = ttl_seconds,
            "Serving cached analysis result"
        );
    }

    pub fn log_derivation_failed(module_id: &str, step: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "module_derivation_failed",
            module.id = module_id,
            derivation.step = step,
            error = %error,
            "Derivation step failed, using empty output"
        );
    }

    pub fn log_job_scheduled(job_id: &str, schedule: &str, next_run_time: DateTime<FixedOffset>) {
        info!(
            event = "job_scheduled",
            job.id = job_id,
            job.schedule = schedule,
            job.next_run_time = %next_run_time,
            "Scheduled job added"
        );
    }

    pub fn log_job_removed(job_id: &str) {
        info!(event = "job_removed", job.id = job_id, "Scheduled job removed");
    }

    pub fn log_job_misfired(job_id: &str, lateness_seconds: i64, grace_seconds: u64) {
        warn!(
            event = "job_misfired",
            job.id = job_id,
            job.lateness_seconds = lateness_seconds,
            job.misfire_grace_seconds = grace_seconds,
            "Run time missed beyond grace period, skipping"
        );
    }

    pub fn log_job_max_instances(job_id: &str, max_instances: usize) {
        warn!(
            event = "job_max_instances_reached",
            job.id = job_id,
            job.max_instances = max_instances,
            "Previous run still active, skipping this tick"
        );
    }

    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::fmt::Display) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error = %error,
            "System error occurred"
        );
    }
}
