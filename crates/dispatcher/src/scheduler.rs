use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use analytics_core::{
    AnalyticsError, AnalyticsResult, ConfigurationStore, SchedulerConfig, StructuredLogger,
};
use analytics_infrastructure::MetricsCollector;

use crate::cron_utils::CronScheduler;
use crate::runner::ModuleRunner;

/// 同一模块同时运行的定时任务实例上限
pub const MAX_INSTANCES: usize = 1;

/// 没有任务时调度循环的最长休眠时间
const IDLE_WAIT: Duration = Duration::from_secs(60);

pub fn job_id(module_id: &str) -> String {
    format!("module_{module_id}")
}

/// 对外展示的定时任务信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub module_id: String,
    pub next_run_time: Option<DateTime<FixedOffset>>,
    pub trigger_description: String,
    pub max_instances: usize,
    pub misfire_grace_seconds: u64,
}

struct ScheduledJob {
    id: String,
    module_id: String,
    name: String,
    trigger: CronScheduler,
    next_run_time: Option<DateTime<Utc>>,
    /// 正在运行（含排队等待工作槽）的实例数
    instances: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct DueJob {
    id: String,
    module_id: String,
    run_time: DateTime<Utc>,
    instances: Arc<AtomicUsize>,
}

/// 运行实例计数，任务结束（包括 panic）时自动归还
struct InstanceGuard(Arc<AtomicUsize>);

impl InstanceGuard {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct DispatcherHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

struct SchedulerShared {
    runner: Arc<ModuleRunner>,
    config_store: Arc<ConfigurationStore>,
    settings: SchedulerConfig,
    timezone: FixedOffset,
    jobs: RwLock<BTreeMap<String, ScheduledJob>>,
    /// 按模块保存的实例计数，任务被删除重建后仍沿用同一个计数
    instances: RwLock<HashMap<String, Arc<AtomicUsize>>>,
    /// 所有模块共享的工作槽，是唯一的准入控制手段
    worker_pool: Arc<Semaphore>,
    jobs_changed: Notify,
    metrics: MetricsCollector,
}

/// 模块定时调度器
///
/// 一个调度循环负责按 cron 触发时间派发任务，派发出的任务先占用实例计数，
/// 再排队获取全局工作槽，最后调用 [`ModuleRunner::run_scheduled`]。
/// 任务内部的任何错误和 panic 都只记录日志，不影响其他任务和后续触发。
pub struct ModuleScheduler {
    shared: Arc<SchedulerShared>,
    handle: Mutex<Option<DispatcherHandle>>,
}

impl ModuleScheduler {
    pub fn new(
        runner: Arc<ModuleRunner>,
        settings: SchedulerConfig,
        metrics: MetricsCollector,
    ) -> AnalyticsResult<Self> {
        let timezone = settings.timezone_offset()?;
        if settings.max_workers == 0 {
            return Err(AnalyticsError::Configuration(
                "max_workers必须大于0".to_string(),
            ));
        }

        Ok(Self {
            shared: Arc::new(SchedulerShared {
                config_store: runner.config_store().clone(),
                runner,
                worker_pool: Arc::new(Semaphore::new(settings.max_workers)),
                settings,
                timezone,
                jobs: RwLock::new(BTreeMap::new()),
                instances: RwLock::new(HashMap::new()),
                jobs_changed: Notify::new(),
                metrics,
            }),
            handle: Mutex::new(None),
        })
    }

    /// 为所有启用且配置了调度表达式的模块创建任务，返回创建的任务数
    ///
    /// 单个模块的表达式无效只记录日志并跳过。
    pub async fn setup_module_jobs(&self) -> AnalyticsResult<usize> {
        let configs = self.shared.config_store.list_configs().await?;
        let mut added = 0;

        for (module_id, config) in configs {
            if !config.is_schedulable() {
                debug!(
                    "模块 {} 未启用或没有调度表达式，不创建定时任务",
                    module_id
                );
                continue;
            }
            match self.add_job(&module_id, &config.schedule).await {
                Ok(_) => added += 1,
                Err(e) => StructuredLogger::log_system_error("scheduler", "setup_module_jobs", &e),
            }
        }

        info!("已创建 {} 个模块定时任务", added);
        Ok(added)
    }

    async fn add_job(&self, module_id: &str, schedule: &str) -> AnalyticsResult<JobInfo> {
        let trigger = CronScheduler::with_timezone(schedule, self.shared.timezone)?;
        let name = self
            .shared
            .config_store
            .registry()
            .get_metadata(module_id)
            .map(|metadata| metadata.name.clone())
            .unwrap_or_else(|| module_id.to_string());

        let job = ScheduledJob {
            id: job_id(module_id),
            module_id: module_id.to_string(),
            name,
            next_run_time: trigger
                .next_execution_time(Utc::now())
                .map(|time| time.with_timezone(&Utc)),
            trigger,
            instances: self.shared.instance_counter(module_id).await,
        };
        let info = self.shared.job_info(&job);

        self.shared.jobs.write().await.insert(job.id.clone(), job);
        self.shared.jobs_changed.notify_one();

        if let Some(next_run_time) = info.next_run_time {
            StructuredLogger::log_job_scheduled(&info.id, schedule, next_run_time);
        }
        Ok(info)
    }

    /// 按最新配置同步某个模块的任务：先删除，启用且有表达式时再添加
    ///
    /// 调度器未运行时会被启动。
    pub async fn update_module_job(
        &self,
        module_id: &str,
        enabled: bool,
        schedule: &str,
    ) -> AnalyticsResult<()> {
        if !self.shared.config_store.registry().contains(module_id) {
            return Err(AnalyticsError::module_not_found(module_id));
        }

        self.remove_module_job(module_id).await;
        if enabled && !schedule.trim().is_empty() {
            self.add_job(module_id, schedule).await?;
        }

        if !self.is_running().await {
            warn!("调度器未运行，更新任务 {} 时重新启动", job_id(module_id));
            self.start().await?;
        }
        Ok(())
    }

    /// 删除模块的任务，任务不存在不是错误
    pub async fn remove_module_job(&self, module_id: &str) -> bool {
        let id = job_id(module_id);
        let removed = self.shared.jobs.write().await.remove(&id).is_some();
        if removed {
            self.shared.jobs_changed.notify_one();
            StructuredLogger::log_job_removed(&id);
        } else {
            debug!("任务 {} 不存在，无需删除", id);
        }
        removed
    }

    /// 启动调度循环，重复调用只记录警告
    pub async fn start(&self) -> AnalyticsResult<()> {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.task.is_finished()) {
            warn!("模块调度器已在运行");
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(dispatcher_loop(self.shared.clone(), shutdown_rx));
        *handle = Some(DispatcherHandle { shutdown_tx, task });

        info!(
            max_workers = self.shared.settings.max_workers,
            timezone = %self.shared.timezone,
            "模块调度器已启动"
        );
        Ok(())
    }

    /// 停止调度循环；已经在执行的任务按各自的超时结束
    pub async fn stop(&self) {
        let Some(handle) = self.handle.lock().await.take() else {
            debug!("模块调度器未运行");
            return;
        };

        let _ = handle.shutdown_tx.send(());
        if let Err(e) = handle.task.await {
            StructuredLogger::log_system_error("scheduler", "stop", &e);
        }
        info!("模块调度器已停止");
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    pub async fn get_jobs(&self) -> Vec<JobInfo> {
        self.shared
            .jobs
            .read()
            .await
            .values()
            .map(|job| self.shared.job_info(job))
            .collect()
    }

    pub async fn get_job(&self, module_id: &str) -> Option<JobInfo> {
        self.shared
            .jobs
            .read()
            .await
            .get(&job_id(module_id))
            .map(|job| self.shared.job_info(job))
    }
}

impl Drop for ModuleScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            let _ = handle.shutdown_tx.send(());
        }
    }
}

impl SchedulerShared {
    fn job_info(&self, job: &ScheduledJob) -> JobInfo {
        JobInfo {
            id: job.id.clone(),
            name: job.name.clone(),
            module_id: job.module_id.clone(),
            next_run_time: job
                .next_run_time
                .map(|time| time.with_timezone(&self.timezone)),
            trigger_description: job.trigger.description(),
            max_instances: MAX_INSTANCES,
            misfire_grace_seconds: self.settings.misfire_grace_seconds,
        }
    }

    async fn instance_counter(&self, module_id: &str) -> Arc<AtomicUsize> {
        self.instances
            .write()
            .await
            .entry(module_id.to_string())
            .or_default()
            .clone()
    }

    fn misfire_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.settings.misfire_grace_seconds.min(i64::MAX as u64) as i64)
    }

    /// 取出到期的任务并推进它们的下次触发时间
    ///
    /// 错过的多个触发点只派发一次。
    async fn collect_due_jobs(&self, now: DateTime<Utc>) -> Vec<DueJob> {
        let mut jobs = self.jobs.write().await;
        let mut due = Vec::new();

        for job in jobs.values_mut() {
            let Some(run_time) = job.next_run_time else {
                continue;
            };
            if run_time > now {
                continue;
            }
            job.next_run_time = job
                .trigger
                .next_execution_time(now)
                .map(|time| time.with_timezone(&Utc));
            due.push(DueJob {
                id: job.id.clone(),
                module_id: job.module_id.clone(),
                run_time,
                instances: job.instances.clone(),
            });
        }
        due
    }

    async fn time_until_next_run(&self, now: DateTime<Utc>) -> Duration {
        self.jobs
            .read()
            .await
            .values()
            .filter_map(|job| job.next_run_time)
            .min()
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(IDLE_WAIT)
            .min(IDLE_WAIT)
    }

    fn is_misfired(&self, job: &DueJob, now: DateTime<Utc>) -> bool {
        let lateness = now - job.run_time;
        if lateness > self.misfire_grace() {
            StructuredLogger::log_job_misfired(
                &job.id,
                lateness.num_seconds(),
                self.settings.misfire_grace_seconds,
            );
            self.metrics.record_misfire(&job.id);
            return true;
        }
        false
    }

    fn submit(self: &Arc<Self>, job: DueJob, now: DateTime<Utc>) {
        if self.is_misfired(&job, now) {
            return;
        }
        if job.instances.load(Ordering::SeqCst) >= MAX_INSTANCES {
            StructuredLogger::log_job_max_instances(&job.id, MAX_INSTANCES);
            self.metrics.record_skipped(&job.id);
            return;
        }

        let guard = InstanceGuard::acquire(job.instances.clone());
        let shared = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let _permit = match shared.worker_pool.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    StructuredLogger::log_system_error("scheduler", "acquire_worker", &e);
                    return;
                }
            };
            // 宽限期只在派发时检查，排队等待工作槽的任务只会延后
            shared.execute_job(&job).await;
        });
    }

    async fn execute_job(&self, job: &DueJob) {
        debug!(job.id = %job.id, "开始执行定时任务");
        let outcome = AssertUnwindSafe(self.runner.run_scheduled(&job.module_id))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => debug!(
                job.id = %job.id,
                run.status = result.status.as_str(),
                "定时任务执行完成"
            ),
            Ok(Err(e)) => StructuredLogger::log_system_error("scheduler", &job.id, &e),
            Err(_) => error!(job.id = %job.id, "定时任务执行时发生panic"),
        }
    }
}

async fn dispatcher_loop(shared: Arc<SchedulerShared>, mut shutdown_rx: broadcast::Receiver<()>) {
    debug!("调度循环已启动");
    loop {
        let now = Utc::now();
        for job in shared.collect_due_jobs(now).await {
            shared.submit(job, now);
        }

        let wait = shared.time_until_next_run(Utc::now()).await;
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shared.jobs_changed.notified() => {
                debug!("任务列表已变更，重新计算触发时间");
            }
            _ = shutdown_rx.recv() => {
                debug!("调度循环收到停止信号");
                break;
            }
        }
    }
}
