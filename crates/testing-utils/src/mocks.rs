//! Test doubles for the module contract, alert sinks and repositories
//!
//! 这些模块不访问数据存储，用可观察的计数器暴露框架的行为：
//! analyze 被调用了几次、同时有几个实例在运行、告警被投递了几次。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use analytics_core::{
    models::{
        AlertRecord, AnalysisOutput, ChartSpec, ChartType, ModuleConfig, ModuleMetadata,
        ModuleRunRecord, ModuleRunResult, ModuleRunStatus, Severity,
    },
    traits::{AlertSink, AnalysisContext, AnalysisModule, ModuleRunRepository},
    AnalyticsError, AnalyticsResult,
};

fn items_of(raw: &AnalysisOutput) -> Vec<Value> {
    raw.get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// 每个 item 生成一条告警
fn item_alerts(module_id: &str, raw: &AnalysisOutput) -> Vec<AlertRecord> {
    items_of(raw)
        .into_iter()
        .map(|item| {
            AlertRecord::new(module_id, Severity::High, "Item found", item.to_string())
                .with_data(item)
        })
        .collect()
}

/// 记录 analyze 调用次数的模块
pub struct CountingModule {
    id: String,
    config: ModuleConfig,
    output: Option<Value>,
    calls: Arc<AtomicUsize>,
}

impl CountingModule {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            config: ModuleConfig::default(),
            output: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }

    /// 固定的 analyze 输出；`items` 中的每个元素派生一条告警
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisModule for CountingModule {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(&self.id, format!("Counting {}", self.id), "test")
    }

    fn default_config(&self) -> ModuleConfig {
        self.config.clone()
    }

    async fn analyze(&self, _ctx: &AnalysisContext) -> AnalyticsResult<AnalysisOutput> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(self
            .output
            .clone()
            .unwrap_or_else(|| json!({"items": [], "summary": {"call": call}})))
    }

    fn generate_alerts(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<AlertRecord>> {
        Ok(item_alerts(&self.id, raw))
    }

    fn generate_recommendations(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<String>> {
        let count = items_of(raw).len();
        Ok(if count > 0 {
            vec![format!("Review {count} items")]
        } else {
            Vec::new()
        })
    }

    fn prepare_chart_data(&self, raw: &AnalysisOutput) -> AnalyticsResult<Vec<ChartSpec>> {
        let items = items_of(raw);
        Ok(vec![ChartSpec::new("items", ChartType::Bar, "Items")
            .with_labels(items.iter().map(Value::to_string).collect())
            .with_series("count", vec![1.0; items.len()])])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// analyze 返回错误
    Error,
    /// analyze 内部 panic
    Panic,
}

/// 每次 analyze 都失败的模块
pub struct FailingModule {
    id: String,
    config: ModuleConfig,
    mode: FailureMode,
    calls: Arc<AtomicUsize>,
}

impl FailingModule {
    pub fn new(id: &str, mode: FailureMode) -> Self {
        Self {
            id: id.to_string(),
            config: ModuleConfig::default(),
            mode,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisModule for FailingModule {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(&self.id, format!("Failing {}", self.id), "test")
    }

    fn default_config(&self) -> ModuleConfig {
        self.config.clone()
    }

    async fn analyze(&self, _ctx: &AnalysisContext) -> AnalyticsResult<AnalysisOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FailureMode::Error => Err(AnalyticsError::analysis("data store unavailable")),
            FailureMode::Panic => panic!("module {} exploded", self.id),
        }
    }

    fn generate_alerts(&self, _raw: &AnalysisOutput) -> AnalyticsResult<Vec<AlertRecord>> {
        Ok(Vec::new())
    }
}

/// 并发计数：当前活跃数和出现过的最大值
///
/// 克隆共享同一组计数，可以挂到多个模块上观察全局并发。
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGauge {
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self) -> ActiveGuard {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        ActiveGuard(self.active.clone())
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// analyze 耗时固定时长的模块，记录最大并发数
pub struct SlowModule {
    id: String,
    config: ModuleConfig,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
    gauge: ConcurrencyGauge,
    shared_gauge: Option<ConcurrencyGauge>,
}

impl SlowModule {
    pub fn new(id: &str, delay: Duration) -> Self {
        Self {
            id: id.to_string(),
            config: ModuleConfig::default(),
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
            gauge: ConcurrencyGauge::new(),
            shared_gauge: None,
        }
    }

    pub fn with_config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }

    /// 额外把运行计入一个跨模块共享的计数
    pub fn with_shared_gauge(mut self, gauge: ConcurrencyGauge) -> Self {
        self.shared_gauge = Some(gauge);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.gauge.max_active()
    }
}

/// 离开作用域（包括任务被中止）时减少活跃计数
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalysisModule for SlowModule {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(&self.id, format!("Slow {}", self.id), "test")
    }

    fn default_config(&self) -> ModuleConfig {
        self.config.clone()
    }

    async fn analyze(&self, _ctx: &AnalysisContext) -> AnalyticsResult<AnalysisOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.gauge.enter();
        let _shared_guard = self.shared_gauge.as_ref().map(ConcurrencyGauge::enter);

        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"items": [], "summary": {"slept_ms": self.delay.as_millis() as u64}}))
    }

    fn generate_alerts(&self, _raw: &AnalysisOutput) -> AnalyticsResult<Vec<AlertRecord>> {
        Ok(Vec::new())
    }
}

/// analyze 成功但派生步骤出错的模块
pub struct BrokenDerivationModule {
    id: String,
}

impl BrokenDerivationModule {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[async_trait]
impl AnalysisModule for BrokenDerivationModule {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(&self.id, format!("Broken {}", self.id), "test")
    }

    fn default_config(&self) -> ModuleConfig {
        ModuleConfig::default()
    }

    async fn analyze(&self, _ctx: &AnalysisContext) -> AnalyticsResult<AnalysisOutput> {
        Ok(json!({"items": [1, 2], "summary": {"total_found": 2}}))
    }

    fn generate_alerts(&self, _raw: &AnalysisOutput) -> AnalyticsResult<Vec<AlertRecord>> {
        Err(AnalyticsError::Derivation("alert template missing".to_string()))
    }

    fn generate_recommendations(&self, _raw: &AnalysisOutput) -> AnalyticsResult<Vec<String>> {
        Ok(vec!["still useful".to_string()])
    }

    fn prepare_chart_data(&self, _raw: &AnalysisOutput) -> AnalyticsResult<Vec<ChartSpec>> {
        panic!("chart renderer bug")
    }
}

/// 记录所有投递内容的通知渠道
#[derive(Debug, Default)]
pub struct CollectingAlertSink {
    delivered: Mutex<Vec<(String, Vec<AlertRecord>)>>,
    failures: Mutex<Vec<ModuleRunResult>>,
}

impl CollectingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// deliver 被调用的次数
    pub fn delivery_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }

    pub fn delivered_alerts(&self) -> Vec<AlertRecord> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, alerts)| alerts.clone())
            .collect()
    }

    pub fn failures(&self) -> Vec<ModuleRunResult> {
        self.failures.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for CollectingAlertSink {
    async fn deliver(&self, module_id: &str, alerts: &[AlertRecord]) -> AnalyticsResult<()> {
        self.delivered
            .lock()
            .unwrap()
            .push((module_id.to_string(), alerts.to_vec()));
        Ok(())
    }

    async fn notify_run_failure(&self, result: &ModuleRunResult) -> AnalyticsResult<()> {
        self.failures.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// 写入总是失败的运行记录存储
#[derive(Debug, Default)]
pub struct FailingRunRepository;

#[async_trait]
impl ModuleRunRepository for FailingRunRepository {
    async fn create(&self, _record: &ModuleRunRecord) -> AnalyticsResult<ModuleRunRecord> {
        Err(AnalyticsError::DatabaseOperation("disk full".to_string()))
    }

    async fn get_by_id(&self, _id: i64) -> AnalyticsResult<Option<ModuleRunRecord>> {
        Ok(None)
    }

    async fn get_recent_runs(
        &self,
        _module_id: &str,
        _limit: i64,
    ) -> AnalyticsResult<Vec<ModuleRunRecord>> {
        Ok(Vec::new())
    }

    async fn count_by_status(
        &self,
        _module_id: &str,
        _status: ModuleRunStatus,
    ) -> AnalyticsResult<i64> {
        Ok(0)
    }
}
