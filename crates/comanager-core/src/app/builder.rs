//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - stores と services は必須。足りなければ build() が BuildError を返す
//! - config は build() 時に検証する
//! - executor を指定しなければ config.executor から SimulatedExecutor を作る

use std::sync::Arc;

use crate::app::alerts::AlertBridge;
use crate::app::console::CommandConsole;
use crate::app::engine::{EngineOptions, TaskEngine};
use crate::app::healing::{RetryOutcome, SelfHealingCoordinator};
use crate::app::reporter::RcaReporter;
use crate::app::retry::RetryPolicy;
use crate::app::status::StatusCounts;
use crate::config::{Config, ConfigError};
use crate::domain::{Alert, ManagerError, Report, ReportSummary, Task, TaskId, TaskStatus};
use crate::impls::{NoopEventSink, SimulatedExecutor};
use crate::ports::{Clock, EventSink, Services, StepExecutor, Stores, SystemClock, UlidGenerator};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .stores(Stores::in_memory())
///     .with_template_services()
///     .config(config)
///     .build()?;
/// ```
#[derive(Default)]
pub struct AppBuilder {
    stores: Option<Stores>,
    services: Option<Services>,
    executor: Option<Arc<dyn StepExecutor>>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<dyn EventSink>>,
    config: Config,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be provided before build().")]
    MissingComponents(Vec<&'static str>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn services(mut self, services: Services) -> Self {
        self.services = Some(services);
        self
    }

    /// Use the offline template collaborators.
    pub fn with_template_services(self) -> Self {
        self.services(Services::templates())
    }

    pub fn executor(mut self, executor: Arc<dyn StepExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;

        let mut missing = Vec::new();
        if self.stores.is_none() {
            missing.push("stores");
        }
        if self.services.is_none() {
            missing.push("services");
        }
        let (Some(stores), Some(services)) = (self.stores, self.services) else {
            return Err(BuildError::MissingComponents(missing));
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = self.events.unwrap_or_else(|| Arc::new(NoopEventSink));
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(SimulatedExecutor::new(&self.config.executor)));
        let retry = RetryPolicy::from(&self.config.store.retry);

        let engine = TaskEngine::new(
            stores.clone(),
            services.planner.clone(),
            executor,
            EngineOptions {
                clock: clock.clone(),
                ids: Arc::new(UlidGenerator::new(clock.clone())),
                events: events.clone(),
                retry: retry.clone(),
                auto_start: self.config.engine.auto_start,
            },
        );
        let reporter = RcaReporter::new(stores, services.report_writer.clone())
            .with_clock(clock)
            .with_events(events)
            .with_retry(retry);

        Ok(App {
            healing: SelfHealingCoordinator::new(engine.clone(), services.healer.clone()),
            alerts: AlertBridge::new(engine.clone(), services.resolver.clone()),
            console: CommandConsole::new(services.console.clone()),
            engine,
            reporter,
            config: self.config,
        })
    }
}

/// App は組み立て済みのアプリケーション
///
/// Cheap to clone; clones share stores and in-flight executions.
#[derive(Clone)]
pub struct App {
    engine: TaskEngine,
    healing: SelfHealingCoordinator,
    reporter: RcaReporter,
    alerts: AlertBridge,
    console: CommandConsole,
    config: Config,
}

impl App {
    pub fn engine(&self) -> &TaskEngine {
        &self.engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn create_task(&self, goal: &str) -> Result<Task, ManagerError> {
        self.engine.create(goal).await
    }

    pub async fn start_task(&self, id: TaskId) -> Result<Task, ManagerError> {
        self.engine.start(id).await
    }

    pub async fn task(&self, id: TaskId) -> Result<Option<Task>, ManagerError> {
        self.engine.get(id).await
    }

    pub async fn tasks(&self) -> Result<Vec<Task>, ManagerError> {
        self.engine.list(None).await
    }

    pub async fn tasks_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, ManagerError> {
        self.engine.list(Some(status)).await
    }

    pub async fn status_counts(&self) -> Result<StatusCounts, ManagerError> {
        Ok(StatusCounts::tally(&self.engine.list(None).await?))
    }

    pub async fn retry_task(&self, id: TaskId) -> Result<RetryOutcome, ManagerError> {
        self.healing.retry(id).await
    }

    pub async fn generate_report(&self, id: TaskId) -> Result<Report, ManagerError> {
        self.reporter.generate_report(id).await
    }

    pub async fn report(&self, id: TaskId) -> Result<Option<Report>, ManagerError> {
        self.reporter.report(id).await
    }

    pub async fn report_summary(&self, id: TaskId) -> Result<Option<ReportSummary>, ManagerError> {
        self.reporter.summary(id).await
    }

    pub async fn resolve_alert(&self, alert: &Alert) -> Result<Task, ManagerError> {
        self.alerts.resolve(alert).await
    }

    pub async fn simulate_command(&self, command: &str) -> Result<String, ManagerError> {
        self.console.simulate(command).await
    }
}
