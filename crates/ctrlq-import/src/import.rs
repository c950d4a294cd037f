//! The two-phase importer.
//!
//! Phase 0 uploads companion QVFs. Phase A creates tasks with their schedule
//! events embedded (one REST call per task). Phase B creates composite
//! events, whose rules may point at tasks Phase A just created. Phases are
//! strictly sequential; within a phase, creations run in input order and
//! failures are recorded per work item without rolling anything back.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use ctrlq_core::{SchemaEvent, TaskKind};
use ctrlq_qrs::create::{
    CompositeEventSpec, CompositeRuleSpec, ExternalProgramTaskCreate, ExternalProgramTaskSpec,
    IdRef, ReloadTaskCreate, ReloadTaskSpec, SchemaEventSpec,
};
use ctrlq_qrs::types::{
    self, QrsCustomPropertyValue, QrsTag, QrsTimeConstraint,
};
use ctrlq_qrs::QrsClient;

use crate::error::{ImportError, ImportResult};
use crate::parse::{AppImportRecord, TaskImportRecord};
use crate::resolve::{ResolvedRule, Resolver};

/// Import mode. Only create is supported; anything else fails fast before
/// network I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    #[default]
    Create,
}

impl FromStr for UpdateMode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(Self::Create),
            other => Err(ImportError::UnsupportedUpdateMode(other.to_string())),
        }
    }
}

/// Importer configuration.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub update_mode: UpdateMode,
    pub dry_run: bool,
    /// Pause between QVF uploads to relieve rate-limit pressure.
    pub sleep_app_upload: Duration,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            update_mode: UpdateMode::Create,
            dry_run: false,
            sleep_app_upload: Duration::from_millis(1000),
        }
    }
}

/// Creation seam of the importer. The production sink posts to the
/// Repository; the dry-run sink logs what would have been posted.
#[async_trait]
pub trait CreateSink: Send + Sync {
    async fn upload_app(&self, name: &str, qvf: &Path, exclude_data: bool) -> ImportResult<Uuid>;
    async fn set_app_labels(
        &self,
        app: Uuid,
        tags: &[QrsTag],
        custom_properties: &[QrsCustomPropertyValue],
    ) -> ImportResult<()>;
    async fn set_app_owner(&self, app: Uuid, directory: &str, user_id: &str) -> ImportResult<()>;
    async fn publish_app(&self, app: Uuid, stream: Uuid) -> ImportResult<()>;
    async fn create_reload_task(&self, bundle: &ReloadTaskCreate) -> ImportResult<Uuid>;
    async fn create_external_program_task(
        &self,
        bundle: &ExternalProgramTaskCreate,
    ) -> ImportResult<Uuid>;
    async fn create_composite_event(&self, spec: &CompositeEventSpec) -> ImportResult<Uuid>;
}

/// Production sink delegating to the Repository client.
pub struct QrsSink {
    client: QrsClient,
}

impl QrsSink {
    pub fn new(client: QrsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CreateSink for QrsSink {
    async fn upload_app(&self, name: &str, qvf: &Path, exclude_data: bool) -> ImportResult<Uuid> {
        Ok(self.client.upload_app(qvf, name, exclude_data).await?.id)
    }

    async fn set_app_labels(
        &self,
        app: Uuid,
        tags: &[QrsTag],
        custom_properties: &[QrsCustomPropertyValue],
    ) -> ImportResult<()> {
        if tags.is_empty() && custom_properties.is_empty() {
            return Ok(());
        }
        Ok(self.client.set_app_labels(app, tags, custom_properties).await?)
    }

    async fn set_app_owner(&self, app: Uuid, directory: &str, user_id: &str) -> ImportResult<()> {
        Ok(self.client.set_app_owner(app, directory, user_id).await?)
    }

    async fn publish_app(&self, app: Uuid, stream: Uuid) -> ImportResult<()> {
        self.client.publish_app(app, stream).await?;
        Ok(())
    }

    async fn create_reload_task(&self, bundle: &ReloadTaskCreate) -> ImportResult<Uuid> {
        Ok(self.client.create_reload_task(bundle).await?)
    }

    async fn create_external_program_task(
        &self,
        bundle: &ExternalProgramTaskCreate,
    ) -> ImportResult<Uuid> {
        Ok(self.client.create_external_program_task(bundle).await?)
    }

    async fn create_composite_event(&self, spec: &CompositeEventSpec) -> ImportResult<Uuid> {
        Ok(self.client.create_composite_event(spec).await?)
    }
}

/// Dry-run sink: performs no I/O, logs every payload that would have been
/// posted, and hands out deterministic placeholder GUIDs so Phase B
/// previews show stable IDs.
#[derive(Default)]
pub struct DryRunSink {
    counter: AtomicU64,
}

impl DryRunSink {
    fn next_id(&self) -> Uuid {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("ctrlq-dry-run-{}", n).as_bytes())
    }

    fn log_payload<T: serde::Serialize>(what: &str, payload: &T) {
        match serde_json::to_string_pretty(payload) {
            Ok(json) => info!("dry run, would post {}:\n{}", what, json),
            Err(_) => info!("dry run, would post {}", what),
        }
    }
}

#[async_trait]
impl CreateSink for DryRunSink {
    async fn upload_app(&self, name: &str, qvf: &Path, exclude_data: bool) -> ImportResult<Uuid> {
        info!(
            app = name,
            qvf = %qvf.display(),
            exclude_data,
            "dry run, would upload app"
        );
        Ok(self.next_id())
    }

    async fn set_app_labels(
        &self,
        app: Uuid,
        tags: &[QrsTag],
        custom_properties: &[QrsCustomPropertyValue],
    ) -> ImportResult<()> {
        info!(
            %app,
            tags = tags.len(),
            custom_properties = custom_properties.len(),
            "dry run, would set app labels"
        );
        Ok(())
    }

    async fn set_app_owner(&self, app: Uuid, directory: &str, user_id: &str) -> ImportResult<()> {
        info!(%app, owner = %format!("{}\\{}", directory, user_id), "dry run, would set app owner");
        Ok(())
    }

    async fn publish_app(&self, app: Uuid, stream: Uuid) -> ImportResult<()> {
        info!(%app, %stream, "dry run, would publish app");
        Ok(())
    }

    async fn create_reload_task(&self, bundle: &ReloadTaskCreate) -> ImportResult<Uuid> {
        Self::log_payload("reload task", bundle);
        Ok(self.next_id())
    }

    async fn create_external_program_task(
        &self,
        bundle: &ExternalProgramTaskCreate,
    ) -> ImportResult<Uuid> {
        Self::log_payload("external program task", bundle);
        Ok(self.next_id())
    }

    async fn create_composite_event(&self, spec: &CompositeEventSpec) -> ImportResult<Uuid> {
        Self::log_payload("composite event", spec);
        Ok(self.next_id())
    }
}

/// Per-item outcomes, reported even for partial runs.

#[derive(Debug, Clone)]
pub struct AppOutcome {
    pub app_counter: u32,
    pub name: String,
    pub result: Result<Uuid, String>,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_counter: u32,
    pub name: String,
    pub result: Result<Uuid, String>,
}

#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub task_counter: u32,
    pub event_counter: u32,
    pub name: String,
    pub result: Result<Uuid, String>,
}

/// Everything that happened during one import run.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    pub apps: Vec<AppOutcome>,
    pub tasks: Vec<TaskOutcome>,
    pub events: Vec<EventOutcome>,
    pub cancelled: bool,
}

impl ImportSummary {
    /// True only when every work item succeeded. A partial Phase A is a
    /// failed run.
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self.apps.iter().all(|a| a.result.is_ok())
            && self.tasks.iter().all(|t| t.result.is_ok())
            && self.events.iter().all(|e| e.result.is_ok())
    }

    pub fn created_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| t.result.is_ok()).count()
    }

    pub fn created_events(&self) -> usize {
        self.events.iter().filter(|e| e.result.is_ok()).count()
    }
}

/// The two-phase import engine.
pub struct Importer<'a> {
    sink: &'a dyn CreateSink,
    resolver: Resolver<'a>,
    options: ImportOptions,
    cancel: CancellationToken,
}

impl<'a> Importer<'a> {
    pub fn new(sink: &'a dyn CreateSink, resolver: Resolver<'a>, options: ImportOptions) -> Self {
        Self {
            sink,
            resolver,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the import: app uploads, then Phase A, then Phase B. Phase B
    /// starts only after Phase A has a terminal result for every task.
    pub async fn run(
        &self,
        apps: &[AppImportRecord],
        tasks: &[TaskImportRecord],
    ) -> ImportSummary {
        let mut summary = ImportSummary::default();
        let mut uploaded: HashMap<u32, Uuid> = HashMap::new();

        self.upload_apps(apps, &mut uploaded, &mut summary).await;
        if summary.cancelled {
            return summary;
        }

        // Phase A. `local` maps raw source `Task id` values to new GUIDs in
        // commit order; Phase B reads it once A has drained.
        let mut local: HashMap<String, ResolvedRule> = HashMap::new();
        let mut created_by_counter: HashMap<u32, ResolvedRule> = HashMap::new();
        for record in tasks {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                return summary;
            }
            let result = self.create_task(record, &uploaded).await;
            if let Ok(id) = &result {
                let resolved = ResolvedRule {
                    id: *id,
                    kind: record.kind,
                };
                created_by_counter.insert(record.task_counter, resolved);
                if !record.task_id.is_empty() {
                    local.insert(record.task_id.clone(), resolved);
                }
            }
            summary.tasks.push(TaskOutcome {
                task_counter: record.task_counter,
                name: record.name.clone(),
                result: result.map_err(|e| e.to_string()),
            });
        }

        // Phase B. Events are mutually independent; source order keeps
        // error attribution stable.
        for record in tasks {
            for event in &record.composite_events {
                if self.cancel.is_cancelled() {
                    summary.cancelled = true;
                    return summary;
                }
                let result = self
                    .create_composite(record, event, &created_by_counter, &local)
                    .await;
                summary.events.push(EventOutcome {
                    task_counter: record.task_counter,
                    event_counter: event.event_counter,
                    name: event.name.clone(),
                    result: result.map_err(|e| e.to_string()),
                });
            }
        }

        summary
    }

    async fn upload_apps(
        &self,
        apps: &[AppImportRecord],
        uploaded: &mut HashMap<u32, Uuid>,
        summary: &mut ImportSummary,
    ) {
        for (index, record) in apps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                return;
            }
            let result = self.upload_one_app(record, uploaded).await;
            summary.apps.push(AppOutcome {
                app_counter: record.app_counter,
                name: record.name.clone(),
                result: result.map_err(|e| e.to_string()),
            });
            // Inter-upload pause, the configured relief for the upload
            // endpoint's throttling.
            if index + 1 < apps.len() && !self.options.sleep_app_upload.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.options.sleep_app_upload) => {}
                    _ = self.cancel.cancelled() => {
                        summary.cancelled = true;
                        return;
                    }
                }
            }
        }
    }

    async fn upload_one_app(
        &self,
        record: &AppImportRecord,
        uploaded: &mut HashMap<u32, Uuid>,
    ) -> ImportResult<Uuid> {
        let qvf: PathBuf = Path::new(&record.qvf_directory).join(&record.qvf_name);
        std::fs::metadata(&qvf).map_err(|source| ImportError::Source {
            path: qvf.display().to_string(),
            source,
        })?;

        // Validate labels before touching the server.
        let tags = self.resolver.resolve_tags(&record.tags).await?;
        let custom_properties = self
            .resolver
            .resolve_custom_properties(&record.custom_properties)
            .await?;

        let app_id = self
            .sink
            .upload_app(&record.name, &qvf, record.exclude_data_connections)
            .await?;
        uploaded.insert(record.app_counter, app_id);

        self.sink
            .set_app_labels(app_id, &tags, &custom_properties)
            .await?;
        if let (Some(directory), Some(user_id)) =
            (&record.owner_user_directory, &record.owner_user_id)
        {
            self.sink.set_app_owner(app_id, directory, user_id).await?;
        }
        if let Some(stream_ref) = &record.publish_to_stream {
            match self.resolver.resolve_stream(stream_ref).await? {
                Some(stream) => self.sink.publish_app(app_id, stream.id).await?,
                None => {
                    // Missing stream cancels the publish for this app only.
                    warn!(app = %record.name, stream = stream_ref, "publish skipped");
                }
            }
        }
        Ok(app_id)
    }

    async fn create_task(
        &self,
        record: &TaskImportRecord,
        uploaded: &HashMap<u32, Uuid>,
    ) -> ImportResult<Uuid> {
        let tags = self.resolver.resolve_tags(&record.tags).await?;
        let custom_properties = self
            .resolver
            .resolve_custom_properties(&record.custom_properties)
            .await?;
        let schema_events: Vec<SchemaEventSpec> =
            record.schema_events.iter().map(schema_event_spec).collect();

        match record.kind {
            TaskKind::Reload => {
                let app_ref = record.app_ref.as_deref().unwrap_or_default();
                let app_id = self.resolver.resolve_app_ref(app_ref, uploaded).await?;
                let bundle = ReloadTaskCreate {
                    task: ReloadTaskSpec {
                        name: record.name.clone(),
                        enabled: record.enabled,
                        task_session_timeout: record.timeout_minutes,
                        max_retries: record.max_retries,
                        app: IdRef { id: app_id },
                        is_partial_reload: record.partial_reload.unwrap_or(false),
                        is_manually_triggered: record.manually_triggered,
                        tags,
                        custom_properties,
                    },
                    schema_events,
                    composite_events: vec![],
                };
                self.sink.create_reload_task(&bundle).await
            }
            TaskKind::ExternalProgram => {
                let bundle = ExternalProgramTaskCreate {
                    task: ExternalProgramTaskSpec {
                        name: record.name.clone(),
                        enabled: record.enabled,
                        task_session_timeout: record.timeout_minutes,
                        max_retries: record.max_retries,
                        path: record.program_path.clone().unwrap_or_default(),
                        parameters: record.program_parameters.clone().unwrap_or_default(),
                        tags,
                        custom_properties,
                    },
                    schema_events,
                    composite_events: vec![],
                };
                self.sink.create_external_program_task(&bundle).await
            }
        }
    }

    async fn create_composite(
        &self,
        record: &TaskImportRecord,
        event: &crate::parse::CompositeEventRecord,
        created_by_counter: &HashMap<u32, ResolvedRule>,
        local: &HashMap<String, ResolvedRule>,
    ) -> ImportResult<Uuid> {
        let downstream =
            created_by_counter
                .get(&record.task_counter)
                .ok_or(ImportError::RowValue {
                    row: event.source_row,
                    entity: crate::error::EntityRef::event(
                        record.task_counter,
                        event.event_counter,
                    ),
                    message: "downstream task was not created in Phase A".to_string(),
                })?;

        let mut rules: Vec<CompositeRuleSpec> = Vec::with_capacity(event.rules.len());
        for rule in &event.rules {
            let upstream = self.resolver.resolve_rule_ref(&rule.task_id, local)?;
            let (reload_task, external_program_task) = kind_ref(upstream);
            rules.push(CompositeRuleSpec {
                rule_state: types::rule_state_to_wire(rule.state),
                reload_task,
                external_program_task,
            });
        }

        let (reload_task, external_program_task) = kind_ref(*downstream);
        let spec = CompositeEventSpec {
            name: event.name.clone(),
            enabled: event.enabled,
            event_type: 1,
            time_constraint: QrsTimeConstraint {
                seconds: event.time_constraint.seconds,
                minutes: event.time_constraint.minutes,
                hours: event.time_constraint.hours,
                days: event.time_constraint.days,
            },
            composite_rules: rules,
            reload_task,
            external_program_task,
        };
        self.sink.create_composite_event(&spec).await
    }
}

fn kind_ref(resolved: ResolvedRule) -> (Option<IdRef>, Option<IdRef>) {
    match resolved.kind {
        TaskKind::Reload => (Some(IdRef { id: resolved.id }), None),
        TaskKind::ExternalProgram => (None, Some(IdRef { id: resolved.id })),
    }
}

fn schema_event_spec(event: &SchemaEvent) -> SchemaEventSpec {
    SchemaEventSpec {
        name: event.name.clone(),
        enabled: event.enabled,
        event_type: 0,
        increment_option: types::increment_option_to_wire(event.increment_option),
        increment_description: event.increment_description.to_string(),
        schema_filter_description: if event.filter_description.is_empty() {
            vec![]
        } else {
            vec![event.filter_description.clone()]
        },
        start_date: event.start,
        expiration_date: event.expiration,
        time_zone: event.time_zone.clone(),
        daylight_saving_time: types::daylight_saving_to_wire(event.daylight_saving),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{CompositeEventRecord, RuleRecord};
    use ctrlq_core::{RuleState, TimeConstraint};
    use ctrlq_graph::{TaskGraph, TaskNode};
    use ctrlq_session::{AuthMethod, RestClient, SessionConfig};
    use std::sync::Mutex;

    fn offline_qrs() -> QrsClient {
        let config = SessionConfig::new("localhost", AuthMethod::Bearer("token".to_string()));
        QrsClient::new(RestClient::new(config).unwrap())
    }

    /// Records every sink call in order and hands out sequential GUIDs.
    #[derive(Default)]
    struct RecordingSink {
        log: Mutex<Vec<String>>,
        reload_tasks: Mutex<Vec<ReloadTaskCreate>>,
        external_tasks: Mutex<Vec<ExternalProgramTaskCreate>>,
        events: Mutex<Vec<CompositeEventSpec>>,
        next: AtomicU64,
        fail_task: Option<String>,
    }

    impl RecordingSink {
        fn next_id(&self) -> Uuid {
            Uuid::from_u128(self.next.fetch_add(1, Ordering::SeqCst) as u128 + 1)
        }

        fn log(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl CreateSink for RecordingSink {
        async fn upload_app(
            &self,
            name: &str,
            _qvf: &Path,
            _exclude_data: bool,
        ) -> ImportResult<Uuid> {
            self.log(format!("upload:{}", name));
            Ok(self.next_id())
        }

        async fn set_app_labels(
            &self,
            _app: Uuid,
            _tags: &[QrsTag],
            _custom_properties: &[QrsCustomPropertyValue],
        ) -> ImportResult<()> {
            Ok(())
        }

        async fn set_app_owner(
            &self,
            _app: Uuid,
            _directory: &str,
            _user_id: &str,
        ) -> ImportResult<()> {
            Ok(())
        }

        async fn publish_app(&self, _app: Uuid, _stream: Uuid) -> ImportResult<()> {
            Ok(())
        }

        async fn create_reload_task(&self, bundle: &ReloadTaskCreate) -> ImportResult<Uuid> {
            if self.fail_task.as_deref() == Some(bundle.task.name.as_str()) {
                return Err(ImportError::UnresolvedApp("injected failure".to_string()));
            }
            self.log(format!("task:{}", bundle.task.name));
            self.reload_tasks.lock().unwrap().push(bundle.clone());
            Ok(self.next_id())
        }

        async fn create_external_program_task(
            &self,
            bundle: &ExternalProgramTaskCreate,
        ) -> ImportResult<Uuid> {
            if self.fail_task.as_deref() == Some(bundle.task.name.as_str()) {
                return Err(ImportError::UnresolvedApp("injected failure".to_string()));
            }
            self.log(format!("task:{}", bundle.task.name));
            self.external_tasks.lock().unwrap().push(bundle.clone());
            Ok(self.next_id())
        }

        async fn create_composite_event(&self, spec: &CompositeEventSpec) -> ImportResult<Uuid> {
            self.log(format!("event:{}", spec.name));
            self.events.lock().unwrap().push(spec.clone());
            Ok(self.next_id())
        }
    }

    fn external_task(counter: u32, task_id: &str, name: &str) -> TaskImportRecord {
        TaskImportRecord {
            task_counter: counter,
            source_row: counter as usize + 1,
            task_id: task_id.to_string(),
            kind: TaskKind::ExternalProgram,
            name: name.to_string(),
            enabled: true,
            timeout_minutes: 60,
            max_retries: 0,
            app_ref: None,
            partial_reload: None,
            manually_triggered: false,
            program_path: Some("/usr/local/bin/job.sh".to_string()),
            program_parameters: None,
            tags: vec![],
            custom_properties: vec![],
            schema_events: vec![],
            composite_events: vec![],
        }
    }

    fn composite(event_counter: u32, rules: Vec<(&str, RuleState)>) -> CompositeEventRecord {
        CompositeEventRecord {
            event_counter,
            source_row: 10,
            name: format!("composite {}", event_counter),
            enabled: true,
            time_constraint: TimeConstraint::default(),
            rules: rules
                .into_iter()
                .enumerate()
                .map(|(index, (task_id, state))| RuleRecord {
                    rule_counter: index as u32 + 1,
                    source_row: 10,
                    state,
                    task_name: String::new(),
                    task_id: task_id.to_string(),
                })
                .collect(),
        }
    }

    fn options() -> ImportOptions {
        ImportOptions {
            sleep_app_upload: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_chain_of_two_tasks() {
        let qrs = offline_qrs();
        let graph = TaskGraph::new();
        let sink = RecordingSink::default();
        let resolver = Resolver::new(&qrs, &graph);
        let importer = Importer::new(&sink, resolver, options());

        let mut downstream = external_task(2, "2", "T2");
        downstream.composite_events = vec![composite(1, vec![("1", RuleState::TaskSuccessful)])];
        let tasks = vec![external_task(1, "1", "T1"), downstream];

        let summary = importer.run(&[], &tasks).await;
        assert!(summary.is_success());
        assert_eq!(summary.created_tasks(), 2);
        assert_eq!(summary.created_events(), 1);

        // Phase B strictly after Phase A.
        let log = sink.log.lock().unwrap().clone();
        let last_task = log.iter().rposition(|e| e.starts_with("task:")).unwrap();
        let first_event = log.iter().position(|e| e.starts_with("event:")).unwrap();
        assert!(last_task < first_event);

        // The sole rule points at T1's new GUID.
        let events = sink.events.lock().unwrap();
        let t1_guid = summary.tasks[0].result.clone().unwrap();
        assert_eq!(
            events[0].composite_rules[0].external_program_task.unwrap().id,
            t1_guid
        );
        // The event is owned by T2.
        let t2_guid = summary.tasks[1].result.clone().unwrap();
        assert_eq!(events[0].external_program_task.unwrap().id, t2_guid);
    }

    #[tokio::test]
    async fn test_rule_against_preexisting_server_task() {
        let qrs = offline_qrs();
        let mut graph = TaskGraph::new();
        let mut existing = TaskNode::tombstone(Uuid::new_v4());
        existing.name = "X".to_string();
        existing.tombstone = false;
        existing.kind = TaskKind::Reload;
        let existing_id = existing.id;
        graph.add_task(existing);

        let sink = RecordingSink::default();
        let resolver = Resolver::new(&qrs, &graph);
        let importer = Importer::new(&sink, resolver, options());

        let existing_ref = existing_id.to_string();
        let mut task = external_task(1, "1", "T1");
        task.composite_events =
            vec![composite(1, vec![(existing_ref.as_str(), RuleState::TaskFail)])];

        let summary = importer.run(&[], &[task]).await;
        assert!(summary.is_success());
        let events = sink.events.lock().unwrap();
        // The pre-existing GUID is used verbatim, as a reload-task ref.
        assert_eq!(events[0].composite_rules[0].reload_task.unwrap().id, existing_id);
    }

    #[tokio::test]
    async fn test_app_upload_feeds_task_reference() {
        let qrs = offline_qrs();
        let graph = TaskGraph::new();
        let sink = RecordingSink::default();
        let resolver = Resolver::new(&qrs, &graph);
        let importer = Importer::new(&sink, resolver, options());

        let qvf = tempfile::NamedTempFile::new().unwrap();
        let qvf_dir = qvf.path().parent().unwrap().display().to_string();
        let qvf_name = qvf
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();

        let app = AppImportRecord {
            app_counter: 1,
            source_row: 2,
            name: "A1".to_string(),
            qvf_directory: qvf_dir,
            qvf_name,
            exclude_data_connections: false,
            tags: vec![],
            custom_properties: vec![],
            owner_user_directory: None,
            owner_user_id: None,
            publish_to_stream: None,
        };

        let task = TaskImportRecord {
            app_ref: Some("newapp-1".to_string()),
            partial_reload: Some(false),
            kind: TaskKind::Reload,
            program_path: None,
            ..external_task(1, "1", "T1")
        };

        let summary = importer.run(&[app], &[task]).await;
        assert!(summary.is_success(), "{:?}", summary);

        let app_guid = summary.apps[0].result.clone().unwrap();
        let bundles = sink.reload_tasks.lock().unwrap();
        assert_eq!(bundles[0].task.app.id, app_guid);

        // Upload strictly precedes task creation.
        let log = sink.log.lock().unwrap();
        assert!(log[0].starts_with("upload:"));
    }

    #[tokio::test]
    async fn test_partial_phase_a_skips_dependent_events_only() {
        let qrs = offline_qrs();
        let graph = TaskGraph::new();
        let sink = RecordingSink {
            fail_task: Some("T2".to_string()),
            ..Default::default()
        };
        let resolver = Resolver::new(&qrs, &graph);
        let importer = Importer::new(&sink, resolver, options());

        let mut t2 = external_task(2, "2", "T2");
        t2.composite_events = vec![composite(1, vec![("1", RuleState::TaskSuccessful)])];
        let mut t3 = external_task(3, "3", "T3");
        t3.composite_events = vec![composite(1, vec![("1", RuleState::TaskSuccessful)])];
        let tasks = vec![external_task(1, "1", "T1"), t2, t3];

        let summary = importer.run(&[], &tasks).await;
        assert!(!summary.is_success());
        assert_eq!(summary.created_tasks(), 2);
        // T2's event fails (no downstream task), T3's event still goes in.
        assert_eq!(summary.created_events(), 1);
        let failed_event = summary
            .events
            .iter()
            .find(|e| e.task_counter == 2)
            .unwrap();
        assert!(failed_event.result.is_err());
    }

    #[tokio::test]
    async fn test_unresolved_rule_aborts_event_not_run() {
        let qrs = offline_qrs();
        let graph = TaskGraph::new();
        let sink = RecordingSink::default();
        let resolver = Resolver::new(&qrs, &graph);
        let importer = Importer::new(&sink, resolver, options());

        let mut t1 = external_task(1, "1", "T1");
        t1.composite_events = vec![composite(1, vec![("no-such-task", RuleState::TaskFail)])];
        let mut t2 = external_task(2, "2", "T2");
        t2.composite_events = vec![composite(1, vec![("1", RuleState::TaskSuccessful)])];

        let summary = importer.run(&[], &[t1, t2]).await;
        assert!(!summary.is_success());
        assert_eq!(summary.created_tasks(), 2);
        assert_eq!(summary.created_events(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_sink_is_deterministic() {
        let sink_a = DryRunSink::default();
        let sink_b = DryRunSink::default();
        let qvf = Path::new("ignored.qvf");
        let id_a = sink_a.upload_app("A", qvf, false).await.unwrap();
        let id_b = sink_b.upload_app("A", qvf, false).await.unwrap();
        assert_eq!(id_a, id_b);
    }

    #[test]
    fn test_update_mode_rejects_update() {
        assert!(matches!(
            "update".parse::<UpdateMode>(),
            Err(ImportError::UnsupportedUpdateMode(_))
        ));
        assert_eq!("create".parse::<UpdateMode>().unwrap(), UpdateMode::Create);
    }
}
