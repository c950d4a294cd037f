//! The Repository client.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use uuid::Uuid;

use ctrlq_session::{Idempotency, RestClient, RestResponse};

use crate::create::{CompositeEventSpec, ExternalProgramTaskCreate, ReloadTaskCreate};
use crate::error::{QrsError, QrsResult};
use crate::types::{
    QrsCompositeEvent, QrsCustomPropertyDefinition, QrsExternalProgramTask, QrsReloadTask,
    QrsSchemaEvent, QrsStream, QrsTag,
};

#[derive(Default)]
struct Caches {
    tags: OnceCell<Vec<QrsTag>>,
    custom_properties: OnceCell<Vec<QrsCustomPropertyDefinition>>,
    streams: OnceCell<Vec<QrsStream>>,
}

/// Typed wrapper over the QRS endpoints the core consumes.
///
/// Tag, custom-property, and stream populations are fetched once per run
/// and treated as immutable afterwards.
#[derive(Clone)]
pub struct QrsClient {
    rest: RestClient,
    caches: Arc<Caches>,
}

/// Decoded `{id}` of a created object.
#[derive(serde::Deserialize)]
struct CreatedId {
    id: Uuid,
}

impl QrsClient {
    pub fn new(rest: RestClient) -> Self {
        Self {
            rest,
            caches: Arc::new(Caches::default()),
        }
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub(crate) fn decode<T: serde::de::DeserializeOwned>(
        response: &RestResponse,
        what: &str,
    ) -> QrsResult<T> {
        if !response.is_success() {
            return Err(QrsError::Api {
                what: what.to_string(),
                status: response.status.as_u16(),
                body: response.body_text(),
            });
        }
        serde_json::from_slice(&response.body).map_err(|source| QrsError::Json {
            what: what.to_string(),
            source,
        })
    }

    pub(crate) fn encode<T: serde::Serialize>(
        payload: &T,
        what: &str,
    ) -> QrsResult<serde_json::Value> {
        serde_json::to_value(payload).map_err(|source| QrsError::Json {
            what: what.to_string(),
            source,
        })
    }

    async fn get_full<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        filter: Option<&str>,
        what: &str,
    ) -> QrsResult<Vec<T>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(filter) = filter {
            query.push(("filter", filter.to_string()));
        }
        let response = self.rest.get(path, &query).await?;
        let items: Vec<T> = Self::decode(&response, what)?;
        debug!(path, count = items.len(), "fetched repository population");
        Ok(items)
    }

    /// Full tag population, cached for the run.
    pub async fn tags(&self) -> QrsResult<&[QrsTag]> {
        let tags = self
            .caches
            .tags
            .get_or_try_init(|| self.get_full("/tag/full", None, "tag list"))
            .await?;
        Ok(tags)
    }

    /// Full custom-property population, cached for the run.
    pub async fn custom_properties(&self) -> QrsResult<&[QrsCustomPropertyDefinition]> {
        let properties = self
            .caches
            .custom_properties
            .get_or_try_init(|| {
                self.get_full("/custompropertydefinition/full", None, "custom property list")
            })
            .await?;
        Ok(properties)
    }

    /// Full stream population, cached for the run.
    pub async fn streams(&self) -> QrsResult<&[QrsStream]> {
        let streams = self
            .caches
            .streams
            .get_or_try_init(|| self.get_full("/stream/full", None, "stream list"))
            .await?;
        Ok(streams)
    }

    /// Look up a tag by exact, case-sensitive name.
    pub async fn tag_by_name(&self, name: &str) -> QrsResult<Option<QrsTag>> {
        Ok(self.tags().await?.iter().find(|t| t.name == name).cloned())
    }

    /// Look up a custom-property definition by exact name.
    pub async fn custom_property_by_name(
        &self,
        name: &str,
    ) -> QrsResult<Option<QrsCustomPropertyDefinition>> {
        Ok(self
            .custom_properties()
            .await?
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    /// Look up a stream by GUID first, then by case-sensitive name.
    pub async fn stream_by_ref(&self, reference: &str) -> QrsResult<Option<QrsStream>> {
        let streams = self.streams().await?;
        if let Ok(id) = Uuid::parse_str(reference) {
            if let Some(stream) = streams.iter().find(|s| s.id == id) {
                return Ok(Some(stream.clone()));
            }
        }
        Ok(streams.iter().find(|s| s.name == reference).cloned())
    }

    pub async fn list_reload_tasks(
        &self,
        filter: Option<&str>,
    ) -> QrsResult<Vec<QrsReloadTask>> {
        self.get_full("/reloadtask/full", filter, "reload task list")
            .await
    }

    pub async fn list_external_program_tasks(
        &self,
        filter: Option<&str>,
    ) -> QrsResult<Vec<QrsExternalProgramTask>> {
        self.get_full(
            "/externalprogramtask/full",
            filter,
            "external program task list",
        )
        .await
    }

    /// Full schema-event population; joined to owning tasks client-side.
    pub async fn list_schema_events(&self) -> QrsResult<Vec<QrsSchemaEvent>> {
        self.get_full("/schemaevent/full", None, "schema event list")
            .await
    }

    /// Full composite-event population; joined to owning tasks client-side.
    pub async fn list_composite_events(&self) -> QrsResult<Vec<QrsCompositeEvent>> {
        self.get_full("/compositeevent/full", None, "composite event list")
            .await
    }

    /// Full app population, for app-tag filters.
    pub async fn list_apps(&self) -> QrsResult<Vec<crate::types::QrsApp>> {
        self.get_full("/app/full", None, "app list").await
    }

    pub async fn get_reload_task(&self, id: Uuid) -> QrsResult<QrsReloadTask> {
        let response = self.rest.get(&format!("/reloadtask/{}", id), &[]).await?;
        Self::decode(&response, "reload task")
    }

    /// Create a reload task with its embedded schedule events; returns the
    /// new GUID. Not idempotent: never retried on application failures.
    pub async fn create_reload_task(&self, bundle: &ReloadTaskCreate) -> QrsResult<Uuid> {
        let response = self
            .rest
            .post_json(
                "/reloadtask/create",
                &[],
                Self::encode(bundle, "reload task creation")?,
                Idempotency::NonIdempotent,
            )
            .await?;
        let created: CreatedId = Self::decode(&response, "reload task creation")?;
        debug!(task = %bundle.task.name, id = %created.id, "created reload task");
        Ok(created.id)
    }

    /// Create an external-program task with its embedded schedule events.
    pub async fn create_external_program_task(
        &self,
        bundle: &ExternalProgramTaskCreate,
    ) -> QrsResult<Uuid> {
        let response = self
            .rest
            .post_json(
                "/externalprogramtask/create",
                &[],
                Self::encode(bundle, "external program task creation")?,
                Idempotency::NonIdempotent,
            )
            .await?;
        let created: CreatedId = Self::decode(&response, "external program task creation")?;
        debug!(task = %bundle.task.name, id = %created.id, "created external program task");
        Ok(created.id)
    }

    /// Create a composite event after all endpoint tasks exist.
    pub async fn create_composite_event(&self, spec: &CompositeEventSpec) -> QrsResult<Uuid> {
        let response = self
            .rest
            .post_json(
                "/compositeevent",
                &[],
                Self::encode(spec, "composite event creation")?,
                Idempotency::NonIdempotent,
            )
            .await?;
        let created: CreatedId = Self::decode(&response, "composite event creation")?;
        debug!(event = %spec.name, id = %created.id, "created composite event");
        Ok(created.id)
    }

    /// Fetch a full task object as raw JSON, apply `patch`, and PUT it back.
    /// Used by the custom-property-set command; the Repository requires the
    /// whole object on update.
    pub async fn patch_reload_task(
        &self,
        id: Uuid,
        patch: impl FnOnce(&mut serde_json::Value),
    ) -> QrsResult<()> {
        self.patch_object(&format!("/reloadtask/{}", id), "reload task", patch)
            .await
    }

    pub async fn patch_external_program_task(
        &self,
        id: Uuid,
        patch: impl FnOnce(&mut serde_json::Value),
    ) -> QrsResult<()> {
        self.patch_object(
            &format!("/externalprogramtask/{}", id),
            "external program task",
            patch,
        )
        .await
    }

    async fn patch_object(
        &self,
        path: &str,
        what: &str,
        patch: impl FnOnce(&mut serde_json::Value),
    ) -> QrsResult<()> {
        let response = self.rest.get(path, &[]).await?;
        let mut object: serde_json::Value = Self::decode(&response, what)?;
        patch(&mut object);
        let response = self.rest.put_json(path, object).await?;
        if !response.is_success() {
            return Err(QrsError::Api {
                what: format!("{} update", what),
                status: response.status.as_u16(),
                body: response.body_text(),
            });
        }
        Ok(())
    }
}
