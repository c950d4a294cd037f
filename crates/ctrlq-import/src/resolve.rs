//! Reference resolution across the three namespaces: existing server
//! objects (by GUID), objects created earlier in the same run (by local
//! counter), and objects referenced by name (tags, custom properties,
//! streams, apps).

use ctrlq_core::{AppRef, CustomPropertyValue, TaskKind};
use ctrlq_graph::TaskGraph;
use ctrlq_qrs::types::{QrsCustomPropertyRef, QrsCustomPropertyValue, QrsStream, QrsTag};
use ctrlq_qrs::{QrsClient, QrsError};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ImportError, ImportResult};

/// A rule endpoint resolved to a concrete task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRule {
    pub id: Uuid,
    pub kind: TaskKind,
}

/// Resolves symbolic references against the Repository caches and the task
/// graph.
pub struct Resolver<'a> {
    qrs: &'a QrsClient,
    graph: &'a TaskGraph,
}

impl<'a> Resolver<'a> {
    pub fn new(qrs: &'a QrsClient, graph: &'a TaskGraph) -> Self {
        Self { qrs, graph }
    }

    /// Every tag name must match an existing tag, case-sensitively.
    /// Creating tags is out of scope.
    pub async fn resolve_tags(&self, names: &[String]) -> ImportResult<Vec<QrsTag>> {
        let mut tags: Vec<QrsTag> = Vec::with_capacity(names.len());
        for name in names {
            match self.qrs.tag_by_name(name).await? {
                Some(tag) => tags.push(tag),
                None => return Err(ImportError::UnknownTag(name.clone())),
            }
        }
        Ok(tags)
    }

    /// Every name must identify an existing property, and every value must
    /// be among that property's declared choices.
    pub async fn resolve_custom_properties(
        &self,
        values: &[CustomPropertyValue],
    ) -> ImportResult<Vec<QrsCustomPropertyValue>> {
        let mut resolved: Vec<QrsCustomPropertyValue> = Vec::with_capacity(values.len());
        for value in values {
            let definition = self
                .qrs
                .custom_property_by_name(&value.name)
                .await?
                .ok_or_else(|| ImportError::UnknownCustomProperty(value.name.clone()))?;
            if !definition.choice_values.iter().any(|c| c == &value.value) {
                return Err(ImportError::InvalidCustomPropertyValue {
                    property: value.name.clone(),
                    value: value.value.clone(),
                });
            }
            resolved.push(QrsCustomPropertyValue {
                value: value.value.clone(),
                definition: QrsCustomPropertyRef {
                    id: definition.id,
                    name: definition.name,
                },
            });
        }
        Ok(resolved)
    }

    /// An app reference is a GUID (checked against the server) or
    /// `newapp-<n>` (resolved against the uploads of this run). Resolving
    /// the same reference twice yields the same GUID.
    pub async fn resolve_app_ref(
        &self,
        raw: &str,
        uploaded: &HashMap<u32, Uuid>,
    ) -> ImportResult<Uuid> {
        let app_ref =
            AppRef::from_str(raw).map_err(|_| ImportError::UnresolvedApp(raw.to_string()))?;
        match app_ref {
            AppRef::Guid(id) => match self.qrs.get_app(id).await {
                Ok(app) => Ok(app.id),
                Err(QrsError::Api { status: 404, .. }) => {
                    Err(ImportError::UnresolvedApp(raw.to_string()))
                }
                Err(other) => Err(other.into()),
            },
            AppRef::New(counter) => uploaded
                .get(&counter)
                .copied()
                .ok_or_else(|| ImportError::UnresolvedApp(raw.to_string())),
        }
    }

    /// Streams resolve by GUID first, then by case-sensitive name. A miss
    /// is a warning that cancels the publish step for that app only.
    pub async fn resolve_stream(&self, reference: &str) -> ImportResult<Option<QrsStream>> {
        let stream = self.qrs.stream_by_ref(reference).await?;
        if stream.is_none() {
            warn!(stream = reference, "stream not found, skipping publish");
        }
        Ok(stream)
    }

    /// A reference matching a task GUID the server population already
    /// knows wins; only then is it tried as the `Task id` of another row
    /// in the same import.
    pub fn resolve_rule_ref(
        &self,
        raw: &str,
        local: &HashMap<String, ResolvedRule>,
    ) -> ImportResult<ResolvedRule> {
        if let Ok(id) = Uuid::parse_str(raw) {
            if self.graph.contains_task(id) {
                if let Some(node) = self.graph.task(id) {
                    return Ok(ResolvedRule {
                        id,
                        kind: node.kind,
                    });
                }
            }
        }
        if let Some(resolved) = local.get(raw) {
            return Ok(*resolved);
        }
        Err(ImportError::UnresolvedRuleRef(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctrlq_graph::TaskNode;
    use ctrlq_session::{AuthMethod, RestClient, SessionConfig};

    fn offline_qrs() -> QrsClient {
        let config = SessionConfig::new("localhost", AuthMethod::Bearer("token".to_string()));
        QrsClient::new(RestClient::new(config).unwrap())
    }

    fn graph_with_task(name: &str) -> (TaskGraph, Uuid) {
        let mut graph = TaskGraph::new();
        let mut node = TaskNode::tombstone(Uuid::new_v4());
        node.name = name.to_string();
        node.tombstone = false;
        let id = node.id;
        graph.add_task(node);
        (graph, id)
    }

    #[test]
    fn test_rule_ref_prefers_server_guid() {
        let qrs = offline_qrs();
        let (graph, server_id) = graph_with_task("X");
        let resolver = Resolver::new(&qrs, &graph);

        let mut local = HashMap::new();
        // A Task id cell that happens to equal an existing server GUID:
        // the server task wins over the same-run mapping.
        local.insert(
            server_id.to_string(),
            ResolvedRule {
                id: Uuid::new_v4(),
                kind: TaskKind::Reload,
            },
        );
        let resolved = resolver
            .resolve_rule_ref(&server_id.to_string(), &local)
            .unwrap();
        assert_eq!(resolved.id, server_id);
    }

    #[test]
    fn test_rule_ref_resolves_server_guid_without_local_map() {
        let qrs = offline_qrs();
        let (graph, server_id) = graph_with_task("X");
        let resolver = Resolver::new(&qrs, &graph);
        let resolved = resolver
            .resolve_rule_ref(&server_id.to_string(), &HashMap::new())
            .unwrap();
        assert_eq!(resolved.id, server_id);
    }

    #[test]
    fn test_rule_ref_falls_back_to_local_counter() {
        let qrs = offline_qrs();
        let (graph, _) = graph_with_task("X");
        let resolver = Resolver::new(&qrs, &graph);

        let local_id = Uuid::new_v4();
        let mut local = HashMap::new();
        local.insert(
            "2".to_string(),
            ResolvedRule {
                id: local_id,
                kind: TaskKind::ExternalProgram,
            },
        );
        let resolved = resolver.resolve_rule_ref("2", &local).unwrap();
        assert_eq!(resolved.id, local_id);
    }

    #[test]
    fn test_rule_ref_unresolved() {
        let qrs = offline_qrs();
        let (graph, _) = graph_with_task("X");
        let resolver = Resolver::new(&qrs, &graph);
        let result = resolver.resolve_rule_ref("99", &HashMap::new());
        assert!(matches!(result, Err(ImportError::UnresolvedRuleRef(_))));
        let result = resolver.resolve_rule_ref(&Uuid::new_v4().to_string(), &HashMap::new());
        assert!(matches!(result, Err(ImportError::UnresolvedRuleRef(_))));
    }
}
