//! App endpoints: QVF upload, stream publication, owner change.

use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::client::QrsClient;
use crate::error::{QrsError, QrsResult};
use crate::types::{QrsApp, QrsCustomPropertyValue, QrsTag};

/// MIME type of an uploaded QVF.
const QVF_CONTENT_TYPE: &str = "application/vnd.qlik.sense.app";

/// A Sense user as returned by `/qrs/user`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsUser {
    pub id: Uuid,
    pub user_id: String,
    pub user_directory: String,
}

impl QrsClient {
    /// Stream a QVF to the Repository and return the created app.
    ///
    /// The upload endpoint is the one QSEoW is known to throttle; the
    /// transport's 429 backoff carries this call.
    pub async fn upload_app(
        &self,
        qvf: &Path,
        name: &str,
        exclude_data_connections: bool,
    ) -> QrsResult<QrsApp> {
        let query = [
            ("name", name.to_string()),
            ("keepdata", "false".to_string()),
            (
                "excludeconnections",
                exclude_data_connections.to_string(),
            ),
        ];
        let response = self
            .rest()
            .post_file("/app/upload", &query, qvf.to_path_buf(), QVF_CONTENT_TYPE)
            .await?;
        let app: QrsApp = Self::decode(&response, "app upload")?;
        info!(app = %app.name, id = %app.id, qvf = %qvf.display(), "uploaded app");
        Ok(app)
    }

    /// Publish an app to a stream.
    pub async fn publish_app(&self, app_id: Uuid, stream_id: Uuid) -> QrsResult<QrsApp> {
        let response = self
            .rest()
            .request(
                reqwest::Method::PUT,
                &format!("/app/{}/publish", app_id),
                &[("stream", stream_id.to_string())],
                ctrlq_session::RequestBody::None,
                ctrlq_session::Idempotency::Idempotent,
            )
            .await?;
        let app: QrsApp = Self::decode(&response, "app publish")?;
        debug!(app = %app_id, stream = %stream_id, "published app");
        Ok(app)
    }

    /// Look up a user by directory and id.
    pub async fn get_user(&self, directory: &str, user_id: &str) -> QrsResult<QrsUser> {
        let filter = format!(
            "userDirectory eq '{}' and userId eq '{}'",
            directory, user_id
        );
        let response = self
            .rest()
            .get("/user", &[("filter", filter.clone())])
            .await?;
        let users: Vec<QrsUser> = Self::decode(&response, "user lookup")?;
        users.into_iter().next().ok_or(QrsError::NotFound {
            kind: "user",
            name: format!("{}\\{}", directory, user_id),
        })
    }

    /// Change an app's owner. The Repository wants the whole object on PUT,
    /// so this reads, patches, and writes back.
    pub async fn set_app_owner(&self, app_id: Uuid, directory: &str, user_id: &str) -> QrsResult<()> {
        let user = self.get_user(directory, user_id).await?;
        self.patch_app(app_id, |app| {
            app["owner"] = serde_json::json!({
                "id": user.id,
                "userId": user.user_id,
                "userDirectory": user.user_directory,
            });
        })
        .await?;
        debug!(app = %app_id, owner = %format!("{}\\{}", directory, user_id), "changed app owner");
        Ok(())
    }

    /// Replace an app's tags and custom-property values.
    pub async fn set_app_labels(
        &self,
        app_id: Uuid,
        tags: &[QrsTag],
        custom_properties: &[QrsCustomPropertyValue],
    ) -> QrsResult<()> {
        let tags_value = serde_json::to_value(tags).map_err(|source| QrsError::Json {
            what: "app tags".to_string(),
            source,
        })?;
        let cp_value =
            serde_json::to_value(custom_properties).map_err(|source| QrsError::Json {
                what: "app custom properties".to_string(),
                source,
            })?;
        self.patch_app(app_id, move |app| {
            app["tags"] = tags_value;
            app["customProperties"] = cp_value;
        })
        .await
    }

    async fn patch_app(
        &self,
        app_id: Uuid,
        patch: impl FnOnce(&mut serde_json::Value),
    ) -> QrsResult<()> {
        let path = format!("/app/{}", app_id);
        let response = self.rest().get(&path, &[]).await?;
        let mut app: serde_json::Value = Self::decode(&response, "app")?;
        patch(&mut app);
        let response = self.rest().put_json(&path, app).await?;
        if !response.is_success() {
            return Err(QrsError::Api {
                what: format!("app update {}", app_id),
                status: response.status.as_u16(),
                body: response.body_text(),
            });
        }
        Ok(())
    }

    /// Existence check for an app GUID.
    pub async fn get_app(&self, app_id: Uuid) -> QrsResult<QrsApp> {
        let response = self.rest().get(&format!("/app/{}", app_id), &[]).await?;
        Self::decode(&response, "app")
    }
}
