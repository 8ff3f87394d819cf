use crate::database::reference::Reference;
use crate::database::snapshot::DataSnapshot;
use crate::database::DatabaseError;
use bytes::Bytes;
use reqwest::{header, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

// Terminal operations. These consume the reference's accumulated modifiers
// and perform the HTTP exchange; the builder methods never do.
impl Reference {
    async fn send(
        &self,
        method: Method,
        extra: &[(&'static str, String)],
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, DatabaseError> {
        let mut params = self.query.to_rest_params();
        params.extend(extra.iter().cloned());
        let url = self.database.rest_url(&self.path, &params).await?;

        debug!(%method, path = %self.path, "database request");
        let mut request = self.database.client().request(method, url);
        if let Some(body) = body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(DatabaseError::ApiError {
                status: status.as_u16(),
                message: extract_error_message(&raw).unwrap_or_else(|| status.to_string()),
            });
        }

        Ok(response.bytes().await?)
    }

    /// Overwrites the data at this location.
    pub async fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), DatabaseError> {
        self.send(Method::PUT, &[], Some(serde_json::to_vec(value)?)).await?;
        Ok(())
    }

    /// Appends `value` under a server-generated key and returns the new child.
    pub async fn push<T: Serialize + ?Sized>(&self, value: &T) -> Result<Reference, DatabaseError> {
        let raw = self.send(Method::POST, &[], Some(serde_json::to_vec(value)?)).await?;
        let pushed: PushResponse = serde_json::from_slice(&raw)?;
        Ok(self.child(&pushed.name))
    }

    /// Writes the given children without touching their siblings. Keys may be
    /// nested paths.
    pub async fn update<T: Serialize + ?Sized>(&self, values: &T) -> Result<(), DatabaseError> {
        self.send(Method::PATCH, &[], Some(serde_json::to_vec(values)?)).await?;
        Ok(())
    }

    pub async fn remove(&self) -> Result<(), DatabaseError> {
        self.send(Method::DELETE, &[], None).await?;
        Ok(())
    }

    /// Reads the data at this location, honouring any query modifiers.
    pub async fn once_value(&self) -> Result<DataSnapshot, DatabaseError> {
        let raw = self.send(Method::GET, &[], None).await?;
        Ok(DataSnapshot::new(self.clone(), raw))
    }

    /// Cheap existence check that asks the server not to send child data.
    pub async fn is_null(&self) -> Result<bool, DatabaseError> {
        let raw = self
            .send(Method::GET, &[("shallow", "true".to_string())], None)
            .await?;
        Ok(raw.as_ref() == b"null")
    }

    pub fn on_value(&self) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented("on_value"))
    }

    pub fn on_child_added(&self) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented("on_child_added"))
    }

    pub fn on_child_changed(&self) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented("on_child_changed"))
    }

    pub fn on_child_moved(&self) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented("on_child_moved"))
    }

    pub fn on_child_removed(&self) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented("on_child_removed"))
    }

    pub async fn once_child_added(&self) -> Result<DataSnapshot, DatabaseError> {
        Err(DatabaseError::NotImplemented("once_child_added"))
    }

    pub async fn once_child_changed(&self) -> Result<DataSnapshot, DatabaseError> {
        Err(DatabaseError::NotImplemented("once_child_changed"))
    }

    pub async fn once_child_moved(&self) -> Result<DataSnapshot, DatabaseError> {
        Err(DatabaseError::NotImplemented("once_child_moved"))
    }

    pub async fn once_child_removed(&self) -> Result<DataSnapshot, DatabaseError> {
        Err(DatabaseError::NotImplemented("once_child_removed"))
    }
}

fn extract_error_message(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(raw) {
        if let Some(Value::String(message)) = obj.get("error") {
            return Some(message.clone());
        }
    }

    Some(raw.to_string())
}
