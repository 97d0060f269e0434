//! REST client for the hosted deed table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deedbook_core::constants::DEEDS_TABLE;
use deedbook_core::deeds::{Deed, DeedPatch, DeedStoreTrait, Partition};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;

use crate::auth::SessionAuth;
use crate::error::{CloudError, Result};
use crate::types::ApiErrorResponse;

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client for the hosted deed table.
///
/// Requests carry the signed-in user's token when there is one and fall back
/// to the public API key otherwise. Row-level policies on the backend decide
/// what an anonymous caller may see.
#[derive(Debug, Clone)]
pub struct DeedbookClient {
    client: reqwest::Client,
    base_url: String,
    auth: Arc<SessionAuth>,
}

impl DeedbookClient {
    /// Create a new client sharing `auth`'s session.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The project URL (e.g., "https://xyz.example.co")
    /// * `auth` - Session used for the bearer token
    pub fn new(base_url: &str, auth: Arc<SessionAuth>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, DEEDS_TABLE)
    }

    /// Create headers for a table request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let anon_key = self.auth.anon_key();
        let api_key = HeaderValue::from_str(anon_key)
            .map_err(|_| CloudError::auth("Invalid API key format"))?;
        headers.insert("apikey", api_key);

        let token = self
            .auth
            .access_token()
            .unwrap_or_else(|| anon_key.to_string());
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| CloudError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rows
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch the user's rows in a partition, oldest first.
    ///
    /// GET /rest/v1/deeds?select=*&user_id=eq.{user}&...
    pub async fn fetch_deeds(&self, user_id: &str, partition: &Partition) -> Result<Vec<Deed>> {
        debug!("Fetching deeds for {} in {}", user_id, partition);
        let response = self
            .client
            .get(self.table_url())
            .headers(self.headers()?)
            .query(&list_query(user_id, partition))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Insert rows and return them as stored.
    ///
    /// POST /rest/v1/deeds
    pub async fn create_deeds(&self, deeds: &[Deed]) -> Result<Vec<Deed>> {
        if deeds.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Inserting {} deed(s)", deeds.len());
        let response = self
            .client
            .post(self.table_url())
            .headers(self.headers()?)
            .header("Prefer", "return=representation")
            .json(deeds)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Write one column, or the whole extra-field map, of one row.
    ///
    /// PATCH /rest/v1/deeds?id=eq.{id}
    pub async fn patch_deed(&self, deed_id: &str, patch: &DeedPatch) -> Result<()> {
        require_id(deed_id)?;
        debug!("Patching deed {}", deed_id);
        let response = self
            .client
            .patch(self.table_url())
            .headers(self.headers()?)
            .query(&id_query(deed_id))
            .json(&patch.to_json())
            .send()
            .await?;

        Self::check_response(response).await
    }

    /// Delete one row.
    ///
    /// DELETE /rest/v1/deeds?id=eq.{id}
    pub async fn remove_deed(&self, deed_id: &str) -> Result<()> {
        require_id(deed_id)?;
        debug!("Deleting deed {}", deed_id);
        let response = self
            .client
            .delete(self.table_url())
            .headers(self.headers()?)
            .query(&id_query(deed_id))
            .send()
            .await?;

        Self::check_response(response).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Responses
    // ─────────────────────────────────────────────────────────────────────────

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        parse_response(response).await
    }

    async fn check_response(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        Err(api_error(status.as_u16(), &body))
    }
}

/// Parse a JSON response, turning non-success statuses into `CloudError::Api`.
pub(crate) async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    debug!("API response ({}): {}", status, body);

    if !status.is_success() {
        return Err(api_error(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        log::error!(
            "Failed to deserialize response. Body: {}, Error: {}",
            body,
            e
        );
        CloudError::api(status.as_u16(), format!("Failed to parse response: {}", e))
    })
}

fn api_error(status: u16, body: &str) -> CloudError {
    let described = serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .and_then(|e| e.describe());
    match described {
        Some(message) => CloudError::api(status, message),
        None => CloudError::api(status, format!("Request failed: {}", body)),
    }
}

fn require_id(deed_id: &str) -> Result<()> {
    if deed_id.trim().is_empty() {
        return Err(CloudError::invalid_request("Deed id is required"));
    }
    Ok(())
}

/// Query pairs selecting a user's rows in one partition.
///
/// Rows written before partitions existed carry no tag and belong to the
/// legacy partition.
pub(crate) fn list_query(user_id: &str, partition: &Partition) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("select", "*".to_string()),
        ("user_id", format!("eq.{}", user_id)),
    ];
    if partition.is_legacy() {
        query.push((
            "or",
            format!(
                "(table_type.eq.\"{}\",table_type.is.null)",
                partition.as_str()
            ),
        ));
    } else {
        query.push(("table_type", format!("eq.{}", partition.as_str())));
    }
    query.push(("order", "created_at.asc".to_string()));
    query
}

fn id_query(deed_id: &str) -> [(&'static str, String); 1] {
    [("id", format!("eq.{}", deed_id))]
}

#[async_trait]
impl DeedStoreTrait for DeedbookClient {
    async fn list_deeds(
        &self,
        user_id: &str,
        partition: &Partition,
    ) -> deedbook_core::Result<Vec<Deed>> {
        Ok(self.fetch_deeds(user_id, partition).await?)
    }

    async fn insert_deeds(&self, deeds: Vec<Deed>) -> deedbook_core::Result<Vec<Deed>> {
        Ok(self.create_deeds(&deeds).await?)
    }

    async fn update_deed(&self, deed_id: &str, patch: DeedPatch) -> deedbook_core::Result<()> {
        Ok(self.patch_deed(deed_id, &patch).await?)
    }

    async fn delete_deed(&self, deed_id: &str) -> deedbook_core::Result<()> {
        Ok(self.remove_deed(deed_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value<'a>(query: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        query
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_legacy_partition_includes_untagged_rows() {
        let query = list_query("u1", &Partition::legacy());
        assert_eq!(value(&query, "user_id"), Some("eq.u1"));
        assert_eq!(
            value(&query, "or"),
            Some("(table_type.eq.\"default\",table_type.is.null)")
        );
        assert_eq!(value(&query, "table_type"), None);
        assert_eq!(value(&query, "order"), Some("created_at.asc"));
    }

    #[test]
    fn test_named_partition_filters_exactly() {
        let query = list_query("u1", &Partition::new("village-a"));
        assert_eq!(value(&query, "table_type"), Some("eq.village-a"));
        assert_eq!(value(&query, "or"), None);
    }

    #[test]
    fn test_api_error_prefers_structured_body() {
        let err = api_error(
            400,
            r#"{"code":"22P02","message":"invalid input syntax","hint":null}"#,
        );
        assert!(
            matches!(err, CloudError::Api { status: 400, ref message } if message == "22P02: invalid input syntax")
        );

        let err = api_error(502, "bad gateway");
        assert!(
            matches!(err, CloudError::Api { status: 502, ref message } if message == "Request failed: bad gateway")
        );
    }

    #[test]
    fn test_headers_fall_back_to_anon_key() {
        let auth = Arc::new(SessionAuth::new("https://example.test", "anon").unwrap());
        let client = DeedbookClient::new("https://example.test/", auth).unwrap();
        let headers = client.headers().unwrap();
        assert_eq!(headers.get("apikey").unwrap(), "anon");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer anon");
        assert_eq!(client.table_url(), "https://example.test/rest/v1/deeds");
    }

    #[tokio::test]
    async fn test_blank_ids_are_rejected_before_sending() {
        let auth = Arc::new(SessionAuth::new("https://example.test", "anon").unwrap());
        let client = DeedbookClient::new("https://example.test", auth).unwrap();
        assert!(matches!(
            client.remove_deed("  ").await,
            Err(CloudError::InvalidRequest(_))
        ));
        assert!(client.create_deeds(&[]).await.unwrap().is_empty());
    }
}
