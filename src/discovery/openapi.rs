//! OpenAPI v3 discovery.

use std::collections::BTreeMap;

use http::header::ACCEPT;
use kube::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::Result;

/// Root of the OpenAPI v3 discovery document.
const OPENAPI_V3_PATH: &str = "/openapi/v3";

#[derive(Debug, Deserialize)]
struct PathsDocument {
    #[serde(default)]
    paths: BTreeMap<String, PathEntry>,
}

#[derive(Debug, Deserialize)]
struct PathEntry {
    #[serde(rename = "serverRelativeURL")]
    server_relative_url: String,
}

/// Client for the OpenAPI v3 endpoints of an API server.
///
/// The discovery document maps each group version path (`api/v1`,
/// `apis/apps/v1`) to a server-relative URL carrying a content hash. Fetch
/// the map with [`paths`](Self::paths), then a document with
/// [`schema`](Self::schema).
#[derive(Clone)]
pub struct OpenApiV3 {
    client: Client,
}

impl OpenApiV3 {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Group version path to server-relative schema URL.
    pub async fn paths(&self) -> Result<BTreeMap<String, String>> {
        let document: PathsDocument = self.get(OPENAPI_V3_PATH).await?;
        Ok(document
            .paths
            .into_iter()
            .map(|(path, entry)| (path, entry.server_relative_url))
            .collect())
    }

    /// Fetch the schema document at a server-relative URL from [`paths`](Self::paths).
    pub async fn schema(&self, server_relative_url: &str) -> Result<serde_json::Value> {
        self.get(server_relative_url).await
    }

    async fn get<T: DeserializeOwned>(&self, uri: &str) -> Result<T> {
        let request = http::Request::get(uri)
            .header(ACCEPT, "application/json")
            .body(Vec::new())?;
        Ok(self.client.request(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_utils::{mock_client, serve};

    #[tokio::test]
    async fn test_paths_and_schema() {
        let (client, handle) = mock_client();
        let server = serve(
            handle,
            vec![
                (
                    "/openapi/v3",
                    json!({
                        "paths": {
                            "api/v1": {"serverRelativeURL": "/openapi/v3/api/v1?hash=AB12"},
                            "apis/apps/v1": {"serverRelativeURL": "/openapi/v3/apis/apps/v1?hash=CD34"}
                        }
                    }),
                ),
                ("/openapi/v3/apis/apps/v1", json!({"openapi": "3.0.0"})),
            ],
        );

        let openapi = OpenApiV3::new(client);
        let paths = openapi.paths().await.unwrap();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths["apis/apps/v1"], "/openapi/v3/apis/apps/v1?hash=CD34");

        let schema = openapi.schema(&paths["apis/apps/v1"]).await.unwrap();
        assert_eq!(schema["openapi"], "3.0.0");
        server.abort();
    }
}
