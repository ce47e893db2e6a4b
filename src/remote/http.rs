//! GraphQL-over-HTTP implementation of `RemoteService`
//!
//! A small blocking client: every call is one POST to `{endpoint}/graphql`
//! carrying the API key in the `key` header. Query-level `errors` are
//! surfaced as `RemoteError::Query`.

use super::types::{
    ImagePage, ItemState, PageInfo, Project, ProjectImage, Registration, RemoteItem, ServerMode,
    UploadKind, UploadTicket,
};
use super::RemoteService;
use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

/// Blocking GraphQL client for the API server
#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    url: String,
    key: String,
}

impl HttpRemote {
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RemoteError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/graphql", config.endpoint.trim_end_matches('/')),
            key: config.key.clone(),
        })
    }

    fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> RemoteResult<T> {
        trace!(url = %self.url, "GraphQL request");
        let res = self
            .client
            .post(&self.url)
            .header("key", &self.key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().unwrap_or_default();
            return Err(RemoteError::Status { status, body });
        }

        let body: GraphqlResponse<T> = res
            .json()
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;

        if !body.errors.is_empty() {
            let msg = body
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RemoteError::Query(msg));
        }

        body.data
            .ok_or_else(|| RemoteError::Malformed("response has no data".into()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemModeData {
    active_system_mode: String,
}

#[derive(Deserialize)]
struct ProjectData {
    node: Option<Project>,
}

#[derive(Deserialize)]
struct ItemStateData {
    node: Option<ItemNode>,
}

#[derive(Deserialize)]
struct ItemNode {
    state: String,
    #[serde(default)]
    error: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudData {
    supported_cloud: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketData {
    bucket_list: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestedBucketData {
    suggested_bucket: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterData {
    register_upload: UploadTicket,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisibilityData {
    is_visible: bool,
}

#[derive(Deserialize)]
struct ImagesData {
    node: Option<ImagesNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagesNode {
    all_images: ImageConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageConnection {
    total_count: usize,
    page_info: PageInfo,
    #[serde(default)]
    edges: Vec<ImageEdge>,
}

#[derive(Deserialize)]
struct ImageEdge {
    node: ProjectImage,
}

impl RemoteService for HttpRemote {
    fn server_mode(&self) -> RemoteResult<ServerMode> {
        let data: SystemModeData = self.query("query { activeSystemMode }", json!({}))?;
        Ok(ServerMode::parse(&data.active_system_mode))
    }

    fn project(&self, project_id: &str) -> RemoteResult<Option<Project>> {
        let data: ProjectData = self.query(
            "query ($id: ID!) { node(id: $id) { ... on Project { id name isImported } } }",
            json!({ "id": project_id }),
        )?;
        Ok(data.node)
    }

    fn item_state(
        &self,
        kind: UploadKind,
        project_id: &str,
        item_id: &str,
    ) -> RemoteResult<RemoteItem> {
        let data: ItemStateData = self.query(
            "query ($pid: ID!, $iid: ID!, $kind: String!) { \
               node: uploadState(projectId: $pid, itemId: $iid, kind: $kind) { state error } }",
            json!({ "pid": project_id, "iid": item_id, "kind": kind.as_str() }),
        )?;
        let node = data
            .node
            .ok_or_else(|| RemoteError::Query(format!("item {} not found", item_id)))?;
        Ok(RemoteItem {
            state: ItemState::parse(&node.state),
            errors: node.error,
        })
    }

    fn supported_clouds(&self, kind: UploadKind) -> RemoteResult<Vec<String>> {
        let data: CloudData = self.query(
            "query ($kind: String!) { supportedCloud(kind: $kind) }",
            json!({ "kind": kind.as_str() }),
        )?;
        Ok(data
            .supported_cloud
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect())
    }

    fn bucket_list(&self, kind: UploadKind, cloud: &str) -> RemoteResult<Vec<String>> {
        let data: BucketData = self.query(
            "query ($kind: String!, $cloud: String!) { bucketList(kind: $kind, cloud: $cloud) }",
            json!({ "kind": kind.as_str(), "cloud": cloud }),
        )?;
        Ok(data.bucket_list)
    }

    fn suggested_bucket(&self, kind: UploadKind, cloud: &str) -> RemoteResult<String> {
        let data: SuggestedBucketData = self.query(
            "query ($kind: String!, $cloud: String!) { suggestedBucket(kind: $kind, cloud: $cloud) }",
            json!({ "kind": kind.as_str(), "cloud": cloud }),
        )?;
        Ok(data.suggested_bucket)
    }

    fn register_upload(&self, registration: &Registration) -> RemoteResult<UploadTicket> {
        let data: RegisterData = self.query(
            "mutation ($input: RegisterUploadInput!) { \
               registerUpload(input: $input) { itemId uploadUrl } }",
            json!({ "input": registration }),
        )?;
        Ok(data.register_upload)
    }

    fn check_visibility(&self, ip: &str, port: u16) -> RemoteResult<bool> {
        let data: VisibilityData = self.query(
            "query ($ip: String!, $port: Int!) { isVisible: checkVisibility(ip: $ip, port: $port) }",
            json!({ "ip": ip, "port": port }),
        )?;
        Ok(data.is_visible)
    }

    fn project_images(
        &self,
        project_id: &str,
        first: usize,
        after: Option<&str>,
    ) -> RemoteResult<ImagePage> {
        let data: ImagesData = self.query(
            "query ($id: ID!, $first: Int!, $after: String) { node(id: $id) { ... on Project { \
               allImages(first: $first, after: $after) { totalCount \
                 pageInfo { hasNextPage endCursor } \
                 edges { node { name filename state url } } } } } }",
            json!({ "id": project_id, "first": first, "after": after }),
        )?;
        let conn = data
            .node
            .ok_or_else(|| RemoteError::Query(format!("project {} not found", project_id)))?
            .all_images;
        Ok(ImagePage {
            images: conn.edges.into_iter().map(|e| e.node).collect(),
            page_info: conn.page_info,
            total: conn.total_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use std::time::Duration;

    /// Answer every POST to `/graphql` with one canned reply; requests
    /// without the `secret` key get 401
    fn canned(status: StatusCode, body: &'static str) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/graphql",
            post(move |headers: HeaderMap| async move {
                if headers.get("key").and_then(|k| k.to_str().ok()) != Some("secret") {
                    return (StatusCode::UNAUTHORIZED, "missing key");
                }
                (status, body)
            }),
        );
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                axum::serve(listener, app).await.unwrap();
            });
        });
        format!("http://{}", addr)
    }

    fn remote(endpoint: String, key: &str) -> HttpRemote {
        HttpRemote::new(&RemoteConfig {
            endpoint,
            key: key.into(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_query_sends_key_and_decodes_data() {
        let endpoint = canned(StatusCode::OK, r#"{"data":{"activeSystemMode":"ReadOnly"}}"#);
        assert_eq!(remote(endpoint.clone(), "secret").server_mode().unwrap(), ServerMode::ReadOnly);

        match remote(endpoint, "wrong").server_mode() {
            Err(RemoteError::Status { status, .. }) => assert_eq!(status, 401),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_query_non_success_status() {
        let endpoint = canned(StatusCode::BAD_GATEWAY, "upstream down");
        match remote(endpoint, "secret").server_mode() {
            Err(RemoteError::Status { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_query_errors_are_joined() {
        let endpoint = canned(
            StatusCode::OK,
            r#"{"data":null,"errors":[{"message":"bad key"},{"message":"expired"}]}"#,
        );
        match remote(endpoint, "secret").server_mode() {
            Err(RemoteError::Query(msg)) => assert_eq!(msg, "bad key; expired"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_query_without_data_is_malformed() {
        let endpoint = canned(StatusCode::OK, "{}");
        assert!(matches!(
            remote(endpoint, "secret").server_mode(),
            Err(RemoteError::Malformed(_))
        ));

        let endpoint = canned(StatusCode::OK, "<html>not json</html>");
        assert!(matches!(
            remote(endpoint, "secret").server_mode(),
            Err(RemoteError::Malformed(_))
        ));
    }

    #[test]
    fn test_project_images_page() {
        let endpoint = canned(
            StatusCode::OK,
            r#"{"data":{"node":{"allImages":{"totalCount":3,
                "pageInfo":{"hasNextPage":true,"endCursor":"c2"},
                "edges":[{"node":{"name":"a.jpg","filename":"h1.jpg","state":"Ready","url":"http://x/a"}},
                         {"node":{"name":"b.jpg","filename":"h2.jpg","state":"Pending","url":""}}]}}}}"#,
        );
        let page = remote(endpoint, "secret").project_images("pid", 2, None).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.images.len(), 2);
        assert_eq!(page.images[0].filename, "h1.jpg");
        assert!(page.page_info.has_next_page);
        assert_eq!(page.page_info.end_cursor.as_deref(), Some("c2"));
    }

    #[test]
    fn test_graphql_error_shape() {
        let body: GraphqlResponse<SystemModeData> =
            serde_json::from_str(r#"{"data":null,"errors":[{"message":"bad key"}]}"#).unwrap();
        assert!(body.data.is_none());
        assert_eq!(body.errors[0].message, "bad key");
    }

    #[test]
    fn test_item_node_defaults_errors() {
        let body: GraphqlResponse<ItemStateData> =
            serde_json::from_str(r#"{"data":{"node":{"state":"Pending"}}}"#).unwrap();
        let node = body.data.unwrap().node.unwrap();
        assert_eq!(node.state, "Pending");
        assert!(node.error.is_empty());
    }

    #[test]
    fn test_url_joins_endpoint() {
        let config = RemoteConfig {
            endpoint: "https://api.example.com/".into(),
            key: "k".into(),
            request_timeout: std::time::Duration::from_secs(5),
        };
        let remote = HttpRemote::new(&config).unwrap();
        assert_eq!(remote.url, "https://api.example.com/graphql");
    }
}
