//! Networked backend speaking the Kubo (go-ipfs) HTTP RPC API.
//!
//! Content lives in the IPFS node behind the API, so a CID stored by one
//! process can be read by any other process whose node reaches the same
//! network. Every RPC call is a `POST` to `<api>/api/v0/<command>`.

use crate::{BackendError, ChunkStream, Connector, ContentBackend};
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use sharex_types::{ContentId, EntryMetadata, LocalFile, DEFAULT_MIME_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_KUBO_API_URL: &str = "http://127.0.0.1:5001";

/// MIME type reported for directory links.
pub const DIRECTORY_MIME_TYPE: &str = "inode/directory";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// UnixFS link type for directories in `ls` output.
const UNIXFS_DIRECTORY: i32 = 1;

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct LsResponse {
    #[serde(rename = "Objects", default)]
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
struct LsObject {
    #[serde(rename = "Links", default)]
    links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
struct LsLink {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "Type", default)]
    kind: i32,
}

#[derive(Debug, Deserialize)]
struct StatResponse {
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "Type", default)]
    kind: String,
}

/// Turn a non-success response into [`BackendError::Api`], keeping the
/// node's own error message when it sent one.
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|err| err.message)
        .unwrap_or(body);
    Err(BackendError::Api {
        status: status.as_u16(),
        message,
    })
}

fn parse_cid(raw: &str) -> Result<ContentId, BackendError> {
    ContentId::parse(raw)
        .map_err(|err| BackendError::InvalidResponse(format!("bad CID '{raw}': {err}")))
}

pub struct KuboBackend {
    client: Client,
    api_url: String,
}

impl KuboBackend {
    fn endpoint(&self, command: &str) -> String {
        format!("{}/api/v0/{command}", self.api_url)
    }

    async fn call(&self, command: &str, arg: &str) -> Result<Response, BackendError> {
        let response = self
            .client
            .post(self.endpoint(command))
            .query(&[("arg", arg)])
            .send()
            .await?;
        check(response).await
    }

    /// Entry for a CID that is itself a file (no directory links).
    async fn stat_entry(&self, cid: &ContentId) -> Result<EntryMetadata, BackendError> {
        let stat: StatResponse = self
            .call("files/stat", &format!("/ipfs/{cid}"))
            .await?
            .json()
            .await?;
        Ok(EntryMetadata {
            cid: cid.clone(),
            name: cid.to_string(),
            mime_type: if stat.kind == "directory" {
                DIRECTORY_MIME_TYPE.to_string()
            } else {
                DEFAULT_MIME_TYPE.to_string()
            },
            size_bytes: stat.size,
        })
    }
}

#[async_trait]
impl ContentBackend for KuboBackend {
    async fn add(&self, file: &LocalFile) -> Result<ContentId, BackendError> {
        let part = Part::bytes(file.data.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let response = self
            .client
            .post(self.endpoint("add"))
            .query(&[("pin", "true")])
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        let added: AddResponse = check(response).await?.json().await?;
        debug!(cid = %added.hash, name = %file.name, "kubo add");
        parse_cid(&added.hash)
    }

    async fn cat(&self, cid: &ContentId) -> Result<ChunkStream, BackendError> {
        let response = self.call("cat", cid.as_str()).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(BackendError::from))
            .boxed())
    }

    async fn ls(&self, cid: &ContentId) -> Result<Vec<EntryMetadata>, BackendError> {
        let listing: LsResponse = self.call("ls", cid.as_str()).await?.json().await?;
        let links: Vec<LsLink> = listing
            .objects
            .into_iter()
            .flat_map(|object| object.links)
            .collect();

        if links.is_empty() {
            return Ok(vec![self.stat_entry(cid).await?]);
        }

        links
            .into_iter()
            .map(|link| {
                Ok(EntryMetadata {
                    cid: parse_cid(&link.hash)?,
                    name: link.name,
                    mime_type: if link.kind == UNIXFS_DIRECTORY {
                        DIRECTORY_MIME_TYPE.to_string()
                    } else {
                        DEFAULT_MIME_TYPE.to_string()
                    },
                    size_bytes: link.size,
                })
            })
            .collect()
    }
}

/// Reaches a Kubo node over its RPC API. Connecting checks that the node
/// answers `id` before handing out a backend.
#[derive(Debug, Clone)]
pub struct KuboConnector {
    api_url: String,
}

impl KuboConnector {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

impl Default for KuboConnector {
    fn default() -> Self {
        Self::new(DEFAULT_KUBO_API_URL)
    }
}

#[async_trait]
impl Connector for KuboConnector {
    async fn connect(&self) -> Result<Arc<dyn ContentBackend>, BackendError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        let backend = KuboBackend {
            client,
            api_url: self.api_url.clone(),
        };
        let response = backend
            .client
            .post(backend.endpoint("id"))
            .send()
            .await
            .map_err(|err| BackendError::Unavailable(format!("{}: {err}", self.api_url)))?;
        let identity: IdResponse = check(response).await?.json().await?;
        info!(api = %self.api_url, peer_id = %identity.id, "kubo node reachable");
        Ok(Arc::new(backend))
    }
}
