//! Proxmox VE REST client
//!
//! Authenticates with an API token and unwraps the `{ "data": ... }` envelope
//! every endpoint returns.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::time::Duration;

use super::{ControlPlane, ControlPlaneError, VmSpec};
use crate::config::ProxmoxSettings;

type Result<T> = std::result::Result<T, ControlPlaneError>;

/// Storage content types that can hold imported disks
const DISK_CONTENT_TYPES: [&str; 2] = ["images", "rootdir"];

/// `/nodes/{node}{rest}`; node names are host names and are rejected otherwise
fn node_path(node: &str, rest: &str) -> Result<String> {
    let valid = node.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric())
        && node
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
        && !node.contains("..");

    if !valid {
        return Err(ControlPlaneError::InvalidNode(node.to_string()));
    }
    Ok(format!("/nodes/{}{}", node, rest))
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct VersionInfo {
    version: String,
}

#[derive(Deserialize)]
struct NodeEntry {
    node: String,
}

#[derive(Deserialize)]
struct ResourceEntry {
    vmid: Option<u32>,
}

#[derive(Deserialize)]
struct StorageEntry {
    storage: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct NetworkEntry {
    iface: String,
    #[serde(default)]
    active: Option<u8>,
}

/// HTTP client for the Proxmox VE API
#[derive(Debug, Clone)]
pub struct ProxmoxClient {
    /// Base URL including `/api2/json`
    base_url: String,
    /// Value of the `Authorization` header, `None` when credentials are incomplete
    auth_header: Option<String>,
    missing: Vec<&'static str>,
    client: Client,
}

impl ProxmoxClient {
    /// Creates a client for the configured cluster
    pub fn new(settings: &ProxmoxSettings) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!settings.verify_ssl)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self::with_client(settings.base_url(), settings, client))
    }

    /// Creates a client against an explicit base URL with a custom HTTP client
    pub fn with_client(base_url: impl Into<String>, settings: &ProxmoxSettings, client: Client) -> Self {
        let missing = settings.missing();
        let auth_header = missing.is_empty().then(|| {
            format!(
                "PVEAPIToken={}!{}={}",
                settings.user, settings.token_name, settings.token_value
            )
        });

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_header,
            missing,
            client,
        }
    }

    fn auth(&self) -> Result<&str> {
        self.auth_header
            .as_deref()
            .ok_or_else(|| ControlPlaneError::NotConfigured(self.missing.join(", ")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth()?)
            .query(query)
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ControlPlaneError::api_error(status.as_u16(), error_text));
        }

        response
            .json::<Envelope<T>>()
            .await
            .map(|envelope| envelope.data)
            .map_err(|e| ControlPlaneError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ControlPlaneError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[async_trait]
impl ControlPlane for ProxmoxClient {
    async fn version(&self) -> Result<String> {
        let info: VersionInfo = self.get("/version", &[]).await?;
        Ok(info.version)
    }

    async fn list_nodes(&self) -> Result<Vec<String>> {
        let nodes: Vec<NodeEntry> = self.get("/nodes", &[]).await?;
        let mut names: Vec<String> = nodes.into_iter().map(|n| n.node).collect();
        names.sort();
        Ok(names)
    }

    async fn list_vm_ids(&self) -> Result<Vec<u32>> {
        let resources: Vec<ResourceEntry> =
            self.get("/cluster/resources", &[("type", "vm")]).await?;
        let ids: BTreeSet<u32> = resources.into_iter().filter_map(|r| r.vmid).collect();
        Ok(ids.into_iter().collect())
    }

    async fn list_storage(&self, node: &str) -> Result<Vec<String>> {
        let storages: Vec<StorageEntry> =
            self.get(&node_path(node, "/storage")?, &[]).await?;

        let names: BTreeSet<String> = storages
            .into_iter()
            .filter(|s| {
                s.content
                    .split(',')
                    .any(|c| DISK_CONTENT_TYPES.contains(&c.trim()))
            })
            .map(|s| s.storage)
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn list_bridges(&self, node: &str) -> Result<Vec<String>> {
        let interfaces: Vec<NetworkEntry> = self
            .get(&node_path(node, "/network")?, &[("type", "bridge")])
            .await?;

        let mut bridges: Vec<String> = interfaces
            .into_iter()
            .filter(|i| i.active == Some(1))
            .map(|i| i.iface)
            .collect();
        bridges.sort();
        Ok(bridges)
    }

    async fn create_vm(&self, node: &str, spec: &VmSpec) -> Result<()> {
        tracing::info!("Creating VM {} '{}' on node {}", spec.vmid, spec.name, node);

        let url = format!("{}{}", self.base_url, node_path(node, "/qemu")?);
        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth()?)
            .form(&spec.form_fields())
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    async fn set_boot_order(&self, node: &str, vmid: u32, slot: &str) -> Result<()> {
        tracing::info!("Setting boot order of VM {} to {}", vmid, slot);

        let url = format!(
            "{}{}",
            self.base_url,
            node_path(node, &format!("/qemu/{}/config", vmid))?
        );
        let boot = format!("order={}", slot);
        let response = self
            .client
            .put(&url)
            .header("Authorization", self.auth()?)
            .form(&[("boot", boot.as_str())])
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> ProxmoxSettings {
        ProxmoxSettings {
            host: "pve.lab".to_string(),
            port: 8006,
            user: "root@pam".to_string(),
            token_name: "toolbox".to_string(),
            token_value: "secret".to_string(),
            verify_ssl: true,
        }
    }

    fn client(server: &MockServer) -> ProxmoxClient {
        ProxmoxClient::with_client(server.uri(), &settings(), Client::new())
    }

    #[tokio::test]
    async fn test_version_sends_token_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/version"))
            .and(header("Authorization", "PVEAPIToken=root@pam!toolbox=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "version": "8.2.4", "release": "8.2" }
            })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).version().await.unwrap(), "8.2.4");
    }

    #[tokio::test]
    async fn test_list_storage_filters_content_types() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nodes/pve1/storage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "storage": "local", "content": "iso,vztmpl,backup" },
                    { "storage": "local-lvm", "content": "images,rootdir" },
                    { "storage": "ceph", "content": "images" },
                    { "storage": "nfs" }
                ]
            })))
            .mount(&server)
            .await;

        let storages = client(&server).list_storage("pve1").await.unwrap();
        assert_eq!(storages, vec!["ceph".to_string(), "local-lvm".to_string()]);
    }

    #[tokio::test]
    async fn test_list_bridges_only_active() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nodes/pve1/network"))
            .and(query_param("type", "bridge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "iface": "vmbr1", "active": 1 },
                    { "iface": "vmbr9" },
                    { "iface": "vmbr0", "active": 1 }
                ]
            })))
            .mount(&server)
            .await;

        let bridges = client(&server).list_bridges("pve1").await.unwrap();
        assert_eq!(bridges, vec!["vmbr0".to_string(), "vmbr1".to_string()]);
    }

    #[tokio::test]
    async fn test_list_vm_ids_dedupes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cluster/resources"))
            .and(query_param("type", "vm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "vmid": 105 }, { "vmid": 100 }, { "vmid": 105 }, {} ]
            })))
            .mount(&server)
            .await;

        assert_eq!(client(&server).list_vm_ids().await.unwrap(), vec![100, 105]);
    }

    #[tokio::test]
    async fn test_create_vm_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/nodes/pve1/qemu"))
            .and(body_string_contains("scsihw=virtio-scsi-pci"))
            .and(body_string_contains("vmid=120"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": "UPID:pve1:0001"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let spec = VmSpec {
            vmid: 120,
            name: "fw".to_string(),
            memory_mb: 2048,
            cores: 2,
            os_type: "l26".to_string(),
            scsi_hw: "virtio-scsi-pci".to_string(),
            networks: Vec::new(),
        };

        client(&server).create_vm("pve1", &spec).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejection_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/nodes/pve1/qemu/120/config"))
            .respond_with(ResponseTemplate::new(500).set_body_string("VM 120 does not exist"))
            .mount(&server)
            .await;

        let err = client(&server)
            .set_boot_order("pve1", 120, "scsi0")
            .await
            .unwrap_err();

        assert!(matches!(err, ControlPlaneError::ApiError { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_incomplete_credentials_fail_without_request() {
        let mut settings = settings();
        settings.token_value = String::new();
        let client = ProxmoxClient::with_client("http://127.0.0.1:9", &settings, Client::new());

        let err = client.version().await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::NotConfigured(ref m) if m == "PROXMOX_TOKEN_VALUE"));
    }

    #[tokio::test]
    async fn test_node_name_is_validated_before_request() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server);
        for node in ["../cluster", "pve1/../..", "pve 1", "", ".hidden", "pve1?x=1"] {
            let err = client.list_bridges(node).await.unwrap_err();
            assert!(
                matches!(err, ControlPlaneError::InvalidNode(ref n) if n == node),
                "{node}: {err}"
            );
        }
        assert!(matches!(
            client.list_storage("a/b").await,
            Err(ControlPlaneError::InvalidNode(_))
        ));
    }

    #[test]
    fn test_node_path_accepts_host_names() {
        assert_eq!(node_path("pve-1", "/network").unwrap(), "/nodes/pve-1/network");
        assert_eq!(
            node_path("pve1.lab.local", "/storage").unwrap(),
            "/nodes/pve1.lab.local/storage"
        );
    }
}
