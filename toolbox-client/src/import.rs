//! VM import endpoints

use std::path::Path;

use reqwest::Body;
use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;
use toolbox_core::domain::import::ImportPlan;
use toolbox_core::dto::import::{BridgeList, Inventory, StartImportRequest, UploadResponse};
use toolbox_core::dto::job::JobStarted;
use tracing::debug;
use uuid::Uuid;

use crate::ConsoleClient;
use crate::error::Result;

impl ConsoleClient {
    /// Nodes, used VM ids and storages of the cluster
    ///
    /// Storages are listed for `node`, or for the first node when `None`.
    pub async fn inventory(&self, node: Option<&str>) -> Result<Inventory> {
        let mut request = self.client.get(self.url("/api/import/inventory"));
        if let Some(node) = node {
            request = request.query(&[("node", node)]);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Active bridges on one node
    pub async fn bridges(&self, node: &str) -> Result<BridgeList> {
        let response = self
            .client
            .get(self.url(&format!("/api/import/bridges/{}", node)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Streams a zip archive to the server and returns the extracted disk images
    pub async fn upload_archive(&self, path: &Path) -> Result<UploadResponse> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.zip".to_string());

        debug!("Uploading {} ({} bytes)", path.display(), size);

        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, size)
            .file_name(file_name)
            .mime_str("application/zip")?;
        let form = Form::new().part("archive", part);

        let response = self
            .client
            .post(self.url("/api/import/upload"))
            .multipart(form)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Starts an import job for a previously uploaded archive
    pub async fn start_import(&self, upload_id: Uuid, plan: ImportPlan) -> Result<JobStarted> {
        let request = StartImportRequest { upload_id, plan };
        let response = self
            .client
            .post(self.url("/api/import/start"))
            .json(&request)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
