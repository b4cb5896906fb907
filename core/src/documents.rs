use crate::transport::{decode_json, endpoint, TransportError};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use url::Url;

const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status: String,
    pub message: String,
    pub num_chunks: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
    pub message: String,
}

#[derive(Deserialize)]
struct StatusMessage {
    message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error("only PDF files are supported, got {0}")]
    UnsupportedFile(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not prepare upload of {file}: {cause}")]
    InvalidUpload { file: String, cause: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Client for the reference documents the chat service answers from.
#[derive(Clone)]
pub struct DocumentLibrary {
    client: Client,
    base_url: Url,
}

impl DocumentLibrary {
    pub fn new(base_url: &Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &Url) -> Self {
        Self {
            client,
            base_url: base_url.clone(),
        }
    }

    pub async fn list(&self) -> Result<Vec<String>, TransportError> {
        let response = self
            .client
            .get(endpoint(&self.base_url, "documents"))
            .send()
            .await
            .map_err(TransportError::unreachable)?;
        decode_json(response).await
    }

    pub async fn upload(&self, path: &Path) -> Result<UploadReceipt, DocumentError> {
        let file_name = pdf_file_name(path)?;
        let bytes = tokio::fs::read(path).await.map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        tracing::info!(file = %file_name, bytes = bytes.len(), "uploading document");
        let part = upload_part(bytes, file_name, PDF_MIME)?;
        let response = self
            .client
            .post(endpoint(&self.base_url, "upload"))
            .multipart(Form::new().part("file", part))
            .send()
            .await
            .map_err(TransportError::unreachable)?;
        Ok(decode_json(response).await?)
    }

    /// Removes a document and returns the server's confirmation.
    pub async fn delete(&self, file_name: &str) -> Result<String, TransportError> {
        let mut url = endpoint(&self.base_url, "documents");
        url.path_segments_mut()
            .map_err(|_| TransportError::Unreachable {
                cause: format!("{} cannot carry a path", self.base_url),
            })?
            .push(file_name);
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(TransportError::unreachable)?;
        let body: StatusMessage = decode_json(response).await?;
        Ok(body.message)
    }

    /// Asks the server root whether the service is up.
    pub async fn health(&self) -> Result<HealthStatus, TransportError> {
        let mut root = self.base_url.clone();
        root.set_path("/");
        let response = self
            .client
            .get(root)
            .send()
            .await
            .map_err(TransportError::unreachable)?;
        decode_json(response).await
    }
}

fn pdf_file_name(path: &Path) -> Result<String, DocumentError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| DocumentError::UnsupportedFile(path.display().to_string()))?;
    if name.to_ascii_lowercase().ends_with(".pdf") {
        Ok(name.to_string())
    } else {
        Err(DocumentError::UnsupportedFile(name.to_string()))
    }
}

fn upload_part(bytes: Vec<u8>, file_name: String, mime: &str) -> Result<Part, DocumentError> {
    Part::bytes(bytes)
        .file_name(file_name.clone())
        .mime_str(mime)
        .map_err(|err| DocumentError::InvalidUpload {
            file: file_name,
            cause: err.to_string(),
        })
}
