use super::{check_status, ApiError, BackendClient, ServiceReply};
use crate::db::models::IndexedDocument;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    pdfs: Vec<IndexedDocument>,
}

/// A document ready to be posted as a multipart file part.
#[derive(Debug, Clone)]
pub struct PdfUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IndexedFile {
    pub filename: String,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub chunks: u32,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BatchReply {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub indexed_files: Vec<IndexedFile>,
    #[serde(default)]
    pub errors: Vec<String>,
}

fn pdf_part(upload: PdfUpload) -> Result<Part, ApiError> {
    Part::bytes(upload.bytes)
        .file_name(upload.file_name)
        .mime_str("application/pdf")
        .map_err(ApiError::Http)
}

impl BackendClient {
    pub async fn list_pdfs(&self) -> Result<Vec<IndexedDocument>, ApiError> {
        let resp = self.http.get(self.endpoint("list-pdfs")?).send().await?;
        let data: ListResponse = check_status(resp).await?.json().await?;
        tracing::debug!(count = data.pdfs.len(), "listed indexed documents");
        Ok(data.pdfs)
    }

    pub async fn upload_pdf(
        &self,
        upload: PdfUpload,
        api_key: &str,
    ) -> Result<ServiceReply, ApiError> {
        let name = upload.file_name.clone();
        let form = Form::new()
            .part("file", pdf_part(upload)?)
            .text("api_key", api_key.to_string());

        let resp = self
            .http
            .post(self.endpoint("upload-pdf")?)
            .multipart(form)
            .send()
            .await?;
        let reply: ServiceReply = check_status(resp).await?.json().await?;
        tracing::info!(file = %name, error = ?reply.error, "upload finished");
        reply.into_result()
    }

    pub async fn upload_pdfs(
        &self,
        uploads: Vec<PdfUpload>,
        api_key: &str,
    ) -> Result<BatchReply, ApiError> {
        let mut form = Form::new().text("api_key", api_key.to_string());
        for upload in uploads {
            form = form.part("files", pdf_part(upload)?);
        }

        let resp = self
            .http
            .post(self.endpoint("upload-pdfs")?)
            .multipart(form)
            .send()
            .await?;
        let reply: BatchReply = check_status(resp).await?.json().await?;
        if let Some(error) = reply.error {
            return Err(ApiError::Service(error));
        }
        tracing::info!(
            indexed = reply.indexed_files.len(),
            failed = reply.errors.len(),
            "batch upload finished"
        );
        Ok(reply)
    }

    pub async fn delete_pdf(&self, filename: &str) -> Result<ServiceReply, ApiError> {
        let url = self.endpoint_with_segment("delete-pdf/", filename)?;
        let resp = self.http.delete(url).send().await?;
        let reply: ServiceReply = check_status(resp).await?.json().await?;
        tracing::info!(file = %filename, error = ?reply.error, "delete finished");
        reply.into_result()
    }

    pub async fn clear_pdfs(&self) -> Result<ServiceReply, ApiError> {
        let resp = self
            .http
            .delete(self.endpoint("clear-pdfs")?)
            .send()
            .await?;
        let reply: ServiceReply = check_status(resp).await?.json().await?;
        reply.into_result()
    }
}
