//! Chat session state shared by every front-end action.
//!
//! `ChatStore` owns the chats, their message histories, the active document
//! and the credential. Each mutating operation ends with an explicit save of
//! the keys it touched.


use crate::api::ask::AskRequest;
use crate::api::registry::PdfUpload;
use crate::api::{ApiError, BackendClient};
use crate::db::models::{Chat, IndexedDocument, Message, Theme};
use crate::db::{Database, DbError, StorageKey};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Please enter your API key in settings.")]
    MissingCredential,
    #[error("Nothing to send.")]
    EmptyMessage,
    /// Error reported by the service in its `error` field.
    #[error("{0}")]
    Service(String),
    #[error(transparent)]
    Api(ApiError),
    #[error(transparent)]
    Storage(#[from] DbError),
    #[error("Could not read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<ApiError> for StoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Service(message) => StoreError::Service(message),
            other => StoreError::Api(other),
        }
    }
}

/// What the user submitted from the composer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendRequest {
    pub text: String,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The final state of the bot message.
    Answered(Message),
    Uploaded,
}

/// Stops the in-flight answer, even one waiting on a silent service.
///
/// Each answer gets a fresh token, so a cancel with nothing streaming does
/// not carry over to the next question.
#[derive(Debug, Clone, Default)]
pub struct StreamCancel(Arc<Mutex<CancellationToken>>);

impl StreamCancel {
    pub fn cancel(&self) {
        self.current().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.current().is_cancelled()
    }

    fn current(&self) -> CancellationToken {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn reset(&self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();
    }
}

pub fn upload_notice(filename: &str) -> String {
    format!("Uploaded PDF: {}", filename)
}

pub fn upload_confirmation(filename: &str, pages: Option<u32>) -> String {
    match pages {
        Some(pages) => format!("PDF '{}' indexed successfully ({} pages).", filename, pages),
        None => format!("PDF '{}' indexed successfully.", filename),
    }
}

/// Whether `message` announces the upload of `filename`, or of any document when `None`.
///
/// Tagged messages match on the tag. Untagged ones, written before tags
/// existed, match on the exact notice or the quoted confirmation phrase.
fn is_upload_message(message: &Message, filename: Option<&str>) -> bool {
    if let Some(document) = &message.document {
        return filename.map_or(true, |name| name == document.as_str());
    }
    match filename {
        Some(name) => {
            message.text == upload_notice(name)
                || message
                    .text
                    .contains(&format!("'{}' indexed successfully", name))
        }
        None => {
            message.text.starts_with("Uploaded PDF: ")
                || message.text.contains("indexed successfully")
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown.pdf")
        .to_string()
}

async fn read_upload(path: &Path) -> Result<PdfUpload, StoreError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| StoreError::File {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(PdfUpload {
        file_name: file_name_of(path),
        bytes,
    })
}

pub struct ChatStore {
    db: Database,
    backend: BackendClient,
    chats: Vec<Chat>,
    histories: HashMap<String, Vec<Message>>,
    active_chat_id: String,
    active_document: Option<String>,
    api_key: String,
    theme: Theme,
    documents: Vec<IndexedDocument>,
    cancel: StreamCancel,
}

impl ChatStore {
    /// Rehydrates the session from `db`, creating a first chat when none exist.
    pub fn load(db: Database, backend: BackendClient) -> Result<Self, StoreError> {
        let mut chats: Vec<Chat> = db.get_json(StorageKey::Chats)?.unwrap_or_default();
        let histories = db.get_json(StorageKey::ChatMessages)?.unwrap_or_default();
        let api_key = db.get(StorageKey::ApiKey)?.unwrap_or_default();
        let active_document = db.get(StorageKey::ActivePdf)?.filter(|s| !s.is_empty());
        let theme = db
            .get(StorageKey::Theme)?
            .and_then(|t| Theme::parse(&t))
            .unwrap_or_default();

        let created = chats.is_empty();
        if created {
            chats.push(Chat::new("Chat 1"));
        }
        let active_chat_id = match db.get(StorageKey::ActiveChat)? {
            Some(id) if chats.iter().any(|c| c.id == id) => id,
            _ => chats[0].id.clone(),
        };

        let store = Self {
            db,
            backend,
            chats,
            histories,
            active_chat_id,
            active_document,
            api_key,
            theme,
            documents: Vec::new(),
            cancel: StreamCancel::default(),
        };
        if created {
            store.save_chats()?;
        }
        store.save_active_chat()?;
        tracing::info!(
            chats = store.chats.len(),
            active = %store.active_chat_id,
            "session restored"
        );
        Ok(store)
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn active_chat_id(&self) -> &str {
        &self.active_chat_id
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == self.active_chat_id)
    }

    /// History of the active chat.
    pub fn messages(&self) -> &[Message] {
        self.histories
            .get(&self.active_chat_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn documents(&self) -> &[IndexedDocument] {
        &self.documents
    }

    pub fn active_document(&self) -> Option<&str> {
        self.active_document.as_deref()
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn backend_url(&self) -> &str {
        self.backend.base_url().as_str()
    }

    pub fn cancel_handle(&self) -> StreamCancel {
        self.cancel.clone()
    }

    fn save_history(&self) -> Result<(), StoreError> {
        self.db.set_json(StorageKey::ChatMessages, &self.histories)?;
        Ok(())
    }

    fn save_chats(&self) -> Result<(), StoreError> {
        self.db.set_json(StorageKey::Chats, &self.chats)?;
        Ok(())
    }

    fn save_active_chat(&self) -> Result<(), StoreError> {
        self.db.set(StorageKey::ActiveChat, &self.active_chat_id)?;
        Ok(())
    }

    fn save_active_document(&self) -> Result<(), StoreError> {
        match &self.active_document {
            Some(name) => self.db.set(StorageKey::ActivePdf, name)?,
            None => self.db.remove(StorageKey::ActivePdf)?,
        }
        Ok(())
    }

    pub fn new_chat(&mut self, title: Option<&str>) -> Result<Chat, StoreError> {
        let title = match title.map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => format!("Chat {}", self.chats.len() + 1),
        };
        let chat = Chat::new(title);
        self.chats.insert(0, chat.clone());
        self.active_chat_id = chat.id.clone();
        self.save_chats()?;
        self.save_active_chat()?;
        tracing::debug!(id = %chat.id, title = %chat.title, "created chat");
        Ok(chat)
    }

    /// Makes `id` active and reloads its history from storage.
    ///
    /// An unknown id shows an empty history.
    pub fn select_chat(&mut self, id: &str) -> Result<(), StoreError> {
        if !self.chats.iter().any(|c| c.id == id) {
            tracing::warn!(id, "selected unknown chat");
        }
        self.active_chat_id = id.to_string();
        self.histories = self
            .db
            .get_json(StorageKey::ChatMessages)?
            .unwrap_or_default();
        self.save_active_chat()?;
        Ok(())
    }

    pub(crate) fn push_messages(
        &mut self,
        chat_id: &str,
        messages: impl IntoIterator<Item = Message>,
    ) -> Result<(), StoreError> {
        self.histories
            .entry(chat_id.to_string())
            .or_default()
            .extend(messages);
        self.save_history()
    }

    fn find_message(&self, chat_id: &str, message_id: &str) -> Option<&Message> {
        self.histories
            .get(chat_id)
            .and_then(|h| h.iter().find(|m| m.id == message_id))
    }

    fn update_message(
        &mut self,
        chat_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<Option<&Message>, StoreError> {
        let found = self
            .histories
            .get_mut(chat_id)
            .and_then(|h| h.iter_mut().find(|m| m.id == message_id));
        let Some(message) = found else {
            return Ok(None);
        };
        message.text = text.to_string();
        self.save_history()?;
        Ok(self.find_message(chat_id, message_id))
    }

    fn require_credential(&self) -> Result<(), StoreError> {
        if self.api_key.trim().is_empty() {
            return Err(StoreError::MissingCredential);
        }
        Ok(())
    }

    fn ask_request(&self, question: &str) -> AskRequest {
        AskRequest {
            question: question.to_string(),
            api_key: self.api_key.clone(),
            pdf_name: self.active_document.clone().unwrap_or_default(),
        }
    }

    /// Sends the composer contents.
    ///
    /// A file is uploaded instead of asked about. Otherwise the question and
    /// an empty bot message are appended, and the bot message is rewritten
    /// with the whole answer so far after every fragment. `on_update` sees
    /// each rewrite. A failed stream leaves `Error: ...` in the bot message
    /// and still returns `Ok`.
    pub async fn send_message(
        &mut self,
        request: SendRequest,
        on_update: impl FnMut(&Message),
    ) -> Result<SendOutcome, StoreError> {
        if let Some(path) = request.file {
            self.upload_pdf(&path).await?;
            return Ok(SendOutcome::Uploaded);
        }
        if request.text.trim().is_empty() {
            return Err(StoreError::EmptyMessage);
        }
        self.require_credential()?;

        let chat_id = self.active_chat_id.clone();
        let placeholder = Message::bot("");
        let placeholder_id = placeholder.id.clone();
        self.push_messages(&chat_id, [Message::user(&request.text), placeholder])?;

        self.cancel.reset();
        let answer = self.backend.ask_stream(self.ask_request(&request.text));
        let bot = self
            .consume_answer(&chat_id, &placeholder_id, answer, on_update)
            .await?;
        Ok(SendOutcome::Answered(bot))
    }

    /// Folds answer fragments into the bot message `message_id` of `chat_id`.
    pub(crate) async fn consume_answer<S>(
        &mut self,
        chat_id: &str,
        message_id: &str,
        mut fragments: S,
        mut on_update: impl FnMut(&Message),
    ) -> Result<Message, StoreError>
    where
        S: Stream<Item = Result<String, ApiError>> + Unpin,
    {
        let token = self.cancel.current();
        let mut answer = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!(chat = chat_id, "answer cancelled");
                    break;
                }
                next = fragments.next() => next,
            };
            let Some(item) = next else {
                break;
            };
            match item {
                Ok(fragment) => {
                    answer.push_str(&fragment);
                    if let Some(message) = self.update_message(chat_id, message_id, &answer)? {
                        on_update(message);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "answer stream failed");
                    answer = format!("Error: {}", e);
                    if let Some(message) = self.update_message(chat_id, message_id, &answer)? {
                        on_update(message);
                    }
                    break;
                }
            }
        }
        Ok(self
            .find_message(chat_id, message_id)
            .cloned()
            .unwrap_or_else(|| Message::bot(answer)))
    }

    /// Refreshes the document list. A failed request empties it.
    pub async fn load_pdf_list(&mut self) -> &[IndexedDocument] {
        match self.backend.list_pdfs().await {
            Ok(docs) => self.documents = docs,
            Err(e) => {
                tracing::error!(error = %e, "failed to list documents");
                self.documents.clear();
            }
        }
        &self.documents
    }

    pub async fn upload_pdf(&mut self, path: &Path) -> Result<(), StoreError> {
        self.require_credential()?;
        let upload = read_upload(path).await?;
        let filename = upload.file_name.clone();

        let reply = self.backend.upload_pdf(upload, &self.api_key).await?;

        let chat_id = self.active_chat_id.clone();
        self.push_messages(
            &chat_id,
            [
                Message::user(upload_notice(&filename))
                    .with_file(&filename)
                    .for_document(&filename),
                Message::bot(upload_confirmation(&filename, reply.pages)).for_document(&filename),
            ],
        )?;
        self.load_pdf_list().await;
        Ok(())
    }

    /// Indexes several documents in one request.
    ///
    /// Each indexed file gets its own tagged notice and confirmation, so a
    /// later delete removes exactly its pair. Per-file failures are reported
    /// in one extra bot message. When nothing was indexed, a user message
    /// naming the attempted files precedes that report.
    pub async fn upload_pdfs(&mut self, paths: &[PathBuf]) -> Result<(), StoreError> {
        self.require_credential()?;
        let mut uploads = Vec::with_capacity(paths.len());
        for path in paths {
            uploads.push(read_upload(path).await?);
        }
        let attempted: Vec<String> = uploads.iter().map(|u| u.file_name.clone()).collect();

        let reply = self.backend.upload_pdfs(uploads, &self.api_key).await?;

        let mut messages = Vec::new();
        if reply.indexed_files.is_empty() {
            messages.push(Message::user(format!(
                "Uploaded PDFs: {}",
                attempted.join(", ")
            )));
        }
        for file in &reply.indexed_files {
            messages.push(
                Message::user(upload_notice(&file.filename))
                    .with_file(&file.filename)
                    .for_document(&file.filename),
            );
            messages.push(
                Message::bot(upload_confirmation(&file.filename, Some(file.pages)))
                    .for_document(&file.filename),
            );
        }
        if !reply.errors.is_empty() {
            messages.push(Message::bot(format!(
                "Some PDFs were not indexed:\n{}",
                reply.errors.join("\n")
            )));
        }
        let chat_id = self.active_chat_id.clone();
        self.push_messages(&chat_id, messages)?;
        self.load_pdf_list().await;
        Ok(())
    }

    /// Deletes `filename` from the index once `confirm` agrees.
    ///
    /// Returns `false` when the user declined.
    pub async fn delete_pdf(
        &mut self,
        filename: &str,
        confirm: impl FnOnce(&str) -> bool,
    ) -> Result<bool, StoreError> {
        if !confirm(&format!("Delete '{}' from the index?", filename)) {
            return Ok(false);
        }
        self.backend.delete_pdf(filename).await?;
        self.load_pdf_list().await;

        if self.active_document.as_deref() == Some(filename) {
            self.set_active_document(None)?;
        }
        self.remove_upload_messages(Some(filename))?;
        Ok(true)
    }

    pub async fn clear_pdfs(
        &mut self,
        confirm: impl FnOnce(&str) -> bool,
    ) -> Result<bool, StoreError> {
        if !confirm("Remove every indexed PDF?") {
            return Ok(false);
        }
        self.backend.clear_pdfs().await?;
        self.load_pdf_list().await;
        self.set_active_document(None)?;
        self.remove_upload_messages(None)?;
        Ok(true)
    }

    fn remove_upload_messages(&mut self, filename: Option<&str>) -> Result<(), StoreError> {
        let mut removed = 0;
        for history in self.histories.values_mut() {
            let before = history.len();
            history.retain(|m| !is_upload_message(m, filename));
            removed += before - history.len();
        }
        tracing::debug!(removed, document = ?filename, "removed upload messages");
        self.save_history()
    }

    pub fn set_active_document(&mut self, name: Option<&str>) -> Result<(), StoreError> {
        self.active_document = name.map(str::to_string).filter(|n| !n.is_empty());
        self.save_active_document()
    }

    pub fn set_api_key(&mut self, key: &str) -> Result<(), StoreError> {
        self.api_key = key.trim().to_string();
        self.db.set(StorageKey::ApiKey, &self.api_key)?;
        Ok(())
    }

    pub fn toggle_theme(&mut self) -> Result<Theme, StoreError> {
        self.theme = self.theme.toggled();
        self.db.set(StorageKey::Theme, self.theme.as_str())?;
        Ok(self.theme)
    }
}
