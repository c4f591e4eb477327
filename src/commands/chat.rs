use super::{CommandError, CommandResult, Session};
use crate::store::SendOutcome;
use crate::view::StreamPrinter;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::AsyncBufRead;

impl<R: AsyncBufRead + Unpin, W: Write> Session<R, W> {
    /// Sends the question, or uploads the staged attachment.
    pub(super) async fn ask(&mut self, text: String) -> CommandResult {
        self.composer.text = text;
        let Some(request) = self.composer.take() else {
            return Ok(());
        };

        let output = &mut self.output;
        let mut printer = StreamPrinter::default();
        let mut failed_write = None;
        let outcome = self
            .store
            .send_message(request, |message| {
                let chunk = printer.update(&message.text);
                if let Err(e) = write!(output, "{}", chunk).and_then(|_| output.flush()) {
                    failed_write.get_or_insert(e);
                }
            })
            .await?;
        if let Some(e) = failed_write {
            return Err(e.into());
        }

        match outcome {
            SendOutcome::Answered(message) => {
                if message.text.is_empty() {
                    writeln!(self.output, "(no answer)")?;
                } else {
                    writeln!(self.output)?;
                }
            }
            SendOutcome::Uploaded => self.show()?,
        }
        Ok(())
    }

    pub(super) fn new_chat(&mut self, title: Option<&str>) -> CommandResult {
        let chat = self.store.new_chat(title)?;
        tracing::info!(chat = %chat.id, "created chat");
        self.show()
    }

    pub(super) fn list_chats(&mut self) -> CommandResult {
        let sidebar = self
            .sidebar
            .render(self.store.chats(), self.store.active_chat_id());
        writeln!(self.output, "{}", sidebar)?;
        Ok(())
    }

    /// Opens a chat by its 1-based sidebar position or by id.
    pub(super) fn open_chat(&mut self, target: &str) -> CommandResult {
        let chats = self.store.chats();
        let id = match target.parse::<usize>() {
            Ok(n) => n
                .checked_sub(1)
                .and_then(|i| chats.get(i))
                .map(|c| c.id.clone()),
            Err(_) => chats.iter().find(|c| c.id == target).map(|c| c.id.clone()),
        };
        let Some(id) = id else {
            return Err(CommandError::Usage(format!("No chat {}.", target)));
        };
        self.store.select_chat(&id)?;
        self.show()
    }

    pub(super) fn toggle_sidebar(&mut self) -> CommandResult {
        self.sidebar.toggle();
        self.list_chats()
    }

    pub(super) fn attach(&mut self, path: PathBuf) -> CommandResult {
        if !path.is_file() {
            return Err(CommandError::Usage(format!(
                "No such file: {}",
                path.display()
            )));
        }
        writeln!(
            self.output,
            "Attached {}. Press Enter to upload it.",
            path.display()
        )?;
        self.composer.attach(path);
        Ok(())
    }

    pub(super) fn detach(&mut self) -> CommandResult {
        match self.composer.detach() {
            Some(path) => writeln!(self.output, "Detached {}.", path.display())?,
            None => writeln!(self.output, "Nothing attached.")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{backend, output_of, session};
    use super::super::Command;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_stream_error_replaces_answer() {
        let server = backend(json!([])).await;
        Mock::given(method("POST"))
            .and(path("/ask-stream"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (mut session, _) = session(&server.uri(), "", false);
        session.dispatch(Command::SetKey("k1".into())).await.unwrap();
        session
            .dispatch(Command::Ask("What is the summary?".into()))
            .await
            .unwrap();

        let last = session.store().messages().last().unwrap().text.clone();
        assert!(last.starts_with("Error: "));
        let out = output_of(session);
        assert!(out.contains(&last));
    }

    #[tokio::test]
    async fn test_attach_missing_file_alerts() {
        let server = backend(json!([])).await;
        let (mut session, _) = session(&server.uri(), "", false);
        session
            .dispatch(Command::Attach("/no/such/file.pdf".into()))
            .await
            .unwrap();
        session.dispatch(Command::Detach).await.unwrap();
        let out = output_of(session);
        assert!(out.contains("! No such file: /no/such/file.pdf"));
        assert!(out.contains("Nothing attached."));
    }

    #[tokio::test]
    async fn test_collapsed_sidebar_lists_markers() {
        let server = backend(json!([])).await;
        let (mut session, _) = session(&server.uri(), "", false);
        session.dispatch(Command::NewChat(None)).await.unwrap();
        session.dispatch(Command::ToggleSidebar).await.unwrap();
        let out = output_of(session);
        assert!(out.contains("[💬] 💬 "));
    }
}
