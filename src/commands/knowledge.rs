use super::{CommandError, CommandResult, Session};
use crate::view::render_documents;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::AsyncBufRead;

impl<R: AsyncBufRead + Unpin, W: Write> Session<R, W> {
    pub(super) async fn upload(&mut self, paths: Vec<PathBuf>) -> CommandResult {
        if let [path] = paths.as_slice() {
            self.store.upload_pdf(path).await?;
        } else {
            self.store.upload_pdfs(&paths).await?;
        }
        self.show()
    }

    pub(super) async fn list_pdfs(&mut self) -> CommandResult {
        self.store.load_pdf_list().await;
        let listing = render_documents(self.store.documents(), self.store.active_document());
        writeln!(self.output, "{}", listing)?;
        Ok(())
    }

    /// Restricts answers to one indexed document, or lifts the restriction.
    pub(super) fn use_pdf(&mut self, name: Option<&str>) -> CommandResult {
        if let Some(name) = name {
            if !self.store.documents().iter().any(|d| d.filename == name) {
                return Err(CommandError::Usage(format!(
                    "'{}' is not indexed. /pdfs lists what is.",
                    name
                )));
            }
        }
        self.store.set_active_document(name)?;
        match self.store.active_document() {
            Some(name) => writeln!(self.output, "Answering from {}.", name)?,
            None => writeln!(self.output, "Answering from all PDFs.")?,
        }
        Ok(())
    }

    pub(super) async fn delete_pdf(&mut self, name: &str) -> CommandResult {
        let confirm = &mut self.confirm;
        let deleted = self
            .store
            .delete_pdf(name, |prompt| confirm(prompt))
            .await?;
        if deleted {
            writeln!(self.output, "Deleted {}.", name)?;
            self.show()
        } else {
            writeln!(self.output, "Kept {}.", name)?;
            Ok(())
        }
    }

    pub(super) async fn clear_pdfs(&mut self) -> CommandResult {
        let confirm = &mut self.confirm;
        let cleared = self
            .store
            .clear_pdfs(|prompt| confirm(prompt))
            .await?;
        if cleared {
            writeln!(self.output, "Index cleared.")?;
            self.show()
        } else {
            writeln!(self.output, "Nothing removed.")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{backend, output_of, session};
    use super::super::Command;
    use crate::db::models::Message;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    #[tokio::test]
    async fn test_list_and_use_pdf() {
        let server = backend(json!([
            {"filename": "report.pdf", "page_count": 12},
            {"filename": "notes.pdf", "page_count": 3}
        ]))
        .await;

        let (mut session, _) = session(&server.uri(), "", false);
        session.dispatch(Command::ListPdfs).await.unwrap();
        session
            .dispatch(Command::UsePdf("notes.pdf".into()))
            .await
            .unwrap();
        assert_eq!(session.store().active_document(), Some("notes.pdf"));

        session
            .dispatch(Command::UsePdf("missing.pdf".into()))
            .await
            .unwrap();
        assert_eq!(session.store().active_document(), Some("notes.pdf"));

        session.dispatch(Command::UnusePdf).await.unwrap();
        assert_eq!(session.store().active_document(), None);

        let out = output_of(session);
        assert!(out.contains("  report.pdf (12 pages)"));
        assert!(out.contains("! 'missing.pdf' is not indexed."));
        assert!(out.contains("Answering from all PDFs."));
    }

    #[tokio::test]
    async fn test_confirmed_delete_removes_upload_messages() {
        let server = backend(json!([])).await;
        Mock::given(method("DELETE"))
            .and(path("/delete-pdf/report.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "deleted"})))
            .expect(1)
            .mount(&server)
            .await;

        let (mut session, prompts) = session(&server.uri(), "", true);
        let chat_id = session.store().active_chat_id().to_string();
        session
            .store
            .push_messages(
                &chat_id,
                [
                    Message::user("Uploaded PDF: report.pdf")
                        .with_file("report.pdf")
                        .for_document("report.pdf"),
                    Message::user("What is in it?"),
                ],
            )
            .unwrap();

        session
            .dispatch(Command::DeletePdf("report.pdf".into()))
            .await
            .unwrap();

        assert_eq!(prompts.borrow().len(), 1);
        let texts: Vec<&str> = session
            .store()
            .messages()
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["What is in it?"]);
        assert!(output_of(session).contains("Deleted report.pdf."));
    }

    #[tokio::test]
    async fn test_declined_clear_keeps_index() {
        let server = backend(json!([])).await;
        Mock::given(method("DELETE"))
            .and(path("/clear-pdfs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(0)
            .mount(&server)
            .await;

        let (mut session, prompts) = session(&server.uri(), "", false);
        session.dispatch(Command::ClearPdfs).await.unwrap();
        assert_eq!(*prompts.borrow(), vec!["Remove every indexed PDF?".to_string()]);
        assert!(output_of(session).contains("Nothing removed."));
    }

    #[tokio::test]
    async fn test_upload_without_key_alerts() {
        let server = backend(json!([])).await;
        let (mut session, _) = session(&server.uri(), "", false);
        session
            .dispatch(Command::Upload(vec!["a.pdf".into(), "b.pdf".into()]))
            .await
            .unwrap();
        assert!(output_of(session).contains("! Please enter your API key in settings."));
    }
}
