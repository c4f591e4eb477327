use super::{CommandResult, Session};
use crate::view::SettingsOverlay;
use std::io::Write;
use tokio::io::AsyncBufRead;

impl<R: AsyncBufRead + Unpin, W: Write> Session<R, W> {
    pub(super) fn set_key(&mut self, input: &str) -> CommandResult {
        let key = SettingsOverlay::save(input)?;
        self.store.set_api_key(&key)?;
        writeln!(self.output, "API key saved!")?;
        Ok(())
    }

    pub(super) fn toggle_theme(&mut self) -> CommandResult {
        let theme = self.store.toggle_theme()?;
        writeln!(self.output, "Theme: {}", theme.as_str())?;
        self.show()
    }

    pub(super) fn show_settings(&mut self) -> CommandResult {
        let store = &self.store;
        writeln!(self.output, "Backend:  {}", store.backend_url())?;
        writeln!(self.output, "API key:  {}", SettingsOverlay::mask(store.api_key()))?;
        writeln!(self.output, "Theme:    {}", store.theme().as_str())?;
        writeln!(
            self.output,
            "PDF:      {}",
            store.active_document().unwrap_or("(all)")
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{output_of, session};
    use super::super::Command;
    use crate::db::models::Theme;

    #[tokio::test]
    async fn test_blank_key_is_rejected_and_not_saved() {
        let (mut session, _) = session("http://127.0.0.1:9", "", false);
        session.dispatch(Command::SetKey("   ".into())).await.unwrap();
        assert_eq!(session.store().api_key(), "");

        session
            .dispatch(Command::SetKey(" sk-abcdefgh1234 ".into()))
            .await
            .unwrap();
        assert_eq!(session.store().api_key(), "sk-abcdefgh1234");

        session.dispatch(Command::Settings).await.unwrap();
        let out = output_of(session);
        assert!(out.contains("! API key cannot be empty."));
        assert!(out.contains("API key saved!"));
        assert!(out.contains("API key:  sk-a...1234"));
        assert!(out.contains("Backend:  http://127.0.0.1:9/"));
    }

    #[tokio::test]
    async fn test_theme_toggles() {
        let (mut session, _) = session("http://127.0.0.1:9", "", false);
        assert_eq!(session.store().theme(), Theme::Light);
        session.dispatch(Command::ToggleTheme).await.unwrap();
        assert_eq!(session.store().theme(), Theme::Dark);
        let out = output_of(session);
        assert!(out.contains("Theme: dark"));
    }
}
