//! Line-oriented terminal front end over `ChatStore`.

mod chat;
mod knowledge;
mod settings;

use crate::store::{ChatStore, StoreError};
use crate::view::{Composer, SettingsError, Sidebar};
use dialoguer::theme::ColorfulTheme;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const HELP: &str = "\
Type a question and press Enter to ask it.

  /new [title]        start a new chat
  /chats              list chats
  /open <n|id>        switch to a chat
  /sidebar            collapse or expand the chat list
  /attach <path>      stage a PDF; the next Enter uploads it
  /detach             drop the staged PDF
  /upload <path>...   index one or more PDFs now
  /pdfs               list indexed PDFs
  /use <name>         answer from one PDF only
  /unuse              answer from every PDF
  /delete <name>      remove a PDF from the index
  /clear-pdfs         remove every PDF from the index
  /key <api key>      save the API key
  /theme              switch between light and dark
  /settings           show current settings
  /show               redraw the current chat
  /help               this text
  /quit               exit (Ctrl-D works too)

Ctrl-C stops an answer that is still streaming, or exits at the prompt.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    NewChat(Option<String>),
    ListChats,
    OpenChat(String),
    ToggleSidebar,
    Attach(PathBuf),
    Detach,
    Upload(Vec<PathBuf>),
    ListPdfs,
    UsePdf(String),
    UnusePdf,
    DeletePdf(String),
    ClearPdfs,
    SetKey(String),
    ToggleTheme,
    Settings,
    Show,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.trim_start().strip_prefix('/') else {
            return Command::Ask(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        let required = |usage: &str, build: fn(String) -> Command| {
            if arg.is_empty() {
                Command::Invalid(format!("Usage: {}", usage))
            } else {
                build(arg.to_string())
            }
        };

        match name {
            "new" => Command::NewChat((!arg.is_empty()).then(|| arg.to_string())),
            "chats" => Command::ListChats,
            "open" => required("/open <n|id>", Command::OpenChat),
            "sidebar" => Command::ToggleSidebar,
            "attach" => required("/attach <path>", |a| Command::Attach(PathBuf::from(a))),
            "detach" => Command::Detach,
            "upload" => {
                if arg.is_empty() {
                    Command::Invalid("Usage: /upload <path>...".to_string())
                } else {
                    Command::Upload(arg.split_whitespace().map(PathBuf::from).collect())
                }
            }
            "pdfs" => Command::ListPdfs,
            "use" => required("/use <name>", Command::UsePdf),
            "unuse" => Command::UnusePdf,
            "delete" => required("/delete <name>", Command::DeletePdf),
            "clear-pdfs" => Command::ClearPdfs,
            "key" => Command::SetKey(arg.to_string()),
            "theme" => Command::ToggleTheme,
            "settings" => Command::Settings,
            "show" => Command::Show,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => Command::Invalid(format!("Unknown command /{}. Try /help.", other)),
        }
    }
}

/// Failures a command reports to the user. Only `Io` ends the session.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

type CommandResult = Result<(), CommandError>;

/// Answers the yes/no questions asked before destructive commands.
pub type Confirm = Box<dyn FnMut(&str) -> bool>;

/// Asks on the controlling terminal. Anything but an explicit yes declines.
pub fn confirm_on_terminal(prompt: &str) -> bool {
    dialoguer::Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "confirmation prompt failed");
            false
        })
}

/// Presentation options taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub width: usize,
    pub history_lines: usize,
}

/// One interactive session: the store plus the state that only the terminal needs.
pub struct Session<R, W> {
    store: ChatStore,
    sidebar: Sidebar,
    composer: Composer,
    layout: Layout,
    input: R,
    output: W,
    confirm: Confirm,
}

impl<R, W> Session<R, W> {
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: AsyncBufRead + Unpin, W: Write> Session<R, W> {
    pub fn new(store: ChatStore, layout: Layout, input: R, output: W) -> Self {
        Self {
            store,
            sidebar: Sidebar::default(),
            composer: Composer::default(),
            layout,
            input,
            output,
            confirm: Box::new(confirm_on_terminal),
        }
    }

    pub fn with_confirm(mut self, confirm: impl FnMut(&str) -> bool + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Reads commands until `/quit`, end of input, or Ctrl-C at the prompt.
    pub async fn run(&mut self) -> io::Result<()> {
        writeln!(self.output, "PDF Brain. /help lists commands.")?;
        self.store.load_pdf_list().await;
        self.dispatch(Command::Show).await?;

        loop {
            write!(self.output, "{}> ", self.prompt_hint())?;
            self.output.flush()?;

            let mut line = String::new();
            let read = tokio::select! {
                read = self.input.read_line(&mut line) => read?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted at the prompt");
                    writeln!(self.output)?;
                    break;
                }
            };
            if read == 0 {
                writeln!(self.output)?;
                break;
            }

            let command = Command::parse(&line);
            tracing::debug!(?command, "dispatching");
            if command == Command::Quit {
                break;
            }
            self.dispatch(command).await?;
        }
        Ok(())
    }

    fn prompt_hint(&self) -> String {
        match &self.composer.attachment {
            Some(path) => format!("[📎 {}] ", path.display()),
            None => String::new(),
        }
    }

    /// Runs one command. Command failures become alerts; output failures end the session.
    pub async fn dispatch(&mut self, command: Command) -> io::Result<()> {
        let result = match command {
            Command::Ask(text) => self.ask(text).await,
            // A bare Enter sends whatever is staged.
            Command::Empty if self.composer.attachment.is_some() => {
                self.ask(String::new()).await
            }
            Command::NewChat(title) => self.new_chat(title.as_deref()),
            Command::ListChats => self.list_chats(),
            Command::OpenChat(target) => self.open_chat(&target),
            Command::ToggleSidebar => self.toggle_sidebar(),
            Command::Attach(path) => self.attach(path),
            Command::Detach => self.detach(),
            Command::Upload(paths) => self.upload(paths).await,
            Command::ListPdfs => self.list_pdfs().await,
            Command::UsePdf(name) => self.use_pdf(Some(&name)),
            Command::UnusePdf => self.use_pdf(None),
            Command::DeletePdf(name) => self.delete_pdf(&name).await,
            Command::ClearPdfs => self.clear_pdfs().await,
            Command::SetKey(key) => self.set_key(&key),
            Command::ToggleTheme => self.toggle_theme(),
            Command::Settings => self.show_settings(),
            Command::Show => self.show(),
            Command::Help => writeln!(self.output, "{}", HELP).map_err(Into::into),
            Command::Invalid(message) => Err(CommandError::Usage(message)),
            Command::Empty | Command::Quit => Ok(()),
        };

        match result {
            Ok(()) => Ok(()),
            Err(CommandError::Io(e)) => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "command failed");
                self.alert(&e.to_string())
            }
        }
    }

    /// A blocking notice the user has to read before continuing.
    fn alert(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.output, "! {}", message)
    }

    /// Redraws the sidebar, the active chat and the active document.
    fn show(&mut self) -> CommandResult {
        let sidebar = self
            .sidebar
            .render(self.store.chats(), self.store.active_chat_id());
        let transcript = crate::view::render_transcript(
            self.store.messages(),
            self.layout.history_lines,
            self.layout.width,
            self.store.theme(),
        );
        let title = self
            .store
            .active_chat()
            .map(|c| c.title.clone())
            .unwrap_or_default();
        writeln!(self.output, "{}", sidebar)?;
        writeln!(self.output, "── {} ──", title)?;
        writeln!(self.output, "{}", transcript)?;
        if let Some(doc) = self.store.active_document() {
            writeln!(self.output, "(answering from {})", doc)?;
        }
        Ok(())
    }
}
