use std::{
    io::Write,
    path::PathBuf,
    time::Duration,
};

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::{oneshot, watch},
    task::JoinHandle,
};

use crate::{
    api::Api,
    chat::{ChatView, Outcome},
    dialogues::{DialogueEditor, RowId, Status},
    errors::ClientError,
    pages::{self, guard, Access, BotView, Effect, HomeView, Route, ViewResult, DEFAULT_THREAD},
    reveal::Revealer,
    session::{IdentityProvider, Session},
};

const HELP: &str = "\
Commands:
  login <email> <password>          sign in
  signup <email> <password> <again> create an account
  verify <code>                     confirm the account from the signup email
  logout                            sign out
  home                              list your bots
  create <name> | <description>     create a bot
  open <bot_id>                     show a bot and its documents
  public                            toggle the open bot between public and private
  edit <name> | <description>       rename the open bot
  delete                            delete the open bot
  upload <file.pdf> [title]         add a PDF to the open bot
  dialogues                         edit question/answer pairs of the open bot
  add                               add a dialogue
  ask <row> <question>              add a question to a dialogue
  unask <row> <n>                   remove question n of a dialogue
  answer <row> <text>               set the answer of a dialogue
  drop <row>                        remove a dialogue from the list
  save                              save new dialogues
  chat [thread]                     chat with the open bot, /back to leave
  back                              go up one page
  quit                              exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Login { email: String, password: String },
    Signup { email: String, password: String, confirm: String },
    Verify { code: String },
    Logout,
    Home,
    Create { name: String, description: String },
    Open { id: String },
    TogglePublic,
    Edit { name: String, description: String },
    Delete,
    Upload { path: PathBuf, title: Option<String> },
    Dialogues,
    AddRow,
    Ask { row: usize, question: String },
    Unask { row: usize, index: usize },
    Answer { row: usize, text: String },
    Drop { row: usize },
    Save,
    Chat { thread: Option<String> },
    Back,
    /// A chat message, only produced inside the chat view.
    Say(String),
}

impl Command {
    /// Parses one input line. In the chat view plain lines are messages
    /// and commands need a leading `/`.
    pub fn parse(line: &str, in_chat: bool) -> Result<Option<Command>, String> {
        let line = if in_chat {
            match line.strip_prefix('/') {
                Some(cmd) => cmd,
                None => return Ok(Some(Command::Say(line.to_string()))),
            }
        } else {
            line
        };

        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        let cmd = match word {
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "login" => match args[..] {
                [email, password] => Command::Login {
                    email: email.to_string(),
                    password: password.to_string(),
                },
                _ => return Err("usage: login <email> <password>".to_string()),
            },
            "signup" => match args[..] {
                [email, password, confirm] => Command::Signup {
                    email: email.to_string(),
                    password: password.to_string(),
                    confirm: confirm.to_string(),
                },
                _ => return Err("usage: signup <email> <password> <password again>".to_string()),
            },
            "verify" => match args[..] {
                [code] => Command::Verify {
                    code: code.to_string(),
                },
                _ => return Err("usage: verify <code>".to_string()),
            },
            "logout" => Command::Logout,
            "home" => Command::Home,
            "create" | "edit" => {
                let (name, description) = rest
                    .split_once('|')
                    .map(|(a, b)| (a.trim().to_string(), b.trim().to_string()))
                    .ok_or_else(|| format!("usage: {} <name> | <description>", word))?;
                if word == "create" {
                    Command::Create { name, description }
                } else {
                    Command::Edit { name, description }
                }
            }
            "open" => match args[..] {
                [id] => Command::Open { id: id.to_string() },
                _ => return Err("usage: open <bot_id>".to_string()),
            },
            "public" => Command::TogglePublic,
            "delete" => Command::Delete,
            "upload" => match rest.split_once(char::is_whitespace) {
                Some((path, title)) => Command::Upload {
                    path: PathBuf::from(path),
                    title: Some(title.trim().to_string()),
                },
                None if !rest.is_empty() => Command::Upload {
                    path: PathBuf::from(rest),
                    title: None,
                },
                None => return Err("usage: upload <file.pdf> [title]".to_string()),
            },
            "dialogues" => Command::Dialogues,
            "add" => Command::AddRow,
            "ask" => {
                let (row, question) = row_and_text(rest).ok_or("usage: ask <row> <question>")?;
                Command::Ask { row, question }
            }
            "unask" => match args[..] {
                [row, index] => Command::Unask {
                    row: parse_number(row)?,
                    index: parse_number(index)?,
                },
                _ => return Err("usage: unask <row> <n>".to_string()),
            },
            "answer" => {
                let (row, text) = row_and_text(rest).ok_or("usage: answer <row> <text>")?;
                Command::Answer { row, text }
            }
            "drop" => match args[..] {
                [row] => Command::Drop {
                    row: parse_number(row)?,
                },
                _ => return Err("usage: drop <row>".to_string()),
            },
            "save" => Command::Save,
            "chat" => Command::Chat {
                thread: args.first().map(|x| x.to_string()),
            },
            "back" => Command::Back,
            other => return Err(format!("Unknown command '{}', type help", other)),
        };
        Ok(Some(cmd))
    }
}

// Rows and questions are numbered from 1 on screen.
fn parse_number(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("'{}' is not a row number", value)),
    }
}

fn row_id(editor: &DialogueEditor, row: usize) -> Option<RowId> {
    editor.rows().get(row - 1).map(|x| x.id.clone())
}

fn row_and_text(rest: &str) -> Option<(usize, String)> {
    let (row, text) = rest.split_once(char::is_whitespace)?;
    let row = parse_number(row).ok()?;
    Some((row, text.trim().to_string()))
}

enum View {
    Blank,
    Home(HomeView),
    Bot(BotView),
    Dialogues(DialogueEditor),
    Chat(ChatView, Revealer),
}

/// Interactive application shell. Owns the credential and the current view.
pub struct Shell<P> {
    api: Api,
    session: Session<P>,
    reveal_interval: Duration,
    route: Route,
    view: View,
}

impl<P: IdentityProvider> Shell<P> {
    pub fn new(api: Api, session: Session<P>, reveal_interval: Duration) -> Self {
        Self {
            api,
            session,
            reveal_interval,
            route: Route::Root,
            view: View::Blank,
        }
    }

    pub async fn run<R: AsyncBufRead + Unpin>(mut self, input: R) -> Result<(), ClientError> {
        println!("Chatterbox, type help for commands.");
        self.session.refresh().await;
        self.navigate(Route::Root).await;

        let mut lines = input.lines();
        loop {
            prompt(&self.route);
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let in_chat = matches!(self.view, View::Chat(..));
            let cmd = match Command::parse(&line, in_chat) {
                Ok(Some(cmd)) => cmd,
                Ok(None) => continue,
                Err(msg) => {
                    println!("{}", msg);
                    continue;
                }
            };
            if !self.dispatch(cmd).await {
                break;
            }
        }
        Ok(())
    }

    /// Moves to `route` through the auth guard and loads the new view.
    pub async fn navigate(&mut self, mut route: Route) {
        loop {
            let state = self.session.snapshot().await;
            match guard(&route, &state) {
                Access::Pending => self.session.refresh().await,
                Access::Redirect(next) => {
                    tracing::debug!("Redirecting {} to {}", route.path(), next.path());
                    route = next;
                }
                Access::Allow => break,
            }
        }

        let token = self.session.token().await;
        // Leaving a view drops it, which cancels any reveal still running.
        self.view = match (&route, token) {
            (Route::Home, Some(token)) => {
                let mut view = HomeView::default();
                if view.load(&self.api, &token).await.is_ok() {
                    print_bots(&view);
                } else if let Some(err) = view.error() {
                    println!("{}", err);
                }
                View::Home(view)
            }
            (Route::Bot { id }, Some(token)) => {
                let mut view = BotView::new(id.clone());
                match view.load(&self.api, &token).await {
                    Ok(()) => print_bot(&view),
                    Err(err) => println!("{}", err.user_message()),
                }
                View::Bot(view)
            }
            (Route::Dialogues { bot_id }, Some(token)) => {
                let mut editor = DialogueEditor::new(bot_id.clone());
                match editor.load(&self.api, &token).await {
                    Ok(()) => print_dialogues(&editor),
                    Err(err) => println!("{}", err.user_message()),
                }
                View::Dialogues(editor)
            }
            (Route::Chat { bot_id, thread_id }, Some(_)) => {
                println!("Chatting with {} on thread {}. What can I help with?", bot_id, thread_id);
                View::Chat(
                    ChatView::new(bot_id.clone(), thread_id.clone()),
                    Revealer::new(self.reveal_interval),
                )
            }
            (Route::Login, _) => {
                println!("Sign in with: login <email> <password>, or create an account with signup.");
                View::Blank
            }
            (Route::Verify { email }, _) => {
                println!("We've sent a verification code to {}. Enter it with: verify <code>", email);
                View::Blank
            }
            _ => View::Blank,
        };
        self.route = route;
    }

    async fn apply(&mut self, result: ViewResult) {
        match result {
            Ok(Effect { notice, navigate }) => {
                if let Some(notice) = notice {
                    println!("{}", notice);
                }
                if let Some(route) = navigate {
                    self.navigate(route).await;
                }
            }
            Err(msg) => println!("{}", msg),
        }
    }

    /// Token for an authorized action. Without one the user is sent to login.
    async fn token(&mut self) -> Option<String> {
        match self.session.require_token().await {
            Ok(token) => Some(token),
            Err(err) => {
                println!("{}", err.user_message());
                self.navigate(Route::Login).await;
                None
            }
        }
    }

    fn current_bot(&self) -> Option<String> {
        match &self.route {
            Route::Bot { id } => Some(id.clone()),
            Route::Dialogues { bot_id } | Route::Chat { bot_id, .. } => Some(bot_id.clone()),
            _ => None,
        }
    }

    /// Runs one command. Returns false once the shell should exit.
    async fn dispatch(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Help => println!("{}", HELP),
            Command::Quit => return false,
            Command::Login { email, password } => {
                let result = pages::login(&self.session, &email, &password).await;
                self.apply(result).await;
            }
            Command::Signup {
                email,
                password,
                confirm,
            } => {
                let result = pages::signup(&self.session, &email, &password, &confirm).await;
                self.apply(result).await;
            }
            Command::Verify { code } => {
                let email = match &self.route {
                    Route::Verify { email } => email.clone(),
                    _ => String::new(),
                };
                let result = pages::verify(&self.session, &email, &code).await;
                self.apply(result).await;
            }
            Command::Logout => {
                let result = pages::logout(&self.session).await;
                self.apply(result).await;
            }
            Command::Home => self.navigate(Route::Home).await,
            Command::Back => {
                let parent = self.route.parent();
                self.navigate(parent).await;
            }
            Command::Open { id } => self.navigate(Route::Bot { id }).await,
            Command::Dialogues => match self.current_bot() {
                Some(bot_id) => self.navigate(Route::Dialogues { bot_id }).await,
                None => println!("Open a bot first."),
            },
            Command::Chat { thread } => match self.current_bot() {
                Some(bot_id) => {
                    let thread_id = thread.unwrap_or_else(|| DEFAULT_THREAD.to_string());
                    self.navigate(Route::Chat { bot_id, thread_id }).await;
                }
                None => println!("Open a bot first."),
            },
            Command::Create { name, description } => self.create_bot(&name, &description).await,
            Command::TogglePublic
            | Command::Edit { .. }
            | Command::Delete
            | Command::Upload { .. } => self.bot_action(cmd).await,
            Command::AddRow
            | Command::Ask { .. }
            | Command::Unask { .. }
            | Command::Answer { .. }
            | Command::Drop { .. }
            | Command::Save => self.dialogue_action(cmd).await,
            Command::Say(text) => self.say(&text).await,
        }
        true
    }

    async fn create_bot(&mut self, name: &str, description: &str) {
        if !matches!(self.view, View::Home(_)) {
            self.navigate(Route::Home).await;
        }
        let Some(token) = self.token().await else {
            return;
        };
        let View::Home(view) = &mut self.view else {
            return;
        };
        match view.create(&self.api, &token, name, description).await {
            Ok(bot) => println!("Created {} ({})", bot.name, bot.id),
            Err(err) => println!("{}", err.user_message()),
        }
    }

    async fn bot_action(&mut self, cmd: Command) {
        if !matches!(self.view, View::Bot(_)) {
            println!("Open a bot first.");
            return;
        }
        let Some(token) = self.token().await else {
            return;
        };
        let View::Bot(view) = &mut self.view else {
            return;
        };
        let api = &self.api;
        let result = match cmd {
            Command::TogglePublic => view
                .toggle_public(api, &token)
                .await
                .map(|public| println!("The bot is now {}.", if public { "public" } else { "private" })),
            Command::Edit { name, description } => view
                .update(api, &token, &name, &description)
                .await
                .map(|bot| println!("Updated {}.", bot.name)),
            Command::Upload { path, title } => view
                .upload(api, &token, &path, title.as_deref())
                .await
                .map(|doc| println!("Uploaded {} ({}).", doc.title, doc.sync_status)),
            Command::Delete => match view.delete(api, &token).await {
                Ok(()) => {
                    println!("Bot deleted.");
                    self.navigate(Route::Home).await;
                    return;
                }
                Err(err) => Err(err),
            },
            _ => Ok(()),
        };
        if let Err(err) = result {
            println!("{}", err.user_message());
        }
    }

    async fn dialogue_action(&mut self, cmd: Command) {
        if !matches!(self.view, View::Dialogues(_)) {
            println!("Open the dialogues of a bot first.");
            return;
        }
        let token = if cmd == Command::Save {
            match self.token().await {
                Some(token) => Some(token),
                None => return,
            }
        } else {
            None
        };
        let View::Dialogues(editor) = &mut self.view else {
            return;
        };

        let changed = match cmd {
            Command::AddRow => {
                editor.add_row();
                true
            }
            Command::Ask { row, question } => row_id(editor, row)
                .map_or(false, |id| editor.add_question(&id, &question)),
            Command::Unask { row, index } => row_id(editor, row)
                .map_or(false, |id| editor.remove_question(&id, index - 1)),
            Command::Answer { row, text } => {
                row_id(editor, row).map_or(false, |id| editor.set_answer(&id, &text))
            }
            Command::Drop { row } => row_id(editor, row).map_or(false, |id| editor.delete_row(&id)),
            Command::Save => {
                let token = token.unwrap_or_default();
                editor.save(&self.api, &token).await;
                match editor.status() {
                    Some(Status::Success(msg)) | Some(Status::Error(msg)) => println!("{}", msg),
                    None => {}
                }
                true
            }
            _ => false,
        };
        if changed {
            print_dialogues(editor);
        } else {
            println!("Nothing changed, check the row and question numbers.");
        }
    }

    async fn say(&mut self, text: &str) {
        let View::Chat(view, revealer) = &mut self.view else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }
        let Some(token) = self.session.token().await else {
            println!("User not authenticated.");
            self.navigate(Route::Login).await;
            return;
        };

        revealer.begin();
        let printer = spawn_printer(revealer.subscribe());
        let outcome = view
            .submit(&self.api, Some(&token), text, |partial| revealer.update(partial))
            .await;

        let reply = view
            .transcript()
            .last()
            .map(|x| x.content.clone())
            .unwrap_or_default();
        if outcome == Outcome::Replied && revealer.is_running() {
            // Let the reveal catch up with the complete reply, one tick per word at most.
            revealer.update(&reply);
            let words = reply.split(' ').count() as u32 + 1;
            let mut shown = revealer.subscribe();
            let caught_up = shown.wait_for(|x| *x == reply);
            if tokio::time::timeout(self.reveal_interval * words, caught_up)
                .await
                .is_err()
            {
                tracing::debug!("Reveal did not catch up, showing the full reply");
            }
        }
        // Rate limit and failure notices are shown at once.
        revealer.finish(&reply);
        printer.stop().await;
    }
}

/// Prints revealed reply text as it grows.
struct Printer {
    done: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Printer {
    async fn stop(self) {
        let _ = self.done.send(());
        let _ = self.task.await;
    }
}

fn spawn_printer(mut shown: watch::Receiver<String>) -> Printer {
    let (done, mut done_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let mut printed = String::new();
        print!("bot> ");
        loop {
            tokio::select! {
                changed = shown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let text = shown.borrow_and_update().clone();
                    print_progress(&mut printed, &text);
                }
                _ = &mut done_rx => {
                    let text = shown.borrow().clone();
                    print_progress(&mut printed, &text);
                    break;
                }
            }
        }
        println!();
    });
    Printer { done, task }
}

fn print_progress(printed: &mut String, text: &str) {
    match text.strip_prefix(printed.as_str()) {
        Some(rest) => print!("{}", rest),
        // The reply was rewritten, start over on a fresh line.
        None => print!("\n{}", text),
    }
    let _ = std::io::stdout().flush();
    *printed = text.to_string();
}

fn prompt(route: &Route) {
    print!("{}> ", route.path());
    let _ = std::io::stdout().flush();
}

fn print_bots(view: &HomeView) {
    if view.bots().is_empty() {
        println!("No bots yet. Create one with: create <name> | <description>");
        return;
    }
    for bot in view.bots() {
        let visibility = if bot.is_public { "public" } else { "private" };
        println!("  {}  {} ({}) - {}", bot.id, bot.name, visibility, bot.description);
    }
}

fn print_bot(view: &BotView) {
    let Some(bot) = view.bot() else {
        println!("Bot not found");
        return;
    };
    println!("{}", bot.name);
    println!("  {}", bot.description);
    if let Some(created_at) = bot.created_at {
        println!("  Date created: {}", created_at.format("%Y-%m-%d"));
    }
    if let Some(updated_at) = bot.updated_at {
        println!("  Last updated: {}", updated_at.format("%Y-%m-%d"));
    }
    println!("  Public: {}", if bot.is_public { "yes" } else { "no" });
    if let Some(settings) = &bot.settings {
        let model = &settings.embedding_model;
        println!(
            "  Embeddings: {} {} ({} dims)",
            model.provider, model.name, model.dimensions
        );
    }
    if view.documents().is_empty() {
        println!("  No PDF sources yet.");
    }
    for doc in view.documents() {
        println!("  [{}] {} ({})", doc.sync_status, doc.title, doc.id);
    }
}

fn print_dialogues(editor: &DialogueEditor) {
    if let Some(Status::Error(msg)) = editor.status() {
        println!("{}", msg);
    }
    if editor.rows().is_empty() {
        println!("No dialogues found. Add a new dialogue to get started.");
        return;
    }
    for (i, row) in editor.rows().iter().enumerate() {
        let marker = if row.id.is_pending() { " (unsaved)" } else { "" };
        println!("{}. {}{}", i + 1, row.id, marker);
        for (n, q) in row.questions.iter().enumerate() {
            println!("   Q{}: {}", n + 1, q);
        }
        for (n, line) in row.answer.split('\n').enumerate() {
            let label = if n == 0 { "   A: " } else { "      " };
            println!("{}{}", label, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(Command::parse("  ", false), Ok(None));
        assert_eq!(Command::parse("help", false), Ok(Some(Command::Help)));
        assert_eq!(
            Command::parse("login ana@example.com hunter22", false),
            Ok(Some(Command::Login {
                email: "ana@example.com".to_string(),
                password: "hunter22".to_string(),
            }))
        );
        assert!(Command::parse("login ana@example.com", false).is_err());
        assert!(Command::parse("dance", false).is_err());
    }

    #[test]
    fn test_parse_create_splits_on_pipe() {
        assert_eq!(
            Command::parse("create Support Bot | Answers billing questions", false),
            Ok(Some(Command::Create {
                name: "Support Bot".to_string(),
                description: "Answers billing questions".to_string(),
            }))
        );
        assert!(Command::parse("create Support Bot", false).is_err());
    }

    #[test]
    fn test_parse_dialogue_commands() {
        assert_eq!(
            Command::parse("ask 2 What are your opening hours?", false),
            Ok(Some(Command::Ask {
                row: 2,
                question: "What are your opening hours?".to_string(),
            }))
        );
        assert_eq!(
            Command::parse("unask 1 3", false),
            Ok(Some(Command::Unask { row: 1, index: 3 }))
        );
        assert!(Command::parse("drop 0", false).is_err());
        assert!(Command::parse("answer x yes", false).is_err());
    }

    #[test]
    fn test_parse_upload() {
        assert_eq!(
            Command::parse("upload manual.pdf User Manual", false),
            Ok(Some(Command::Upload {
                path: PathBuf::from("manual.pdf"),
                title: Some("User Manual".to_string()),
            }))
        );
        assert_eq!(
            Command::parse("upload manual.pdf", false),
            Ok(Some(Command::Upload {
                path: PathBuf::from("manual.pdf"),
                title: None,
            }))
        );
    }

    #[test]
    fn test_chat_lines_are_messages() {
        assert_eq!(
            Command::parse("what is /etc?", true),
            Ok(Some(Command::Say("what is /etc?".to_string())))
        );
        assert_eq!(Command::parse("/back", true), Ok(Some(Command::Back)));
        assert_eq!(Command::parse("/quit", true), Ok(Some(Command::Quit)));
        assert_eq!(
            Command::parse("quit", true),
            Ok(Some(Command::Say("quit".to_string())))
        );
        assert_eq!(
            Command::parse("   ", true),
            Ok(Some(Command::Say("   ".to_string())))
        );
    }

    #[test]
    fn test_print_progress_tracks_printed_text() {
        let mut printed = String::new();
        print_progress(&mut printed, "Hi");
        print_progress(&mut printed, "Hi there");
        assert_eq!(printed, "Hi there");
        print_progress(&mut printed, "Hello");
        assert_eq!(printed, "Hello");
    }
}
