use std::path::PathBuf;
use std::sync::Arc;

use aiagent_core::{attachment, ChatController};
use anyhow::{bail, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::app::{App, InputMode};
use crate::platform;
use crate::tui::AppEvent;

const IMAGE_COMMAND: &str = "/image";

/// What the input line asks for
#[derive(Debug, PartialEq, Eq)]
enum Submission {
    Text(String),
    Image { path: PathBuf, prompt: String },
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices().nth(char_idx).map(|(i, _)| i).unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Conversation(state) => app.update_conversation(state),
        AppEvent::Status(status) => app.status = status,
        AppEvent::InputClosed(reason) => bail!("terminal input closed: {}", reason),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Char('a') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
        }

        // Scrolling
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_down(app.half_page());
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_up(app.half_page());
        }
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        // Reply actions
        KeyCode::Char('c') => {
            app.status = Some(match app.latest_reply().map(platform::copy_to_clipboard) {
                Some(Some(tool)) => format!("Copied latest reply ({})", tool),
                Some(None) => "No clipboard tool found".to_string(),
                None => "Nothing to copy yet".to_string(),
            });
        }
        KeyCode::Char('s') => {
            app.status = Some(match app.latest_reply().map(platform::speak) {
                Some(Some(tool)) => format!("Speaking latest reply ({})", tool),
                Some(None) => "No text-to-speech tool found".to_string(),
                None => "Nothing to read yet".to_string(),
            });
        }

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => submit_input(app),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

fn submit_input(app: &mut App) {
    let Some(submission) = parse_submission(&app.input) else {
        return;
    };

    if app.controller.is_awaiting_response() {
        app.status = Some("Still waiting for the previous reply".to_string());
        return;
    }

    // Spawned turns publish their entries through the store; the handles are
    // not needed here.
    match submission {
        Submission::Text(text) => {
            drop(app.controller.spawn_text(text));
            app.status = None;
        }
        Submission::Image { path, prompt } => {
            if !attachment::is_image_file(&path) {
                app.status = Some(format!("Not an image file: {}", path.display()));
                return;
            }
            app.status = Some(format!("Attaching {}...", path.display()));
            drop(attach_image(Arc::clone(&app.controller), app.events.clone(), path, prompt));
        }
    }

    app.input.clear();
    app.cursor = 0;
    app.scroll_to_bottom();
}

/// Decode the file on the blocking pool, then run the image turn
fn attach_image(
    controller: Arc<ChatController>,
    events: mpsc::UnboundedSender<AppEvent>,
    path: PathBuf,
    prompt: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let source = path.clone();
        let loaded = tokio::task::spawn_blocking(move || attachment::load_from_path(&source)).await;

        let status = match loaded {
            Ok(Ok(image)) => {
                let _ = events.send(AppEvent::Status(None));
                match controller.submit_image(image, &prompt).await {
                    Ok(_) => return,
                    Err(err) => err.to_string(),
                }
            }
            Ok(Err(err)) => format!("Could not attach {}: {}", path.display(), err),
            Err(err) => format!("Could not attach {}: {}", path.display(), err),
        };

        tracing::warn!(path = %path.display(), "{}", status);
        let _ = events.send(AppEvent::Status(Some(status)));
    })
}

/// `/image <path> [prompt]` attaches a file; anything else non-blank is text.
/// A path with spaces can be wrapped in single or double quotes.
fn parse_submission(input: &str) -> Option<Submission> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Some(rest) = trimmed.strip_prefix(IMAGE_COMMAND) else {
        return Some(Submission::Text(trimmed.to_string()));
    };
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        // e.g. "/images are neat" is plain text
        return Some(Submission::Text(trimmed.to_string()));
    }

    let (path, prompt) = split_path(rest.trim_start());
    if path.is_empty() {
        return None;
    }

    Some(Submission::Image {
        path: expand_home(path),
        prompt: prompt.trim().to_string(),
    })
}

fn split_path(rest: &str) -> (&str, &str) {
    let quote = match rest.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => return rest.split_once(char::is_whitespace).unwrap_or((rest, "")),
    };

    let quoted = &rest[1..];
    match quoted.find(quote) {
        Some(end) => (&quoted[..end], &quoted[end + 1..]),
        // Unterminated: the whole remainder is the path
        None => (quoted, ""),
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiagent_core::{InferenceClient, InferenceError, Prompt};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl InferenceClient for Echo {
        fn describe(&self) -> String {
            "echo".to_string()
        }

        async fn generate(&self, prompt: &Prompt) -> Result<Option<String>, InferenceError> {
            Ok(Some(format!("you said {}", prompt.text)))
        }
    }

    fn app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (App::new(Arc::new(ChatController::new(Arc::new(Echo))), events), rx)
    }

    fn type_input(app: &mut App, text: &str) {
        app.input = text.to_string();
        app.cursor = text.chars().count();
    }

    #[test]
    fn test_char_to_byte_index_handles_multibyte() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("héllo", 10), 6);
        assert_eq!(char_to_byte_index("", 0), 0);
    }

    #[test]
    fn test_blank_input_submits_nothing() {
        assert_eq!(parse_submission(""), None);
        assert_eq!(parse_submission("   "), None);
        assert_eq!(parse_submission("/image"), None);
        assert_eq!(parse_submission("/image   "), None);
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(
            parse_submission("What is Rust?"),
            Some(Submission::Text("What is Rust?".to_string()))
        );
        assert_eq!(
            parse_submission("/images are neat"),
            Some(Submission::Text("/images are neat".to_string()))
        );
    }

    #[test]
    fn test_text_is_trimmed() {
        assert_eq!(
            parse_submission("   hello there \t"),
            Some(Submission::Text("hello there".to_string()))
        );
    }

    #[test]
    fn test_quoted_image_path_may_contain_spaces() {
        assert_eq!(
            parse_submission(r#"/image "My Photos/cat pic.png" what is this?"#),
            Some(Submission::Image {
                path: PathBuf::from("My Photos/cat pic.png"),
                prompt: "what is this?".to_string(),
            })
        );
        assert_eq!(
            parse_submission("/image 'a b.jpg'"),
            Some(Submission::Image {
                path: PathBuf::from("a b.jpg"),
                prompt: String::new(),
            })
        );
        assert_eq!(parse_submission(r#"/image """#), None);
    }

    #[test]
    fn test_non_image_path_is_refused_before_loading() {
        let (mut app, _rx) = app();
        type_input(&mut app, "/image notes.txt summarise");
        submit_input(&mut app);

        assert_eq!(app.status.as_deref(), Some("Not an image file: notes.txt"));
        assert_eq!(app.input, "/image notes.txt summarise");
        assert_eq!(app.controller.snapshot().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_text_submission_sends_trimmed_text() {
        let (mut app, _rx) = app();
        type_input(&mut app, "  hello  ");
        submit_input(&mut app);
        assert!(app.input.is_empty());

        let mut conversation = app.controller.conversation();
        let state = conversation
            .wait_for(|state| state.entries.len() == 3 && !state.awaiting_response)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.entries[1].content(), "hello");
        assert_eq!(state.entries[2].content(), "you said hello");
    }

    #[tokio::test]
    async fn test_unreadable_image_is_reported_as_status() {
        let (mut app, mut rx) = app();
        type_input(&mut app, "/image /definitely/missing/shot.png");
        submit_input(&mut app);

        // The handler returns before the file is touched
        assert!(app.input.is_empty());
        assert_eq!(
            app.status.as_deref(),
            Some("Attaching /definitely/missing/shot.png...")
        );

        let event = rx.recv().await.unwrap();
        handle_event(&mut app, event).unwrap();
        let status = app.status.clone().unwrap_or_default();
        assert!(status.starts_with("Could not attach /definitely/missing/shot.png"), "{}", status);
        assert_eq!(app.controller.snapshot().entries.len(), 1);
    }

    #[test]
    fn test_lost_input_ends_the_loop() {
        let (mut app, _rx) = app();
        assert!(handle_event(&mut app, AppEvent::InputClosed("stream ended".to_string())).is_err());
    }

    #[test]
    fn test_image_command_with_and_without_prompt() {
        assert_eq!(
            parse_submission("/image shot.png"),
            Some(Submission::Image {
                path: PathBuf::from("shot.png"),
                prompt: String::new(),
            })
        );
        assert_eq!(
            parse_submission("/image  /tmp/shot.jpg  what breed is this dog? "),
            Some(Submission::Image {
                path: PathBuf::from("/tmp/shot.jpg"),
                prompt: "what breed is this dog?".to_string(),
            })
        );
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path.png"), PathBuf::from("/abs/path.png"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/pics/a.png"), home.join("pics/a.png"));
        }
    }
}
