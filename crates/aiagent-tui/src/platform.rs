//! Clipboard and text-to-speech through whatever system tools are installed

use std::io::{self, Write};
use std::process::{Child, Command, Stdio};

const CLIPBOARD_COMMANDS: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
];

// Each reads the text from stdin when given no text argument, so a reply
// starting with '-' is never taken as an option
const SPEECH_COMMANDS: &[&str] = &["say", "espeak-ng", "espeak"];

/// Copy text to the system clipboard; returns the tool used
pub fn copy_to_clipboard(text: &str) -> Option<&'static str> {
    for (program, args) in CLIPBOARD_COMMANDS {
        let Ok(child) = spawn_piped(program, args) else {
            continue;
        };

        match feed_and_wait(child, text) {
            Ok(()) => return Some(*program),
            Err(err) => tracing::warn!(program, error = %err, "clipboard write failed"),
        }
    }

    tracing::warn!("no clipboard tool found");
    None
}

/// Read text aloud in the background; returns the tool used
pub fn speak(text: &str) -> Option<&'static str> {
    for program in SPEECH_COMMANDS {
        let Ok(child) = spawn_piped(program, &[]) else {
            continue;
        };

        // Speech lasts as long as the text; reap the child off the UI thread
        let text = text.to_string();
        std::thread::spawn(move || {
            if let Err(err) = feed_and_wait(child, &text) {
                tracing::warn!(program, error = %err, "text-to-speech failed");
            }
        });
        return Some(*program);
    }

    tracing::warn!("no text-to-speech tool found");
    None
}

fn spawn_piped(program: &str, args: &[&str]) -> io::Result<Child> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
}

/// Write `text` to the child's stdin, close it, and wait for the exit
fn feed_and_wait(mut child: Child, text: &str) -> io::Result<()> {
    let written = match child.stdin.take() {
        // Dropping stdin at the end of this arm sends EOF
        Some(mut stdin) => stdin.write_all(text.as_bytes()),
        None => Ok(()),
    };
    let status = child.wait()?;
    written?;

    if status.success() {
        Ok(())
    } else {
        Err(io::Error::new(io::ErrorKind::Other, format!("exited with {}", status)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_feed_and_wait_reaps_child() {
        let child = spawn_piped("cat", &[]).unwrap();
        let pid = child.id();
        feed_and_wait(child, "-v --help").unwrap();
        // A reaped pid is gone from /proc on Linux; elsewhere just check the call
        if cfg!(target_os = "linux") {
            assert!(!std::path::Path::new(&format!("/proc/{}", pid)).exists());
        }
    }

    #[test]
    fn test_failing_tool_is_an_error() {
        let child = spawn_piped("false", &[]).unwrap();
        assert!(feed_and_wait(child, "text").is_err());
    }
}
