//! Console I/O
//!
//! Owns the three standard streams for one invocation. Command output goes
//! to stdout; prompts, progress trackers and status lines go to stderr so
//! they never corrupt machine-readable output.

use crate::error::{CliError, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use std::io::{BufRead, IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Where prompt answers come from
enum PromptInput {
    /// A real terminal, driven through dialoguer widgets on stderr
    Terminal,
    /// Piped or scripted lines
    Lines(Mutex<Box<dyn BufRead + Send>>),
}

impl PromptInput {
    fn for_stdin(is_terminal: bool) -> Self {
        if is_terminal {
            Self::Terminal
        } else {
            Self::Lines(Mutex::new(Box::new(std::io::BufReader::new(std::io::stdin()))))
        }
    }
}

/// Interactive I/O for one invocation
pub struct Console {
    quiet: bool,
    interactive: bool,
    user_output_enabled: bool,
    input: PromptInput,
    stdout: Mutex<Box<dyn Write + Send>>,
    stderr: Mutex<Box<dyn Write + Send>>,
}

impl Console {
    /// Console over the process streams. Prompts are only offered when
    /// stdin is a terminal.
    pub fn stdio(quiet: bool) -> Self {
        let is_terminal = std::io::stdin().is_terminal();
        Self {
            quiet,
            interactive: is_terminal,
            user_output_enabled: true,
            input: PromptInput::for_stdin(is_terminal),
            stdout: Mutex::new(Box::new(std::io::stdout())),
            stderr: Mutex::new(Box::new(std::io::stderr())),
        }
    }

    /// Console over arbitrary streams
    pub fn new(
        input: Box<dyn BufRead + Send>,
        stdout: Box<dyn Write + Send>,
        stderr: Box<dyn Write + Send>,
        interactive: bool,
    ) -> Self {
        Self {
            quiet: false,
            interactive,
            user_output_enabled: true,
            input: PromptInput::Lines(Mutex::new(input)),
            stdout: Mutex::new(stdout),
            stderr: Mutex::new(stderr),
        }
    }

    /// Console fed from a fixed answer script, writing into shared buffers
    pub fn scripted(answers: &str, interactive: bool) -> (Self, Captured) {
        let captured = Captured::default();
        let console = Self::new(
            Box::new(std::io::Cursor::new(answers.as_bytes().to_vec())),
            Box::new(captured.stdout.clone()),
            Box::new(captured.stderr.clone()),
            interactive,
        );
        (console, captured)
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    pub fn set_user_output_enabled(&mut self, enabled: bool) {
        self.user_output_enabled = enabled;
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Whether an interactive prompt may be shown
    pub fn can_prompt(&self) -> bool {
        self.interactive && !self.quiet
    }

    /// Write command output to stdout
    pub fn out(&self, text: &str) -> Result<()> {
        if !self.user_output_enabled {
            return Ok(());
        }
        let mut out = lock(&self.stdout);
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    /// Write one status line to stderr
    pub fn status(&self, line: &str) {
        if !self.user_output_enabled {
            return;
        }
        self.err_line(line);
    }

    /// Write one line to stderr regardless of output settings (errors)
    pub fn err_line(&self, line: &str) {
        let mut err = lock(&self.stderr);
        // A closed stderr has nowhere to report to
        let _ = writeln!(err, "{line}");
        let _ = err.flush();
    }

    fn err_write(&self, text: &str) {
        let mut err = lock(&self.stderr);
        let _ = write!(err, "{text}");
        let _ = err.flush();
    }

    /// Read one piped line, `None` on end of input
    fn read_line(input: &Mutex<Box<dyn BufRead + Send>>) -> Result<Option<String>> {
        let mut line = String::new();
        let n = lock(input).read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Ask a yes/no question.
    ///
    /// With `--quiet` the default is taken without reading input. When the
    /// answer is "no" and `cancel_on_no` is set, the operation is cancelled.
    /// Running out of input on a non-interactive stdin also cancels.
    pub fn prompt_continue(&self, message: &str, default: bool, cancel_on_no: bool) -> Result<bool> {
        let answer = if self.quiet {
            default
        } else {
            self.ask_yes_no(message, default)?
        };
        if !answer && cancel_on_no {
            return Err(CliError::aborted_by_user());
        }
        Ok(answer)
    }

    fn ask_yes_no(&self, message: &str, default: bool) -> Result<bool> {
        if !message.is_empty() {
            self.err_line(message);
            self.err_line("");
        }
        let input = match &self.input {
            PromptInput::Terminal => {
                // Escape or `q` declines
                let answer = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("Do you want to continue")
                    .default(default)
                    .interact_opt()
                    .map_err(prompt_error)?;
                return Ok(answer.unwrap_or(false));
            }
            PromptInput::Lines(input) => input,
        };
        let choices = if default { "Y/n" } else { "y/N" };
        loop {
            self.err_write(&format!("Do you want to continue ({choices})?  "));
            let Some(line) = Self::read_line(input)? else {
                self.err_line("");
                if self.interactive {
                    return Ok(default);
                }
                return Err(CliError::cancelled(
                    "This prompt could not be answered because stdin is not interactive. \
                     Re-run with --quiet to accept the default.",
                ));
            };
            match line.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.err_line("Please enter 'y' or 'n':"),
            }
        }
    }

    /// Ask for a free-form value. Returns `None` when prompting is not
    /// possible or the user enters nothing.
    pub fn prompt_string(&self, message: &str) -> Result<Option<String>> {
        if !self.can_prompt() {
            return Ok(None);
        }
        let answer = match &self.input {
            PromptInput::Terminal => Some(
                Input::<String>::with_theme(&ColorfulTheme::default())
                    .with_prompt(message)
                    .allow_empty(true)
                    .interact_text()
                    .map_err(prompt_error)?,
            ),
            PromptInput::Lines(input) => {
                self.err_write(&format!("{message}:  "));
                Self::read_line(input)?
            }
        };
        Ok(answer.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    }
}

/// Ctrl-C inside a widget aborts like a "no"; other terminal failures are I/O errors
fn prompt_error(err: dialoguer::Error) -> CliError {
    let dialoguer::Error::IO(io) = err;
    if io.kind() == std::io::ErrorKind::Interrupted {
        CliError::aborted_by_user()
    } else {
        CliError::from(io)
    }
}

fn lock<T: ?Sized>(m: &Mutex<Box<T>>) -> std::sync::MutexGuard<'_, Box<T>> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory writer shared between a console and the code inspecting it
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Output captured from a scripted console
#[derive(Clone, Default)]
pub struct Captured {
    pub stdout: SharedBuffer,
    pub stderr: SharedBuffer,
}

// =============================================================================
// Progress tracking
// =============================================================================

/// Kind of change an operation performs, used for tracker wording
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationVerb {
    Create,
    Delete,
    Update,
    Start,
    Stop,
    Other,
}

impl OperationVerb {
    /// Classify from a Compute `operationType` or a method name
    pub fn from_operation_type(op_type: &str) -> Self {
        match op_type {
            "insert" | "create" => Self::Create,
            "delete" => Self::Delete,
            "start" => Self::Start,
            "stop" => Self::Stop,
            t if t.starts_with("set") || t == "update" || t == "patch" => Self::Update,
            _ => Self::Other,
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Create => "Created",
            Self::Delete => "Deleted",
            Self::Update => "Updated",
            Self::Start => "Started",
            Self::Stop => "Stopped",
            Self::Other => "Completed",
        }
    }

    pub fn present_participle(&self) -> &'static str {
        match self {
            Self::Create => "Creating",
            Self::Delete => "Deleting",
            Self::Update => "Updating",
            Self::Start => "Starting",
            Self::Stop => "Stopping",
            Self::Other => "Waiting for",
        }
    }
}

/// Format an elapsed duration for tracker lines
pub fn duration_display(d: Duration) -> String {
    if d.as_secs() < 1 {
        format!("{}ms", d.as_millis())
    } else if d.as_secs() < 60 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}m{}s", d.as_secs() / 60, d.as_secs() % 60)
    }
}

/// Emits one stderr line per poll while an operation runs
pub struct ProgressTracker<'a> {
    console: &'a Console,
    label: String,
    verb: OperationVerb,
    started: Instant,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(console: &'a Console, verb: OperationVerb, label: impl Into<String>) -> Self {
        Self {
            console,
            label: label.into(),
            verb,
            started: Instant::now(),
        }
    }

    pub fn tick(&self, state: &str) {
        self.console.status(&format!(
            "{} [{}]...{} ({})",
            self.verb.present_participle(),
            self.label,
            state,
            duration_display(self.started.elapsed())
        ));
    }

    pub fn succeeded(&self) {
        self.console.status(&format!(
            "{} [{}] ({}).",
            self.verb.past_tense(),
            self.label,
            duration_display(self.started.elapsed())
        ));
    }

    pub fn failed(&self) {
        self.console
            .status(&format!("{} [{}]...failed.", self.verb.present_participle(), self.label));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_prompt_accepts_yes_and_no() {
        let (console, captured) = Console::scripted("y\n", true);
        assert!(console.prompt_continue("Delete it?", true, true).unwrap());
        assert!(captured.stderr.contents().contains("Do you want to continue (Y/n)?"));

        let (console, _) = Console::scripted("no\n", true);
        assert!(!console.prompt_continue("", true, false).unwrap());
    }

    #[test]
    fn test_prompt_no_cancels() {
        let (console, _) = Console::scripted("n\n", true);
        let err = console.prompt_continue("Delete it?", true, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert!(err.message.contains("aborted by user"));
    }

    #[test]
    fn test_prompt_empty_line_takes_default() {
        let (console, _) = Console::scripted("\n", true);
        assert!(!console.prompt_continue("", false, false).unwrap());
    }

    #[test]
    fn test_prompt_reasks_on_garbage() {
        let (console, captured) = Console::scripted("maybe\ny\n", true);
        assert!(console.prompt_continue("", false, false).unwrap());
        assert!(captured.stderr.contents().contains("Please enter 'y' or 'n'"));
    }

    #[test]
    fn test_quiet_takes_default_without_reading() {
        let (mut console, captured) = Console::scripted("n\n", true);
        console.set_quiet(true);
        assert!(console.prompt_continue("Delete it?", true, true).unwrap());
        assert!(captured.stderr.contents().is_empty());
    }

    #[test]
    fn test_non_interactive_eof_cancels() {
        let (console, _) = Console::scripted("", false);
        let err = console.prompt_continue("Delete it?", true, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[test]
    fn test_piped_answer_is_honoured() {
        let (console, _) = Console::scripted("y\n", false);
        assert!(console.prompt_continue("", false, true).unwrap());
    }

    #[test]
    fn test_terminal_widgets_only_for_tty_stdin() {
        assert!(matches!(PromptInput::for_stdin(true), PromptInput::Terminal));
        assert!(matches!(PromptInput::for_stdin(false), PromptInput::Lines(_)));

        // Scripted consoles keep reading lines even when marked interactive
        let (console, _) = Console::scripted("y\n", true);
        assert!(matches!(console.input, PromptInput::Lines(_)));
        assert!(console.prompt_continue("", false, true).unwrap());
    }

    #[test]
    fn test_prompt_string_trims_answer() {
        let (console, _) = Console::scripted("  europe-west1  \n", true);
        assert_eq!(console.prompt_string("Region").unwrap().as_deref(), Some("europe-west1"));
    }

    #[test]
    fn test_prompt_string_requires_tty() {
        let (console, _) = Console::scripted("us-east1\n", false);
        assert_eq!(console.prompt_string("Region").unwrap(), None);
        let (console, _) = Console::scripted("us-east1\n", true);
        assert_eq!(console.prompt_string("Region").unwrap().as_deref(), Some("us-east1"));
    }

    #[test]
    fn test_user_output_disabled_suppresses_stdout() {
        let (mut console, captured) = Console::scripted("", false);
        console.set_user_output_enabled(false);
        console.out("hidden").unwrap();
        console.err_line("ERROR: shown");
        assert!(captured.stdout.contents().is_empty());
        assert!(captured.stderr.contents().contains("ERROR: shown"));
    }

    #[test]
    fn test_operation_verbs() {
        assert_eq!(OperationVerb::from_operation_type("insert"), OperationVerb::Create);
        assert_eq!(OperationVerb::from_operation_type("setMetadata"), OperationVerb::Update);
        assert_eq!(OperationVerb::Delete.past_tense(), "Deleted");
        assert_eq!(duration_display(Duration::from_millis(250)), "250ms");
        assert_eq!(duration_display(Duration::from_secs(75)), "1m15s");
    }

    #[test]
    fn test_tracker_lines() {
        let (console, captured) = Console::scripted("", false);
        let tracker = ProgressTracker::new(&console, OperationVerb::Create, "vm-1");
        tracker.tick("RUNNING");
        tracker.succeeded();
        let err = captured.stderr.contents();
        assert!(err.contains("Creating [vm-1]...RUNNING"));
        assert!(err.contains("Created [vm-1]"));
    }
}
