use crate::config::StartModeDefaults;
use crate::model::{Candidate, StartMode};
use log::warn;
use regex::Regex;
use std::io::{self, BufRead, Write};
use std::sync::LazyLock;
use thiserror::Error;

static APP_SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.(\d+))?([ad])?$").expect("selection pattern is valid")
});

/// A choice that passed the grammar. `action` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub main: usize,
    pub action: Option<usize>,
    pub mode: Option<StartMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select(Selection),
    Quit,
    Help,
    Download,
    Unknown,
}

/// Raw input before bounds are known. The sub index is still 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawSelection {
    main: usize,
    action: Option<usize>,
    mode: Option<StartMode>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Number cannot be greater than {max}, got {got}.")]
    MainTooLarge { max: usize, got: usize },
    #[error("Sub index cannot be less than 1, got {got}.")]
    ActionTooSmall { got: usize },
    #[error("Sub index cannot be greater than {max}, got {got}.")]
    ActionTooLarge { max: usize, got: usize },
    #[error("Number {0} is too large.")]
    Overflow(String),
}

/// Whether `D` can fetch the resource right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    NotUrl,
    Available,
    AlreadyDownloaded,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Launch(Selection),
    Quit,
    Download,
    /// Input ended before a valid choice, nothing should be launched.
    Closed,
}

pub struct Prompt<'a> {
    pub hint: &'a str,
    pub download: DownloadState,
}

fn parse_raw(text: &str) -> Result<Option<RawSelection>, SelectionError> {
    match text {
        "" => {
            return Ok(Some(RawSelection {
                main: 0,
                action: None,
                mode: None,
            }));
        }
        "a" | "d" => {
            return Ok(Some(RawSelection {
                main: 0,
                action: None,
                mode: StartMode::from_letter(text),
            }));
        }
        _ => {}
    }

    let Some(caps) = APP_SELECT_RE.captures(text) else {
        return Ok(None);
    };
    let number = |s: &str| {
        s.parse::<usize>()
            .map_err(|_| SelectionError::Overflow(s.to_string()))
    };

    Ok(Some(RawSelection {
        main: number(&caps[1])?,
        action: caps.get(2).map(|m| number(m.as_str())).transpose()?,
        mode: caps.get(3).and_then(|m| StartMode::from_letter(m.as_str())),
    }))
}

/// Checks a raw choice against the number of sub-actions of each candidate.
fn validate(raw: RawSelection, action_counts: &[usize]) -> Result<Selection, SelectionError> {
    let max = action_counts.len().saturating_sub(1);
    let Some(&actions) = action_counts.get(raw.main) else {
        return Err(SelectionError::MainTooLarge { max, got: raw.main });
    };

    let action = match raw.action {
        None => None,
        Some(0) => return Err(SelectionError::ActionTooSmall { got: 0 }),
        Some(n) if n > actions => {
            return Err(SelectionError::ActionTooLarge { max: actions, got: n });
        }
        Some(n) => Some(n - 1),
    };

    Ok(Selection {
        main: raw.main,
        action,
        mode: raw.mode,
    })
}

/// Parses one line of input and checks it against the candidates' sub-action
/// counts.
pub fn parse_command(text: &str, action_counts: &[usize]) -> Result<Command, SelectionError> {
    match text {
        "q" => return Ok(Command::Quit),
        "?" => return Ok(Command::Help),
        "D" => return Ok(Command::Download),
        _ => {}
    }

    match parse_raw(text)? {
        Some(raw) => validate(raw, action_counts).map(Command::Select),
        None => Ok(Command::Unknown),
    }
}

pub struct Selector {
    defaults: StartModeDefaults,
}

impl Selector {
    pub fn new(defaults: StartModeDefaults) -> Self {
        Self { defaults }
    }

    /// Prompts until the user makes a valid choice, quits or asks for a
    /// download. Invalid input is reported and prompted for again.
    pub fn choose<R: BufRead, W: Write>(
        &self,
        prompt: &Prompt<'_>,
        candidates: &[Candidate],
        input: &mut R,
        output: &mut W,
    ) -> io::Result<Outcome> {
        let action_counts: Vec<usize> = candidates.iter().map(|c| c.actions.len()).collect();

        loop {
            print_options(output, candidates)?;
            write!(output, "Open {} with (?=help)[0]: ", prompt.hint)?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                warn!("error reading standard input: unexpected end of input");
                return Ok(Outcome::Closed);
            }
            let text = line.trim_end_matches(['\n', '\r']);

            match parse_command(text, &action_counts) {
                Ok(Command::Select(selection)) => return Ok(Outcome::Launch(selection)),
                Ok(Command::Quit) => return Ok(Outcome::Quit),
                Ok(Command::Help) => writeln!(output, "{}", self.help_text())?,
                Ok(Command::Download) => match prompt.download {
                    DownloadState::Available => return Ok(Outcome::Download),
                    DownloadState::NotUrl => {
                        writeln!(output, "D(ownload) is only supported for URL inputs")?
                    }
                    DownloadState::AlreadyDownloaded => {
                        writeln!(output, "File is already downloaded")?
                    }
                    DownloadState::Unsupported => {
                        writeln!(output, "Download is not supported for this protocol/scheme")?
                    }
                },
                Ok(Command::Unknown) => warn!("Unrecognized input '{}', enter ? for help.", text),
                Err(e) => warn!("{}", e),
            }
        }
    }

    pub fn help_text(&self) -> String {
        format!(
            "\
Choose the application to open the file with, using the respective number.
If no number is entered, 0 is assumed.
Sub actions are chosen with <number>.<sub number>, e.g. 1.2.

Optionally append either a or d to control stdin/stdout behavior.
a(ttached): execute program in this terminal.
  When opening with vim, this would launch vim in the current terminal.
d(etached): launch the program detached from the terminal.
  When opening with vim, this would launch vim in a new terminal.

Current defaults:
Terminal: {}
GUI: {}

D to download a http(s) URL and choose from the applications for its content
q to quit
",
            self.defaults.term.describe(),
            self.defaults.gui.describe(),
        )
    }
}

/// Lists candidates from the highest index down so that 0 ends up right
/// above the prompt.
pub fn print_options<W: Write>(output: &mut W, candidates: &[Candidate]) -> io::Result<()> {
    for (index, candidate) in candidates.iter().enumerate().rev() {
        writeln!(output, "{}) {}", index, candidate.name())?;
        for (action_index, action) in candidate.actions.iter().enumerate() {
            writeln!(output, "  {}.{}) {}", index, action_index + 1, action.name)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::desktop::parse_desktop_file;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn candidate(name: &str, actions: &[&str]) -> Candidate {
        let mut content = format!("[Desktop Entry]\nName={name}\nExec={name} %u\n");
        if !actions.is_empty() {
            content.push_str(&format!("Actions={};\n", actions.join(";")));
        }
        for action in actions {
            content.push_str(&format!(
                "[Desktop Action {action}]\nName={action}\nExec={name} --{action} %u\n"
            ));
        }
        let entry = parse_desktop_file(&content).unwrap();
        Candidate {
            desktop_id: format!("{name}.desktop"),
            entry_path: PathBuf::from(format!("/apps/{name}.desktop")),
            actions: entry.actions.clone(),
            entry,
        }
    }

    fn three() -> Vec<Candidate> {
        vec![
            candidate("firefox", &["new", "private"]),
            candidate("chromium", &[]),
            candidate("vim", &["diff"]),
        ]
    }

    fn run(input: &str, download: DownloadState) -> (Outcome, String) {
        let selector = Selector::new(StartModeDefaults::default());
        let prompt = Prompt {
            hint: "index.html",
            download,
        };
        let mut output = Vec::new();
        let outcome = selector
            .choose(&prompt, &three(), &mut Cursor::new(input), &mut output)
            .unwrap();
        (outcome, String::from_utf8(output).unwrap())
    }

    #[test]
    fn grammar_with_sub_action_and_mode() {
        let command = parse_command("2.1d", &[0, 0, 1]).unwrap();
        assert_eq!(
            command,
            Command::Select(Selection {
                main: 2,
                action: Some(0),
                mode: Some(StartMode::Detached),
            })
        );
    }

    #[test]
    fn shortcuts_select_first_candidate() {
        let first = |mode: Option<StartMode>| -> Result<Command, SelectionError> {
            Ok(Command::Select(Selection {
                main: 0,
                action: None,
                mode,
            }))
        };
        assert_eq!(parse_command("", &[0]), first(None));
        assert_eq!(parse_command("a", &[0]), first(Some(StartMode::Attached)));
        assert_eq!(parse_command("d", &[0]), first(Some(StartMode::Detached)));
        assert_eq!(parse_command("q", &[0]), Ok(Command::Quit));
        assert_eq!(parse_command("?", &[0]), Ok(Command::Help));
        assert_eq!(parse_command("D", &[0]), Ok(Command::Download));
        assert_eq!(parse_command("x1", &[0]), Ok(Command::Unknown));
    }

    #[test]
    fn bounds_are_checked() {
        assert_eq!(
            parse_command("99", &[0, 0, 0]),
            Err(SelectionError::MainTooLarge { max: 2, got: 99 })
        );
        assert_eq!(
            parse_command("0.0", &[2]),
            Err(SelectionError::ActionTooSmall { got: 0 })
        );
        assert_eq!(
            parse_command("0.3", &[2]),
            Err(SelectionError::ActionTooLarge { max: 2, got: 3 })
        );
        assert!(matches!(
            parse_command("99999999999999999999999", &[0]),
            Err(SelectionError::Overflow(_))
        ));
    }

    #[test]
    fn out_of_range_input_prompts_again() {
        let (outcome, output) = run("99\n1a\n", DownloadState::NotUrl);
        assert_eq!(
            outcome,
            Outcome::Launch(Selection {
                main: 1,
                action: None,
                mode: Some(StartMode::Attached),
            })
        );
        assert_eq!(output.matches("Open index.html with (?=help)[0]: ").count(), 2);
    }

    #[test]
    fn lists_highest_index_first() {
        let (_, output) = run("q\n", DownloadState::NotUrl);
        let listing: Vec<&str> = output.lines().take(6).collect();
        assert_eq!(
            listing,
            vec![
                "2) vim",
                "  2.1) diff",
                "1) chromium",
                "0) firefox",
                "  0.1) new",
                "  0.2) private",
            ]
        );
    }

    #[test]
    fn quit_and_end_of_input() {
        assert_eq!(run("q\n", DownloadState::NotUrl).0, Outcome::Quit);
        assert_eq!(run("", DownloadState::NotUrl).0, Outcome::Closed);
        assert_eq!(run("abc\n", DownloadState::NotUrl).0, Outcome::Closed);
    }

    #[test]
    fn help_shows_current_defaults() {
        let (outcome, output) = run("?\n\n", DownloadState::NotUrl);
        assert!(output.contains("Terminal: attached"));
        assert!(output.contains("GUI: detached"));
        assert!(matches!(outcome, Outcome::Launch(Selection { main: 0, .. })));
    }

    #[test]
    fn download_only_when_available() {
        assert_eq!(run("D\n", DownloadState::Available).0, Outcome::Download);

        let (outcome, output) = run("D\nq\n", DownloadState::NotUrl);
        assert_eq!(outcome, Outcome::Quit);
        assert!(output.contains("D(ownload) is only supported for URL inputs"));

        let (_, output) = run("D\nq\n", DownloadState::AlreadyDownloaded);
        assert!(output.contains("File is already downloaded"));

        let (_, output) = run("D\nq\n", DownloadState::Unsupported);
        assert!(output.contains("Download is not supported for this protocol/scheme"));
    }
}
