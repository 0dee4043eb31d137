use crate::config::{StartModeDefaults, TerminalSetting, TERMINAL_ENV_VARS};
use crate::error::{OpnError, Result};
use crate::model::StartMode;
use crate::rendezvous::{StartNotifier, StartSignal};
use log::{debug, info, warn};
use nix::unistd::{getppid, setsid};
use std::env;
use std::fs;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Name of the hidden subcommand that runs a program inside a new terminal
/// and reports back once it has started.
pub const RELAY_COMMAND: &str = "relay";

/// A detached child handed over to init. We no longer wait for it.
#[derive(Debug)]
pub struct Released {
    pub pid: u32,
}

pub struct Launcher {
    start_modes: StartModeDefaults,
    terminal: Option<TerminalSetting>,
    parent_is_shell: fn() -> bool,
}

impl Launcher {
    /// `parent_is_shell` decides whether terminal programs can skip the
    /// relay, see [`parent_is_shell`].
    pub fn new(
        start_modes: StartModeDefaults,
        terminal: Option<TerminalSetting>,
        parent_is_shell: fn() -> bool,
    ) -> Self {
        Self {
            start_modes,
            terminal,
            parent_is_shell,
        }
    }

    pub fn start_mode(&self, chosen: Option<StartMode>, needs_terminal: bool) -> StartMode {
        self.start_modes.resolve(chosen, needs_terminal)
    }

    pub fn launch(&self, argv: Vec<String>, needs_terminal: bool, mode: StartMode) -> Result<()> {
        info!("Starting {} ({})", argv.join(" "), mode.describe());
        match mode {
            StartMode::Attached => run_attached(&argv),
            StartMode::Detached if !needs_terminal => {
                spawn_detached(&argv).map(release)?;
                Ok(())
            }
            StartMode::Detached => self.start_in_terminal(argv),
        }
    }

    fn start_in_terminal(&self, argv: Vec<String>) -> Result<()> {
        let terminal = self.terminal_argv()?;

        // A shell parent keeps its own terminal, so the program can be
        // started inside the new one directly.
        if (self.parent_is_shell)() {
            let mut full = terminal;
            full.extend(argv);
            spawn_detached(&full).map(release)?;
            return Ok(());
        }

        let signal = StartSignal::create().map_err(|source| OpnError::Launch {
            argv: argv.clone(),
            source,
        })?;
        let self_exe = env::current_exe()?;
        let full = relay_argv(&terminal, &self_exe, signal.path(), &argv);
        let child = spawn_detached(&full)?;

        if let Err(e) = signal.wait() {
            warn!("Error reading start signal from {}: {}", argv.join(" "), e);
        }
        release(child);
        Ok(())
    }

    fn terminal_argv(&self) -> Result<Vec<String>> {
        match &self.terminal {
            Some(setting) => setting.argv(),
            None => Err(OpnError::config(
                format!(
                    "Program needs to be opened in a new terminal but none of these \
                     environment variables are set: {}",
                    TERMINAL_ENV_VARS.join(", ")
                ),
                "Set one of them, e.g. OPN_TERM_CMD=\"foot\", or general.terminal in config.toml",
            )),
        }
    }
}

/// Runs the program in the foreground with our stdio and waits for it.
pub fn run_attached(argv: &[String]) -> Result<()> {
    let mut command = command_for(argv)?;
    command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let status = command.status().map_err(|source| OpnError::Launch {
        argv: argv.to_vec(),
        source,
    })?;
    if !status.success() {
        return Err(OpnError::ExitStatus {
            argv: argv.to_vec(),
            status,
        });
    }
    Ok(())
}

/// Runs inside the new terminal: starts the program, tells opn it started,
/// then waits for it like an attached launch would.
pub fn relay(fifo: &Path, argv: &[String]) -> Result<()> {
    let notifier = StartNotifier::open(fifo)?;
    let mut child = command_for(argv)?
        .spawn()
        .map_err(|source| OpnError::Launch {
            argv: argv.to_vec(),
            source,
        })?;

    if let Err(e) = notifier.notify() {
        warn!("Error writing to {:?}: {}", fifo, e);
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(OpnError::ExitStatus {
            argv: argv.to_vec(),
            status,
        });
    }
    Ok(())
}

fn relay_argv(terminal: &[String], self_exe: &Path, fifo: &Path, argv: &[String]) -> Vec<String> {
    let mut full = terminal.to_vec();
    full.push(self_exe.to_string_lossy().into_owned());
    full.push(RELAY_COMMAND.to_string());
    full.push(fifo.to_string_lossy().into_owned());
    full.push("--".to_string());
    full.extend(argv.iter().cloned());
    full
}

fn command_for(argv: &[String]) -> Result<Command> {
    let Some((program, args)) = argv.split_first() else {
        return Err(OpnError::Launch {
            argv: Vec::new(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        });
    };
    let mut command = Command::new(program);
    command.args(args);
    Ok(command)
}

/// Spawns the program in its own session so it outlives us and our
/// terminal.
fn spawn_detached(argv: &[String]) -> Result<Child> {
    let mut command = command_for(argv)?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // SAFETY: setsid is async-signal-safe and touches no memory of ours.
    unsafe {
        command.pre_exec(|| setsid().map(|_| ()).map_err(io::Error::from));
    }

    command.spawn().map_err(|source| OpnError::Launch {
        argv: argv.to_vec(),
        source,
    })
}

fn release(child: Child) -> Released {
    let released = Released { pid: child.id() };
    debug!("Released process {}", released.pid);
    drop(child);
    released
}

/// Whether our parent process is one of the login shells listed in
/// /etc/shells.
pub fn parent_is_shell() -> bool {
    let exe = match fs::read_link(format!("/proc/{}/exe", getppid())) {
        Ok(exe) => exe,
        Err(e) => {
            debug!("Cannot resolve parent executable: {}", e);
            return false;
        }
    };
    match fs::read_to_string("/etc/shells") {
        Ok(shells) => is_listed_shell(&exe, &shells),
        Err(e) => {
            debug!("Cannot read /etc/shells: {}", e);
            false
        }
    }
}

fn is_listed_shell(exe: &Path, shells: &str) -> bool {
    shells
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .any(|line| Path::new(line) == exe)
}
