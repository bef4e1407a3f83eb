/*!
Command executor: discovery, path resolution and execution of the wrapped
command tree.

Discovery runs once at construction. It walks the tree depth-first, skips
the root and hidden nodes (their children are still visited) and records a
`CommandInfo` per node, including the node's `HandlerStyle`.

Execution strategies:

  - in-process : the tree's entry point runs in this process with fd 1
    captured and fd 2 discarded (see `capture`)
  - sub-process : the configured program (default: the current executable)
    is spawned with the same argument vector

Under `ExecutionPolicy::Auto` the choice is a pure function of the node's
`HandlerStyle`: commands that may terminate the process run in a child.
*/

mod argv;
#[cfg(unix)]
mod capture;
mod subprocess;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AdapterError;
use crate::tree::{CommandSpec, CommandTree, FlagKind, FlagSpec, HandlerStyle};

#[cfg(unix)]
pub(crate) use capture::detach_protocol_stdout;

/// Default bound on captured stdout (16 MiB).
pub const DEFAULT_CAPTURE_LIMIT: usize = 16 * 1024 * 1024;

/* -------------------------------------------------------------------------- */
/* Data Model                                                                 */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagInfo {
    pub name: String,
    pub shorthand: Option<char>,
    pub description: String,
    pub kind: FlagKind,
    /// Best-effort: declared required, or the help text says "required".
    pub required: bool,
    /// Values declared on the flag itself.
    pub choices: Vec<String>,
}

impl FlagInfo {
    fn from_spec(spec: &FlagSpec) -> Self {
        Self {
            name: spec.name.clone(),
            shorthand: spec.shorthand,
            description: spec.help.clone(),
            kind: spec.kind,
            required: spec.required || mentions_required(&spec.help),
            choices: spec.choices.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn test(name: &str, kind: FlagKind) -> Self {
        Self {
            name: name.to_string(),
            shorthand: None,
            description: String::new(),
            kind,
            required: false,
            choices: Vec::new(),
        }
    }
}

fn mentions_required(help: &str) -> bool {
    help.split(|c: char| !c.is_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case("required"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandInfo {
    pub path: Vec<String>,
    pub description: String,
    pub usage: String,
    pub long_help: String,
    pub example: String,
    pub flags: Vec<FlagInfo>,
    pub style: HandlerStyle,
    /// Long name of the output-format flag (own or inherited), if any.
    pub output_flag: Option<String>,
}

impl CommandInfo {
    pub fn joined_path(&self) -> String {
        self.path.join(" ")
    }

    /// First path segment.
    pub fn action(&self) -> &str {
        self.path.first().map(String::as_str).unwrap_or_default()
    }

    /// Second path segment, if any.
    pub fn resource(&self) -> Option<&str> {
        self.path.get(1).map(String::as_str)
    }

    pub fn has_output_flag(&self) -> bool {
        self.output_flag.is_some()
    }

    /// Look a flag up by long name or one-letter shorthand.
    pub fn flag(&self, key: &str) -> Option<&FlagInfo> {
        self.flags.iter().find(|f| f.name == key).or_else(|| {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => self.flags.iter().find(|f| f.shorthand == Some(c)),
                _ => None,
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    InProcess,
    SubProcess,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecuteResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Set when the call could not be carried out at all.
    pub error: Option<String>,
    pub mode: ExecutionMode,
    /// Captured stdout hit the capture bound.
    pub truncated: bool,
}

impl ExecuteResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    pub(crate) fn failed(mode: ExecutionMode, message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.clone(),
            exit_code: 1,
            error: Some(message),
            mode,
            truncated: false,
        }
    }

    /// `ExecutionFailure` for a non-zero outcome, carrying stderr (or the
    /// error, or the bare exit code when both are empty).
    pub fn check(self, path: &[String]) -> Result<Self, AdapterError> {
        if self.success() {
            return Ok(self);
        }
        let stderr = match (self.stderr.trim(), &self.error) {
            ("", Some(error)) => error.clone(),
            ("", None) => format!("exit code {}", self.exit_code),
            (stderr, _) => stderr.to_string(),
        };
        Err(AdapterError::ExecutionFailure {
            command: path.join(" "),
            exit_code: self.exit_code,
            stderr,
        })
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionPolicy {
    InProcess,
    SubProcess,
    #[default]
    Auto,
}

impl ExecutionPolicy {
    pub fn mode_for(&self, style: HandlerStyle) -> ExecutionMode {
        match (self, style) {
            (ExecutionPolicy::InProcess, _) => ExecutionMode::InProcess,
            (ExecutionPolicy::SubProcess, _) => ExecutionMode::SubProcess,
            (ExecutionPolicy::Auto, HandlerStyle::ReturnsResult) => ExecutionMode::InProcess,
            (ExecutionPolicy::Auto, HandlerStyle::MayTerminate) => ExecutionMode::SubProcess,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub policy: ExecutionPolicy,
    /// Program spawned for sub-process runs; the current executable if unset.
    pub program: Option<PathBuf>,
    /// Value appended for the output-format flag when the caller sets none.
    pub output_format: Option<String>,
    pub capture_limit: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            policy: ExecutionPolicy::Auto,
            program: None,
            output_format: Some("json".to_string()),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Runner Seam                                                                */
/* -------------------------------------------------------------------------- */

/// What the registries need from an executor.
pub trait CommandRunner: Send + Sync {
    fn commands(&self) -> &[CommandInfo];

    fn execute(
        &self,
        path: &[String],
        flags: &Map<String, Value>,
        args: &[String],
    ) -> Result<ExecuteResult, AdapterError>;

    /// The wrapped program's own help for `path`.
    fn help_text(&self, path: &[String]) -> String;

    /// True when commands that may terminate the process will run in-process.
    fn runs_terminating_in_process(&self) -> bool {
        false
    }
}

/* -------------------------------------------------------------------------- */
/* Executor                                                                   */
/* -------------------------------------------------------------------------- */

/// A path resolved against the discovered commands.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub info: &'a CommandInfo,
    pub leftover: Vec<String>,
}

pub struct CommandExecutor {
    tree: Arc<CommandTree>,
    commands: Vec<CommandInfo>,
    index: HashMap<Vec<String>, usize>,
    options: ExecutorOptions,
}

impl CommandExecutor {
    pub fn new(tree: Arc<CommandTree>, options: ExecutorOptions) -> Self {
        let commands = discover(&tree);
        let index = commands
            .iter()
            .enumerate()
            .map(|(i, c)| (c.path.clone(), i))
            .collect();
        tracing::debug!(count = commands.len(), "discovered commands");
        Self {
            tree,
            commands,
            index,
            options,
        }
    }

    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn get_all_commands(&self) -> &[CommandInfo] {
        &self.commands
    }

    /// Resolve `path` to the deepest discovered command; the rest of the
    /// path becomes positional arguments.
    pub fn find_command(&self, path: &[String]) -> Result<Resolved<'_>, AdapterError> {
        (1..=path.len())
            .rev()
            .find_map(|depth| {
                self.index.get(&path[..depth]).map(|&i| Resolved {
                    info: &self.commands[i],
                    leftover: path[depth..].to_vec(),
                })
            })
            .ok_or_else(|| AdapterError::command_not_found(path))
    }

    /// Strategy the configured policy picks for `info`.
    pub fn mode_for(&self, info: &CommandInfo) -> ExecutionMode {
        let mode = self.options.policy.mode_for(info.style);
        if cfg!(unix) {
            mode
        } else {
            ExecutionMode::SubProcess
        }
    }

    pub fn execute(
        &self,
        path: &[String],
        flags: &Map<String, Value>,
        args: &[String],
    ) -> Result<ExecuteResult, AdapterError> {
        let resolved = self.find_command(path)?;
        let argv = argv::build_argv(
            resolved.info,
            &resolved.leftover,
            flags,
            args,
            self.options.output_format.as_deref(),
        );
        let mode = self.mode_for(resolved.info);
        tracing::debug!(command = %resolved.info.joined_path(), ?mode, ?argv, "executing");

        let result = match mode {
            ExecutionMode::InProcess => self.run_in_process(&argv),
            ExecutionMode::SubProcess => self.run_sub_process(&argv),
        };
        tracing::debug!(
            command = %resolved.info.joined_path(),
            exit_code = result.exit_code,
            stdout_bytes = result.stdout.len(),
            truncated = result.truncated,
            "execution finished"
        );
        Ok(result)
    }

    pub fn help_text(&self, path: &[String]) -> String {
        self.tree.render_help(path)
    }

    fn run_sub_process(&self, argv: &[String]) -> ExecuteResult {
        let program = match &self.options.program {
            Some(p) => p.clone(),
            None => match std::env::current_exe() {
                Ok(p) => p,
                Err(e) => {
                    return ExecuteResult::failed(
                        ExecutionMode::SubProcess,
                        format!("cannot locate current executable: {e}"),
                    );
                }
            },
        };
        subprocess::run(&program, argv, self.options.capture_limit)
    }

    #[cfg(unix)]
    fn run_in_process(&self, argv: &[String]) -> ExecuteResult {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let full: Vec<String> = std::iter::once(self.tree.name().to_string())
            .chain(argv.iter().cloned())
            .collect();
        let mut out = Vec::new();
        let mut err = Vec::new();

        let outcome = capture::with_captured_stdio(self.options.capture_limit, || {
            catch_unwind(AssertUnwindSafe(|| {
                self.tree.run(full.iter(), &mut out, &mut err)
            }))
        });

        let (ran, captured) = match outcome {
            Ok(v) => v,
            Err(e) => {
                return ExecuteResult::failed(
                    ExecutionMode::InProcess,
                    AdapterError::Capture(e).to_string(),
                );
            }
        };
        let exit_code = ran.unwrap_or_else(|panic| {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            err.extend_from_slice(format!("Error: handler panicked: {msg}\n").as_bytes());
            1
        });

        let mut stdout = String::from_utf8_lossy(&out).into_owned();
        stdout.push_str(&String::from_utf8_lossy(&captured.stdout));
        ExecuteResult {
            stdout,
            stderr: String::from_utf8_lossy(&err).into_owned(),
            exit_code,
            error: None,
            mode: ExecutionMode::InProcess,
            truncated: captured.truncated,
        }
    }

    #[cfg(not(unix))]
    fn run_in_process(&self, argv: &[String]) -> ExecuteResult {
        self.run_sub_process(argv)
    }
}

impl CommandRunner for CommandExecutor {
    fn commands(&self) -> &[CommandInfo] {
        self.get_all_commands()
    }

    fn execute(
        &self,
        path: &[String],
        flags: &Map<String, Value>,
        args: &[String],
    ) -> Result<ExecuteResult, AdapterError> {
        CommandExecutor::execute(self, path, flags, args)
    }

    fn help_text(&self, path: &[String]) -> String {
        CommandExecutor::help_text(self, path)
    }

    fn runs_terminating_in_process(&self) -> bool {
        self.options.policy == ExecutionPolicy::InProcess
            && self
                .commands
                .iter()
                .any(|c| c.style == HandlerStyle::MayTerminate)
    }
}

/* -------------------------------------------------------------------------- */
/* Discovery                                                                  */
/* -------------------------------------------------------------------------- */

fn discover(tree: &CommandTree) -> Vec<CommandInfo> {
    let mut built = tree.built_command();
    let root = tree.root();
    let inherited: Vec<&FlagSpec> = root.persistent_flags().iter().collect();
    let mut out = Vec::new();
    for child in root.children() {
        if let Some(cmd) = built.find_subcommand_mut(child.name()) {
            walk(child, cmd, &[], &inherited, &mut out);
        }
    }
    out
}

fn walk(
    spec: &CommandSpec,
    cmd: &mut clap::Command,
    parent: &[String],
    inherited: &[&FlagSpec],
    out: &mut Vec<CommandInfo>,
) {
    let mut path = parent.to_vec();
    path.push(spec.name().to_string());

    let mut in_scope: Vec<&FlagSpec> = spec.persistent_flags().iter().collect();
    in_scope.extend(inherited.iter().copied());

    if !spec.is_hidden() {
        let flags = merge_flags(spec.flags(), &in_scope);
        let output_flag = flags
            .iter()
            .find(|f| f.name == "output")
            .or_else(|| flags.iter().find(|f| f.shorthand == Some('o')))
            .map(|f| f.name.clone());
        let usage = cmd.render_usage().to_string();
        out.push(CommandInfo {
            description: spec.short_help().to_string(),
            usage: usage
                .trim()
                .strip_prefix("Usage:")
                .unwrap_or(usage.trim())
                .trim()
                .to_string(),
            long_help: spec.long_help().to_string(),
            example: spec.example_text().to_string(),
            style: spec
                .handler()
                .map(|h| h.style())
                .unwrap_or(HandlerStyle::ReturnsResult),
            output_flag,
            flags,
            path: path.clone(),
        });
    }

    for child in spec.children() {
        if let Some(sub) = cmd.find_subcommand_mut(child.name()) {
            walk(child, sub, &path, &in_scope, out);
        }
    }
}

/// Own flags first, then inherited ones; first declaration of a name wins.
fn merge_flags(own: &[FlagSpec], inherited: &[&FlagSpec]) -> Vec<FlagInfo> {
    let mut merged: Vec<FlagInfo> = Vec::new();
    for spec in own.iter().chain(inherited.iter().copied()) {
        if merged.iter().all(|f| f.name != spec.name) {
            merged.push(FlagInfo::from_spec(spec));
        }
    }
    merged
}
