/*!
Command tree: the wrapped program's commands.

A `CommandSpec` tree describes the program (names, help text, flags,
children and handlers). `CommandTree` compiles it into a `clap::Command`
for parsing and exposes the single entry point `run(argv, out, err)`.

Handlers come in two styles:

  - `Handler::Returns` : reports failure by returning an error
  - `Handler::Terminates` : may end the whole process on failure
    (`Invocation::terminate`, `std::process::exit`, ...)

The style is a static property of a node and is what the executor uses to
decide whether a command may safely run inside the host process.
*/

mod flag;

pub use flag::{FlagKind, FlagSpec};

use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches};
use serde::Serialize;

/// Id of the positional catch-all argument on leaf commands.
pub(crate) const ARGS_ID: &str = "args";

pub type ResultHandler = Arc<dyn Fn(&mut Invocation<'_>) -> anyhow::Result<()> + Send + Sync>;
pub type TerminatingHandler = Arc<dyn Fn(&mut Invocation<'_>) + Send + Sync>;

#[derive(Clone)]
pub enum Handler {
    Returns(ResultHandler),
    Terminates(TerminatingHandler),
}

impl Handler {
    pub fn style(&self) -> HandlerStyle {
        match self {
            Handler::Returns(_) => HandlerStyle::ReturnsResult,
            Handler::Terminates(_) => HandlerStyle::MayTerminate,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Returns(_) => f.write_str("Handler::Returns(..)"),
            Handler::Terminates(_) => f.write_str("Handler::Terminates(..)"),
        }
    }
}

/// Capability tag computed once per node at discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerStyle {
    ReturnsResult,
    MayTerminate,
}

/* -------------------------------------------------------------------------- */
/* Invocation                                                                 */
/* -------------------------------------------------------------------------- */

/// What a handler sees: the matched path, parsed flags and the framework's
/// output/error sinks.
pub struct Invocation<'a> {
    path: &'a [String],
    matches: &'a ArgMatches,
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
}

impl<'a> Invocation<'a> {
    pub fn path(&self) -> &[String] {
        self.path
    }

    pub fn string(&self, name: &str) -> Option<String> {
        self.matches
            .try_get_one::<String>(name)
            .ok()
            .flatten()
            .cloned()
    }

    pub fn strings(&self, name: &str) -> Vec<String> {
        self.matches
            .try_get_many::<String>(name)
            .ok()
            .flatten()
            .map(|vals| vals.cloned().collect())
            .unwrap_or_default()
    }

    pub fn flag(&self, name: &str) -> bool {
        self.matches
            .try_get_one::<bool>(name)
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.matches.try_get_one::<i64>(name).ok().flatten().copied()
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.matches.try_get_one::<f64>(name).ok().flatten().copied()
    }

    /// Positional arguments given after the command path.
    pub fn args(&self) -> Vec<String> {
        self.strings(ARGS_ID)
    }

    /// Framework output sink.
    pub fn out(&mut self) -> &mut dyn Write {
        &mut *self.out
    }

    /// Framework error sink.
    pub fn err(&mut self) -> &mut dyn Write {
        &mut *self.err
    }

    /// Report `message` on the error sink and end the process with status 1.
    pub fn terminate(&mut self, message: impl fmt::Display) -> ! {
        let _ = writeln!(self.err, "Error: {message}");
        let _ = self.err.flush();
        let _ = self.out.flush();
        std::process::exit(1)
    }
}

/* -------------------------------------------------------------------------- */
/* CommandSpec                                                                */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub(crate) name: String,
    pub(crate) short: String,
    pub(crate) long: String,
    pub(crate) example: String,
    pub(crate) version: Option<String>,
    pub(crate) hidden: bool,
    pub(crate) flags: Vec<FlagSpec>,
    pub(crate) persistent_flags: Vec<FlagSpec>,
    pub(crate) handler: Option<Handler>,
    pub(crate) children: Vec<CommandSpec>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short: String::new(),
            long: String::new(),
            example: String::new(),
            version: None,
            hidden: false,
            flags: Vec::new(),
            persistent_flags: Vec::new(),
            handler: None,
            children: Vec::new(),
        }
    }

    /// One-line description.
    pub fn about(mut self, text: impl Into<String>) -> Self {
        self.short = text.into();
        self
    }

    pub fn long_about(mut self, text: impl Into<String>) -> Self {
        self.long = text.into();
        self
    }

    pub fn example(mut self, text: impl Into<String>) -> Self {
        self.example = text.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn flag(mut self, flag: FlagSpec) -> Self {
        self.flags.push(flag);
        self
    }

    /// A flag inherited by every descendant.
    pub fn persistent_flag(mut self, flag: FlagSpec) -> Self {
        self.persistent_flags.push(flag);
        self
    }

    pub fn subcommand(mut self, child: CommandSpec) -> Self {
        self.children.push(child);
        self
    }

    /// Attach a handler that reports failure through its return value.
    pub fn run<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handler = Some(Handler::Returns(Arc::new(f)));
        self
    }

    /// Attach a handler that may end the process instead of returning an error.
    pub fn run_or_exit<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Invocation<'_>) + Send + Sync + 'static,
    {
        self.handler = Some(Handler::Terminates(Arc::new(f)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_help(&self) -> &str {
        &self.short
    }

    pub fn long_help(&self) -> &str {
        &self.long
    }

    pub fn example_text(&self) -> &str {
        &self.example
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn flags(&self) -> &[FlagSpec] {
        &self.flags
    }

    pub fn persistent_flags(&self) -> &[FlagSpec] {
        &self.persistent_flags
    }

    pub fn handler(&self) -> Option<&Handler> {
        self.handler.as_ref()
    }

    pub fn children(&self) -> &[CommandSpec] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&CommandSpec> {
        self.children.iter().find(|c| c.name == name)
    }

    fn to_clap(&self) -> clap::Command {
        let mut cmd = clap::Command::new(self.name.clone()).hide(self.hidden);
        if !self.short.is_empty() {
            cmd = cmd.about(self.short.clone());
        }
        if !self.long.is_empty() {
            cmd = cmd.long_about(self.long.clone());
        }
        if !self.example.is_empty() {
            cmd = cmd.after_long_help(format!("Examples:\n{}", self.example));
        }
        if let Some(v) = &self.version {
            cmd = cmd.version(v.clone());
        }
        for f in &self.flags {
            cmd = cmd.arg(f.to_arg(false));
        }
        for f in &self.persistent_flags {
            cmd = cmd.arg(f.to_arg(true));
        }
        if self.children.is_empty() && self.handler.is_some() {
            cmd = cmd.arg(
                Arg::new(ARGS_ID)
                    .value_name("ARGS")
                    .num_args(1..)
                    .action(ArgAction::Append),
            );
        }
        for child in &self.children {
            cmd = cmd.subcommand(child.to_clap());
        }
        cmd
    }
}

/* -------------------------------------------------------------------------- */
/* CommandTree                                                                */
/* -------------------------------------------------------------------------- */

/// A compiled command tree with its single entry point.
#[derive(Debug, Clone)]
pub struct CommandTree {
    root: CommandSpec,
    clap: clap::Command,
}

impl CommandTree {
    pub fn new(root: CommandSpec) -> Self {
        let clap = root.to_clap();
        Self { root, clap }
    }

    pub fn root(&self) -> &CommandSpec {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.root.name
    }

    /// A built copy of the clap command (bin names and help templates resolved).
    pub fn built_command(&self) -> clap::Command {
        let mut cmd = self.clap.clone();
        cmd.build();
        cmd
    }

    /// Parse `argv` (program name first) and dispatch to the matched handler.
    ///
    /// Returns the process exit code. Help and version requests go to `out`
    /// with code 0; usage errors are rendered to `err` with clap's code.
    pub fn run<I, T>(&self, argv: I, out: &mut dyn Write, err: &mut dyn Write) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = match self.clap.clone().try_get_matches_from(argv) {
            Ok(m) => m,
            Err(e) => {
                let rendered = e.render().to_string();
                let sink: &mut dyn Write = if e.use_stderr() { err } else { out };
                let _ = sink.write_all(rendered.as_bytes());
                return e.exit_code();
            }
        };

        let mut node = &self.root;
        let mut path = Vec::new();
        let mut current = &matches;
        while let Some((name, sub)) = current.subcommand() {
            let Some(child) = node.child(name) else {
                break;
            };
            node = child;
            path.push(name.to_string());
            current = sub;
        }

        let Some(handler) = node.handler.clone() else {
            let _ = out.write_all(self.render_help(&path).as_bytes());
            return 0;
        };

        let mut invocation = Invocation {
            path: &path,
            matches: current,
            out,
            err,
        };
        let code = match handler {
            Handler::Returns(f) => match f(&mut invocation) {
                Ok(()) => 0,
                Err(e) => {
                    let _ = writeln!(invocation.err, "Error: {e:#}");
                    1
                }
            },
            Handler::Terminates(f) => {
                f(&mut invocation);
                0
            }
        };
        let _ = invocation.out.flush();
        let _ = invocation.err.flush();
        code
    }

    /// Run against the real process arguments and standard streams.
    pub fn run_main(&self) -> i32 {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        self.run(
            std::env::args_os(),
            &mut stdout.lock(),
            &mut stderr.lock(),
        )
    }

    /// Long help for the deepest node matching `path` (root help if none).
    pub fn render_help(&self, path: &[String]) -> String {
        let mut cmd = self.built_command();
        help_for(&mut cmd, path)
    }
}

fn help_for(cmd: &mut clap::Command, path: &[String]) -> String {
    if let Some((first, rest)) = path.split_first()
        && let Some(sub) = cmd.find_subcommand_mut(first)
    {
        return help_for(sub, rest);
    }
    cmd.render_long_help().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CommandTree {
        CommandTree::new(
            CommandSpec::new("demo")
                .persistent_flag(FlagSpec::boolean("debug").help("Debug output"))
                .subcommand(
                    CommandSpec::new("greet")
                        .about("Say hello")
                        .flag(FlagSpec::string("name").short('n').required())
                        .flag(FlagSpec::integer("times").default_value("1"))
                        .run(|inv| {
                            let name = inv.string("name").unwrap_or_default();
                            for _ in 0..inv.integer("times").unwrap_or(1) {
                                writeln!(inv.out(), "hello {name}")?;
                            }
                            if inv.flag("debug") {
                                writeln!(inv.err(), "debug on")?;
                            }
                            Ok(())
                        }),
                )
                .subcommand(
                    CommandSpec::new("fail").run(|_| Err(anyhow::anyhow!("boom"))),
                )
                .subcommand(CommandSpec::new("group").subcommand(
                    CommandSpec::new("leaf").run(|inv| {
                        let args = inv.args().join(",");
                        writeln!(inv.out(), "{args}")?;
                        Ok(())
                    }),
                )),
        )
    }

    fn run(tree: &CommandTree, argv: &[&str]) -> (i32, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let full: Vec<&str> = std::iter::once("demo").chain(argv.iter().copied()).collect();
        let code = tree.run(full, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn dispatches_to_leaf_with_flags() {
        let tree = sample();
        let (code, out, err) = run(&tree, &["greet", "--name", "bob", "--times", "2", "--debug"]);
        assert_eq!(code, 0);
        assert_eq!(out, "hello bob\nhello bob\n");
        assert_eq!(err, "debug on\n");
    }

    #[test]
    fn handler_error_is_exit_one() {
        let (code, _, err) = run(&sample(), &["fail"]);
        assert_eq!(code, 1);
        assert!(err.contains("boom"));
    }

    #[test]
    fn usage_error_goes_to_err() {
        let (code, out, err) = run(&sample(), &["greet"]);
        assert_ne!(code, 0);
        assert!(out.is_empty());
        assert!(err.contains("--name"));
    }

    #[test]
    fn group_without_handler_prints_help() {
        let (code, out, _) = run(&sample(), &["group"]);
        assert_eq!(code, 0);
        assert!(out.contains("leaf"));
    }

    #[test]
    fn positional_args_reach_leaf() {
        let (code, out, _) = run(&sample(), &["group", "leaf", "--", "a", "-b"]);
        assert_eq!(code, 0);
        assert_eq!(out, "a,-b\n");
    }

    #[test]
    fn render_help_for_nested_path() {
        let tree = sample();
        let help = tree.render_help(&["greet".to_string()]);
        assert!(help.contains("--times"));
        let fallback = tree.render_help(&["nope".to_string()]);
        assert!(fallback.contains("greet"));
    }
}
