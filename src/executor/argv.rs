//! Argument-vector reconstruction shared by both execution strategies.

use serde_json::{Map, Value};

use super::CommandInfo;

/// Build `[...path, flag pairs..., positional...]` for `info`.
///
/// Flags are emitted in key order. Keys may be a flag's long name or its
/// one-letter shorthand; keys the node does not declare are dropped. When
/// the node has an output-format flag and the caller did not set it,
/// `--<output>=<format>` is appended.
pub(crate) fn build_argv(
    info: &CommandInfo,
    leftover: &[String],
    flags: &Map<String, Value>,
    args: &[String],
    output_format: Option<&str>,
) -> Vec<String> {
    let mut argv = info.path.clone();
    let mut output_requested = false;

    let mut entries: Vec<_> = flags.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (key, value) in entries {
        let key = key.trim_start_matches('-');
        let Some(flag) = info.flag(key) else {
            tracing::debug!(command = %info.joined_path(), flag = key, "dropping undeclared flag");
            continue;
        };
        if info.output_flag.as_deref() == Some(flag.name.as_str()) && !value.is_null() {
            output_requested = true;
        }
        argv.extend(flag.kind.to_argv(&flag.name, value));
    }

    if !output_requested
        && let Some(format) = output_format
        && let Some(name) = &info.output_flag
    {
        argv.push(format!("--{name}={format}"));
    }

    if !leftover.is_empty() || !args.is_empty() {
        argv.push("--".to_string());
        argv.extend(leftover.iter().cloned());
        argv.extend(args.iter().cloned());
    }
    argv
}
