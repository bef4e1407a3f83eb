//! `fleet`: the sample command tree shipped with `fleetctl`.
//!
//! A small cluster-management CLI over static data. It exercises every shape
//! the adapter cares about: hierarchical actions, standalone commands,
//! inherited flags, declared and prose-only value lists, a handler that
//! writes straight to the process stdout, and a handler that may end the
//! process.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, bail};
use serde::Serialize;

use crate::prompt::interactive_allowed;
use crate::tree::{CommandSpec, CommandTree, FlagSpec, Invocation};

pub const PROGRAM: &str = "fleet";

#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub id: &'static str,
    pub name: &'static str,
    pub state: &'static str,
    pub region: &'static str,
    pub version: &'static str,
    pub channel: &'static str,
    pub replicas: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub name: &'static str,
    pub permissions: &'static [&'static str],
}

pub const CLUSTERS: &[Cluster] = &[
    Cluster {
        id: "c-1a2b",
        name: "alpha",
        state: "ready",
        region: "us-east-1",
        version: "4.16.2",
        channel: "stable",
        replicas: 3,
    },
    Cluster {
        id: "c-3c4d",
        name: "bravo",
        state: "ready",
        region: "eu-west-1",
        version: "4.17.0",
        channel: "fast",
        replicas: 5,
    },
    Cluster {
        id: "c-5e6f",
        name: "charlie",
        state: "uninstalling",
        region: "us-east-1",
        version: "4.15.9",
        channel: "stable",
        replicas: 2,
    },
];

pub const ROLES: &[Role] = &[
    Role {
        name: "admin",
        permissions: &["clusters:*", "roles:*"],
    },
    Role {
        name: "viewer",
        permissions: &["clusters:read", "roles:read"],
    },
];

pub const WHOAMI: &str = "ops@example.com";

/// Build the `fleet` command tree.
pub fn tree() -> CommandTree {
    CommandTree::new(
        CommandSpec::new(PROGRAM)
            .about("Manage a fleet of clusters")
            .version(env!("CARGO_PKG_VERSION"))
            .persistent_flag(
                FlagSpec::string("output")
                    .short('o')
                    .help("Output format")
                    .choices(["json", "table"]),
            )
            .persistent_flag(FlagSpec::boolean("debug").help("Print debug information"))
            .subcommand(list())
            .subcommand(describe())
            .subcommand(create())
            .subcommand(delete())
            .subcommand(
                CommandSpec::new("whoami")
                    .about("Show the logged-in account")
                    .run(whoami),
            )
            .subcommand(
                CommandSpec::new("version")
                    .about("Print the client version")
                    .run(|inv| {
                        writeln!(inv.out(), "{PROGRAM} {}", env!("CARGO_PKG_VERSION"))?;
                        Ok(())
                    }),
            ),
    )
}

fn list() -> CommandSpec {
    CommandSpec::new("list")
        .about("List resources")
        .subcommand(
            CommandSpec::new("clusters")
                .about("List clusters")
                .example("  fleet list clusters --region us-east-1 -o json")
                .flag(FlagSpec::boolean("all").help("Include clusters that are uninstalling"))
                .flag(
                    FlagSpec::string("region")
                        .help("Only clusters in this region. One of: us-east-1, eu-west-1"),
                )
                .run(|inv| {
                    let all = inv.flag("all");
                    let region = inv.string("region");
                    let rows: Vec<&Cluster> = CLUSTERS
                        .iter()
                        .filter(|c| all || c.state != "uninstalling")
                        .filter(|c| region.as_deref().is_none_or(|r| r == c.region))
                        .collect();
                    emit(inv, &rows, |out| cluster_table(out, &rows))
                }),
        )
        .subcommand(
            CommandSpec::new("roles")
                .about("List roles")
                .run(|inv| {
                    emit(inv, &ROLES, |out| {
                        writeln!(out, "{:<10} PERMISSIONS", "NAME")?;
                        for r in ROLES {
                            writeln!(out, "{:<10} {}", r.name, r.permissions.join(","))?;
                        }
                        Ok(())
                    })
                }),
        )
}

fn describe() -> CommandSpec {
    CommandSpec::new("describe")
        .about("Show details of a resource")
        .subcommand(
            CommandSpec::new("cluster")
                .about("Show details of a cluster")
                .flag(
                    FlagSpec::string("cluster")
                        .short('c')
                        .help("Name or id of the cluster (required)"),
                )
                .run(|inv| {
                    let key = target(inv, "cluster")?;
                    let cluster = find_cluster(&key)
                        .with_context(|| format!("cluster '{key}' not found"))?;
                    emit(inv, cluster, |out| {
                        writeln!(out, "ID:       {}", cluster.id)?;
                        writeln!(out, "Name:     {}", cluster.name)?;
                        writeln!(out, "State:    {}", cluster.state)?;
                        writeln!(out, "Region:   {}", cluster.region)?;
                        writeln!(out, "Version:  {} ({})", cluster.version, cluster.channel)?;
                        writeln!(out, "Replicas: {}", cluster.replicas)
                    })
                }),
        )
        .subcommand(
            CommandSpec::new("role")
                .about("Show details of a role")
                .flag(FlagSpec::string("role").help("Role name"))
                .run(|inv| {
                    let key = target(inv, "role")?;
                    let Some(role) = ROLES.iter().find(|r| r.name == key) else {
                        bail!("role '{key}' not found");
                    };
                    emit(inv, role, |out| {
                        writeln!(out, "{}: {}", role.name, role.permissions.join(", "))
                    })
                }),
        )
}

fn create() -> CommandSpec {
    CommandSpec::new("create")
        .about("Create a resource")
        .subcommand(
            CommandSpec::new("cluster")
                .about("Create a cluster")
                .long_about("Create a cluster. The request is validated and queued; nothing is provisioned.")
                .example("  fleet create cluster --name delta --replicas 3 --channel fast")
                .flag(FlagSpec::string("name").short('n').help("Cluster name").required())
                .flag(FlagSpec::integer("replicas").help("Number of control-plane replicas").default_value("3"))
                .flag(
                    FlagSpec::string("channel")
                        .help("Update channel. One of: stable, fast, candidate (default stable)"),
                )
                .flag(FlagSpec::string_array("zone").help("Availability zone; repeat for several"))
                .flag(FlagSpec::boolean("dry-run").help("Validate only"))
                .run(|inv| {
                    let name = inv.string("name").unwrap_or_default();
                    if find_cluster(&name).is_some() {
                        bail!("cluster '{name}' already exists");
                    }
                    let request = serde_json::json!({
                        "name": name,
                        "replicas": inv.integer("replicas").unwrap_or(3),
                        "channel": inv.string("channel").unwrap_or_else(|| "stable".into()),
                        "zones": inv.strings("zone"),
                        "state": if inv.flag("dry-run") { "validated" } else { "pending" },
                    });
                    emit(inv, &request, |out| {
                        writeln!(out, "Cluster '{}' is {}", request["name"].as_str().unwrap_or_default(), request["state"].as_str().unwrap_or_default())
                    })
                }),
        )
        .subcommand(
            CommandSpec::new("role")
                .about("Create a role")
                .flag(FlagSpec::string("name").help("Role name (required)"))
                .flag(FlagSpec::string_array("permission").help("Granted permission"))
                .run(|inv| {
                    let Some(name) = inv.string("name") else {
                        bail!("--name is required");
                    };
                    let request = serde_json::json!({
                        "name": name,
                        "permissions": inv.strings("permission"),
                    });
                    emit(inv, &request, |out| writeln!(out, "Role '{name}' created"))
                }),
        )
}

fn delete() -> CommandSpec {
    CommandSpec::new("delete")
        .about("Delete a resource")
        .subcommand(
            CommandSpec::new("cluster")
                .about("Delete a cluster")
                .flag(FlagSpec::string("cluster").short('c').help("Name or id of the cluster"))
                .flag(FlagSpec::boolean("yes").short('y').help("Skip the confirmation prompt"))
                .run_or_exit(|inv| {
                    let key = inv
                        .string("cluster")
                        .or_else(|| inv.args().into_iter().next());
                    let Some(key) = key else {
                        inv.terminate("a cluster name or id is required");
                    };
                    let Some(cluster) = find_cluster(&key) else {
                        inv.terminate(format!("cluster '{key}' not found"));
                    };
                    if !inv.flag("yes") && !confirm(&format!("Delete cluster '{}'?", cluster.name)) {
                        let _ = writeln!(inv.err(), "Aborted");
                        return;
                    }
                    let _ = writeln!(inv.out(), "Cluster '{}' will start uninstalling", cluster.name);
                }),
        )
}

/// Writes straight to the process stdout rather than the framework sink.
fn whoami(inv: &mut Invocation<'_>) -> anyhow::Result<()> {
    let text = if json_output(inv) {
        serde_json::to_string(&serde_json::json!({ "user": WHOAMI, "org": "example" }))?
    } else {
        WHOAMI.to_string()
    };
    let mut stdout = io::stdout();
    stdout.write_all(text.as_bytes())?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

/// Ask on the terminal. Proceeds without asking when prompting is suppressed
/// or stdin is not a terminal.
fn confirm(question: &str) -> bool {
    if !interactive_allowed() || !io::stdin().is_terminal() {
        return true;
    }
    eprint!("{question} [y/N] ");
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

pub fn find_cluster(key: &str) -> Option<&'static Cluster> {
    CLUSTERS.iter().find(|c| c.name == key || c.id == key)
}

/// The named flag, else the first positional argument.
fn target(inv: &Invocation<'_>, flag: &str) -> anyhow::Result<String> {
    inv.string(flag)
        .or_else(|| inv.args().into_iter().next())
        .with_context(|| format!("--{flag} is required"))
}

fn json_output(inv: &Invocation<'_>) -> bool {
    inv.string("output").as_deref() == Some("json")
}

fn emit<T, F>(inv: &mut Invocation<'_>, value: &T, table: F) -> anyhow::Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    if inv.flag("debug") {
        let path = inv.path().join(" ");
        writeln!(inv.err(), "debug: {path} (static data)")?;
    }
    if json_output(inv) {
        serde_json::to_writer_pretty(&mut *inv.out(), value)?;
        writeln!(inv.out())?;
    } else {
        table(inv.out())?;
    }
    Ok(())
}

fn cluster_table(out: &mut dyn Write, rows: &[&Cluster]) -> io::Result<()> {
    writeln!(out, "{:<8} {:<8} {:<13} {:<10} VERSION", "ID", "NAME", "STATE", "REGION")?;
    for c in rows {
        writeln!(
            out,
            "{:<8} {:<8} {:<13} {:<10} {}",
            c.id, c.name, c.state, c.region, c.version
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(argv: &[&str]) -> (i32, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = tree().run(
            std::iter::once(PROGRAM).chain(argv.iter().copied()),
            &mut out,
            &mut err,
        );
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn list_clusters_filters() {
        let (code, out, _) = run(&["list", "clusters", "-o", "json"]);
        assert_eq!(code, 0);
        let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 2);

        let (_, out, _) = run(&["list", "clusters", "--all", "--region", "us-east-1", "-o", "json"]);
        let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(rows.as_array().unwrap().len(), 2);
        assert_eq!(rows[1]["name"], "charlie");
    }

    #[test]
    fn describe_by_flag_or_positional() {
        let (code, out, _) = run(&["describe", "cluster", "--cluster", "bravo", "-o", "json"]);
        assert_eq!(code, 0);
        assert!(out.contains("\"id\": \"c-3c4d\""));

        let (code, out, _) = run(&["describe", "cluster", "c-1a2b"]);
        assert_eq!(code, 0);
        assert!(out.contains("Name:     alpha"));

        let (code, _, err) = run(&["describe", "cluster", "--cluster", "zulu"]);
        assert_eq!(code, 1);
        assert!(err.contains("cluster 'zulu' not found"));
    }

    #[test]
    fn create_cluster_request() {
        let (code, out, _) = run(&[
            "create", "cluster", "--name", "delta", "--zone", "a", "--zone", "b", "--dry-run",
            "-o", "json",
        ]);
        assert_eq!(code, 0);
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["zones"], serde_json::json!(["a", "b"]));
        assert_eq!(v["state"], "validated");
        assert_eq!(v["replicas"], 3);

        let (code, _, err) = run(&["create", "cluster"]);
        assert_eq!(code, 2);
        assert!(err.contains("--name"));
    }

    #[test]
    fn output_choices_are_enforced() {
        let (code, _, err) = run(&["list", "roles", "-o", "xml"]);
        assert_eq!(code, 2);
        assert!(err.contains("xml"));
    }
}
