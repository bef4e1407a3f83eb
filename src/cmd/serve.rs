//! `fleetctl mcp serve`: run the adapter as an MCP server.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use cmdtree_mcp::AdapterConfig;

use crate::cmd::shared::local_server;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Protocol transport
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    pub transport: Transport,

    /// Listen port for the http transport
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Listen address for the http transport
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,
}

pub async fn execute_serve(args: ServeArgs, config: &AdapterConfig) -> Result<()> {
    let server = local_server(config);
    tracing::info!(policy = ?config.policy, transport = ?args.transport, "starting server");
    match args.transport {
        Transport::Stdio => server.serve_stdio().await.context("stdio server failed"),
        Transport::Http => {
            let addr = SocketAddr::new(args.host, args.port);
            eprintln!("MCP endpoint: http://{addr}/mcp");
            server
                .serve_http(addr)
                .await
                .with_context(|| format!("http server on {addr} failed"))
        }
    }
}
