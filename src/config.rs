//! Launcher configuration.
//!
//! The launcher surface is flag-driven: one process hosts `num_servers`
//! replicas. Replica `i` binds client port `start_server_port + i` and peer
//! port `start_internal_port + i`; every replica probes the same configured
//! peer address space, the product of the supplied host list, starting-port
//! list, and per-host port count.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use clap::Parser;

use crate::sync::Endpoint;

/// Command-line flags of the rchatd launcher.
#[derive(Debug, Parser)]
#[command(name = "rchatd", about = "Replicated chat daemon", version)]
pub struct LauncherArgs {
    /// Number of replicas to run in this process.
    #[arg(long = "num_servers", default_value_t = 2)]
    pub num_servers: usize,

    /// First client-facing port; replica i binds start_server_port + i.
    #[arg(long = "start_server_port", default_value_t = 50000)]
    pub start_server_port: u16,

    /// First peer-facing port; replica i binds start_internal_port + i.
    #[arg(long = "start_internal_port", default_value_t = 60000)]
    pub start_internal_port: u16,

    /// Host every replica binds.
    #[arg(long = "host", default_value = "localhost")]
    pub host: String,

    /// Comma-separated peer hosts.
    #[arg(long = "internal_other_servers", default_value = "localhost")]
    pub internal_other_servers: String,

    /// Comma-separated starting peer ports.
    #[arg(long = "internal_other_ports", default_value = "60000")]
    pub internal_other_ports: String,

    /// Comma-separated consecutive-port counts, one per peer host.
    #[arg(long = "internal_max_ports", default_value = "10")]
    pub internal_max_ports: String,

    /// Directory for persisted snapshots.
    #[arg(long = "data_dir", default_value = "database")]
    pub data_dir: PathBuf,

    /// Prometheus metrics port; 0 disables the endpoint.
    #[arg(long = "metrics_port", default_value_t = 0)]
    pub metrics_port: u16,

    /// Emit JSON logs.
    #[arg(long = "log_json", default_value_t = false)]
    pub log_json: bool,
}

/// Everything one replica needs to come up.
#[derive(Debug, Clone)]
pub struct ReplicaConfig {
    pub id: usize,
    pub host: String,
    pub client_port: u16,
    pub peer_port: u16,
    /// Peer address space this replica probes on every sweep.
    pub peer_space: Vec<Endpoint>,
    pub data_dir: PathBuf,
}

impl LauncherArgs {
    /// Expand the flag surface into one config per replica.
    pub fn replica_configs(&self) -> anyhow::Result<Vec<ReplicaConfig>> {
        if self.num_servers == 0 {
            bail!("--num_servers must be at least 1");
        }
        let last = u16::try_from(self.num_servers - 1).ok();
        let fits = |start: u16| last.and_then(|l| start.checked_add(l)).is_some();
        if !fits(self.start_server_port) || !fits(self.start_internal_port) {
            bail!("--num_servers overflows the configured port ranges");
        }

        let hosts: Vec<String> = self
            .internal_other_servers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let starting_ports: Vec<u16> =
            parse_list(&self.internal_other_ports, "--internal_other_ports")?;
        let counts: Vec<u16> = parse_list(&self.internal_max_ports, "--internal_max_ports")?;
        if counts.len() != hosts.len() {
            bail!(
                "--internal_max_ports needs one entry per host ({} hosts, {} counts)",
                hosts.len(),
                counts.len()
            );
        }

        let peer_space = peer_space(&hosts, &starting_ports, &counts);
        Ok((0..self.num_servers)
            .map(|i| ReplicaConfig {
                id: i,
                host: self.host.clone(),
                client_port: self.start_server_port + i as u16,
                peer_port: self.start_internal_port + i as u16,
                peer_space: peer_space.clone(),
                data_dir: self.data_dir.clone(),
            })
            .collect())
    }
}

fn parse_list<T: FromStr>(raw: &str, flag: &str) -> anyhow::Result<Vec<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|tok| {
            tok.parse::<T>()
                .with_context(|| format!("{flag}: bad entry {tok:?}"))
        })
        .collect()
}

/// Every host, crossed with every starting port, each extended by that
/// host's count of consecutive ports.
fn peer_space(hosts: &[String], starting_ports: &[u16], counts: &[u16]) -> Vec<Endpoint> {
    let mut space = Vec::new();
    for (host, count) in hosts.iter().zip(counts) {
        for port in starting_ports {
            for offset in 0..*count {
                space.push(Endpoint::new(host, port.saturating_add(offset)));
            }
        }
    }
    space
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> LauncherArgs {
        let mut full = vec!["rchatd"];
        full.extend_from_slice(argv);
        LauncherArgs::try_parse_from(full).expect("flags parse")
    }

    #[test]
    fn flags_keep_their_underscore_names() {
        let parsed = args(&[
            "--num_servers",
            "3",
            "--start_server_port",
            "51000",
            "--start_internal_port",
            "61000",
            "--internal_other_servers",
            "localhost,otherhost",
            "--internal_other_ports",
            "61000,62000",
            "--internal_max_ports",
            "2,1",
        ]);
        assert_eq!(parsed.num_servers, 3);
        assert_eq!(parsed.start_server_port, 51000);
    }

    #[test]
    fn replica_ports_step_by_id() {
        let configs = args(&["--num_servers", "3"]).replica_configs().unwrap();
        assert_eq!(configs.len(), 3);
        assert_eq!(configs[0].client_port, 50000);
        assert_eq!(configs[2].client_port, 50002);
        assert_eq!(configs[1].peer_port, 60001);
    }

    #[test]
    fn peer_space_is_the_host_port_count_product() {
        let parsed = args(&[
            "--internal_other_servers",
            "hosta,hostb",
            "--internal_other_ports",
            "60000,61000",
            "--internal_max_ports",
            "2,1",
        ]);
        let space = &parsed.replica_configs().unwrap()[0].peer_space;
        let rendered: Vec<&str> = space.iter().map(Endpoint::as_str).collect();
        assert_eq!(
            rendered,
            vec![
                "hosta:60000",
                "hosta:60001",
                "hosta:61000",
                "hosta:61001",
                "hostb:60000",
                "hostb:61000",
            ]
        );
    }

    #[test]
    fn count_list_must_match_host_list() {
        let parsed = args(&[
            "--internal_other_servers",
            "hosta,hostb",
            "--internal_max_ports",
            "2",
        ]);
        assert!(parsed.replica_configs().is_err());
    }

    #[test]
    fn bad_port_entry_is_rejected() {
        let parsed = args(&["--internal_other_ports", "60000,notaport"]);
        assert!(parsed.replica_configs().is_err());
    }

    #[test]
    fn zero_replicas_is_rejected() {
        assert!(args(&["--num_servers", "0"]).replica_configs().is_err());
    }
}
