//! Command line and environment configuration for the coordinator and worker.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::rpc::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Network {
    Tcp,
    Unix,
}

/// How to reach the coordinator. Both sides read the same variables.
#[derive(clap::Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Transport between workers and the coordinator
    #[arg(long, env = "NETWORK", value_enum, default_value_t = Network::Unix)]
    pub network: Network,
    /// Coordinator address for the tcp transport
    #[arg(long, env = "MASTER_IP", default_value = "127.0.0.1")]
    pub master_ip: String,
    /// Coordinator port for the tcp transport
    #[arg(long, env = "MASTER_PORT", default_value_t = 50051)]
    pub master_port: u16,
    /// Socket path for the unix transport
    #[arg(long, env = "MR_SOCKET")]
    pub socket: Option<PathBuf>,
}

impl EndpointArgs {
    pub fn endpoint(&self) -> Endpoint {
        match self.network {
            Network::Tcp if self.master_ip.contains(':') => {
                Endpoint::Tcp(format!("[{}]:{}", self.master_ip, self.master_port))
            }
            Network::Tcp => Endpoint::Tcp(format!("{}:{}", self.master_ip, self.master_port)),
            Network::Unix => Endpoint::Unix(
                self.socket
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("mr-coordinator.sock")),
            ),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = "MapReduce coordinator", long_about = None)]
pub struct CoordinatorArgs {
    /// Input splits, one map task each
    #[arg(required = true)]
    pub files: Vec<String>,
    /// Number of reduce partitions
    #[arg(short = 'r', long, default_value_t = 10)]
    pub n_reduce: usize,
    /// Milliseconds before an unreported task is handed to another worker
    #[arg(short = 't', long, default_value_t = 10_000)]
    pub task_timeout_ms: u64,
    /// Milliseconds to keep answering `exit` after the job is done. Keep it
    /// above the workers' longest backoff delay.
    #[arg(long, default_value_t = 3_000)]
    pub linger_ms: u64,
    /// Maximum number of concurrently served worker connections
    #[arg(long, default_value_t = 64)]
    pub max_channels: usize,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

impl CoordinatorArgs {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn serve_settings(&self) -> ServeSettings {
        ServeSettings {
            linger: Duration::from_millis(self.linger_ms),
            max_channels: self.max_channels.max(1),
            ..ServeSettings::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServeSettings {
    pub linger: Duration,
    pub max_channels: usize,
    /// How often the server checks whether the job is done.
    pub done_poll: Duration,
}

impl Default for ServeSettings {
    fn default() -> Self {
        ServeSettings {
            linger: Duration::from_secs(3),
            max_channels: 64,
            done_poll: Duration::from_millis(200),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = "MapReduce worker", long_about = None)]
pub struct WorkerArgs {
    /// Application to run (wc, indexer)
    #[arg(short, long, default_value = "wc")]
    pub app: String,
    /// Directory for intermediate and output files
    #[arg(short = 'd', long, default_value = ".")]
    pub work_dir: PathBuf,
    /// First delay after a `wait` reply, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub backoff_base_ms: u64,
    /// Longest delay between polls while waiting, in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub backoff_max_ms: u64,
    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

impl WorkerArgs {
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            work_dir: self.work_dir.clone(),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms.max(self.backoff_base_ms)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub work_dir: PathBuf,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            work_dir: PathBuf::from("."),
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_args() {
        let args = CoordinatorArgs::try_parse_from([
            "server",
            "-r",
            "3",
            "--task-timeout-ms",
            "250",
            "--network",
            "tcp",
            "--master-port",
            "6000",
            "pg-1.txt",
            "pg-2.txt",
        ])
        .unwrap();
        assert_eq!(args.files, vec!["pg-1.txt", "pg-2.txt"]);
        assert_eq!(args.n_reduce, 3);
        assert_eq!(args.task_timeout(), Duration::from_millis(250));
        assert_eq!(
            args.endpoint.endpoint(),
            Endpoint::Tcp("127.0.0.1:6000".to_string())
        );
    }

    #[test]
    fn test_coordinator_requires_files() {
        assert!(CoordinatorArgs::try_parse_from(["server"]).is_err());
    }

    #[test]
    fn test_unix_endpoint() {
        let args = WorkerArgs::try_parse_from([
            "client",
            "--network",
            "unix",
            "--socket",
            "/tmp/x.sock",
        ])
        .unwrap();
        assert_eq!(args.app, "wc");
        assert_eq!(
            args.endpoint.endpoint(),
            Endpoint::Unix(PathBuf::from("/tmp/x.sock"))
        );
    }

    #[test]
    fn test_ipv6_endpoint() {
        let args = WorkerArgs::try_parse_from([
            "client",
            "--network",
            "tcp",
            "--master-ip",
            "::1",
        ])
        .unwrap();
        assert_eq!(
            args.endpoint.endpoint(),
            Endpoint::Tcp("[::1]:50051".to_string())
        );
    }

    #[test]
    fn test_default_linger_outlasts_worker_backoff() {
        assert!(ServeSettings::default().linger > WorkerSettings::default().backoff_max);
        let server = CoordinatorArgs::try_parse_from(["server", "pg-1.txt"]).unwrap();
        let worker = WorkerArgs::try_parse_from(["client"]).unwrap();
        assert!(server.serve_settings().linger > worker.worker_settings().backoff_max);
    }

    #[test]
    fn test_worker_backoff_cap_not_below_base() {
        let args = WorkerArgs::try_parse_from([
            "client",
            "--backoff-base-ms",
            "500",
            "--backoff-max-ms",
            "10",
        ])
        .unwrap();
        let settings = args.worker_settings();
        assert_eq!(settings.backoff_max, Duration::from_millis(500));
    }
}
