use std::path::PathBuf;

use anyhow::Context;
use tarpc::{client, tokio_serde::formats::Json};

use super::task::TaskDescriptor;

#[tarpc::service]
pub trait Rpc {
    /// Hands out the next task, or tells the caller to wait or exit.
    async fn distribute_task() -> TaskDescriptor;
    /// Registers the bytes of one partition written by a map attempt.
    async fn notify_intermediate_file(
        map_index: usize,
        reduce_index: usize,
        attempt: u32,
        name: String,
        content: Vec<u8>,
    );
    async fn notify_map_success(split: String, attempt: u32);
    async fn notify_reduce_success(reduce_index: usize);
}

/// Where the coordinator listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`
    Tcp(String),
    Unix(PathBuf),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

pub async fn connect(endpoint: &Endpoint) -> anyhow::Result<RpcClient> {
    let client = match endpoint {
        Endpoint::Tcp(addr) => {
            let mut transport =
                tarpc::serde_transport::tcp::connect(addr.as_str(), Json::default);
            transport.config_mut().max_frame_length(usize::MAX);
            let transport = transport
                .await
                .with_context(|| format!("dialing coordinator at {}", endpoint))?;
            RpcClient::new(client::Config::default(), transport).spawn()
        }
        Endpoint::Unix(path) => {
            let mut transport = tarpc::serde_transport::unix::connect(path, Json::default);
            transport.config_mut().max_frame_length(usize::MAX);
            let transport = transport
                .await
                .with_context(|| format!("dialing coordinator at {}", endpoint))?;
            RpcClient::new(client::Config::default(), transport).spawn()
        }
    };
    Ok(client)
}
