use futures::{future, lock::Mutex, prelude::*};
use anyhow::Context as _;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    os::unix::fs::FileTypeExt,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};
use tarpc::{
    client, context,
    server::{self, Channel},
    tokio_serde::formats::Json,
};
use tracing::{debug, info, warn};

use crate::config::ServeSettings;
use crate::rpc::{Endpoint, Rpc, RpcClient};
use crate::task::{IntermediateFile, Phase, Task, TaskDescriptor, TaskKind, TaskStatus};

/// Partitions of one map attempt, keyed by reduce index.
type Buckets = BTreeMap<usize, IntermediateFile>;

/// The job: every task, the current phase and the registered map output.
#[derive(Debug)]
pub struct Coordinator {
    n_reduce: usize,
    timeout: Duration,
    phase: Phase,
    map_tasks: Vec<Task>,
    reduce_tasks: Vec<Task>,
    split_index: HashMap<String, usize>,
    // Registrations of attempts that have not reported success yet.
    staged: HashMap<(usize, u32), Buckets>,
    // Output of the accepted attempt of each completed map task.
    committed: HashMap<usize, Buckets>,
}

impl Coordinator {
    pub fn new(files: Vec<String>, n_reduce: usize, timeout: Duration) -> anyhow::Result<Self> {
        anyhow::ensure!(n_reduce > 0, "the number of reduce tasks must be positive");
        let mut seen = HashSet::new();
        for file in &files {
            anyhow::ensure!(seen.insert(file.as_str()), "duplicate input split {}", file);
        }

        let split_index = files
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), i))
            .collect();
        let map_tasks: Vec<Task> = files
            .into_iter()
            .enumerate()
            .map(|(i, f)| Task::new_map(i, f))
            .collect();
        let reduce_tasks = (0..n_reduce).map(Task::new_reduce).collect();
        let phase = if map_tasks.is_empty() {
            Phase::Reducing
        } else {
            Phase::Mapping
        };

        Ok(Coordinator {
            n_reduce,
            timeout,
            phase,
            map_tasks,
            reduce_tasks,
            split_index,
            staged: HashMap::new(),
            committed: HashMap::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn n_reduce(&self) -> usize {
        self.n_reduce
    }

    pub fn task(&self, kind: TaskKind, index: usize) -> Option<&Task> {
        match kind {
            TaskKind::Map => self.map_tasks.get(index),
            TaskKind::Reduce => self.reduce_tasks.get(index),
        }
    }

    pub fn distribute_task(&mut self) -> TaskDescriptor {
        self.distribute_task_at(Instant::now())
    }

    /// Assigns the lowest-indexed task of the current phase that is idle or
    /// has been held for longer than the timeout.
    pub fn distribute_task_at(&mut self, now: Instant) -> TaskDescriptor {
        let timeout = self.timeout;
        let tasks = match self.phase {
            Phase::Mapping => &mut self.map_tasks,
            Phase::Reducing => &mut self.reduce_tasks,
            Phase::Done => return TaskDescriptor::Exit,
        };
        let Some(task) = tasks.iter_mut().find(|t| t.is_assignable(now, timeout)) else {
            return TaskDescriptor::Wait;
        };

        if task.get_status() == TaskStatus::InProgress {
            warn!(
                "{:?} task {} timed out after attempt {}, reassigning",
                task.get_kind(),
                task.get_index(),
                task.get_attempts()
            );
        }
        let attempt = task.assign(now);
        let kind = task.get_kind();
        let index = task.get_index();
        let split = task.get_split().map(str::to_string);
        debug!("assigned {:?} task {} attempt {}", kind, index, attempt);

        match kind {
            TaskKind::Map => TaskDescriptor::Map {
                index,
                attempt,
                split: split.unwrap_or_default(),
                n_reduce: self.n_reduce,
            },
            TaskKind::Reduce => TaskDescriptor::Reduce {
                index,
                n_reduce: self.n_reduce,
                files: self.reduce_input(index),
            },
        }
    }

    fn reduce_input(&self, reduce_index: usize) -> Vec<IntermediateFile> {
        (0..self.map_tasks.len())
            .filter_map(|m| self.committed.get(&m)?.get(&reduce_index).cloned())
            .collect()
    }

    /// Stages one partition of a map attempt. Re-registering the same
    /// partition within an attempt replaces it.
    pub fn notify_intermediate_file(&mut self, file: IntermediateFile, attempt: u32) {
        let Some(task) = self.map_tasks.get(file.map_index) else {
            warn!("intermediate file {} names unknown map task {}", file.name, file.map_index);
            return;
        };
        if task.is_completed() {
            debug!(
                "dropping intermediate file {} from attempt {}: map task {} already completed",
                file.name, attempt, file.map_index
            );
            return;
        }
        if file.reduce_index >= self.n_reduce {
            warn!("intermediate file {} names unknown partition {}", file.name, file.reduce_index);
            return;
        }
        self.staged
            .entry((file.map_index, attempt))
            .or_default()
            .insert(file.reduce_index, file);
    }

    /// Accepts the first success report of a map task and makes that attempt's
    /// partitions the ones reduce tasks will read. Later reports are no-ops.
    pub fn notify_map_success(&mut self, split: &str, attempt: u32) {
        let Some(&index) = self.split_index.get(split) else {
            warn!("success reported for unknown split {}", split);
            return;
        };
        if !self.map_tasks[index].complete() {
            debug!("ignoring duplicate success for map task {} attempt {}", index, attempt);
            return;
        }

        let buckets = self.staged.remove(&(index, attempt)).unwrap_or_default();
        if buckets.len() < self.n_reduce {
            warn!(
                "map task {} attempt {} registered {} of {} partitions",
                index,
                attempt,
                buckets.len(),
                self.n_reduce
            );
        }
        self.committed.insert(index, buckets);
        self.staged.retain(|(m, _), _| *m != index);
        info!("map task {} ({}) completed by attempt {}", index, split, attempt);

        if self.phase == Phase::Mapping && self.map_tasks.iter().all(Task::is_completed) {
            info!("all {} map tasks completed, starting reduce phase", self.map_tasks.len());
            self.phase = Phase::Reducing;
        }
    }

    pub fn notify_reduce_success(&mut self, reduce_index: usize) {
        let Some(task) = self.reduce_tasks.get_mut(reduce_index) else {
            warn!("success reported for unknown reduce task {}", reduce_index);
            return;
        };
        if !task.complete() {
            debug!("ignoring duplicate success for reduce task {}", reduce_index);
            return;
        }
        info!("reduce task {} completed", reduce_index);

        if self.phase == Phase::Reducing && self.reduce_tasks.iter().all(Task::is_completed) {
            info!("all {} reduce tasks completed, job done", self.reduce_tasks.len());
            self.phase = Phase::Done;
        }
    }
}

#[derive(Clone)]
pub struct CoordinatorServer {
    coordinator: Arc<Mutex<Coordinator>>,
    peer: String,
}

impl CoordinatorServer {
    pub fn new(coordinator: Arc<Mutex<Coordinator>>, peer: impl Into<String>) -> Self {
        CoordinatorServer {
            coordinator,
            peer: peer.into(),
        }
    }
}

impl Rpc for CoordinatorServer {
    async fn distribute_task(self, _: context::Context) -> TaskDescriptor {
        let mut coordinator = self.coordinator.lock().await;
        let task = coordinator.distribute_task();
        debug!("{} -> {:?}", self.peer, task.kind());
        task
    }

    async fn notify_intermediate_file(
        self,
        _: context::Context,
        map_index: usize,
        reduce_index: usize,
        attempt: u32,
        name: String,
        content: Vec<u8>,
    ) {
        let mut coordinator = self.coordinator.lock().await;
        coordinator.notify_intermediate_file(
            IntermediateFile {
                map_index,
                reduce_index,
                name,
                content,
            },
            attempt,
        );
    }

    async fn notify_map_success(self, _: context::Context, split: String, attempt: u32) {
        let mut coordinator = self.coordinator.lock().await;
        coordinator.notify_map_success(&split, attempt);
    }

    async fn notify_reduce_success(self, _: context::Context, reduce_index: usize) {
        let mut coordinator = self.coordinator.lock().await;
        coordinator.notify_reduce_success(reduce_index);
    }
}

async fn spawn(fut: impl Future<Output = ()> + Send + 'static) {
    tokio::spawn(fut);
}

/// Opens an in-memory connection to a coordinator served on this runtime.
pub fn connect_in_process(coordinator: &Arc<Mutex<Coordinator>>) -> RpcClient {
    let (client_transport, server_transport) = tarpc::transport::channel::unbounded();
    let server = CoordinatorServer::new(Arc::clone(coordinator), "in-process");
    tokio::spawn(
        server::BaseChannel::with_defaults(server_transport)
            .execute(server.serve())
            .for_each(spawn),
    );
    RpcClient::new(client::Config::default(), client_transport).spawn()
}

// Serves every accepted connection until the listener ends. The listener types
// of the two transports differ, so the body is shared through a macro.
macro_rules! serve_listener {
    ($listener:expr, $coordinator:expr, $max_channels:expr, |$channel:ident| $peer:expr) => {{
        let mut listener = $listener;
        listener.config_mut().max_frame_length(usize::MAX);
        listener
            // Ignore accept errors.
            .filter_map(|r| future::ready(r.ok()))
            .map(server::BaseChannel::with_defaults)
            .map(|$channel| {
                let peer: String = $peer;
                let server = CoordinatorServer::new(Arc::clone(&$coordinator), peer);
                $channel.execute(server.serve()).for_each(spawn)
            })
            .buffer_unordered($max_channels)
            .for_each(|_| async {})
            .await;
    }};
}

async fn serve(
    endpoint: Endpoint,
    coordinator: Arc<Mutex<Coordinator>>,
    max_channels: usize,
) -> anyhow::Result<()> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let listener =
                tarpc::serde_transport::tcp::listen(addr.as_str(), Json::default).await?;
            info!("coordinator listening on {}", listener.local_addr());
            serve_listener!(listener, coordinator, max_channels, |channel| channel
                .transport()
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown".to_string()));
        }
        Endpoint::Unix(path) => {
            remove_stale_socket(&path)?;
            let listener = tarpc::serde_transport::unix::listen(&path, Json::default).await?;
            info!("coordinator listening on {}", path.display());
            serve_listener!(listener, coordinator, max_channels, |channel| format!(
                "unix:{}",
                path.display()
            ));
        }
    }
    Ok(())
}

/// Removes a socket left behind by an earlier coordinator. Anything else at
/// `path` is left alone and is an error.
fn remove_stale_socket(path: &Path) -> anyhow::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            std::fs::remove_file(path)
                .with_context(|| format!("cannot remove stale socket {}", path.display()))?;
            Ok(())
        }
        Ok(_) => anyhow::bail!("{} exists and is not a socket", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("cannot inspect {}", path.display())),
    }
}

async fn wait_until_done(coordinator: &Mutex<Coordinator>, poll: Duration) {
    while !coordinator.lock().await.done() {
        tokio::time::sleep(poll).await;
    }
}

/// Serves the job on `endpoint` and returns once every reduce task is done.
pub async fn run(
    coordinator: Coordinator,
    endpoint: Endpoint,
    settings: ServeSettings,
) -> anyhow::Result<()> {
    let coordinator = Arc::new(Mutex::new(coordinator));
    let mut server = tokio::spawn(serve(
        endpoint.clone(),
        Arc::clone(&coordinator),
        settings.max_channels,
    ));

    tokio::select! {
        res = &mut server => return res?,
        _ = wait_until_done(&coordinator, settings.done_poll) => {},
    }

    // Keep answering so that polling workers are told to exit.
    tokio::time::sleep(settings.linger).await;
    server.abort();
    if let Endpoint::Unix(path) = &endpoint {
        let _ = std::fs::remove_file(path);
    }
    info!("coordinator shut down");
    Ok(())
}
