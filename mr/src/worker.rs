use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use tarpc::context;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::codec;
use crate::config::WorkerSettings;
use crate::partition::{group_by_key, partition, sort_by_key};
use crate::rpc::RpcClient;
use crate::task::{IntermediateFile, TaskDescriptor};
use crate::{KeyValue, MapFn, ReduceFn};

/// Name of the file holding partition `reduce_index` of map task `map_index`.
pub fn intermediate_name(map_index: usize, reduce_index: usize) -> String {
    format!("mr-{}-{}", map_index, reduce_index)
}

/// Name of the output file of reduce task `reduce_index`.
pub fn output_name(reduce_index: usize) -> String {
    format!("mr-out-{}", reduce_index)
}

/// Runs tasks handed out by the coordinator until it says the job is done.
pub struct Worker {
    client: RpcClient,
    map_fn: MapFn,
    reduce_fn: ReduceFn,
    settings: WorkerSettings,
}

enum State {
    Requesting,
    Executing(TaskDescriptor),
    Waiting,
    Exiting,
}

/// Delay between polls while the coordinator has nothing to hand out.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Backoff {
            base,
            max: max.max(base),
            current: base,
        }
    }

    /// The next delay: the current step plus up to half of it again as
    /// jitter, never more than the cap. Each call doubles the step until it
    /// reaches the cap.
    pub fn next_delay(&mut self) -> Duration {
        let step = self.current;
        self.current = (self.current * 2).min(self.max);
        let jitter_ms = (step.as_millis() / 2) as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        (step + Duration::from_millis(jitter)).min(self.max)
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

impl Worker {
    pub fn new(
        client: RpcClient,
        map_fn: MapFn,
        reduce_fn: ReduceFn,
        settings: WorkerSettings,
    ) -> Self {
        Worker {
            client,
            map_fn,
            reduce_fn,
            settings,
        }
    }

    /// Returns `Ok` once told to exit. Any RPC or file error ends the loop;
    /// the coordinator hands the abandoned task to someone else.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut backoff = Backoff::new(self.settings.backoff_base, self.settings.backoff_max);
        let mut state = State::Requesting;
        loop {
            state = match state {
                State::Requesting => {
                    match self.client.distribute_task(context::current()).await? {
                        TaskDescriptor::Wait => State::Waiting,
                        TaskDescriptor::Exit => State::Exiting,
                        task => State::Executing(task),
                    }
                }
                State::Executing(task) => {
                    self.execute(task).await?;
                    backoff.reset();
                    State::Requesting
                }
                State::Waiting => {
                    let delay = backoff.next_delay();
                    debug!("no task available, retrying in {:?}", delay);
                    sleep(delay).await;
                    State::Requesting
                }
                State::Exiting => {
                    info!("job done, worker exiting");
                    return Ok(());
                }
            };
        }
    }

    pub async fn execute(&self, task: TaskDescriptor) -> anyhow::Result<()> {
        match task {
            TaskDescriptor::Map {
                index,
                attempt,
                split,
                n_reduce,
            } => self.do_map(index, attempt, split, n_reduce).await,
            TaskDescriptor::Reduce { index, files, .. } => self.do_reduce(index, &files).await,
            TaskDescriptor::Wait | TaskDescriptor::Exit => Ok(()),
        }
    }

    async fn do_map(
        &self,
        index: usize,
        attempt: u32,
        split: String,
        n_reduce: usize,
    ) -> anyhow::Result<()> {
        info!("map task {} attempt {} on {}", index, attempt, split);
        let bytes = fs::read(&split).with_context(|| format!("cannot read split {}", split))?;
        let kva = (self.map_fn)(&split, &String::from_utf8_lossy(&bytes));

        for (reduce_index, bucket) in partition(kva, n_reduce).into_iter().enumerate() {
            let name = intermediate_name(index, reduce_index);
            let content = codec::encode(&bucket)?;
            replace_file(&self.settings.work_dir.join(&name), &content)?;
            self.client
                .notify_intermediate_file(
                    context::current(),
                    index,
                    reduce_index,
                    attempt,
                    name,
                    content,
                )
                .await?;
        }
        self.client
            .notify_map_success(context::current(), split, attempt)
            .await?;
        Ok(())
    }

    async fn do_reduce(&self, index: usize, files: &[IntermediateFile]) -> anyhow::Result<()> {
        info!("reduce task {} over {} partitions", index, files.len());
        let intermediate = files.iter().flat_map(|f| codec::decode(&f.content)).collect();
        let output = reduce_records(self.reduce_fn, intermediate);
        replace_file(&self.settings.work_dir.join(output_name(index)), output.as_bytes())?;
        self.client
            .notify_reduce_success(context::current(), index)
            .await?;
        Ok(())
    }
}

/// Sorts and groups `records` and renders one `<key> <result>` line per key.
pub fn reduce_records(reduce_fn: ReduceFn, mut records: Vec<KeyValue>) -> String {
    sort_by_key(&mut records);
    let mut output = String::new();
    for (key, values) in group_by_key(records) {
        let result = reduce_fn(&key, &values);
        output.push_str(&format!("{} {}\n", key, result));
    }
    output
}

/// Writes `contents` to a temporary sibling and renames it over `path`, so a
/// reader never sees a half-written file.
fn replace_file(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
    }
    let file_name = path
        .file_name()
        .with_context(|| format!("{} is not a file path", path.display()))?;
    let tmp = path.with_file_name(format!(
        ".{}.{:08x}",
        file_name.to_string_lossy(),
        rand::random::<u32>()
    ));
    fs::write(&tmp, contents).with_context(|| format!("cannot write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("cannot replace {}", path.display()))?;
    Ok(())
}
