//! A fault-tolerant MapReduce coordinator and worker.
//!
//! One [`coordinator::Coordinator`] hands out map tasks over input splits and,
//! once every map output is registered, reduce tasks over the hash partitions.
//! Any number of [`worker::Worker`]s poll it over RPC, run the user callbacks
//! and report back. Tasks that are not reported within the timeout are handed
//! to the next worker that asks.

pub mod apps;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod partition;
pub mod rpc;
pub mod sequential;
pub mod task;
pub mod telemetry;
pub mod worker;

/// A single key-value pair emitted by a map function.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Map callback: `(split name, split content)` to emitted pairs.
pub type MapFn = fn(&str, &str) -> Vec<KeyValue>;

/// Reduce callback: `(key, every value emitted for it)` to one output value.
pub type ReduceFn = fn(&str, &[String]) -> String;
