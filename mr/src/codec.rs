//! Encoding of intermediate partitions: one JSON object per line.

use std::io::Write;

use crate::KeyValue;

pub fn encode(records: &[KeyValue]) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    for kv in records {
        serde_json::to_writer(&mut buf, kv)?;
        buf.write_all(b"\n")?;
    }
    Ok(buf)
}

/// Decodes records until the input ends or a record fails to parse.
///
/// A partition left behind by a crashed attempt may be cut short, so a bad
/// record ends the stream instead of failing the whole read.
pub fn decode(bytes: &[u8]) -> Vec<KeyValue> {
    let mut records = vec![];
    for record in serde_json::Deserializer::from_slice(bytes).into_iter::<KeyValue>() {
        match record {
            Ok(kv) => records.push(kv),
            Err(e) => {
                tracing::debug!("stopped decoding intermediate records: {}", e);
                break;
            }
        }
    }
    records
}
