//! Single-process reference run, used to check distributed output.

use std::fs;

use anyhow::Context;

use crate::apps::Application;
use crate::worker::reduce_records;

/// Runs `app` over every split in this process and returns the output lines
/// sorted by key.
pub fn run(app: &Application, splits: &[String]) -> anyhow::Result<String> {
    let mut intermediate = vec![];
    for split in splits {
        let bytes = fs::read(split).with_context(|| format!("cannot read split {}", split))?;
        intermediate.extend((app.map_fn)(split, &String::from_utf8_lossy(&bytes)));
    }
    Ok(reduce_records(app.reduce_fn, intermediate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apps;

    #[test]
    fn test_sequential_word_count() {
        let dir = std::env::temp_dir().join(format!("mr-seq-{:08x}", rand::random::<u32>()));
        fs::create_dir_all(&dir).unwrap();
        let a = dir.join("a.txt");
        let b = dir.join("b.txt");
        fs::write(&a, "the quick fox").unwrap();
        fs::write(&b, "the lazy dog").unwrap();
        let splits = vec![
            a.to_string_lossy().to_string(),
            b.to_string_lossy().to_string(),
        ];

        let wc = apps::named("wc").unwrap();
        let output = run(&wc, &splits).unwrap();
        assert_eq!(output, "dog 1\nfox 1\nlazy 1\nquick 1\nthe 2\n");

        assert!(run(&wc, &[dir.join("missing").to_string_lossy().to_string()]).is_err());
        fs::remove_dir_all(dir).unwrap();
    }
}
