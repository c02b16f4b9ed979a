//! Map and reduce functions the binaries can run by name.

use crate::{MapFn, ReduceFn};

pub mod indexer;
pub mod wc;

#[derive(Clone, Copy)]
pub struct Application {
    pub name: &'static str,
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application").field("name", &self.name).finish()
    }
}

const APPLICATIONS: &[Application] = &[
    Application {
        name: "wc",
        map_fn: wc::map,
        reduce_fn: wc::reduce,
    },
    Application {
        name: "indexer",
        map_fn: indexer::map,
        reduce_fn: indexer::reduce,
    },
];

pub fn by_name(name: &str) -> Option<Application> {
    APPLICATIONS.iter().find(|app| app.name == name).copied()
}

/// Like [`by_name`], but the error lists the known applications.
pub fn named(name: &str) -> anyhow::Result<Application> {
    by_name(name).ok_or_else(|| {
        let known: Vec<&str> = APPLICATIONS.iter().map(|app| app.name).collect();
        anyhow::anyhow!("no application named `{}` (known: {})", name, known.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(by_name("wc").map(|app| app.name), Some("wc"));
        assert_eq!(by_name("indexer").map(|app| app.name), Some("indexer"));
        assert!(by_name("grep").is_none());
        let err = named("grep").unwrap_err().to_string();
        assert!(err.contains("wc, indexer"));
    }
}
