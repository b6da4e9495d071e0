use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use strand_core::error::Result;

/// Key under which `set_state` nodes store their variables.
pub const STATE_KEY: &str = "state";

/// Split a dotted path into segments. `a.b[0]` and `a.b.0` are equivalent.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split(|c| c == '.' || c == '[' || c == ']')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn descend<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Follow a dotted path into a JSON value. Numeric segments index arrays.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    split_path(path)
        .into_iter()
        .try_fold(root, |current, segment| descend(current, segment))
}

/// Run-scoped map from node id to that node's output record.
///
/// The `state` key additionally holds variables written by `set_state`
/// nodes. Values are JSON so any node can read any other node's output
/// through a dotted path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    data: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Read JSON object files in order and merge them; later files win on
    /// conflicting top-level keys.
    pub fn load(paths: &[impl AsRef<Path>]) -> Result<Self> {
        let mut context = Self::new();
        for path in paths {
            let content = std::fs::read_to_string(path)?;
            let map: Map<String, Value> = serde_json::from_str(&content)?;
            context.merge(&Self::from_map(map));
        }
        Ok(context)
    }

    /// Wrap a JSON value; anything but an object yields an empty context.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Self { data },
            _ => Self::default(),
        }
    }

    /// Top-level entry, usually a node's output record.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let segments = split_path(path);
        let (first, rest) = segments.split_first()?;
        rest.iter()
            .try_fold(self.data.get(*first)?, |current, segment| descend(current, segment))
    }

    /// Replace a top-level entry.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Write through a dotted path, creating intermediate objects and
    /// replacing non-object values in the way.
    pub fn set_path(&mut self, path: &str, value: Value) {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.data;
        for segment in parents {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Some(map) = slot.as_object_mut() else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value);
    }

    /// Merge another context into this one (overwrites on conflict).
    pub fn merge(&mut self, other: &ExecutionContext) {
        for (k, v) in &other.data {
            self.data.insert(k.clone(), v.clone());
        }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Execution context shared by every branch of one run.
///
/// The lock is only held for synchronous reads and writes, never across an
/// await. Concurrent writers to one key are last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<Mutex<ExecutionContext>>,
}

impl SharedContext {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExecutionContext> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read<R>(&self, f: impl FnOnce(&ExecutionContext) -> R) -> R {
        f(&self.lock())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut ExecutionContext) -> R) -> R {
        f(&mut self.lock())
    }

    /// Store a node's output record.
    pub fn set_output(&self, node_id: &str, output: Value) {
        self.write(|ctx| ctx.set(node_id, output));
    }

    pub fn snapshot(&self) -> ExecutionContext {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("a.b[0].c"), vec!["a", "b", "0", "c"]);
        assert_eq!(split_path(" a . b "), vec!["a", "b"]);
        assert!(split_path("").is_empty());
    }

    #[test]
    fn test_lookup_path() {
        let root = json!({"a": {"b": [10, {"c": "deep"}]}});
        assert_eq!(lookup_path(&root, "a.b.0"), Some(&json!(10)));
        assert_eq!(lookup_path(&root, "a.b[1].c"), Some(&json!("deep")));
        assert_eq!(lookup_path(&root, "a.x"), None);
        assert_eq!(lookup_path(&root, "a.b.9"), None);
    }

    #[test]
    fn test_set_path_creates_objects() {
        let mut ctx = ExecutionContext::new();
        ctx.set_path("state.count", json!(1));
        ctx.set_path("state.user.name", json!("ada"));
        assert_eq!(ctx.get_path("state.count"), Some(&json!(1)));
        assert_eq!(ctx.get_path("state.user.name"), Some(&json!("ada")));

        // scalar in the way is replaced
        ctx.set_path("state.count.inner", json!(true));
        assert_eq!(ctx.get_path("state.count.inner"), Some(&json!(true)));
    }

    #[test]
    fn test_merge_overwrites() {
        let mut a = ExecutionContext::from_value(json!({"x": 1, "y": 2}));
        let b = ExecutionContext::from_value(json!({"y": 3, "z": 4}));
        a.merge(&b);
        assert_eq!(a.into_value(), json!({"x": 1, "y": 3, "z": 4}));
    }

    #[test]
    fn test_load_merges_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.json");
        let local = dir.path().join("local.json");
        std::fs::write(&base, r#"{"input": {"a": 1}, "env": "dev"}"#).unwrap();
        std::fs::write(&local, r#"{"env": "prod"}"#).unwrap();

        let ctx = ExecutionContext::load(&[&base, &local]).unwrap();
        assert_eq!(ctx.into_value(), json!({"input": {"a": 1}, "env": "prod"}));

        let empty: [&Path; 0] = [];
        assert!(ExecutionContext::load(&empty).unwrap().is_empty());

        let list = dir.path().join("list.json");
        std::fs::write(&list, "[1, 2]").unwrap();
        assert!(ExecutionContext::load(&[&base, &list]).is_err());
        assert!(ExecutionContext::load(&[dir.path().join("missing.json")]).is_err());
    }

    #[test]
    fn test_non_object_value_is_empty() {
        assert!(ExecutionContext::from_value(json!([1, 2])).is_empty());
    }

    #[test]
    fn test_shared_context() {
        let shared = SharedContext::new(ExecutionContext::new());
        let other = shared.clone();
        other.set_output("n1", json!({"content": "hi"}));
        assert_eq!(
            shared.read(|ctx| ctx.get_path("n1.content").cloned()),
            Some(json!("hi"))
        );
        assert_eq!(shared.snapshot().into_value(), json!({"n1": {"content": "hi"}}));
    }
}
