use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use relayrpc_codec::{Closure, Value};

/// Named functions a side exports to its peer.
///
/// Cheap to clone; built once with [`with_function`](Self::with_function)
/// and shared by every connection that serves it.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: Arc<HashMap<String, Closure>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `f` under `name`, replacing any previous export.
    pub fn with_function<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Value>> + Send + 'static,
    {
        self.with_closure(name, Closure::new(f))
    }

    pub fn with_closure(mut self, name: impl Into<String>, closure: Closure) -> Self {
        Arc::make_mut(&mut self.functions).insert(name.into(), closure);
        self
    }

    pub fn get(&self, name: &str) -> Option<Closure> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Exported names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_and_call() {
        let table = FunctionTable::new()
            .with_function("echo", |args| async move {
                Ok(args.into_iter().next().unwrap_or(Value::Undefined))
            })
            .with_function("fail", |_| async { Err(Value::from("nope")) });

        assert_eq!(table.names(), vec!["echo", "fail"]);
        assert!(table.contains("echo"));
        assert!(table.get("missing").is_none());

        let echo = table.get("echo").unwrap();
        assert_eq!(echo.call(vec!["hi".into()]).await, Ok(Value::from("hi")));
        let fail = table.get("fail").unwrap();
        assert_eq!(fail.call(vec![]).await, Err(Value::from("nope")));
    }

    #[test]
    fn clones_share_until_extended() {
        let base = FunctionTable::new().with_function("a", |_| async { Ok(Value::Null) });
        let extended = base.clone().with_function("b", |_| async { Ok(Value::Null) });
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
    }
}
