// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Explicit, constructor-injected replacement for a process-wide mutable
//! function table. The orchestrator never reads this registry — only
//! in-process executors (e.g. [`super::LocalExecutor`]) consult it to
//! actually run a registered function.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type RegisteredFn = Arc<dyn Fn(serde_json::Value) -> BoxFuture<Result<serde_json::Value, String>> + Send + Sync>;

/// A capability table of callable functions, built once at executor
/// construction time and passed in — never assembled via global
/// registration side effects.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, RegisteredFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
    {
        self.functions.insert(name.into(), Arc::new(move |args| Box::pin(f(args))));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub async fn invoke(&self, name: &str, args: serde_json::Value) -> Result<serde_json::Value, String> {
        match self.functions.get(name) {
            Some(f) => f(args).await,
            None => Err(format!("function '{name}' is not registered")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registered_function_is_invoked_with_its_args() {
        let registry = FunctionRegistry::new().register("double", |args: serde_json::Value| async move {
            let n = args.as_i64().ok_or("expected an integer")?;
            Ok(serde_json::json!(n * 2))
        });
        let result = registry.invoke("double", serde_json::json!(21)).await.unwrap();
        assert_eq!(result, serde_json::json!(42));
    }

    #[tokio::test]
    async fn unregistered_function_errors() {
        let registry = FunctionRegistry::new();
        assert!(registry.invoke("missing", serde_json::json!(null)).await.is_err());
        assert!(!registry.contains("missing"));
    }
}
