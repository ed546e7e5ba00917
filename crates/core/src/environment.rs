// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container environment assembly

use std::collections::BTreeMap;

/// Layered environment: later additions override earlier ones on key collision
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Merge a whole source over the current contents
    pub fn add_all<I, K, V>(&mut self, source: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in source {
            self.add(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// `KEY=VALUE` pairs sorted by key
    pub fn to_vec(&self) -> Vec<String> {
        self.vars.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn later_sources_override() {
        let mut env = Environment::new();
        env.add_all([("A", "1"), ("B", "1")]);
        let secrets: HashMap<String, String> =
            [("B".to_string(), "secret".to_string())].into_iter().collect();
        env.add_all(secrets);

        assert_eq!(env.get("A"), Some("1"));
        assert_eq!(env.get("B"), Some("secret"));
        assert_eq!(env.to_vec(), vec!["A=1", "B=secret"]);
    }

    #[test]
    fn empty_environment() {
        let env = Environment::new();
        assert!(env.is_empty());
        assert!(env.to_vec().is_empty());
    }
}
