// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `${{ namespace.name }}` interpolation for job fields that reference secrets

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\{\s*([a-zA-Z_][a-zA-Z0-9_-]*)\.([a-zA-Z0-9_.-]+)\s*\}\}")
        .expect("constant regex pattern is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InterpolateError {
    #[error("unknown namespace: {0}")]
    UnknownNamespace(String),
    #[error("unknown variable: {namespace}.{name}")]
    UnknownVariable { namespace: String, name: String },
    #[error("unterminated placeholder in: {0}")]
    Unterminated(String),
}

/// Resolves placeholders against named groups of variables
#[derive(Debug, Clone, Default)]
pub struct VariablesInterpolator {
    namespaces: HashMap<String, HashMap<String, String>>,
}

impl VariablesInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or extend) a namespace such as `secrets`
    pub fn add(&mut self, namespace: &str, values: HashMap<String, String>) {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .extend(values);
    }

    /// Replace every placeholder; the first unresolved one is an error
    pub fn interpolate(&self, template: &str) -> Result<String, InterpolateError> {
        let mut failure = None;
        let result = VAR_PATTERN.replace_all(template, |caps: &regex::Captures| {
            let namespace = &caps[1];
            let name = &caps[2];
            match self.lookup(namespace, name) {
                Ok(value) => value.to_string(),
                Err(e) => {
                    failure.get_or_insert(e);
                    String::new()
                }
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        if result.contains("${{") {
            return Err(InterpolateError::Unterminated(template.to_string()));
        }
        Ok(result.into_owned())
    }

    fn lookup(&self, namespace: &str, name: &str) -> Result<&str, InterpolateError> {
        let vars = self
            .namespaces
            .get(namespace)
            .ok_or_else(|| InterpolateError::UnknownNamespace(namespace.to_string()))?;
        vars.get(name)
            .map(String::as_str)
            .ok_or_else(|| InterpolateError::UnknownVariable {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
#[path = "interpolate_tests.rs"]
mod tests;
