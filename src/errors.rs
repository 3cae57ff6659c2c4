use std::fmt;

use thiserror::Error;

use crate::container::{DisposalFailure, ServiceKey};

/// Error type produced by factories and lifecycle hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used across the container API.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Ordered list of keys that led to a failure, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyChain(pub Vec<ServiceKey>);

impl KeyChain {
    pub fn keys(&self) -> &[ServiceKey] {
        &self.0
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.0.contains(key)
    }
}

impl fmt::Display for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

impl From<Vec<ServiceKey>> for KeyChain {
    fn from(keys: Vec<ServiceKey>) -> Self {
        Self(keys)
    }
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Service '{key}' is not registered (chain: {chain}){}", available_hint(.available))]
    NotRegistered {
        key: ServiceKey,
        chain: KeyChain,
        available: Vec<String>,
    },

    /// `path` runs from the first occurrence of the repeated key back to the repeat.
    #[error("Circular dependency detected: {path}")]
    CircularDependency { path: KeyChain },

    #[error("Cannot resolve parameter '{parameter}' ({dependency}) of '{requester}' (chain: {chain})")]
    MissingParameter {
        requester: ServiceKey,
        parameter: String,
        dependency: ServiceKey,
        chain: KeyChain,
    },

    #[error("No active scope named '{scope}' for scoped service '{key}' (chain: {chain})")]
    NoActiveScope {
        key: ServiceKey,
        scope: String,
        chain: KeyChain,
    },

    #[error("Failed to construct '{key}' (chain: {chain}): {source}")]
    ConstructionFailed {
        key: ServiceKey,
        chain: KeyChain,
        #[source]
        source: BoxError,
    },

    #[error("Disposal of scope '{scope}' failed for {} instance(s): {}", .failures.len(), describe_failures(.failures))]
    DisposalFailed {
        scope: String,
        failures: Vec<DisposalFailure>,
    },

    #[error("Service '{key}' requires an asynchronous producer and cannot be resolved synchronously (chain: {chain})")]
    SuspensionRequired { key: ServiceKey, chain: KeyChain },

    #[error("Scope '{scope}' error during '{operation}': {reason}")]
    ScopeError {
        scope: String,
        operation: String,
        reason: String,
    },

    #[error("Type cast failed: expected '{expected}' in {context}")]
    TypeCastFailed {
        expected: &'static str,
        context: String,
    },

    #[error("Container has been disposed")]
    ContainerDisposed,
}

impl ContainerError {
    /// The key the failing operation was working on, when there is one.
    pub fn key(&self) -> Option<&ServiceKey> {
        match self {
            ContainerError::NotRegistered { key, .. }
            | ContainerError::NoActiveScope { key, .. }
            | ContainerError::ConstructionFailed { key, .. }
            | ContainerError::SuspensionRequired { key, .. } => Some(key),
            ContainerError::MissingParameter { requester, .. } => Some(requester),
            ContainerError::CircularDependency { path } => path.keys().first(),
            _ => None,
        }
    }

    /// Chain of keys leading to the failure.
    pub fn chain(&self) -> Option<&KeyChain> {
        match self {
            ContainerError::NotRegistered { chain, .. }
            | ContainerError::MissingParameter { chain, .. }
            | ContainerError::NoActiveScope { chain, .. }
            | ContainerError::ConstructionFailed { chain, .. }
            | ContainerError::SuspensionRequired { chain, .. } => Some(chain),
            ContainerError::CircularDependency { path } => Some(path),
            _ => None,
        }
    }

    pub(crate) fn scope_error(scope: &str, operation: &str, reason: impl Into<String>) -> Self {
        ContainerError::ScopeError {
            scope: scope.to_string(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

fn available_hint(available: &[String]) -> String {
    if available.is_empty() {
        return String::new();
    }
    let mut hint = format!(". Available services: {}", available.iter().take(5).cloned().collect::<Vec<_>>().join(", "));
    if available.len() > 5 {
        hint.push_str(&format!(" (and {} more)", available.len() - 5));
    }
    hint
}

fn describe_failures(failures: &[DisposalFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.key, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Raised by `Args` accessors inside factories.
#[derive(Debug, Error)]
pub enum ArgumentError {
    #[error("Parameter '{param}' is not declared by '{owner}'")]
    Undeclared { owner: String, param: String },
    #[error("Parameter '{param}' of '{owner}' resolved to nothing")]
    Absent { owner: String, param: String },
    #[error("Parameter '{param}' of '{owner}' is not a '{expected}'")]
    WrongType {
        owner: String,
        param: String,
        expected: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file '{0}': {1}")]
    FileRead(String, #[source] std::io::Error),
    #[error("Failed to parse TOML from '{0}': {1}")]
    TomlParse(String, #[source] toml::de::Error),
    #[error("Invalid value '{value}' for environment variable '{var}'")]
    InvalidEnv { var: String, value: String },
    #[error("Required configuration field '{0}' is missing or invalid")]
    FieldMissing(String),
}
