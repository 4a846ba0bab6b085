// Logging utilities for the keyauth stack
//
// Component-tagged loggers over the `log` facade. Every logger carries the
// identity instance it belongs to (usually the application id), so several
// authorities living in one process can be told apart in the output.

use log::{debug, error, info, warn};
use std::fmt::{self, Arguments, Display, Formatter};

/// Predefined components for logging categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Authority,
    KeyStore,
    ProofOfWork,
    Crypto,
    Cli,
    Custom(&'static str),
}

impl Component {
    /// Get the string representation of the component
    pub fn as_str(&self) -> &str {
        match self {
            Component::Authority => "Authority",
            Component::KeyStore => "KeyStore",
            Component::ProofOfWork => "PoW",
            Component::Crypto => "Crypto",
            Component::Cli => "CLI",
            Component::Custom(name) => name,
        }
    }
}

// Avoids building a prefix String for the `*_args` variants
struct ComponentPrefixDisplay {
    parent: Option<Component>,
    component: Component,
}

impl Display for ComponentPrefixDisplay {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) if parent != self.component => {
                write!(f, "{}.{}", parent.as_str(), self.component.as_str())
            }
            _ => write!(f, "{}", self.component.as_str()),
        }
    }
}

/// A component logger bound to one identity instance
#[derive(Clone, Debug)]
pub struct Logger {
    component: Component,
    instance_id: String,
    parent_component: Option<Component>,
}

impl Logger {
    /// Create a root logger for a component and instance id
    pub fn new_root(component: Component, instance_id: &str) -> Self {
        Self {
            component,
            instance_id: instance_id.to_string(),
            parent_component: None,
        }
    }

    /// Create a child logger with the same instance id but a different component
    pub fn with_component(&self, component: Component) -> Self {
        Self {
            component,
            instance_id: self.instance_id.clone(),
            parent_component: Some(self.component),
        }
    }

    /// Create a logger for another instance, keeping the component chain
    pub fn with_instance(&self, instance_id: impl Into<String>) -> Self {
        Self {
            component: self.component,
            instance_id: instance_id.into(),
            parent_component: self.parent_component,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn component(&self) -> Component {
        self.component
    }

    fn prefix(&self) -> ComponentPrefixDisplay {
        ComponentPrefixDisplay {
            parent: self.parent_component,
            component: self.component,
        }
    }

    /// Log a debug message
    pub fn debug(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    /// Log a debug message using fmt::Arguments (avoids allocating message String)
    pub fn debug_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Debug) {
            debug!("[{}][{}] {}", self.instance_id, self.prefix(), args);
        }
    }

    /// Log an info message
    pub fn info(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    pub fn info_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Info) {
            info!("[{}][{}] {}", self.instance_id, self.prefix(), args);
        }
    }

    /// Log a warning message
    pub fn warn(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    pub fn warn_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Warn) {
            warn!("[{}][{}] {}", self.instance_id, self.prefix(), args);
        }
    }

    /// Log an error message
    pub fn error(&self, message: impl Into<String>) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.instance_id, self.prefix(), message.into());
        }
    }

    pub fn error_args(&self, args: Arguments) {
        if log::log_enabled!(log::Level::Error) {
            error!("[{}][{}] {}", self.instance_id, self.prefix(), args);
        }
    }
}
