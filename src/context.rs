//! Emission context: environment, clock and process-wide record stamps
//!
//! The engine holds an explicit `Arc<Context>` instead of reading global state, so
//! each test can build its own engine with its own clock.

use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Deployment environment that selects the retention profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Resolve an environment tag
    ///
    /// Total: unrecognized tags fall back to `Development`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Environment::Production,
            "stage" | "staging" => Environment::Staging,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of the current UTC time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic rotation and retention tests
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: ChronoDuration) {
        if let Ok(mut now) = self.now.write() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|n| *n).unwrap_or_else(|_| Utc::now())
    }
}

/// Mutable stamps copied onto every record at emission time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub current_user: Option<String>,
    pub device_info: Option<String>,
    pub app_version: Option<String>,
}

/// Process-wide logging context
pub struct Context {
    environment: Environment,
    clock: Box<dyn Clock>,
    state: RwLock<ContextSnapshot>,
}

impl Context {
    /// Create a context on the system clock
    pub fn new(environment: Environment) -> Self {
        Self::with_clock(environment, Box::new(SystemClock))
    }

    /// Create a context on a custom clock
    pub fn with_clock(environment: Environment, clock: Box<dyn Clock>) -> Self {
        Self {
            environment,
            clock,
            state: RwLock::new(ContextSnapshot::default()),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Copy of the current stamps
    pub fn snapshot(&self) -> ContextSnapshot {
        self.state.read().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn current_user(&self) -> Option<String> {
        self.snapshot().current_user
    }

    pub fn set_current_user(&self, user: Option<String>) {
        if let Ok(mut state) = self.state.write() {
            state.current_user = user;
        }
    }

    pub fn set_device_info(&self, device: Option<String>) {
        if let Ok(mut state) = self.state.write() {
            state.device_info = device;
        }
    }

    pub fn set_app_version(&self, version: Option<String>) {
        if let Ok(mut state) = self.state.write() {
            state.app_version = version;
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("environment", &self.environment)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Clock shared between a [`Context`] and a store that stamps modification times
impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
