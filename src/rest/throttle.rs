//! Throttle gate: admission control keyed by endpoint
//!
//! The executor acquires a permit before every attempt and drops it when the
//! attempt resolves. Gates are shared by concurrent callers through `&self`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::infrastructure::config::ThrottleConfig;

/// Scoped admission; capacity is returned on drop
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ThrottlePermit {
    /// Permit that holds no capacity
    pub fn unbounded() -> Self {
        Self { _permit: None }
    }
}

/// Admission gate consulted before every REST attempt
pub trait ThrottleGate: Send + Sync {
    /// Suspend until `key` is admitted
    fn acquire(&self, key: &str) -> impl Future<Output = ThrottlePermit> + Send;
}

/// Admits everything immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct Unthrottled;

impl ThrottleGate for Unthrottled {
    async fn acquire(&self, _key: &str) -> ThrottlePermit {
        ThrottlePermit::unbounded()
    }
}

/// Bounds concurrent requests per key, one semaphore per key
#[derive(Debug, Clone)]
pub struct KeyedThrottle {
    default_limit: usize,
    limits: Arc<HashMap<String, usize>>,
    semaphores: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl KeyedThrottle {
    /// Same limit for every key
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            default_limit: max_concurrent.max(1),
            limits: Arc::new(HashMap::new()),
            semaphores: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &ThrottleConfig) -> Self {
        Self {
            default_limit: config.max_concurrent.max(1),
            limits: Arc::new(config.limits.clone()),
            semaphores: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Limit that applies to `key`
    pub fn limit_for(&self, key: &str) -> usize {
        self.limits
            .get(key)
            .copied()
            .unwrap_or(self.default_limit)
            .max(1)
    }

    /// Permits currently free for `key`
    pub fn available(&self, key: &str) -> usize {
        self.semaphores
            .lock()
            .get(key)
            .map(|s| s.available_permits())
            .unwrap_or_else(|| self.limit_for(key))
    }

    fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        let mut semaphores = self.semaphores.lock();
        semaphores
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.limit_for(key))))
            .clone()
    }
}

impl ThrottleGate for KeyedThrottle {
    async fn acquire(&self, key: &str) -> ThrottlePermit {
        let semaphore = self.semaphore(key);
        match semaphore.acquire_owned().await {
            Ok(permit) => ThrottlePermit {
                _permit: Some(permit),
            },
            // Semaphores are never closed by this gate
            Err(_) => ThrottlePermit::unbounded(),
        }
    }
}
