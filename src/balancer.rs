//! Session selection policies.
//!
//! The manager asks a [`Balancer`] to pick one session id out of the live
//! set on every send. Strategies are stateless from the caller's point of
//! view; round-robin keeps its cursor behind an atomic so the manager can
//! stay `&self` everywhere.

use crate::error::Error;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Pick-one policy over session ids.
pub trait Balancer: Send + Sync {
    /// Select one id. Fails with [`Error::NoAvailableSession`] on an empty
    /// set.
    fn pick(&self, ids: &[String]) -> Result<String, Error>;
}

/// Default strategy: cycle through the ids in order.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for RoundRobin {
    fn pick(&self, ids: &[String]) -> Result<String, Error> {
        if ids.is_empty() {
            return Err(Error::NoAvailableSession);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % ids.len();
        Ok(ids[index].clone())
    }
}

/// Uniformly random selection.
#[derive(Debug, Default)]
pub struct Random;

impl Balancer for Random {
    fn pick(&self, ids: &[String]) -> Result<String, Error> {
        if ids.is_empty() {
            return Err(Error::NoAvailableSession);
        }
        let index = rand::thread_rng().gen_range(0..ids.len());
        Ok(ids[index].clone())
    }
}
