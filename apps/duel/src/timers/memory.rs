//! In-process timer registry mirroring the Redis layout: an ordered set of
//! encoded members plus an index of live members, behind one lock so every
//! operation is atomic the way the Lua scripts are.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use super::{index_field, TimerEntry, TimerRegistry};
use crate::clock::Clock;
use crate::error::AppError;

/// Sorted-set score; `f64` ordered with `total_cmp`.
#[derive(Debug, Clone, Copy)]
struct Score(f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Default)]
struct Inner {
    ordered: BTreeSet<(Score, String)>,
    index: HashMap<String, String>,
}

impl Inner {
    fn drop_member(&mut self, member: &str) {
        self.ordered.retain(|(_, m)| m != member);
    }

    fn has_pointer(&self, member: &str) -> bool {
        self.ordered.iter().any(|(_, m)| m == member)
    }
}

pub struct MemoryTimerRegistry {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryTimerRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock,
        }
    }

    /// Add a raw ordered-set member with no index entry, the way a foreign or
    /// half-finished writer would leave it.
    pub fn insert_raw_member(&self, score: f64, member: &str) {
        self.inner
            .lock()
            .ordered
            .insert((Score(score), member.to_string()));
    }

    /// Drop the ordered-set pointer for a live entry but keep its index slot,
    /// as a crash between the two writes would.
    pub fn drop_pointer(&self, session_id: &str, timer_name: &str) {
        let mut inner = self.inner.lock();
        let member = inner.index.get(&index_field(session_id, timer_name)).cloned();
        if let Some(member) = member {
            inner.drop_member(&member);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TimerRegistry for MemoryTimerRegistry {
    async fn schedule(
        &self,
        session_id: &str,
        timer_name: &str,
        frequency: Duration,
        timeout: Duration,
    ) -> Result<bool, AppError> {
        let entry = TimerEntry::new(
            session_id,
            timer_name,
            frequency,
            timeout,
            self.clock.unix_now(),
        );
        let member = entry.encode()?;
        let mut inner = self.inner.lock();
        let field = entry.index_field();
        if inner.index.contains_key(&field) {
            return Ok(false);
        }
        inner.index.insert(field, member.clone());
        inner.ordered.insert((Score(entry.next_tick), member));
        Ok(true)
    }

    async fn due(&self, now: f64) -> Result<Vec<TimerEntry>, AppError> {
        let mut inner = self.inner.lock();
        let candidates: Vec<String> = inner
            .ordered
            .iter()
            .take_while(|(score, _)| score.0 <= now)
            .map(|(_, member)| member.clone())
            .collect();

        let mut due = Vec::with_capacity(candidates.len());
        for member in candidates {
            match TimerEntry::decode(&member) {
                Ok(entry) => {
                    if inner.index.get(&entry.index_field()) == Some(&member) {
                        due.push(entry);
                    } else {
                        inner.drop_member(&member);
                    }
                }
                Err(err) => {
                    warn!(member = %member, error = %err, "Purging malformed timer entry");
                    inner.drop_member(&member);
                }
            }
        }
        Ok(due)
    }

    async fn reschedule(&self, entry: &TimerEntry, next_tick: f64) -> Result<bool, AppError> {
        let old = entry.encode()?;
        let next = entry.with_next_tick(next_tick);
        let member = next.encode()?;
        let field = entry.index_field();

        let mut inner = self.inner.lock();
        inner.ordered.remove(&(Score(entry.next_tick), old.clone()));
        if inner.index.get(&field) != Some(&old) {
            return Ok(false);
        }
        inner.ordered.insert((Score(next_tick), member.clone()));
        inner.index.insert(field, member);
        Ok(true)
    }

    async fn remove(&self, entry: &TimerEntry) -> Result<bool, AppError> {
        let member = entry.encode()?;
        let field = entry.index_field();

        let mut inner = self.inner.lock();
        inner.ordered.remove(&(Score(entry.next_tick), member.clone()));
        if inner.index.get(&field) == Some(&member) {
            inner.index.remove(&field);
            return Ok(true);
        }
        Ok(false)
    }

    async fn lookup(
        &self,
        session_id: &str,
        timer_name: &str,
    ) -> Result<Option<TimerEntry>, AppError> {
        let member = self
            .inner
            .lock()
            .index
            .get(&index_field(session_id, timer_name))
            .cloned();
        member.map(|m| TimerEntry::decode(&m)).transpose()
    }

    async fn cancel(&self, session_id: &str, timer_name: &str) -> Result<bool, AppError> {
        let mut inner = self.inner.lock();
        match inner.index.remove(&index_field(session_id, timer_name)) {
            Some(member) => {
                inner.drop_member(&member);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn repair(&self) -> Result<usize, AppError> {
        let mut inner = self.inner.lock();
        let orphans: Vec<(String, String)> = inner
            .index
            .iter()
            .filter(|(_, member)| !inner.has_pointer(member))
            .map(|(field, member)| (field.clone(), member.clone()))
            .collect();

        let mut restored = 0;
        for (field, member) in orphans {
            match TimerEntry::decode(&member) {
                Ok(entry) => {
                    inner.ordered.insert((Score(entry.next_tick), member));
                    restored += 1;
                }
                Err(err) => {
                    warn!(field = %field, error = %err, "Dropping malformed timer index entry");
                    inner.index.remove(&field);
                }
            }
        }
        Ok(restored)
    }
}
