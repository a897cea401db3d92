//! Event Filters
//!
//! Composable post-decode predicates over `(stream offset, event)`. Filters
//! run *after* decode so that filter-miss events still count toward the
//! health report; a filtered scan and an unfiltered scan agree on journal
//! health, they only differ in which events the report retains.

use serde::{Deserialize, Serialize};

use scour_core::LogEvent;

/// A single predicate over a decoded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventFilter {
    /// Keep events whose type tag equals the given name.
    ByType(String),
    /// Keep update events touching the given inode (as target or directory).
    ByInode(u64),
    /// Keep update events whose path starts with the given prefix.
    ByPathPrefix(String),
    /// Keep events whose stream offset lies in `[lo, hi)`.
    ByRange { lo: u64, hi: u64 },
    /// Keep update events naming `name` inside the directory `dir_inode`.
    ByDirfragName { dir_inode: u64, name: String },
}

impl EventFilter {
    pub fn matches(&self, offset: u64, event: &LogEvent) -> bool {
        match self {
            EventFilter::ByType(tag) => event.type_tag == *tag,
            EventFilter::ByInode(inode) => event
                .as_update()
                .is_some_and(|u| u.inode == *inode || u.dir_inode == *inode),
            EventFilter::ByPathPrefix(prefix) => event
                .as_update()
                .is_some_and(|u| u.path.starts_with(prefix.as_str())),
            EventFilter::ByRange { lo, hi } => *lo <= offset && offset < *hi,
            EventFilter::ByDirfragName { dir_inode, name } => {
                event.as_update().is_some_and(|u| {
                    u.dir_inode == *dir_inode
                        && u.path.rsplit('/').next() == Some(name.as_str())
                })
            }
        }
    }
}

/// Conjunction of filters; an empty set keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet(Vec<EventFilter>);

impl FilterSet {
    pub fn new(filters: Vec<EventFilter>) -> Self {
        Self(filters)
    }

    pub fn push(&mut self, filter: EventFilter) {
        self.0.push(filter);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, offset: u64, event: &LogEvent) -> bool {
        self.0.iter().all(|f| f.matches(offset, event))
    }
}
