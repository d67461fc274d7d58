//! Shared test doubles for unit tests.
//!
//! `StubSource` is a scripted [`CatchSource`]: each region gets a total count
//! and a sequence of pages; the stub fabricates deterministic cursors of the
//! form `<stem>#<page>` so pagination behaves like the real source without a
//! network. Call counters let tests assert exact fetch counts (pagination
//! completeness, idempotent resume).

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Error, Result};
use crate::source::CatchSource;
use crate::types::{CatchRecord, DetailRecord, Page, Region};

/// Scripted pages for one region
#[derive(Clone, Default)]
struct Script {
    total_count: u64,
    pages: Vec<Vec<CatchRecord>>,
}

/// Scripted in-memory [`CatchSource`]
#[derive(Default)]
pub(crate) struct StubSource {
    scripts: Mutex<HashMap<String, Script>>,
    /// Count returned for regions without an explicit script
    default_count: u64,
    fail_regions: Mutex<HashSet<String>>,
    fail_details: Mutex<HashSet<String>>,
    repeat_cursor_regions: Mutex<HashSet<String>>,
    /// Page fetches issued, across all regions
    pub(crate) fetch_calls: AtomicU32,
    /// Detail fetches issued
    pub(crate) detail_calls: AtomicU32,
}

impl StubSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A stub that reports `count` for every region it has no script for
    pub(crate) fn with_default_count(count: u64) -> Self {
        Self {
            default_count: count,
            ..Self::default()
        }
    }

    /// Script a region with a total count and no records
    pub(crate) fn script_count(&mut self, region: &Region, total_count: u64) {
        self.script_pages(region, total_count, Vec::new());
    }

    /// Script a region's full pagination sequence
    pub(crate) fn script_pages(
        &mut self,
        region: &Region,
        total_count: u64,
        pages: Vec<Vec<CatchRecord>>,
    ) {
        self.scripts
            .lock()
            .unwrap()
            .insert(region.artifact_stem(), Script { total_count, pages });
    }

    /// Make every fetch for a region fail permanently
    pub(crate) fn fail_region(&mut self, region: &Region) {
        self.fail_regions
            .lock()
            .unwrap()
            .insert(region.artifact_stem());
    }

    /// Make one catch id's detail fetch fail permanently
    pub(crate) fn fail_detail(&mut self, catch_id: &str) {
        self.fail_details.lock().unwrap().insert(catch_id.to_string());
    }

    /// Make a region return the same cursor on every page (protocol violation)
    pub(crate) fn repeat_cursor(&mut self, region: &Region) {
        self.repeat_cursor_regions
            .lock()
            .unwrap()
            .insert(region.artifact_stem());
    }

    pub(crate) fn fetch_count(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

/// Build a minimal catch record for tests
pub(crate) fn record(id: &str) -> CatchRecord {
    CatchRecord {
        id: id.to_string(),
        caught_at_gmt: Some("2024-06-01T12:00:00Z".to_string()),
        fishing_water: None,
        species: None,
        likes_count: 0,
        text: None,
        user_id: format!("user-{id}"),
    }
}

#[async_trait]
impl CatchSource for StubSource {
    async fn fetch_page(&self, region: &Region, cursor: Option<&str>) -> Result<Page> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let stem = region.artifact_stem();

        if self.fail_regions.lock().unwrap().contains(&stem) {
            return Err(Error::Protocol {
                message: format!("scripted failure for {stem}"),
                body: String::new(),
            });
        }

        if self.repeat_cursor_regions.lock().unwrap().contains(&stem) {
            return Ok(Page {
                records: vec![record("looping")],
                total_count: 100,
                next_cursor: Some(format!("{stem}#stuck")),
                has_more: true,
            });
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&stem)
            .cloned()
            .unwrap_or(Script {
                total_count: self.default_count,
                pages: Vec::new(),
            });

        let index = match cursor {
            None => 0,
            Some(c) => c
                .rsplit('#')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(0),
        };

        let records = script.pages.get(index).cloned().unwrap_or_default();
        let has_more = index + 1 < script.pages.len();
        Ok(Page {
            records,
            total_count: script.total_count,
            next_cursor: has_more.then(|| format!("{stem}#{}", index + 1)),
            has_more,
        })
    }

    async fn fetch_detail(&self, catch_id: &str) -> Result<DetailRecord> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_details.lock().unwrap().contains(catch_id) {
            return Err(Error::Protocol {
                message: format!("scripted detail failure for {catch_id}"),
                body: String::new(),
            });
        }
        Ok(DetailRecord {
            fishing_method: Some("Spinning".to_string()),
            catch_and_release: Some(false),
            length: Some(0.4),
            weight: Some(1.2),
            has_exact_position: Some(true),
            latitude: Some(45.0),
            longitude: Some(-93.0),
        })
    }
}
