//! Region collection: draining one region's pagination to exhaustion.
//!
//! The collector walks the cursor chain for a single region and accumulates
//! records in arrival order (the source's natural order; no re-sorting, since
//! downstream consumers may rely on arrival order within a region). The loop
//! terminates because the cursor stream is finite and monotonically
//! advancing; a cursor seen twice is a protocol violation and aborts the
//! region's unit of work instead of looping silently.

use std::collections::HashSet;

use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::source::CatchSource;
use crate::types::{CollectedRecord, Event, Region, RegionResult};

/// Collects the complete, ordered record set for one region
pub struct RegionCollector<'a> {
    source: &'a dyn CatchSource,
    ceiling: u64,
    events: Option<broadcast::Sender<Event>>,
}

impl<'a> RegionCollector<'a> {
    /// Create a collector over a source with the given retrieval ceiling
    pub fn new(source: &'a dyn CatchSource, ceiling: u64) -> Self {
        Self {
            source,
            ceiling,
            events: None,
        }
    }

    /// Attach a progress-event sender (dropped receivers are ignored)
    pub fn with_events(mut self, events: broadcast::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            tx.send(event).ok();
        }
    }

    /// Drain all pages for `region` and seal the result.
    ///
    /// A total count at or above the ceiling is a loud warning, not a
    /// failure: the sealed result is marked `truncated` so partitioning
    /// policy (or the operator) decides what to do about it.
    pub async fn collect(&self, region: &Region) -> Result<RegionResult> {
        let mut result = RegionResult {
            region: *region,
            total_count: 0,
            truncated: false,
            records: Vec::new(),
        };

        let mut cursor: Option<String> = None;
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut page_index: u32 = 0;

        loop {
            let page = self.source.fetch_page(region, cursor.as_deref()).await?;

            if page_index == 0 {
                result.total_count = page.total_count;
                if page.total_count >= self.ceiling {
                    result.truncated = true;
                    tracing::warn!(
                        region = %region,
                        total_count = page.total_count,
                        ceiling = self.ceiling,
                        "region count meets retrieval ceiling, result will be truncated"
                    );
                    self.emit(Event::RegionTruncated {
                        region: *region,
                        total_count: page.total_count,
                    });
                }
                tracing::info!(
                    region = %region,
                    total_count = page.total_count,
                    "collecting region"
                );
            }

            result
                .records
                .extend(page.records.into_iter().map(|record| CollectedRecord {
                    page_index,
                    record,
                }));

            tracing::debug!(
                region = %region,
                page_index,
                collected = result.records.len(),
                "collected page"
            );
            self.emit(Event::PageCollected {
                region: *region,
                page_index,
                records_so_far: result.records.len(),
            });

            if !page.has_more {
                break;
            }

            let next = page.next_cursor.ok_or_else(|| Error::Protocol {
                message: format!("region {region} reported more pages but no cursor"),
                body: String::new(),
            })?;
            if !seen_cursors.insert(next.clone()) {
                return Err(Error::CursorRepeated { cursor: next });
            }
            cursor = Some(next);
            page_index += 1;
        }

        Ok(result)
    }
}
