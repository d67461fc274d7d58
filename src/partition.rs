//! Spatial partitioning: deciding which regions are directly collectible.
//!
//! The source caps the number of records it returns per bounded-area query,
//! so a region holding more records than the cap must be subdivided before
//! collection. Two policies:
//!
//! - **Adaptive** (no cell size configured): probe each region's total count
//!   and split it into four midpoint quadrants while the count meets the
//!   ceiling, walking an explicit work stack with a depth/size termination
//!   guard instead of recursing.
//! - **Fixed grid** (cell size configured): tile the area-of-interest polygon
//!   into square cells and keep only cells fully contained in the polygon.
//!   Cells straddling the boundary are dropped, trading edge coverage for
//!   tiling simplicity. Grid cells are never
//!   re-split; an over-full cell is surfaced as a truncation warning.

use geo::{Contains, Polygon, Rect, coord};

use crate::source::CatchSource;
use crate::types::{Region, UnitFailure};

/// Outcome of the partition decision for one region
#[derive(Clone, Debug, PartialEq)]
pub enum Partition {
    /// The region's count fits under the ceiling; collect it directly
    Collectible(Region),
    /// The region must be split; collect the quadrants instead
    Split([Region; 4]),
}

/// One leaf region produced by partitioning
#[derive(Clone, Debug, PartialEq)]
pub struct Leaf {
    /// The collectible region
    pub region: Region,
    /// True when the region's count still met the ceiling but subdivision hit
    /// its termination guard; collection will be truncated
    pub truncation_risk: bool,
}

/// Result of the adaptive partition walk.
///
/// Probe failures are isolated per subtree so one unreachable region never
/// aborts planning for the rest of the area.
#[derive(Debug, Default)]
pub struct PartitionOutcome {
    /// Collectible leaves, in traversal order
    pub leaves: Vec<Leaf>,
    /// Regions whose count probe failed permanently
    pub failures: Vec<UnitFailure>,
}

/// Pure partition decision: split when the declared count meets the ceiling.
///
/// The comparison is strictly-less-than on purpose: a count exactly at the
/// ceiling cannot be distinguished from a capped one, so it is treated as
/// unsafe to collect directly.
pub fn decide(region: &Region, count: u64, ceiling: u64) -> Partition {
    if count < ceiling {
        Partition::Collectible(*region)
    } else {
        Partition::Split(region.quadrants())
    }
}

/// True when splitting `region` further would violate the termination guard
fn at_split_limit(region: &Region, depth: u32, max_depth: u32, min_cell_size: f64) -> bool {
    depth >= max_depth
        || region.width() / 2.0 < min_cell_size
        || region.height() / 2.0 < min_cell_size
}

/// Adaptive quadrant partitioning over an explicit work stack.
///
/// Each region's count is probed with a first-page fetch. Regions at or over
/// `ceiling` are split into four quadrants and pushed back; the guard
/// (`max_depth`, `min_cell_size`) stops pathological clustering (e.g. all
/// records colocated at one point) from splitting forever; a guarded region
/// is emitted as a truncation-risk leaf instead.
pub async fn partition_adaptive(
    source: &dyn CatchSource,
    root: Region,
    ceiling: u64,
    max_depth: u32,
    min_cell_size: f64,
) -> PartitionOutcome {
    let mut outcome = PartitionOutcome::default();
    let mut stack: Vec<(Region, u32)> = vec![(root, 0)];

    while let Some((region, depth)) = stack.pop() {
        tracing::info!(region = %region, depth, "probing region count");

        let count = match source.fetch_page(&region, None).await {
            Ok(page) => page.total_count,
            Err(e) => {
                tracing::error!(region = %region, error = %e, "count probe failed");
                outcome.failures.push(UnitFailure {
                    unit: region.artifact_stem(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        match decide(&region, count, ceiling) {
            Partition::Collectible(region) => {
                tracing::info!(region = %region, count, "region is collectible");
                outcome.leaves.push(Leaf {
                    region,
                    truncation_risk: false,
                });
            }
            Partition::Split(quadrants) => {
                if at_split_limit(&region, depth, max_depth, min_cell_size) {
                    tracing::warn!(
                        region = %region,
                        count,
                        ceiling,
                        depth,
                        "split limit reached on over-full region, collection will be truncated"
                    );
                    outcome.leaves.push(Leaf {
                        region,
                        truncation_risk: true,
                    });
                } else {
                    tracing::info!(region = %region, count, "count meets ceiling, splitting");
                    // Reverse keeps traversal in quadrant order off the stack
                    for quad in quadrants.into_iter().rev() {
                        stack.push((quad, depth + 1));
                    }
                }
            }
        }
    }

    outcome
}

/// Fixed-grid partitioning: square cells of `cell_size` degrees, keeping only
/// cells fully contained in the area-of-interest polygon.
///
/// Cells are emitted row-major from the south-west corner. Every surviving
/// cell is collectible unconditionally.
pub fn partition_grid(aoi: &Polygon<f64>, cell_size: f64) -> Vec<Region> {
    use geo::BoundingRect;

    let Some(bounds) = aoi.bounding_rect() else {
        return Vec::new();
    };

    let cols = ((bounds.width() / cell_size) + 1e-9).floor() as i64;
    let rows = ((bounds.height() / cell_size) + 1e-9).floor() as i64;

    let mut cells = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let min_lon = bounds.min().x + col as f64 * cell_size;
            let min_lat = bounds.min().y + row as f64 * cell_size;
            let cell = Rect::new(
                coord! { x: min_lon, y: min_lat },
                coord! { x: min_lon + cell_size, y: min_lat + cell_size },
            );
            if aoi.contains(&cell.to_polygon()) {
                cells.push(Region {
                    min_lon: cell.min().x,
                    min_lat: cell.min().y,
                    max_lon: cell.max().x,
                    max_lat: cell.max().y,
                });
            }
        }
    }

    tracing::info!(
        cells = cells.len(),
        cell_size,
        "gridded area of interest (boundary-straddling cells dropped)"
    );
    cells
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubSource;
    use geo::polygon;

    #[test]
    fn count_at_ceiling_splits_into_quadrants() {
        let region = Region::new(0.0, 0.0, 4.0, 4.0).unwrap();

        match decide(&region, 15_000, 10_000) {
            Partition::Split(quads) => {
                assert_eq!(quads.len(), 4);
                let area: f64 = quads.iter().map(|q| q.width() * q.height()).sum();
                assert!((area - 16.0).abs() < 1e-9);
            }
            Partition::Collectible(_) => panic!("over-full region must split"),
        }

        // Exactly at the ceiling is still a split: the reported count may be capped
        assert!(matches!(
            decide(&region, 10_000, 10_000),
            Partition::Split(_)
        ));
        assert!(matches!(
            decide(&region, 9_999, 10_000),
            Partition::Collectible(_)
        ));
    }

    #[tokio::test]
    async fn adaptive_walk_splits_until_under_ceiling() {
        // Root reports 15,000; every quadrant reports 100.
        let root = Region::new(0.0, 0.0, 2.0, 2.0).unwrap();
        let mut source = StubSource::new();
        source.script_count(&root, 15_000);
        for quad in root.quadrants() {
            source.script_count(&quad, 100);
        }

        let outcome = partition_adaptive(&source, root, 10_000, 12, 1e-4).await;

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.leaves.len(), 4);
        assert!(outcome.leaves.iter().all(|l| !l.truncation_risk));
        let leaf_area: f64 = outcome
            .leaves
            .iter()
            .map(|l| l.region.width() * l.region.height())
            .sum();
        assert!((leaf_area - 4.0).abs() < 1e-9, "leaves must tile the root");
    }

    #[tokio::test]
    async fn split_limit_yields_truncation_risk_leaf() {
        // Pathological cluster: every region at every depth reports 20,000.
        let root = Region::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let source = StubSource::with_default_count(20_000);

        let outcome = partition_adaptive(&source, root, 10_000, 2, 1e-4).await;

        assert!(!outcome.leaves.is_empty());
        assert!(
            outcome.leaves.iter().all(|l| l.truncation_risk),
            "guard-limited leaves must carry the truncation flag"
        );
        // Depth 2 guard: 16 leaves at most, no infinite walk
        assert_eq!(outcome.leaves.len(), 16);
    }

    #[tokio::test]
    async fn probe_failure_isolated_to_subtree() {
        let root = Region::new(0.0, 0.0, 2.0, 2.0).unwrap();
        let quads = root.quadrants();
        let mut source = StubSource::new();
        source.script_count(&root, 15_000);
        source.fail_region(&quads[0]);
        for quad in &quads[1..] {
            source.script_count(quad, 10);
        }

        let outcome = partition_adaptive(&source, root, 10_000, 12, 1e-4).await;

        assert_eq!(outcome.leaves.len(), 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].unit, quads[0].artifact_stem());
    }

    #[test]
    fn grid_keeps_only_fully_contained_cells() {
        let aoi = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ];

        let cells = partition_grid(&aoi, 1.0);
        let expected = [
            Region::new(0.0, 0.0, 1.0, 1.0).unwrap(),
            Region::new(1.0, 0.0, 2.0, 1.0).unwrap(),
            Region::new(0.0, 1.0, 1.0, 2.0).unwrap(),
            Region::new(1.0, 1.0, 2.0, 2.0).unwrap(),
        ];
        assert_eq!(cells, expected);
    }

    #[test]
    fn boundary_straddling_cells_dropped() {
        // Triangle: only cells under the hypotenuse fit entirely inside
        let aoi = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 0.0, y: 4.0),
            (x: 0.0, y: 0.0),
        ];

        let cells = partition_grid(&aoi, 1.0);
        assert!(!cells.is_empty());
        // Cells on or past the diagonal must have been dropped
        for cell in &cells {
            assert!(
                cell.max_lon + cell.max_lat <= 4.0 + 1e-9,
                "cell {cell} straddles the hypotenuse"
            );
        }
        // Cells whose north-east corner lies exactly on the hypotenuse are
        // boundary-touching but still fully contained: (2,0), (1,1), (0,2)
        // plus the three strictly interior cells.
        assert_eq!(cells.len(), 6);
    }
}
