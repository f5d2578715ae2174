use std::borrow::Borrow;
use std::collections::BTreeMap;

use ahash::RandomState;
use hashbrown::HashMap;
use rayon::prelude::*;
use tracing::info;

use crate::record::Record;

type RegionMap = HashMap<String, RegionExtremes, RandomState>;

/// The record currently holding one extreme, and the coordinate that put it there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extreme {
    pub code: i64,
    pub coordinate: f64,
}

impl Extreme {
    /// Replaces `slot` when `candidate` is strictly further out, or ties on
    /// the coordinate with a smaller code. An empty slot always takes it.
    fn offer(slot: &mut Option<Extreme>, candidate: Extreme, further: fn(f64, f64) -> bool) {
        match slot {
            None => *slot = Some(candidate),
            Some(current) => {
                let tie_won = candidate.coordinate == current.coordinate
                    && candidate.code < current.code;
                if further(candidate.coordinate, current.coordinate) || tie_won {
                    *current = candidate;
                }
            }
        }
    }
}

#[inline]
fn less(a: f64, b: f64) -> bool {
    a < b
}

#[inline]
fn greater(a: f64, b: f64) -> bool {
    a > b
}

/// Four running extremes for one region.
///
/// Eastmost is the smallest longitude and westmost the largest, matching
/// the western hemisphere data this is run against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionExtremes {
    pub eastmost: Option<Extreme>,
    pub westmost: Option<Extreme>,
    pub northmost: Option<Extreme>,
    pub southmost: Option<Extreme>,
}

impl RegionExtremes {
    pub fn update(&mut self, record: &Record) {
        let by_longitude = Extreme { code: record.code, coordinate: record.longitude };
        let by_latitude = Extreme { code: record.code, coordinate: record.latitude };

        Extreme::offer(&mut self.eastmost, by_longitude, less);
        Extreme::offer(&mut self.westmost, by_longitude, greater);
        Extreme::offer(&mut self.northmost, by_latitude, greater);
        Extreme::offer(&mut self.southmost, by_latitude, less);
    }

    /// Folds another partial result for the same region into this one.
    pub fn merge(&mut self, other: &Self) {
        if let Some(extreme) = other.eastmost {
            Extreme::offer(&mut self.eastmost, extreme, less);
        }
        if let Some(extreme) = other.westmost {
            Extreme::offer(&mut self.westmost, extreme, greater);
        }
        if let Some(extreme) = other.northmost {
            Extreme::offer(&mut self.northmost, extreme, greater);
        }
        if let Some(extreme) = other.southmost {
            Extreme::offer(&mut self.southmost, extreme, less);
        }
    }
}

/// Per region extremes, iterated in region key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    regions: BTreeMap<String, RegionExtremes>,
}

impl AggregateResult {
    pub fn get(&self, region_key: &str) -> Option<&RegionExtremes> {
        self.regions.get(region_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegionExtremes)> {
        self.regions.iter().map(|(key, extremes)| (key.as_str(), extremes))
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl From<RegionMap> for AggregateResult {
    fn from(regions: RegionMap) -> Self {
        Self { regions: BTreeMap::from_iter(regions) }
    }
}

/// Single pass fold of `records` into per region extremes.
pub fn aggregate<I>(records: I) -> AggregateResult
where
    I: IntoIterator,
    I::Item: Borrow<Record>,
{
    let mut regions: RegionMap = HashMap::default();
    let mut count = 0usize;

    for record in records {
        let record = record.borrow();
        regions
            .entry_ref(record.region_key.as_str())
            .or_default()
            .update(record);
        count += 1;
    }

    info!("Aggregated {} records into {} regions", count, regions.len());
    AggregateResult::from(regions)
}

/// Same result as [`aggregate`], folding slices of `records` on the rayon
/// pool and merging the partial maps.
pub fn aggregate_parallel(records: &[Record]) -> AggregateResult {
    let regions: RegionMap = records
        .par_iter()
        .fold(RegionMap::default, |mut regions, record| {
            regions
                .entry_ref(record.region_key.as_str())
                .or_default()
                .update(record);
            regions
        })
        .reduce(RegionMap::default, merge_maps);

    info!(
        "Aggregated {} records into {} regions in parallel",
        records.len(),
        regions.len()
    );
    AggregateResult::from(regions)
}

fn merge_maps(mut map_one: RegionMap, map_two: RegionMap) -> RegionMap {
    for (region_key, extremes) in map_two {
        map_one
            .entry(region_key)
            .and_modify(|current| current.merge(&extremes))
            .or_insert(extremes);
    }
    map_one
}
