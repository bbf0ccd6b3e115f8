//! Catalog cross-matching over a [`PixelIndex`].
//!
//! One pass over the populated pixels, in index order. For each bucket
//! with at least two samples, every sample after the first is tested
//! against the samples before it in storage order (the intra-bucket pass)
//! and against every sample of each neighboring bucket the visit claimed
//! (the neighbor pass). Claiming marks the per-direction flags on both
//! buckets, so each unordered bucket pair is worked exactly once per run.
//! Same-field pairs are never tested in either pass.
//!
//! A pairwise test rejects on the declination difference before paying
//! for the great-circle distance, then updates the best match of *both*
//! samples, so one pass produces symmetric bookkeeping without a second
//! sweep. Ties on exactly equal distances resolve to the earliest-tested
//! candidate in bucket order.
//!
//! # Parallel hazard
//!
//! The mutual update writes to a sample that may belong to a bucket far
//! from the one being driven, so handing buckets to threads that share
//! one table is a data race. [`run_parallel`] therefore never shares: each
//! worker accumulates candidate best matches for a contiguous run of
//! buckets into a local table (bucket-pair ownership decided statically,
//! so no worker pair touches the same pair of buckets), and a
//! deterministic minimum-distance reduction merges the locals. The
//! reduction is commutative and idempotent, so the outcome is identical
//! to [`run`]'s, independent of write order.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::catalog::Field;
use crate::constants::ARCSEC_TO_RAD;
use crate::errors::Result;
use crate::healpix;
use crate::index::{BackendKind, PixelIndex, SampleId};

/// Parameters of one cross-match run.
#[derive(Debug, Clone)]
pub struct MatchParams {
    /// Resolution exponent of the pixelization (nside = 2^order).
    pub order: u32,
    /// Search radius in arcseconds.
    pub radius_arcsec: f64,
    /// Bucket storage backend.
    pub backend: BackendKind,
    /// Use the accumulate-then-reduce parallel runner.
    pub parallel: bool,
}

impl Default for MatchParams {
    fn default() -> Self {
        MatchParams {
            order: 13,
            radius_arcsec: 2.0,
            backend: BackendKind::BalancedTree,
            parallel: false,
        }
    }
}

/// Best cross-field counterpart found for one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestMatch {
    /// Nearest cross-field sample within the radius, if any.
    pub partner: Option<SampleId>,
    /// Distance to `partner` in radians; stays at the radius sentinel
    /// while no partner has been found.
    pub distance: f64,
}

/// Result of one matcher invocation.
#[derive(Debug)]
pub struct MatchOutcome {
    matches: usize,
    tests: u64,
    best: Vec<BestMatch>,
}

impl MatchOutcome {
    /// Number of matched samples, counted the way the single pass counts
    /// them (bucket heads are never iterated as initiators and are not
    /// counted).
    pub fn match_count(&self) -> usize {
        self.matches
    }

    /// Pairwise tests attempted during this invocation, including
    /// pre-filter rejections.
    pub fn test_count(&self) -> u64 {
        self.tests
    }

    /// Best match of one sample.
    pub fn best_match(&self, id: SampleId) -> Option<(SampleId, f64)> {
        let best = &self.best[id.as_usize()];
        best.partner.map(|partner| (partner, best.distance))
    }

    /// Per-sample best-match table, indexed by [`SampleId`].
    pub fn best_matches(&self) -> &[BestMatch] {
        &self.best
    }

    /// All samples that ended with a partner.
    pub fn iter_matches(&self) -> impl Iterator<Item = (SampleId, SampleId, f64)> + '_ {
        self.best.iter().enumerate().filter_map(|(i, best)| {
            best.partner
                .map(|partner| (SampleId(i as u32), partner, best.distance))
        })
    }
}

/// Build an index over `fields` and run one matcher pass.
///
/// The process-level entry point: index construction, one pass, index
/// dropped on return.
pub fn cross_fields(fields: &[Field], params: &MatchParams) -> Result<MatchOutcome> {
    let mut index = PixelIndex::build(fields, params.order, params.backend)?;
    let radius = params.radius_arcsec * ARCSEC_TO_RAD;
    let outcome = if params.parallel {
        run_parallel(&mut index, radius)
    } else {
        run(&mut index, radius)
    };
    Ok(outcome)
}

/// Sequential matcher pass. `radius` is in radians.
pub fn run(index: &mut PixelIndex, radius: f64) -> MatchOutcome {
    index.set_max_radius(radius);
    index.clear_tested_flags();
    let mut table = MatchTable::new(index.num_samples(), radius);

    let pixel_ids: Vec<u64> = index.pixel_ids().to_vec();
    for &pix in &pixel_ids {
        let initiators = match index.get(pix) {
            Some(bucket) => bucket.samples.len(),
            None => 0,
        };
        if initiators < 2 {
            // Head-only bucket: nothing initiates, so no pair gets
            // claimed from this side either.
            continue;
        }
        let claimed = index.claim_neighbor_pairs(pix);
        if let Some(bucket) = index.get(pix) {
            for j in 1..bucket.samples.len() {
                let current = bucket.samples[j];
                let current_field = index.sample(current).field;

                for k in 0..j {
                    let test = bucket.samples[k];
                    if index.sample(test).field == current_field {
                        continue;
                    }
                    table.pairwise_test(index, current, test, false);
                }

                for &neighbor_id in &claimed {
                    if let Some(neighbor) = index.get(neighbor_id) {
                        for &test in &neighbor.samples {
                            if index.sample(test).field == current_field {
                                continue;
                            }
                            table.pairwise_test(index, current, test, true);
                        }
                    }
                }
            }
        }
    }
    finish(index, table)
}

/// Parallel matcher pass with the same outcome as [`run`].
///
/// Buckets are processed in contiguous chunks; each (bucket, neighbor)
/// pair has a statically determined owner, so the chunk workers never
/// contend. Local candidate tables merge by minimum distance in chunk
/// order.
pub fn run_parallel(index: &mut PixelIndex, radius: f64) -> MatchOutcome {
    index.set_max_radius(radius);
    index.clear_tested_flags();

    let pixel_ids: Vec<u64> = index.pixel_ids().to_vec();
    let rank: HashMap<u64, usize> = pixel_ids
        .iter()
        .enumerate()
        .map(|(position, &pix)| (pix, position))
        .collect();

    let chunk_size = (pixel_ids.len() / (rayon::current_num_threads() * 4)).max(1);
    let shared: &PixelIndex = index;
    let locals: Vec<LocalTable> = pixel_ids
        .par_chunks(chunk_size)
        .map(|chunk| {
            let mut local = LocalTable::new(radius);
            for &pix in chunk {
                accumulate_bucket(shared, &rank, pix, &mut local);
            }
            local
        })
        .collect();

    let mut table = MatchTable::new(index.num_samples(), radius);
    for local in locals {
        table.merge(local);
    }
    finish(index, table)
}

/// One bucket's share of the parallel pass, into a local table.
fn accumulate_bucket(
    index: &PixelIndex,
    rank: &HashMap<u64, usize>,
    pix: u64,
    local: &mut LocalTable,
) {
    let bucket = match index.get(pix) {
        Some(bucket) => bucket,
        None => return,
    };
    if bucket.samples.len() < 2 {
        return;
    }

    // Static ownership of each neighbor pair: the side that would claim
    // it in the sequential pass — the earlier-visited bucket able to
    // initiate, or the only one able to.
    let mut owned: Vec<u64> = Vec::with_capacity(8);
    for neighbor_id in bucket.neighbors.into_iter().flatten() {
        if neighbor_id == pix || owned.contains(&neighbor_id) {
            continue;
        }
        if let Some(neighbor) = index.get(neighbor_id) {
            if neighbor.samples.len() < 2 || rank[&pix] < rank[&neighbor_id] {
                owned.push(neighbor_id);
            }
        }
    }

    for j in 1..bucket.samples.len() {
        let current = bucket.samples[j];
        let current_field = index.sample(current).field;

        for k in 0..j {
            let test = bucket.samples[k];
            if index.sample(test).field == current_field {
                continue;
            }
            local.pairwise_test(index, current, test, false);
        }

        for &neighbor_id in &owned {
            if let Some(neighbor) = index.get(neighbor_id) {
                for &test in &neighbor.samples {
                    if index.sample(test).field == current_field {
                        continue;
                    }
                    local.pairwise_test(index, current, test, true);
                }
            }
        }
    }
}

/// The full best-match table of one run.
struct MatchTable {
    radius: f64,
    best: Vec<BestMatch>,
    /// Whether the sample got within-radius evidence it would have seen by
    /// the end of its own visit: its own initiations, or any cross-bucket
    /// pair involving its bucket (those all complete no later than the
    /// bucket's visit). This is what the single pass counts.
    countable: Vec<bool>,
    tests: u64,
}

impl MatchTable {
    fn new(num_samples: usize, radius: f64) -> Self {
        MatchTable {
            radius,
            best: vec![
                BestMatch {
                    partner: None,
                    distance: radius,
                };
                num_samples
            ],
            countable: vec![false; num_samples],
            tests: 0,
        }
    }

    fn pairwise_test(
        &mut self,
        index: &PixelIndex,
        current: SampleId,
        test: SampleId,
        mutual_countable: bool,
    ) {
        self.tests += 1;
        let a = index.sample(current);
        let b = index.sample(test);

        // Bounding pre-filter: the great-circle distance is at least the
        // declination difference, so skip the trigonometry when that
        // alone exceeds the radius.
        if (a.dec - b.dec).abs() > self.radius {
            return;
        }

        let distance = healpix::angular_separation(&a.vector, &b.vector);
        if distance < self.best[current.as_usize()].distance {
            self.best[current.as_usize()] = BestMatch {
                partner: Some(test),
                distance,
            };
        }
        if distance < self.best[test.as_usize()].distance {
            self.best[test.as_usize()] = BestMatch {
                partner: Some(current),
                distance,
            };
        }
        if distance < self.radius {
            self.countable[current.as_usize()] = true;
            if mutual_countable {
                self.countable[test.as_usize()] = true;
            }
        }
    }

    fn merge(&mut self, local: LocalTable) {
        self.tests += local.tests;
        for (sample, candidate) in local.best {
            if candidate.distance < self.best[sample as usize].distance {
                self.best[sample as usize] = candidate;
            }
        }
        for sample in local.countable {
            self.countable[sample as usize] = true;
        }
    }
}

/// One worker's candidates: sparse best-match entries plus counters.
struct LocalTable {
    radius: f64,
    best: HashMap<u32, BestMatch>,
    countable: Vec<u32>,
    tests: u64,
}

impl LocalTable {
    fn new(radius: f64) -> Self {
        LocalTable {
            radius,
            best: HashMap::new(),
            countable: Vec::new(),
            tests: 0,
        }
    }

    fn pairwise_test(
        &mut self,
        index: &PixelIndex,
        current: SampleId,
        test: SampleId,
        mutual_countable: bool,
    ) {
        self.tests += 1;
        let a = index.sample(current);
        let b = index.sample(test);
        if (a.dec - b.dec).abs() > self.radius {
            return;
        }

        let distance = healpix::angular_separation(&a.vector, &b.vector);
        let radius = self.radius;
        let entry = self.best.entry(current.0).or_insert(BestMatch {
            partner: None,
            distance: radius,
        });
        if distance < entry.distance {
            *entry = BestMatch {
                partner: Some(test),
                distance,
            };
        }
        let entry = self.best.entry(test.0).or_insert(BestMatch {
            partner: None,
            distance: radius,
        });
        if distance < entry.distance {
            *entry = BestMatch {
                partner: Some(current),
                distance,
            };
        }
        if distance < radius {
            self.countable.push(current.0);
            if mutual_countable {
                self.countable.push(test.0);
            }
        }
    }
}

/// Count matches the way the pass does: samples after the first of their
/// bucket, with within-radius evidence by their own visit.
fn finish(index: &PixelIndex, table: MatchTable) -> MatchOutcome {
    let mut matches = 0;
    for &pix in index.pixel_ids() {
        if let Some(bucket) = index.get(pix) {
            for sample in bucket.samples.iter().skip(1) {
                if table.countable[sample.as_usize()] {
                    matches += 1;
                }
            }
        }
    }
    MatchOutcome {
        matches,
        tests: table.tests,
        best: table.best,
    }
}
