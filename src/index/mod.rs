//! Spatial index: every sample bucketed by its HEALPix pixel.
//!
//! [`PixelIndex::build`] walks the fields once, pixelizes each sample, and
//! appends it to its pixel's [`PixelBucket`], creating the bucket (and
//! its precomputed 8-direction neighbor list) on first touch. Buckets
//! live in one of two interchangeable backends chosen at build time
//! ([`BackendKind`]): a dense one-slot-per-pixel array or an AVL tree over
//! populated pixels only. Both answer [`PixelIndex::get`] identically;
//! the choice moves memory/time constants only.
//!
//! The index owns bucket and backend storage plus per-sample derived
//! records ([`SampleRecord`]); the catalog keeps ownership of the samples
//! themselves. Dropping the index never touches catalog memory.

mod dense;
mod tree;

use serde::Serialize;

use crate::catalog::{Field, Sample};
use crate::errors::{CrossmatchError, Result};
use crate::healpix;

use dense::DenseStore;
use tree::TreeStore;

/// Dense index of a sample inside the index, assigned in field → set →
/// sample traversal order during [`PixelIndex::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SampleId(pub u32);

impl SampleId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Backend policy for bucket storage. A closed choice: exactly these two
/// exist, fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// One slot per possible pixel. O(1) lookup, memory proportional to
    /// the pixel count at the build order.
    DenseArray,
    /// AVL tree over populated pixels. O(log n) lookup, memory
    /// proportional to sky coverage.
    BalancedTree,
}

/// Per-sample state derived at build time: where the sample lives in the
/// catalogs, and the geometry the matcher needs.
#[derive(Debug, Clone, Serialize)]
pub struct SampleRecord {
    /// Index of the owning field in the build's field list.
    pub field: u32,
    /// Index of the owning set within the field.
    pub set: u32,
    /// Position within the set.
    pub pos: u32,
    /// The sample's own catalog identifier.
    pub catalog_id: i64,
    /// Right ascension in radians.
    pub ra: f64,
    /// Declination in radians (the matcher's bounding pre-filter axis).
    pub dec: f64,
    /// Unit vector for great-circle distance.
    pub vector: [f64; 3],
    /// The pixel this sample fell into.
    pub pix: u64,
}

/// One non-empty pixel: the samples that fell inside it, its up-to-8
/// neighbor pixel ids, and the per-direction pair-dedup flags.
#[derive(Debug, Clone)]
pub struct PixelBucket {
    pub id: u64,
    /// Samples in insertion order (append-only; ids, never owned samples).
    pub samples: Vec<SampleId>,
    /// Neighbor pixel ids, computed once when the bucket is created.
    /// `None` entries are the missing diagonals at face-corner junctions.
    pub neighbors: [Option<u64>; 8],
    /// Per-direction "this bucket pair was already tested" flags,
    /// write-once per direction per matcher run.
    pub(crate) tested: [bool; 8],
}

impl PixelBucket {
    fn new(id: u64, order: u32) -> Self {
        PixelBucket {
            id,
            samples: Vec::new(),
            neighbors: healpix::neighbors_nest(order, id),
            tested: [false; 8],
        }
    }

    fn push_sample(&mut self, sample: SampleId) -> Result<()> {
        self.samples
            .try_reserve(1)
            .map_err(|_| CrossmatchError::Allocation("bucket sample list"))?;
        self.samples.push(sample);
        Ok(())
    }
}

#[derive(Debug)]
enum BucketStore {
    Dense(DenseStore),
    Tree(TreeStore),
}

impl BucketStore {
    fn get(&self, pix: u64) -> Option<&PixelBucket> {
        match self {
            BucketStore::Dense(store) => store.get(pix),
            BucketStore::Tree(store) => store.get(pix),
        }
    }

    fn get_mut(&mut self, pix: u64) -> Option<&mut PixelBucket> {
        match self {
            BucketStore::Dense(store) => store.get_mut(pix),
            BucketStore::Tree(store) => store.get_mut(pix),
        }
    }

    fn get_or_insert(&mut self, pix: u64, order: u32) -> Result<(&mut PixelBucket, bool)> {
        match self {
            BucketStore::Dense(store) => Ok(store.get_or_insert(pix, order)),
            BucketStore::Tree(store) => store.get_or_insert(pix, order),
        }
    }

    fn clear_tested_flags(&mut self, pixel_ids: &[u64]) {
        match self {
            BucketStore::Dense(store) => store.clear_tested_flags(pixel_ids),
            BucketStore::Tree(store) => store.clear_tested_flags(),
        }
    }
}

/// The spatial index: all buckets, the ordered list of populated pixel
/// ids, the per-sample records, and the configured search radius.
///
/// Built once per cross-match run, consumed by one matcher pass, then
/// dropped. Drop releases buckets and backend structures only.
#[derive(Debug)]
pub struct PixelIndex {
    store: BucketStore,
    pixel_ids: Vec<u64>,
    samples: Vec<SampleRecord>,
    order: u32,
    max_radius: f64,
}

impl PixelIndex {
    /// Bucket every sample of `fields` at the given order.
    ///
    /// Each non-empty pixel appears exactly once in [`pixel_ids`], in
    /// first-touch order; each sample is appended to exactly one bucket
    /// exactly once, and gets a [`SampleId`] equal to its record's
    /// position.
    ///
    /// [`pixel_ids`]: PixelIndex::pixel_ids
    pub fn build(fields: &[Field], order: u32, backend: BackendKind) -> Result<PixelIndex> {
        if !healpix::is_valid_order(order) {
            return Err(CrossmatchError::InvalidResolution(order));
        }
        let store = match backend {
            BackendKind::DenseArray => BucketStore::Dense(DenseStore::new(healpix::npix(order))?),
            BackendKind::BalancedTree => BucketStore::Tree(TreeStore::new()),
        };
        let mut index = PixelIndex {
            store,
            pixel_ids: Vec::new(),
            samples: Vec::new(),
            order,
            max_radius: 0.0,
        };
        for (field_idx, field) in fields.iter().enumerate() {
            for (set_idx, set) in field.sets.iter().enumerate() {
                for (pos, sample) in set.samples.iter().enumerate() {
                    index.insert(field_idx as u32, set_idx as u32, pos as u32, sample)?;
                }
            }
        }
        Ok(index)
    }

    fn insert(&mut self, field: u32, set: u32, pos: u32, sample: &Sample) -> Result<()> {
        let pix = healpix::ang2pix_nest(self.order, sample.ra, sample.dec);
        self.samples
            .try_reserve(1)
            .map_err(|_| CrossmatchError::Allocation("sample records"))?;
        let id = SampleId(self.samples.len() as u32);
        self.samples.push(SampleRecord {
            field,
            set,
            pos,
            catalog_id: sample.id,
            ra: sample.ra,
            dec: sample.dec,
            vector: healpix::unit_vector(sample.ra, sample.dec),
            pix,
        });

        let created = {
            let (bucket, created) = self.store.get_or_insert(pix, self.order)?;
            bucket.push_sample(id)?;
            created
        };
        if created {
            self.pixel_ids
                .try_reserve(1)
                .map_err(|_| CrossmatchError::Allocation("pixel id list"))?;
            self.pixel_ids.push(pix);
        }
        Ok(())
    }

    /// Bucket for `pix`, or `None` for an empty/absent pixel — a normal
    /// negative result, not an error.
    pub fn get(&self, pix: u64) -> Option<&PixelBucket> {
        self.store.get(pix)
    }

    /// Populated pixel ids in first-touch order. The matcher's iteration
    /// order.
    pub fn pixel_ids(&self) -> &[u64] {
        &self.pixel_ids
    }

    pub fn num_pixels(&self) -> usize {
        self.pixel_ids.len()
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn sample(&self, id: SampleId) -> &SampleRecord {
        &self.samples[id.as_usize()]
    }

    pub fn samples(&self) -> &[SampleRecord] {
        &self.samples
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Store the search radius used as each sample's initial best-match
    /// distance sentinel. The matcher calls this once before its pass.
    pub fn set_max_radius(&mut self, radius: f64) {
        self.max_radius = radius;
    }

    pub fn max_radius(&self) -> f64 {
        self.max_radius
    }

    /// Clear all pair-dedup flags so a fresh matcher pass sees them
    /// write-once again.
    pub(crate) fn clear_tested_flags(&mut self) {
        self.store.clear_tested_flags(&self.pixel_ids);
    }

    /// Claim every not-yet-tested (bucket, neighbor) pair around `pix`:
    /// mark the flags on both sides and return the claimed neighbor ids.
    /// Neighbors that are absent or empty are skipped without marking;
    /// they can never become populated later.
    pub(crate) fn claim_neighbor_pairs(&mut self, pix: u64) -> Vec<u64> {
        let (own_id, neighbors, tested) = match self.get(pix) {
            Some(bucket) => (bucket.id, bucket.neighbors, bucket.tested),
            None => return Vec::new(),
        };
        let mut claimed: Vec<u64> = Vec::with_capacity(8);
        for dir in 0..8 {
            let neighbor_id = match neighbors[dir] {
                Some(id) => id,
                None => continue,
            };
            // At nside = 1 a neighbor can appear under two directions;
            // the claimed list keeps the pair single-shot anyway.
            if neighbor_id == own_id || tested[dir] || claimed.contains(&neighbor_id) {
                continue;
            }
            if self.get(neighbor_id).is_none() {
                continue;
            }
            if let Some(bucket) = self.store.get_mut(pix) {
                for d in 0..8 {
                    if bucket.neighbors[d] == Some(neighbor_id) {
                        bucket.tested[d] = true;
                    }
                }
            }
            if let Some(neighbor) = self.store.get_mut(neighbor_id) {
                for d in 0..8 {
                    if neighbor.neighbors[d] == Some(pix) {
                        neighbor.tested[d] = true;
                    }
                }
            }
            claimed.push(neighbor_id);
        }
        claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Sample;

    fn field_of(points: &[(i64, f64, f64)]) -> Field {
        Field::from_samples(
            points
                .iter()
                .map(|&(id, ra, dec)| Sample::from_degrees(id, ra, dec))
                .collect(),
        )
    }

    fn spread_fields() -> Vec<Field> {
        vec![
            field_of(&[(1, 10.0, 10.0), (2, 10.001, 10.001), (3, 200.0, -45.0)]),
            field_of(&[(1, 10.0005, 10.0005), (2, 95.0, 70.0)]),
        ]
    }

    #[test]
    fn test_build_assigns_every_sample_once() {
        for backend in [BackendKind::DenseArray, BackendKind::BalancedTree] {
            let fields = spread_fields();
            let index = PixelIndex::build(&fields, 6, backend).unwrap();
            assert_eq!(index.num_samples(), 5);

            let mut seen = vec![0u32; index.num_samples()];
            for &pix in index.pixel_ids() {
                let bucket = index.get(pix).unwrap();
                assert_eq!(bucket.id, pix);
                for sid in &bucket.samples {
                    seen[sid.as_usize()] += 1;
                    assert_eq!(index.sample(*sid).pix, pix);
                }
            }
            assert!(seen.iter().all(|&n| n == 1));
        }
    }

    #[test]
    fn test_pixel_ids_distinct_and_populated() {
        let fields = spread_fields();
        let index = PixelIndex::build(&fields, 6, BackendKind::BalancedTree).unwrap();
        let mut ids = index.pixel_ids().to_vec();
        ids.sort_unstable();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before);
        for &pix in index.pixel_ids() {
            assert!(!index.get(pix).unwrap().samples.is_empty());
        }
    }

    #[test]
    fn test_backends_agree() {
        let fields = spread_fields();
        let dense = PixelIndex::build(&fields, 6, BackendKind::DenseArray).unwrap();
        let tree = PixelIndex::build(&fields, 6, BackendKind::BalancedTree).unwrap();

        assert_eq!(dense.pixel_ids(), tree.pixel_ids());
        for &pix in dense.pixel_ids() {
            let a = dense.get(pix).unwrap();
            let b = tree.get(pix).unwrap();
            assert_eq!(a.samples, b.samples);
            assert_eq!(a.neighbors, b.neighbors);
        }
    }

    #[test]
    fn test_get_absent_pixel_is_none() {
        let fields = spread_fields();
        let index = PixelIndex::build(&fields, 6, BackendKind::BalancedTree).unwrap();
        // A valid pixel id nothing fell into.
        let empty = (0..crate::healpix::npix(6))
            .find(|p| !index.pixel_ids().contains(p))
            .unwrap();
        assert!(index.get(empty).is_none());
    }

    #[test]
    fn test_invalid_order_rejected() {
        let fields = spread_fields();
        let err = PixelIndex::build(&fields, 30, BackendKind::BalancedTree).unwrap_err();
        assert!(matches!(err, CrossmatchError::InvalidResolution(30)));
    }

    #[test]
    fn test_claim_neighbor_pairs_marks_both_sides() {
        // Two samples in adjacent pixels.
        let fields = vec![
            field_of(&[(1, 0.0877, 0.0)]),
            field_of(&[(1, 0.0880, 0.0)]),
        ];
        let mut index = PixelIndex::build(&fields, 10, BackendKind::BalancedTree).unwrap();
        assert_eq!(index.num_pixels(), 2);
        let first = index.pixel_ids()[0];
        let second = index.pixel_ids()[1];

        let claimed = index.claim_neighbor_pairs(first);
        assert_eq!(claimed, vec![second]);

        // The reciprocal claim must now be a no-op.
        assert!(index.claim_neighbor_pairs(second).is_empty());
        // And re-claiming from the first side too.
        assert!(index.claim_neighbor_pairs(first).is_empty());
    }

    #[test]
    fn test_set_max_radius() {
        let fields = spread_fields();
        let mut index = PixelIndex::build(&fields, 6, BackendKind::BalancedTree).unwrap();
        index.set_max_radius(1.5e-5);
        assert_eq!(index.max_radius(), 1.5e-5);
    }
}
