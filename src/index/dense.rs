//! Dense array backend: one slot per possible pixel at the build order.
//!
//! Lookup is a single bounds-checked index. The price is upfront memory
//! proportional to the total pixel count at the resolution, which is why
//! this backend suits coarse orders or near-uniform sky coverage.

use super::PixelBucket;
use crate::errors::{CrossmatchError, Result};

#[derive(Debug)]
pub(super) struct DenseStore {
    slots: Vec<Option<Box<PixelBucket>>>,
}

impl DenseStore {
    /// Allocate the full slot table. The only large allocation of this
    /// backend happens here, so the failure path surfaces before any
    /// samples are recorded.
    pub(super) fn new(npix: u64) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(npix as usize)
            .map_err(|_| CrossmatchError::Allocation("dense pixel array"))?;
        slots.resize_with(npix as usize, || None);
        Ok(DenseStore { slots })
    }

    pub(super) fn get(&self, pix: u64) -> Option<&PixelBucket> {
        self.slots.get(pix as usize).and_then(|s| s.as_deref())
    }

    pub(super) fn get_mut(&mut self, pix: u64) -> Option<&mut PixelBucket> {
        self.slots
            .get_mut(pix as usize)
            .and_then(|s| s.as_deref_mut())
    }

    /// Bucket for `pix`, created on first touch. The boolean reports
    /// whether this call created it.
    pub(super) fn get_or_insert(&mut self, pix: u64, order: u32) -> (&mut PixelBucket, bool) {
        let slot = &mut self.slots[pix as usize];
        let created = slot.is_none();
        let bucket = slot.get_or_insert_with(|| Box::new(PixelBucket::new(pix, order)));
        (bucket.as_mut(), created)
    }

    pub(super) fn clear_tested_flags(&mut self, pixel_ids: &[u64]) {
        for &pix in pixel_ids {
            if let Some(bucket) = self.get_mut(pix) {
                bucket.tested = [false; 8];
            }
        }
    }
}
