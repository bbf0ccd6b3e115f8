//! Nearest-neighbor cross-matching of astronomical catalogs.
//!
//! Finds, for every sample in a set of catalogs placed on the celestial
//! sphere, its nearest counterpart from a *different* catalog within a
//! fixed angular radius — a spatial join over up to millions of points.
//! Samples are bucketed by HEALPix pixel with precomputed adjacency, so
//! the pairwise work is confined to same-cell and neighboring-cell
//! candidates and scales near-linearly instead of O(n²).
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`catalog`] | [`Field`]/[`Set`]/[`Sample`] data model, ASCII catalog loading |
//! | [`healpix`] | Nested-scheme pixelization, neighbor enumeration, angular separation |
//! | [`index`] | [`PixelIndex`]: samples bucketed per pixel, dense-array or AVL-tree backend |
//! | [`matching`] | The cross-matcher: sequential and parallel runners, [`MatchOutcome`] |
//!
//! # Quick Start
//!
//! ```
//! use celestial_crossmatch::{cross_fields, BackendKind, Field, MatchParams, Sample};
//!
//! let reference = Field::from_samples(vec![Sample::from_degrees(1, 180.0, -30.0)]);
//! let observed = Field::from_samples(vec![Sample::from_degrees(1, 180.0001, -30.0)]);
//!
//! let outcome = cross_fields(
//!     &[reference, observed],
//!     &MatchParams {
//!         order: 8,
//!         radius_arcsec: 2.0,
//!         backend: BackendKind::BalancedTree,
//!         parallel: false,
//!     },
//! )?;
//! println!("{} matches in {} pairwise tests", outcome.match_count(), outcome.test_count());
//! # Ok::<(), celestial_crossmatch::CrossmatchError>(())
//! ```
//!
//! # Features
//!
//! - **`cli`** — Enables the `xmatch` binary for cross-matching ASCII
//!   catalogs from the command line.

pub mod catalog;
pub mod constants;
pub mod errors;
pub mod healpix;
pub mod index;
pub mod matching;

pub use catalog::{Field, MatchBundle, Sample, Set};
pub use errors::{CrossmatchError, Result};
pub use index::{BackendKind, PixelIndex, SampleId};
pub use matching::{cross_fields, BestMatch, MatchOutcome, MatchParams};
