//! Catalog data model and ASCII loading.
//!
//! A [`Field`] is one input catalog, holding ordered [`Set`]s of
//! [`Sample`]s; a set's samples share one source image. Samples own their
//! sky coordinates in both radians and degrees. The spatial index and the
//! matcher only ever borrow fields — sample lifetime belongs here.
//!
//! The ASCII reader accepts one sample per line, whitespace-separated
//! `id ra_deg dec_deg` columns, with `#` comment lines. FITS tables and
//! WCS conversion are out of scope for this crate.

use crate::constants::DEG_TO_RAD;
use crate::errors::{CrossmatchError, Result};
use std::fs;
use std::path::Path;

/// One catalog entry placed on the celestial sphere.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Catalog identifier (the extraction "number" in source-extractor
    /// style catalogs).
    pub id: i64,
    /// Right ascension in radians.
    pub ra: f64,
    /// Declination in radians.
    pub dec: f64,
    /// Right ascension in degrees.
    pub ra_deg: f64,
    /// Declination in degrees.
    pub dec_deg: f64,
}

impl Sample {
    pub fn from_degrees(id: i64, ra_deg: f64, dec_deg: f64) -> Self {
        Sample {
            id,
            ra: ra_deg * DEG_TO_RAD,
            dec: dec_deg * DEG_TO_RAD,
            ra_deg,
            dec_deg,
        }
    }
}

/// An ordered sequence of samples sharing one source image.
#[derive(Debug, Clone, Default)]
pub struct Set {
    pub samples: Vec<Sample>,
}

/// One input catalog: an ordered sequence of sets.
#[derive(Debug, Clone, Default)]
pub struct Field {
    pub sets: Vec<Set>,
}

impl Field {
    /// A field holding a single set of samples. The shape every ASCII
    /// catalog loads into.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Field {
            sets: vec![Set { samples }],
        }
    }

    /// Read an ASCII catalog file into a single-set field.
    pub fn open_ascii<P: AsRef<Path>>(path: P) -> Result<Field> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        parse_ascii(&content, &path.display().to_string())
    }

    /// Total number of samples across all sets.
    pub fn num_samples(&self) -> usize {
        self.sets.iter().map(|s| s.samples.len()).sum()
    }
}

/// Reserved grouping of mutually matched samples across fields
/// (friend-of-friends bundles). The matcher records pairwise best matches
/// only and never populates bundles.
#[derive(Debug, Clone, Default)]
pub struct MatchBundle {
    pub samples: Vec<crate::index::SampleId>,
}

/// Parse ASCII catalog content. `origin` names the source in errors.
pub fn parse_ascii(content: &str, origin: &str) -> Result<Field> {
    let mut samples = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        samples.push(parse_sample_line(trimmed).map_err(|message| CrossmatchError::Parse {
            path: origin.to_string(),
            line: lineno + 1,
            message,
        })?);
    }
    Ok(Field::from_samples(samples))
}

fn parse_sample_line(line: &str) -> std::result::Result<Sample, String> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.len() < 3 {
        return Err(format!("expected 3 columns, got {}", columns.len()));
    }
    let id: i64 = columns[0]
        .parse()
        .map_err(|_| format!("bad id: {}", columns[0]))?;
    let ra_deg: f64 = columns[1]
        .parse()
        .map_err(|_| format!("bad ra: {}", columns[1]))?;
    let dec_deg: f64 = columns[2]
        .parse()
        .map_err(|_| format!("bad dec: {}", columns[2]))?;
    if !(-90.0..=90.0).contains(&dec_deg) {
        return Err(format!("dec out of range: {}", dec_deg));
    }
    Ok(Sample::from_degrees(id, ra_deg, dec_deg))
}
