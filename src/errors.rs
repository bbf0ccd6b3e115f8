//! Error types for catalog cross-matching.
//!
//! The failure surface of the core is narrow: either a precondition is
//! violated before any work begins ([`InvalidResolution`]), or a growable
//! structure cannot reserve memory while samples are being recorded
//! ([`Allocation`]). Both are fatal to the run. Querying an empty or
//! absent cell is *not* an error — [`crate::index::PixelIndex::get`]
//! returns `None` and the matcher treats it as nothing to test.
//!
//! [`InvalidResolution`]: CrossmatchError::InvalidResolution
//! [`Allocation`]: CrossmatchError::Allocation

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrossmatchError {
    /// The resolution exponent does not correspond to a valid pixelization
    /// level.
    #[error("invalid pixelization order {0}: expected 0..={max}", max = crate::healpix::MAX_ORDER)]
    InvalidResolution(u32),

    /// A bucket or id-list could not grow. The run cannot continue since a
    /// sample could not be recorded.
    #[error("allocation failure while growing {0}")]
    Allocation(&'static str),

    /// A catalog file could not be parsed.
    #[error("parse error in {path} line {line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CrossmatchError>;
