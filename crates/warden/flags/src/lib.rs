//! Warden Flags - Effective flag values for an actor at a location
//!
//! Given an [`ApplicableRegionSet`](warden_index::ApplicableRegionSet) the
//! [`FlagValueCalculator`] answers "what is flag F for actor A here". The
//! walk is a short circuit: the first region (in priority order) whose value
//! applies to the actor decides, otherwise the flag default does.
//!
//! ```text
//! for region in applicable (highest priority first):
//!     for r in region, region.parent, ...:
//!         if r defines F and r's group selector covers the actor:
//!             return r[F]
//! return default(F)
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod calculator;

pub use calculator::FlagValueCalculator;
