//! Hot-reload reinstancing for Tether.
//!
//! When a managed module is rebuilt, the registry materializes new native
//! type objects next to the old ones. [`Reinstancer`] collects those
//! replacements and, in one pass, points every graph pin, function binding,
//! data table and live object at the new types before retiring the old ones.

pub mod batch;
pub mod error;
pub mod pin;
pub mod reinstancer;

pub use batch::{ReinstancingBatch, ResolvedBatch, TypePair};
pub use error::ReloadError;
pub use pin::{EnumIndex, PinUpdate, try_update_pin};
pub use reinstancer::{ReinstancePhase, ReinstanceReport, Reinstancer};
