//! Cross-cutting request middleware.
//!
//! Order on the way in: [`segments::trace_segments`] opens the request's
//! trace segment, then [`fault_injection::inject_faults`] may reject the
//! request before its handler runs.

pub mod fault_injection;
pub mod segments;

pub use fault_injection::{ChaosSettings, FaultInjector, inject_faults};
pub use segments::{TRACE_ID_HEADER, trace_segments};
