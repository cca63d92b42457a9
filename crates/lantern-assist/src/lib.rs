//! Editor assistance on top of the Lantern caches: code inspections and import context.
//!
//! [`AssistSession`] wires the pieces together. The services can also be used on their own.

mod backend;
mod error;
mod imports;
mod inspection;
mod invalidation;
mod locate;
pub mod parse;
mod service;
mod session;

pub use backend::{AssistBackend, InspectionRequest};
pub use error::AssistError;
pub use imports::{ImportCache, ImportContextService, ImportRecord};
pub use inspection::{Inspection, Problem, ProblemPosition, Severity};
pub use invalidation::{InvalidationHandle, InvalidationSource};
pub use locate::{locate_and_store, target_symbols};
pub use parse::ResponseFormat;
pub use service::{InspectionCache, InspectionOutcome, InspectionService};
pub use session::{AssistSession, SessionStats};
