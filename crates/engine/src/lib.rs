//! Ingestion and workflow services over the dispute store.
//!
//! This crate hosts the two write paths of the system:
//!
//! 1. **Ingestion** (`ingest`) turns a raw webhook envelope into a durable,
//!    idempotent dispute record: payload archival, gateway normalization,
//!    create-or-update resolution, round-robin analyst assignment under the
//!    per-merchant cursor lock, notification fan-out, and a best-effort
//!    audit record after the transaction resolves.
//! 2. **Workflow transitions** (`workflow`) apply staff actions
//!    (submit / accept / reject) to a dispute through the stage machine,
//!    guarded against concurrent transitions.
//!
//! Both services own their transactions; repositories only ever join one.
//! External collaborators (gateway normalizer, clock, audit sink) enter
//! through traits so tests can substitute them.

pub mod audit;
pub mod clock;
pub mod errors;
pub mod ingest;
pub mod normalizer;
pub mod workflow;

pub use audit::TracingAuditSink;
pub use clock::{Clock, SystemClock};
pub use errors::{IngestError, TransitionError};
pub use ingest::IngestionPipeline;
pub use normalizer::{GatewayNormalizer, JsonNormalizer};
pub use workflow::{FeedbackInput, WorkflowService};
