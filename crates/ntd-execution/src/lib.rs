//! ntd-execution
//!
//! Write/lock state machine for one tag, and the collaborator contracts it
//! drives: the [`TagReader`] hardware boundary and the [`Operator`] who decides
//! what happens after a fault.
//!
//! ```text
//! Idle → Detecting → Formatting → Writing → Verifying ─┬─────────────────────→ Done
//!            ▲            │           │         │       └→ LockPending → Locking → VerifyingLock → Done
//!            └── retry ───┴───────────┴─────────┘                  ▲       │
//!                                                                  └ retry ┘
//! Failed and Skipped are reachable from every non-terminal state.
//! ```
//!
//! Nothing here retries on its own. Every fault goes to the operator.

mod machine;
mod operator;
mod reader;
mod state;

pub use machine::{CancelFlag, MachineConfig, TagRun, WriteMachine};
pub use operator::{FaultContext, FaultDecision, LockDecision, Operator};
pub use reader::{ReaderError, TagReader};
pub use state::{FailReason, Fault, TagState};
