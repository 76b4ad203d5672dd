//! Domain model (ids, tasks, steps, reports, outcomes, errors, events).

pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod report;
pub mod state;
pub mod task;

pub use self::errors::{ErrorKind, ManagerError, ServiceError, StoreError};
pub use self::events::DomainEvent;
pub use self::ids::{ParseIdError, TaskId};
pub use self::outcome::{OutcomeKind, StepOutcome};
pub use self::report::{Alert, Report, ReportSummary};
pub use self::state::{StepStatus, StepTransition, TaskStatus, TaskTransition, TransitionError};
pub use self::task::{
    PatchError, Step, StepAction, StepUpdate, Task, TaskOrigin, TaskPatch, progress_for,
};
