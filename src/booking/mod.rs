//! The booking wizard: accumulator, step tables, slot rules, and the
//! state machine that ties them together.

pub mod model;
pub mod routes;
pub mod schedule;
pub mod state;
pub mod wizard;

pub use model::{BookingData, BookingPatch, BookingPattern, BookingType};
pub use routes::{ContextFactory, MountRequest, WizardRouteState, wizard_routes};
pub use schedule::SlotPolicy;
pub use state::{Field, StepKind, WizardGate};
pub use wizard::{BookingWizard, SubmitOutcome, WizardContext, WizardStatus};
