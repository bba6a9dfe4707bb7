//! Generative-AI collaborators: the booking concierge and ID checks.

pub mod concierge;
pub mod id_verify;
pub mod prompts;

pub use concierge::{Concierge, ConciergeReply, ReviewInput};
pub use id_verify::{IdImage, IdVerification, IdVerifier};
