//! Wellness booking: a multi-step booking wizard for a therapist marketplace.

pub mod ai;
pub mod api;
pub mod booking;
pub mod config;
pub mod error;
pub mod llm;
pub mod navigation;
pub mod session;
pub mod steps;
