//! Core domain types
//!
//! These types describe a unit of work as the scheduler sees it. They are
//! immutable once built and shared between the scheduler (which owns them)
//! and the job connection (which only references them while the job runs).

pub mod job;
pub mod result;
pub mod trigger;
