//! Shared arithmetic: money, weights, basis points, and calendar months

pub mod calendar;
pub mod money;
