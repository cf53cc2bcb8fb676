pub mod artifacts;
pub mod controller;
pub mod drift;
pub mod harvest;
pub mod job;
pub mod reconcile;
