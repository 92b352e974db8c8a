// Page locks for strict two-phase locking
pub mod entity;
pub mod manager;
