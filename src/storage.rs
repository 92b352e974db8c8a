// Page identifiers and the page store contract
pub mod entity;
pub mod manager;
