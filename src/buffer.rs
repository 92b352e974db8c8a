// Cached pages, handles and the pool contract
pub mod entity;
pub mod manager;
