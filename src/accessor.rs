// Tuples and the table files that place them on pages
pub mod entity;
pub mod method;
