pub mod cell;
pub mod chemistry;
pub mod domain;
pub mod spatial;
