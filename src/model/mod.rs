pub mod atom;
pub mod bonds;
pub mod constraining;
pub mod neighbors;
pub mod objective;
pub mod polyhedra;
