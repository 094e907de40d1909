use nalgebra::{Matrix3, Point3};
use std::io::{self, Write};

use crate::core::domain::element_symbol;

/// Writes one trajectory frame: atom count, elapsed-count line with an
/// optional evaluation value, the basis block, and one line per atom with
/// the zeroed velocity/force columns downstream viewers expect.
pub fn write_frame<W: Write>(
    writer: &mut W,
    basis: &Matrix3<f64>,
    atoms: &[(u8, Point3<f64>)],
    elapsed_count: usize,
    evaluation: Option<(&str, f64)>,
) -> io::Result<()> {
    writeln!(writer, "{}", atoms.len())?;

    match evaluation {
        Some((name, value)) => {
            writeln!(writer, "  elapsed_count=  {elapsed_count} ()  {name}=  {value:.9}  ")?
        }
        None => writeln!(writer, "  elapsed_count=  {elapsed_count} ()  ")?,
    }

    for c in 0..3 {
        let column = basis.column(c);
        writeln!(
            writer,
            "  {:>15.9}  {:>15.9}  {:>15.9}",
            column[0], column[1], column[2]
        )?;
    }

    for (z, position) in atoms {
        writeln!(
            writer,
            "  {}  {:>15.9}  {:>15.9}  {:>15.9}  0.0  0.0  0.0  0.0  0.0  0.0  0.0  0.0  0.0  \
             0.0  0.0  0.0  0.0",
            element_symbol(*z),
            position.x,
            position.y,
            position.z
        )?;
    }

    Ok(())
}
