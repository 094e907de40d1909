use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::core::domain::element_symbol;
use crate::core::spatial;
use crate::symmetry::{SymmetrizedStructure, SymmetryOp};

/// Writes the structure as a CIF with the record layout downstream tooling
/// parses: formulas, the International Tables number, the equivalent-position
/// loop, and the atom-site loop.
pub fn write_cif<W: Write>(
    writer: &mut W,
    structure: &SymmetrizedStructure,
    space_group: u16,
    operations: &[SymmetryOp],
) -> io::Result<()> {
    writeln!(
        writer,
        "_chemical_formula_structural  '{}'",
        structural_formula(structure)
    )?;
    writeln!(writer, "_chemical_formula_sum         '{}'", sum_formula(structure))?;
    writeln!(writer, "_symmetry_Int_Tables_number   {space_group}")?;

    writeln!(writer, "loop_ _symmetry_equiv_pos_site_id _symmetry_equiv_pos_as_xyz")?;
    for (index, operation) in operations.iter().enumerate() {
        writeln!(writer, " {}    {}", index + 1, operation.to_xyz_triplet())?;
    }

    writeln!(writer, "loop_")?;
    writeln!(writer, " _atom_site_label _atom_site_type_symbol _atom_site_symmetry_multiplicity")?;
    writeln!(
        writer,
        " _atom_site_Wyckoff_symbol _atom_site_fract_x _atom_site_fract_y _atom_site_fract_z"
    )?;
    writeln!(writer, " _atom_site_occupancy")?;

    for site in &structure.sites {
        let wrapped = spatial::wrap_position(&structure.cell, &site.position);
        let fractional = structure.cell.to_fractional(&wrapped);
        writeln!(
            writer,
            " {} {} {} {} {:.9} {:.9} {:.9} 1.0",
            site.label,
            site.species.symbol(),
            site.multiplicity.max(1),
            site.wyckoff,
            fractional.x,
            fractional.y,
            fractional.z
        )?;
    }

    Ok(())
}

fn element_counts(structure: &SymmetrizedStructure) -> BTreeMap<u8, usize> {
    let mut counts = BTreeMap::new();
    for site in &structure.sites {
        *counts.entry(site.species.atomic_number).or_insert(0) += 1;
    }
    counts
}

/// Raw per-cell formula, e.g. `Mg4 O4`.
pub fn sum_formula(structure: &SymmetrizedStructure) -> String {
    format_counts(element_counts(structure))
}

/// Formula with counts reduced by their greatest common divisor, e.g. `Mg O`.
pub fn structural_formula(structure: &SymmetrizedStructure) -> String {
    let mut counts = element_counts(structure);
    let divisor = counts.values().copied().fold(0, gcd);
    if divisor > 1 {
        for count in counts.values_mut() {
            *count /= divisor;
        }
    }
    format_counts(counts)
}

fn format_counts(counts: BTreeMap<u8, usize>) -> String {
    counts
        .into_iter()
        .map(|(z, count)| {
            if count == 1 {
                element_symbol(z).to_string()
            } else {
                format!("{}{}", element_symbol(z), count)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::UnitCell;
    use crate::core::domain::IonicSpecies;
    use crate::symmetry::CrystallographicSite;
    use nalgebra::Point3;

    fn rock_salt_pair() -> SymmetrizedStructure {
        let cell = UnitCell::cubic(4.0);
        let mut sites = vec![
            CrystallographicSite::new(IonicSpecies::new(11, 1), Point3::new(0.0, 0.0, 0.0)),
            CrystallographicSite::new(IonicSpecies::new(17, -1), Point3::new(2.0, 0.0, 0.0)),
        ];
        for (index, site) in sites.iter_mut().enumerate() {
            site.label = format!("{}{}", site.species.symbol(), index + 1);
            site.wyckoff = 'a';
            site.site_symmetry = "1".into();
            site.multiplicity = 1;
        }
        SymmetrizedStructure::new(cell, sites)
    }

    #[test]
    fn formulas_reduce_by_gcd() {
        let structure = rock_salt_pair();
        assert_eq!(sum_formula(&structure), "Na Cl");
        assert_eq!(structural_formula(&structure), "Na Cl");
    }

    #[test]
    fn cif_records_are_in_order() {
        let structure = rock_salt_pair();
        let mut buffer = Vec::new();
        write_cif(&mut buffer, &structure, 1, &[SymmetryOp::identity()]).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("_chemical_formula_structural  'Na Cl'"));
        assert!(lines[1].starts_with("_chemical_formula_sum         'Na Cl'"));
        assert_eq!(lines[2], "_symmetry_Int_Tables_number   1");
        assert_eq!(lines[3], "loop_ _symmetry_equiv_pos_site_id _symmetry_equiv_pos_as_xyz");
        assert_eq!(lines[4], " 1    x,y,z");
        assert!(text.contains(" Na1 Na 1 a 0.000000000 0.000000000 0.000000000 1.0"));
        assert!(text.contains(" Cl2 Cl 1 a 0.500000000 0.000000000 0.000000000 1.0"));
    }
}
