use nalgebra::Point3;

use xtal_designer::core::cell::UnitCell;
use xtal_designer::core::domain::{AtomicRadii, CoordinationConstraints, IonicSpecies, RadiusRange};
use xtal_designer::model::atom::ConstrainingAtom;
use xtal_designer::model::constraining::ConstrainingCrystalStructure;
use xtal_designer::model::polyhedra::FeasiblePolyhedraConnections;

/// Radii for a purely ionic species.
pub fn ionic_radii(minimum: f64, maximum: f64, repulsion: f64) -> AtomicRadii {
    AtomicRadii {
        covalent: RadiusRange::zero(),
        ionic: RadiusRange::new(minimum, maximum),
        repulsion: RadiusRange::new(repulsion, repulsion),
    }
}

/// Radii for a purely covalent species.
pub fn covalent_radii(minimum: f64, maximum: f64) -> AtomicRadii {
    AtomicRadii {
        covalent: RadiusRange::new(minimum, maximum),
        ionic: RadiusRange::zero(),
        repulsion: RadiusRange::zero(),
    }
}

pub fn ion_atom(z: u8, charge: i8, radii: AtomicRadii, position: [f64; 3]) -> ConstrainingAtom {
    ConstrainingAtom::new(
        IonicSpecies::new(z, charge),
        radii,
        CoordinationConstraints::unconstrained(),
        Point3::new(position[0], position[1], position[2]),
    )
}

/// The seed scenario pair: opposite charges, ionic radii [1.0, 1.2] and
/// [0.8, 1.0], placed `separation` apart along x in a cubic cell.
pub fn ionic_pair_structure(edge: f64, separation: f64, seed: u64) -> ConstrainingCrystalStructure {
    let cation = ion_atom(11, 1, ionic_radii(1.0, 1.2, 1.0), [0.0, 0.0, 0.0]);
    let anion = ion_atom(17, -1, ionic_radii(0.8, 1.0, 1.0), [separation, 0.0, 0.0]);

    ConstrainingCrystalStructure::with_seed(
        UnitCell::cubic(edge),
        vec![cation, anion],
        FeasiblePolyhedraConnections::unconstrained(),
        seed,
    )
}

/// A cation pair bridged by `bridge_count` anions arranged on a ring between
/// them, every cation-anion pair ionically bonded. Used for polyhedra
/// pruning tests.
pub fn bridged_cation_pair(
    bridge_count: usize,
    seed: u64,
    rules: FeasiblePolyhedraConnections,
) -> ConstrainingCrystalStructure {
    use xtal_designer::core::cell::TranslatedIndex;

    let cation_radii = ionic_radii(0.9, 1.3, 1.2);
    let anion_radii = ionic_radii(0.9, 1.3, 1.2);

    let mut atoms = vec![
        ion_atom(12, 2, cation_radii, [0.0, 0.0, -1.0]),
        ion_atom(12, 2, cation_radii, [0.0, 0.0, 1.0]),
    ];
    for b in 0..bridge_count {
        let angle = 2.0 * std::f64::consts::PI * (b as f64) / (bridge_count as f64);
        atoms.push(ion_atom(8, -2, anion_radii, [1.5 * angle.cos(), 1.5 * angle.sin(), 0.0]));
    }

    let mut structure = ConstrainingCrystalStructure::with_seed(
        UnitCell::cubic(20.0),
        atoms,
        rules,
        seed,
    );
    for cation in 0..2usize {
        for anion in 0..bridge_count {
            structure.create_ionic_bond(cation, TranslatedIndex::in_cell(2 + anion));
        }
    }
    structure
}
