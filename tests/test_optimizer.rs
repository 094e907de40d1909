use nalgebra::Matrix3;

use xtal_designer::core::cell::{TranslatedIndex, UnitCell};
use xtal_designer::engine::optimizer::CrystalOptimizer;
use xtal_designer::engine::params::{GeometricalConstraintParameters, OptimizationParameters};
use xtal_designer::model::constraining::ConstrainingCrystalStructure;
use xtal_designer::model::objective::ObjectiveCrystalStructure;
use xtal_designer::model::polyhedra::FeasiblePolyhedraConnections;

mod common;
use common::{ion_atom, ionic_pair_structure, ionic_radii};

fn geometry(exclusion_ratio: f64) -> GeometricalConstraintParameters {
    GeometricalConstraintParameters {
        minimum_exclusion_distance_ratio: exclusion_ratio,
        ..GeometricalConstraintParameters::default()
    }
}

fn quiet_parameters() -> OptimizationParameters {
    OptimizationParameters {
        repulsive_force_constant: 0.0,
        attractive_force_constant: 0.0,
        atom_step_size: 0.0,
        cell_step_size: 0.0,
        pressure: 0.0,
        feasible_error_rate: 0.0,
        max_optimizing_steps: 1,
        record_interval: 1,
    }
}

fn pair_distance(objective: &ObjectiveCrystalStructure) -> f64 {
    (objective.atoms()[1].position - objective.atoms()[0].position).norm()
}

#[test]
fn exclusion_violation_separates_monotonically() {
    // Overlapping attractive pair without a bond: the exclusion kernel must
    // push the atoms apart step by step.
    let mut structure = ionic_pair_structure(10.0, 0.5, 1);
    structure.set_geometrical_parameters(&geometry(0.9));
    let mut objective = ObjectiveCrystalStructure::new(&structure);
    assert_eq!(objective.ionic_excluded(), &[(0, 1)]);

    let parameters = OptimizationParameters {
        repulsive_force_constant: 1.0,
        atom_step_size: 0.01,
        ..quiet_parameters()
    };
    let optimizer = CrystalOptimizer::new(parameters, &geometry(0.9));

    let mut previous = pair_distance(&objective);
    for _ in 0..100 {
        optimizer.step(&mut objective).unwrap();
        let current = pair_distance(&objective);
        assert!(current >= previous - 1e-12);
        previous = current;
    }

    // The pair ends outside the exclusion minimum 0.9 * (1.2 + 1.0).
    assert!(previous > 1.9);
    assert!(objective.is_feasible(0.0, 0.9));
}

#[test]
fn stretched_bond_converges_back_into_the_window() {
    let mut structure = ionic_pair_structure(20.0, 3.2, 1);
    structure.create_ionic_bond(0, TranslatedIndex::in_cell(1));
    let mut objective = ObjectiveCrystalStructure::new(&structure);
    assert_eq!(objective.ionic_bonded(), &[(0, 1)]);

    let parameters = OptimizationParameters {
        attractive_force_constant: 1.0,
        atom_step_size: 0.01,
        ..quiet_parameters()
    };
    let optimizer = CrystalOptimizer::new(parameters, &geometry(0.9));

    let mut previous = pair_distance(&objective);
    for _ in 0..100 {
        optimizer.step(&mut objective).unwrap();
        let current = pair_distance(&objective);
        assert!(current <= previous + 1e-12);
        previous = current;
    }

    // Summed ionic maxima: 1.2 + 1.0.
    assert!(previous <= 2.2 + 1e-9);
    assert!(previous >= 1.8 - 1e-9);
}

#[test]
fn compressed_bond_is_pushed_open() {
    let mut structure = ionic_pair_structure(20.0, 1.2, 1);
    structure.create_ionic_bond(0, TranslatedIndex::in_cell(1));
    let mut objective = ObjectiveCrystalStructure::new(&structure);

    let parameters = OptimizationParameters {
        repulsive_force_constant: 1.0,
        atom_step_size: 0.01,
        ..quiet_parameters()
    };
    let optimizer = CrystalOptimizer::new(parameters, &geometry(0.9));

    for _ in 0..100 {
        optimizer.step(&mut objective).unwrap();
    }

    // Summed ionic minima: 1.0 + 0.8.
    assert!(pair_distance(&objective) >= 1.8 - 1e-9);
}

#[test]
fn pressure_step_alone_is_a_positive_multiple_of_the_volume_gradient() {
    // Frozen, empty structure: only the pressure term acts on the cell.
    let structure = ConstrainingCrystalStructure::with_seed(
        UnitCell::cubic(2.0),
        Vec::new(),
        FeasiblePolyhedraConnections::unconstrained(),
        1,
    );
    let mut objective = ObjectiveCrystalStructure::new(&structure);

    let parameters = OptimizationParameters {
        pressure: 0.5,
        cell_step_size: 0.1,
        ..quiet_parameters()
    };
    let optimizer = CrystalOptimizer::new(parameters, &geometry(0.9));

    let before = *objective.cell().basis();
    optimizer.step(&mut objective).unwrap();
    let after = *objective.cell().basis();

    // For a cubic cell, B^-T * |det B| = a^2 * I; the applied deformation
    // must be eta * p * a^2 * I with a positive coefficient.
    let delta = after - before;
    let expected = Matrix3::from_diagonal_element(0.1 * 0.5 * 4.0);
    assert!((delta - expected).norm() < 1e-12);
    assert!(after.determinant() > before.determinant());
}

#[test]
fn translated_pairs_feel_the_image_translation() {
    // Two like-charged ions near opposite faces: the nearest contact runs
    // through the cell boundary, so the repulsion must act on the image
    // pair and push the in-cell distance down is wrong; it must grow the
    // boundary distance by moving the atoms apart across the face.
    let atoms = vec![
        ion_atom(12, 2, ionic_radii(0.6, 0.9, 1.2), [0.3, 1.5, 1.5]),
        ion_atom(12, 2, ionic_radii(0.6, 0.9, 1.2), [2.7, 1.5, 1.5]),
    ];
    let mut structure = ConstrainingCrystalStructure::with_seed(
        UnitCell::cubic(3.0),
        atoms,
        FeasiblePolyhedraConnections::unconstrained(),
        5,
    );
    structure.set_geometrical_parameters(&geometry(0.9));
    structure.update_tracing_index_pairs();
    structure.create_interatomic_distance_constraints();

    let mut objective = ObjectiveCrystalStructure::new(&structure);
    assert!(!objective.translated_ionic_repulsed().is_empty());

    let parameters = OptimizationParameters {
        repulsive_force_constant: 1.0,
        atom_step_size: 0.005,
        ..quiet_parameters()
    };
    let optimizer = CrystalOptimizer::new(parameters, &geometry(0.9));

    let boundary_distance = |objective: &ObjectiveCrystalStructure| {
        xtal_designer::core::spatial::minimum_image_distance_sq(
            objective.cell(),
            &objective.atoms()[0].position,
            &objective.atoms()[1].position,
        )
        .sqrt()
    };

    let before = boundary_distance(&objective);
    for _ in 0..50 {
        optimizer.step(&mut objective).unwrap();
    }
    let after = boundary_distance(&objective);

    // Initial boundary separation 0.6 is far below the repulsion minimum
    // 2.4; the kernel must widen it.
    assert!(before < 0.7);
    assert!(after > before);
}

#[test]
fn in_window_pairs_feel_no_force() {
    let mut structure = ionic_pair_structure(20.0, 2.0, 1);
    structure.create_ionic_bond(0, TranslatedIndex::in_cell(1));
    let mut objective = ObjectiveCrystalStructure::new(&structure);

    let parameters = OptimizationParameters {
        repulsive_force_constant: 1.0,
        attractive_force_constant: 1.0,
        atom_step_size: 0.05,
        ..quiet_parameters()
    };
    let optimizer = CrystalOptimizer::new(parameters, &geometry(0.9));

    let before = pair_distance(&objective);
    for _ in 0..10 {
        optimizer.step(&mut objective).unwrap();
    }
    assert!((pair_distance(&objective) - before).abs() < 1e-12);
}
