use log::debug;
use nalgebra::Point3;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::cell::UnitCell;
use crate::core::chemistry::PairThresholdTable;
use crate::core::domain::SpeciesRecord;
use crate::core::spatial;
use crate::engine::params::GenerationParameters;
use crate::errors::DesignError;
use crate::model::atom::ConstrainingAtom;
use crate::model::constraining::ConstrainingCrystalStructure;
use crate::model::polyhedra::FeasiblePolyhedraConnections;

/// Produces random periodic starting structures for the designer: a cubic
/// cell sized from the target packing fraction, filled by random sequential
/// adsorption with pairwise collision checks under the minimum image
/// convention.
#[derive(Debug, Clone)]
pub struct RandomStructureGenerator {
    records: Vec<SpeciesRecord>,
    polyhedra_rules: FeasiblePolyhedraConnections,
    parameters: GenerationParameters,
}

impl RandomStructureGenerator {
    pub fn new(
        records: Vec<SpeciesRecord>,
        polyhedra_rules: FeasiblePolyhedraConnections,
        parameters: GenerationParameters,
    ) -> Self {
        Self { records, polyhedra_rules, parameters }
    }

    pub fn atom_count(&self) -> usize {
        self.records.iter().map(|record| record.count).sum()
    }

    /// Generates the next structure for `seed`. Identical seeds produce
    /// identical structures, including the structure's own RNG stream.
    pub fn next(&self, seed: u64) -> Result<ConstrainingCrystalStructure, DesignError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        // The exact multiset of species entries, shuffled for a random
        // placement order.
        let mut entries: Vec<&SpeciesRecord> = Vec::new();
        for record in &self.records {
            for _ in 0..record.count {
                entries.push(record);
            }
        }
        if entries.is_empty() {
            return Err(DesignError::GenerationFailure("composition is empty".into()));
        }
        entries.shuffle(&mut rng);

        let sphere_volume: f64 = entries
            .iter()
            .map(|record| {
                let r = record.radii.characteristic_radius(&record.species);
                4.0 / 3.0 * std::f64::consts::PI * r * r * r
            })
            .sum();
        let edge = (sphere_volume / self.parameters.target_packing_fraction).cbrt();
        let cell = UnitCell::cubic(edge);

        let radii: Vec<f64> = entries
            .iter()
            .map(|record| record.radii.characteristic_radius(&record.species))
            .collect();
        let collisions = PairThresholdTable::new(&radii, self.parameters.collision_scale);

        let mut positions: Vec<Point3<f64>> = Vec::with_capacity(entries.len());
        for index in 0..entries.len() {
            let mut placed = false;

            for _ in 0..self.parameters.max_placement_attempts {
                let fractional = Point3::new(
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(0.0..1.0),
                );
                let candidate = cell.to_cartesian(&fractional);

                let clash = positions.iter().enumerate().any(|(existing, position)| {
                    spatial::minimum_image_distance_sq(&cell, position, &candidate)
                        < collisions.get_sq(index, existing)
                });

                if !clash {
                    positions.push(candidate);
                    placed = true;
                    break;
                }
            }

            if !placed {
                return Err(DesignError::GenerationFailure(format!(
                    "could not place atom {} of {} within {} attempts",
                    index + 1,
                    entries.len(),
                    self.parameters.max_placement_attempts
                )));
            }
        }

        let atoms: Vec<ConstrainingAtom> = entries
            .iter()
            .zip(&positions)
            .map(|(record, &position)| {
                ConstrainingAtom::new(
                    record.species,
                    record.radii,
                    record.coordination.clone(),
                    position,
                )
            })
            .collect();

        debug!(
            "generated {} atoms in a cubic cell of edge {:.3} (seed {})",
            atoms.len(),
            edge,
            seed
        );

        // The structure RNG continues the generation stream, so one seed
        // fixes the whole attempt.
        let structure_seed = rng.gen();
        Ok(ConstrainingCrystalStructure::with_seed(
            cell,
            atoms,
            self.polyhedra_rules.clone(),
            structure_seed,
        ))
    }
}
