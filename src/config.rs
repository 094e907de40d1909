use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::core::domain::{
    atomic_number_of, AtomicRadii, Composition, CoordinationConstraints, IonicSpecies,
    RadiusRange, SpeciesRecord,
};
use crate::engine::params::DesignParameters;
use crate::errors::DesignError;
use crate::model::polyhedra::FeasiblePolyhedraConnections;

/// A JSON run definition: the target composition with its geometry rules,
/// optional polyhedra-sharing limits, and the designer parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDefinition {
    pub species: Vec<SpeciesSpec>,
    #[serde(default)]
    pub polyhedra_limits: Vec<PolyhedraLimitSpec>,
    #[serde(default)]
    pub parameters: DesignParameters,
}

/// One species entry, radii as `[min, max]` pairs in ångströms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciesSpec {
    /// Ion notation, e.g. `"Mg2+"`, `"O2-"`, `"Si"`.
    pub ion: String,
    pub count: usize,
    #[serde(default)]
    pub covalent_radius: [f64; 2],
    #[serde(default)]
    pub ionic_radius: [f64; 2],
    #[serde(default)]
    pub repulsion_radius: [f64; 2],
    #[serde(default)]
    pub coordination: CoordinationSpec,
}

/// Coordination rules keyed by element symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinationSpec {
    #[serde(default)]
    pub compositions: Vec<BTreeMap<String, usize>>,
    #[serde(default)]
    pub lower_bounds: Vec<BTreeMap<String, usize>>,
    #[serde(default)]
    pub covalent_numbers: Vec<usize>,
    #[serde(default)]
    pub ionic_numbers: Vec<usize>,
}

/// Cap on common bridging anions between two cation-centred polyhedra.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolyhedraLimitSpec {
    pub centres: [String; 2],
    pub bridging: BTreeMap<String, usize>,
}

impl RunDefinition {
    pub fn load(path: &Path) -> Result<Self, DesignError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|error| DesignError::InvalidConfiguration(error.to_string()))
    }

    pub fn species_records(&self) -> Result<Vec<SpeciesRecord>, DesignError> {
        self.species.iter().map(SpeciesSpec::to_record).collect()
    }

    pub fn polyhedra_rules(&self) -> Result<FeasiblePolyhedraConnections, DesignError> {
        let mut rules = FeasiblePolyhedraConnections::unconstrained();
        for limit in &self.polyhedra_limits {
            let a = parse_ion(&limit.centres[0])?;
            let b = parse_ion(&limit.centres[1])?;
            rules.insert_rule(a, b, parse_composition(&limit.bridging)?);
        }
        Ok(rules)
    }

    /// The built-in example target: rock-salt-like MgO, four formula units.
    pub fn example_rock_salt() -> Self {
        let mg_coordination = CoordinationSpec {
            compositions: vec![
                BTreeMap::from([("O".to_string(), 4)]),
                BTreeMap::from([("O".to_string(), 6)]),
            ],
            ..CoordinationSpec::default()
        };
        let o_coordination = CoordinationSpec {
            compositions: vec![
                BTreeMap::from([("Mg".to_string(), 4)]),
                BTreeMap::from([("Mg".to_string(), 6)]),
            ],
            ..CoordinationSpec::default()
        };

        Self {
            species: vec![
                SpeciesSpec {
                    ion: "Mg2+".to_string(),
                    count: 4,
                    covalent_radius: [0.0, 0.0],
                    ionic_radius: [0.6, 0.9],
                    repulsion_radius: [1.3, 1.3],
                    coordination: mg_coordination,
                },
                SpeciesSpec {
                    ion: "O2-".to_string(),
                    count: 4,
                    covalent_radius: [0.0, 0.0],
                    ionic_radius: [1.2, 1.5],
                    repulsion_radius: [1.4, 1.4],
                    coordination: o_coordination,
                },
            ],
            polyhedra_limits: Vec::new(),
            parameters: DesignParameters::default(),
        }
    }
}

impl SpeciesSpec {
    fn to_record(&self) -> Result<SpeciesRecord, DesignError> {
        let species = parse_ion(&self.ion)?;

        let mut coordination = if !self.coordination.compositions.is_empty() {
            let compositions = self
                .coordination
                .compositions
                .iter()
                .map(parse_composition)
                .collect::<Result<Vec<_>, _>>()?;
            CoordinationConstraints::with_compositions(compositions)
        } else {
            CoordinationConstraints::with_coordination_numbers(
                self.coordination.covalent_numbers.clone(),
                self.coordination.ionic_numbers.clone(),
            )
        };
        if !self.coordination.lower_bounds.is_empty() {
            let lower_bounds = self
                .coordination
                .lower_bounds
                .iter()
                .map(parse_composition)
                .collect::<Result<Vec<_>, _>>()?;
            coordination.set_lower_bound_compositions(lower_bounds);
        }

        Ok(SpeciesRecord {
            species,
            radii: AtomicRadii {
                covalent: to_range(self.covalent_radius, &self.ion)?,
                ionic: to_range(self.ionic_radius, &self.ion)?,
                repulsion: to_range(self.repulsion_radius, &self.ion)?,
            },
            coordination,
            count: self.count,
        })
    }
}

fn parse_ion(notation: &str) -> Result<IonicSpecies, DesignError> {
    IonicSpecies::parse(notation).ok_or_else(|| {
        DesignError::InvalidConfiguration(format!("unrecognised ion notation '{notation}'"))
    })
}

fn parse_composition(counts: &BTreeMap<String, usize>) -> Result<Composition, DesignError> {
    let mut pairs = Vec::with_capacity(counts.len());
    for (symbol, &count) in counts {
        let z = atomic_number_of(symbol).ok_or_else(|| {
            DesignError::InvalidConfiguration(format!("unrecognised element symbol '{symbol}'"))
        })?;
        pairs.push((z, count));
    }
    Ok(Composition::from_pairs(&pairs))
}

fn to_range(bounds: [f64; 2], ion: &str) -> Result<RadiusRange, DesignError> {
    let [minimum, maximum] = bounds;
    if minimum < 0.0 || maximum < minimum {
        return Err(DesignError::InvalidConfiguration(format!(
            "radius range [{minimum}, {maximum}] for '{ion}' is not ordered"
        )));
    }
    Ok(RadiusRange::new(minimum, maximum))
}
