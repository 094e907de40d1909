use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// --- Element table ---

const ELEMENT_SYMBOLS: [&str; 119] = [
    "X", "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd",
    "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm",
    "Bk", "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn",
    "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Symbol of element `z`, or `"X"` for out-of-range numbers.
pub fn element_symbol(z: u8) -> &'static str {
    ELEMENT_SYMBOLS.get(z as usize).copied().unwrap_or("X")
}

/// Atomic number for an element symbol, case-sensitive ("Mg", "O", ...).
pub fn atomic_number_of(symbol: &str) -> Option<u8> {
    ELEMENT_SYMBOLS
        .iter()
        .position(|&s| s == symbol && s != "X")
        .map(|z| z as u8)
}

// --- Species ---

/// An ionic species: element plus signed formal charge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct IonicSpecies {
    pub atomic_number: u8,
    pub formal_charge: i8,
}

impl IonicSpecies {
    pub fn new(atomic_number: u8, formal_charge: i8) -> Self {
        Self { atomic_number, formal_charge }
    }

    pub fn neutral(atomic_number: u8) -> Self {
        Self { atomic_number, formal_charge: 0 }
    }

    pub fn is_cation(&self) -> bool {
        self.formal_charge > 0
    }

    pub fn is_anion(&self) -> bool {
        self.formal_charge < 0
    }

    pub fn is_charged(&self) -> bool {
        self.formal_charge != 0
    }

    pub fn symbol(&self) -> &'static str {
        element_symbol(self.atomic_number)
    }

    /// Parses ion notation such as `"Mg2+"`, `"O2-"`, `"Cl-"`, or `"Si"`.
    pub fn parse(notation: &str) -> Option<Self> {
        // Compiled on demand; species parsing happens only at configuration time.
        let pattern = regex::Regex::new(r"^([A-Z][a-z]?)(\d*)([+-])?$").expect("valid pattern");
        let captures = pattern.captures(notation.trim())?;

        let atomic_number = atomic_number_of(captures.get(1)?.as_str())?;
        let magnitude: i8 = match captures.get(2).map(|m| m.as_str()) {
            Some("") | None => match captures.get(3) {
                Some(_) => 1,
                None => 0,
            },
            Some(digits) => digits.parse().ok()?,
        };
        let formal_charge = match captures.get(3).map(|m| m.as_str()) {
            Some("-") => -magnitude,
            Some(_) => magnitude,
            None if magnitude == 0 => 0,
            None => return None,
        };

        Some(Self { atomic_number, formal_charge })
    }

    pub fn notation(&self) -> String {
        match self.formal_charge {
            0 => self.symbol().to_string(),
            q if q > 0 => format!("{}{}+", self.symbol(), q),
            q => format!("{}{}-", self.symbol(), -q),
        }
    }
}

impl fmt::Display for IonicSpecies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.notation())
    }
}

// --- Radii ---

/// A closed distance interval, `0 <= minimum <= maximum`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RadiusRange {
    pub minimum: f64,
    pub maximum: f64,
}

impl RadiusRange {
    pub fn new(minimum: f64, maximum: f64) -> Self {
        debug_assert!(0.0 <= minimum && minimum <= maximum);
        Self { minimum, maximum }
    }

    pub fn zero() -> Self {
        Self { minimum: 0.0, maximum: 0.0 }
    }

    /// A species with a null range cannot participate in that bond class.
    pub fn is_null(&self) -> bool {
        self.maximum <= 0.0
    }
}

/// The three radius ranges attached to every species.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct AtomicRadii {
    pub covalent: RadiusRange,
    pub ionic: RadiusRange,
    pub repulsion: RadiusRange,
}

impl AtomicRadii {
    /// Radius used by the periodic tracer: wide enough for every pair class.
    pub fn tracing_radius(&self) -> f64 {
        self.covalent
            .maximum
            .max(self.ionic.maximum)
            .max(self.repulsion.minimum)
    }

    /// Radius used for perturbation amplitudes and sphere volumes: ionic for
    /// charged species, covalent otherwise.
    pub fn characteristic_radius(&self, species: &IonicSpecies) -> f64 {
        if species.is_charged() {
            self.ionic.maximum
        } else {
            self.covalent.maximum
        }
    }
}

// --- Compositions ---

/// A multiset of elements keyed by atomic number.
///
/// Zero counts are never stored, so equality and iteration are canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Composition {
    counts: BTreeMap<u8, usize>,
}

impl Composition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(u8, usize)]) -> Self {
        let mut composition = Self::new();
        for &(z, count) in pairs {
            if count > 0 {
                *composition.counts.entry(z).or_insert(0) += count;
            }
        }
        composition
    }

    pub fn add(&mut self, z: u8) {
        *self.counts.entry(z).or_insert(0) += 1;
    }

    pub fn count(&self, z: u8) -> usize {
        self.counts.get(&z).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, usize)> + '_ {
        self.counts.iter().map(|(&z, &count)| (z, count))
    }

    pub fn species(&self) -> impl Iterator<Item = u8> + '_ {
        self.counts.keys().copied()
    }

    /// Per-species `<=` with at least one strict `<`.
    pub fn is_proper_subset_of(&self, other: &Composition) -> bool {
        self != other && self.iter().all(|(z, count)| count <= other.count(z))
    }

    /// L1 distance over the union of species.
    pub fn distance(&self, other: &Composition) -> usize {
        let mut distance = 0usize;
        for (z, count) in self.iter() {
            distance += count.abs_diff(other.count(z));
        }
        for (z, count) in other.iter() {
            if self.count(z) == 0 {
                distance += count;
            }
        }
        distance
    }

    /// Union of two multisets (used to merge covalent and ionic shells).
    pub fn merged(&self, other: &Composition) -> Composition {
        let mut merged = self.clone();
        for (z, count) in other.iter() {
            *merged.counts.entry(z).or_insert(0) += count;
        }
        merged
    }
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (z, count) in self.iter() {
            write!(f, "{}{}", element_symbol(z), count)?;
        }
        Ok(())
    }
}

// --- Coordination constraints ---

/// Allowed coordination environments for one species.
///
/// Either a disjunction of full compositions, or independent bounds on the
/// covalent and ionic coordination numbers, optionally with lower-bound
/// compositions that pruning must not dig below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CoordinationConstraints {
    feasible_compositions: Vec<Composition>,
    lower_bound_compositions: Vec<Composition>,
    feasible_covalent_numbers: Vec<usize>,
    feasible_ionic_numbers: Vec<usize>,
}

impl CoordinationConstraints {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn with_compositions(compositions: Vec<Composition>) -> Self {
        Self { feasible_compositions: compositions, ..Self::default() }
    }

    pub fn with_coordination_numbers(covalent: Vec<usize>, ionic: Vec<usize>) -> Self {
        Self {
            feasible_covalent_numbers: covalent,
            feasible_ionic_numbers: ionic,
            ..Self::default()
        }
    }

    pub fn set_lower_bound_compositions(&mut self, compositions: Vec<Composition>) {
        self.lower_bound_compositions = compositions;
    }

    pub fn has_feasible_compositions(&self) -> bool {
        !self.feasible_compositions.is_empty()
    }

    pub fn has_lower_bound_compositions(&self) -> bool {
        !self.lower_bound_compositions.is_empty()
    }

    pub fn has_feasible_covalent_coordination_numbers(&self) -> bool {
        !self.feasible_covalent_numbers.is_empty()
    }

    pub fn has_feasible_ionic_coordination_numbers(&self) -> bool {
        !self.feasible_ionic_numbers.is_empty()
    }

    pub fn is_constrained(&self) -> bool {
        self.has_feasible_compositions()
            || self.has_feasible_covalent_coordination_numbers()
            || self.has_feasible_ionic_coordination_numbers()
    }

    pub fn max_coordination_number(&self) -> usize {
        let composition_max = self
            .feasible_compositions
            .iter()
            .map(Composition::total)
            .max()
            .unwrap_or(0);
        let covalent_max = self.feasible_covalent_numbers.iter().copied().max().unwrap_or(0);
        let ionic_max = self.feasible_ionic_numbers.iter().copied().max().unwrap_or(0);

        composition_max.max(covalent_max + ionic_max)
    }

    /// Exact membership in the allowed composition set.
    pub fn allows(&self, composition: &Composition) -> bool {
        self.feasible_compositions.iter().any(|c| c == composition)
    }

    pub fn allows_covalent_number(&self, n: usize) -> bool {
        self.feasible_covalent_numbers.contains(&n)
    }

    pub fn allows_ionic_number(&self, n: usize) -> bool {
        self.feasible_ionic_numbers.contains(&n)
    }

    /// Allowed composition with minimal L1 distance to `current`; ties keep
    /// declaration order. Must not be called on an empty disjunction.
    pub fn closest_feasible(&self, current: &Composition) -> &Composition {
        self.feasible_compositions
            .iter()
            .min_by_key(|candidate| candidate.distance(current))
            .expect("closest_feasible requires at least one feasible composition")
    }

    pub fn closest_feasible_covalent_number(&self, current: usize) -> usize {
        Self::closest_number(&self.feasible_covalent_numbers, current)
    }

    pub fn closest_feasible_ionic_number(&self, current: usize) -> usize {
        Self::closest_number(&self.feasible_ionic_numbers, current)
    }

    /// Lower-bound composition closest to the combined covalent+ionic shell.
    pub fn closest_lower_bound(&self, covalent: &Composition, ionic: &Composition) -> Composition {
        let combined = covalent.merged(ionic);
        self.lower_bound_compositions
            .iter()
            .min_by_key(|candidate| candidate.distance(&combined))
            .cloned()
            .unwrap_or_default()
    }

    // Ties prefer the smaller value so pruning only ever erases bonds.
    fn closest_number(feasible: &[usize], current: usize) -> usize {
        feasible
            .iter()
            .copied()
            .min_by_key(|&n| (n.abs_diff(current), n))
            .unwrap_or(current)
    }
}

// --- Atoms ---

/// The optimizer's view of an atom: a constrained sphere with an accumulated
/// force. Projected from the design form; carries no bond ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct SphericalAtom {
    pub species: IonicSpecies,
    pub radii: AtomicRadii,
    pub position: Point3<f64>,
    pub applied_force: Vector3<f64>,
}

impl SphericalAtom {
    pub fn new(species: IonicSpecies, radii: AtomicRadii, position: Point3<f64>) -> Self {
        Self { species, radii, position, applied_force: Vector3::zeros() }
    }

    pub fn clear_force(&mut self) {
        self.applied_force = Vector3::zeros();
    }
}

/// One species entry of a design target: identity, geometry rules, and the
/// number of atoms of this kind in the unit cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesRecord {
    pub species: IonicSpecies,
    pub radii: AtomicRadii,
    pub coordination: CoordinationConstraints,
    pub count: usize,
}
