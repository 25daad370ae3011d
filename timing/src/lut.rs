//! Characterization lookup tables.

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use splines::{Interpolation, Key, Spline};

/// Extrapolation options.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum Extrapolation {
    /// Do not extrapolate.
    #[default]
    None,
    /// Clamps to the nearest key in the lookup table's range.
    Clamp,
}

/// A floating point 1D lookup table.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatLut1 {
    k1: Vec<f64>,
    values: Vec<f64>,
}

impl FloatLut1 {
    /// Creates a table from `(key, value)` pairs, sorting them by key.
    pub fn new(mut points: Vec<(f64, f64)>) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (k1, values) = points.into_iter().unzip();
        Self { k1, values }
    }

    /// Lookup the value stored at exactly `k1`.
    pub fn get(&self, k1: f64) -> Option<f64> {
        let i = self.k1.iter().position(|&k| (k - k1).abs() <= 1e-9 * k.abs().max(1.0))?;
        self.values.get(i).copied()
    }

    /// Lookup a value for the given key, interpolating as necessary.
    pub fn getf(&self, k1: f64) -> Option<f64> {
        let (first, last) = (*self.k1.first()?, *self.k1.last()?);
        if k1 < first || k1 > last {
            return None;
        }
        Spline::from_vec(
            self.k1
                .iter()
                .copied()
                .zip(self.values.iter().copied())
                .map(|(k, v)| Key::new(k, v, Interpolation::Linear))
                .collect(),
        )
        .clamped_sample(k1)
    }

    /// Lookup a value for the given key, interpolating as necessary.
    ///
    /// Can extrapolate beyond the bounds of the key range.
    pub fn getf_extrapolate(&self, k1: f64, extrapolate: Extrapolation) -> Option<f64> {
        match extrapolate {
            Extrapolation::None => self.getf(k1),
            Extrapolation::Clamp => self.getf(k1.clamp(*self.k1.first()?, *self.k1.last()?)),
        }
    }
}

/// A characterization query.
#[derive(Debug, Clone, Copy)]
pub struct LookupQuery<'a> {
    /// The characterized cell name.
    pub cell: &'a str,
    /// The pin or quantity name, such as `A` or `resistance_Z`.
    pub pin: &'a str,
    /// The size of the queried instance.
    pub size: f64,
    /// Extra `(key, value)` filters.
    pub file_suffixes: &'a [(ArcStr, ArcStr)],
    /// Extra numeric filters.
    pub size_suffixes: &'a [(ArcStr, f64)],
    /// Interpolate between sizes and numeric filters instead of requiring exact matches.
    pub interpolate_size_suffixes: bool,
}

/// A source of characterized capacitance and resistance data.
///
/// A miss is reported as `None`, and callers fall back to analytical estimates.
pub trait CharacterizationLookup {
    /// Looks up the value for `query`.
    fn load_data(&self, query: &LookupQuery<'_>) -> Option<f64>;
}

/// A characterized size sweep of one cell pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// The characterized cell name.
    pub cell: ArcStr,
    /// The pin or quantity name.
    pub pin: ArcStr,
    /// Extra `(key, value)` filters.
    pub file_suffixes: Vec<(ArcStr, ArcStr)>,
    /// Extra numeric filters.
    pub size_suffixes: Vec<(ArcStr, f64)>,
    /// Value versus size.
    pub lut: FloatLut1,
}

/// An in-memory [`CharacterizationLookup`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableLookup {
    tables: Vec<Table>,
    #[serde(skip)]
    extrapolation: Extrapolation,
}

fn same_file_suffixes(a: &[(ArcStr, ArcStr)], b: &[(ArcStr, ArcStr)]) -> bool {
    a.len() == b.len() && a.iter().all(|pair| b.contains(pair))
}

fn suffix_value(suffixes: &[(ArcStr, f64)], key: &str) -> Option<f64> {
    suffixes.iter().find(|(k, _)| k.as_str() == key).map(|(_, v)| *v)
}

impl TableLookup {
    /// Creates an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how sizes outside a table's characterized range are handled.
    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    /// Adds a table.
    pub fn add_table(&mut self, table: Table) {
        self.tables.push(table);
    }

    fn sample(&self, table: &Table, size: f64, interpolate: bool) -> Option<f64> {
        if interpolate {
            table.lut.getf_extrapolate(size, self.extrapolation)
        } else {
            table.lut.get(size)
        }
    }

    /// Tables matching the query on everything but numeric filters.
    fn candidates<'a>(&'a self, query: &'a LookupQuery<'a>) -> impl Iterator<Item = &'a Table> {
        self.tables.iter().filter(move |t| {
            t.cell.eq_ignore_ascii_case(query.cell)
                && t.pin.as_str() == query.pin
                && same_file_suffixes(&t.file_suffixes, query.file_suffixes)
                && t.size_suffixes.len() == query.size_suffixes.len()
        })
    }

    /// Interpolates across tables that differ only in the value of one numeric filter.
    fn interpolate_suffix(&self, query: &LookupQuery<'_>) -> Option<f64> {
        let [(key, target)] = query.size_suffixes else {
            return None;
        };
        let points = self
            .candidates(query)
            .filter_map(|t| {
                let v = suffix_value(&t.size_suffixes, key)?;
                Some((v, self.sample(t, query.size, true)?))
            })
            .collect::<Vec<_>>();
        FloatLut1::new(points).getf(*target)
    }
}

impl CharacterizationLookup for TableLookup {
    fn load_data(&self, query: &LookupQuery<'_>) -> Option<f64> {
        let exact = self.candidates(query).find(|t| {
            query.size_suffixes.iter().all(|(k, v)| {
                suffix_value(&t.size_suffixes, k).is_some_and(|tv| (tv - v).abs() <= 1e-9)
            })
        });
        let value = match exact {
            Some(table) => self.sample(table, query.size, query.interpolate_size_suffixes),
            None if query.interpolate_size_suffixes => self.interpolate_suffix(query),
            None => None,
        };
        tracing::trace!(
            cell = query.cell,
            pin = query.pin,
            size = query.size,
            ?value,
            "characterization lookup"
        );
        value
    }
}
