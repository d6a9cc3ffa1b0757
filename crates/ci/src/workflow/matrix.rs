//! Matrix strategy expansion.

use super::schema::scalar_to_string;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One matrix combination: axis name to value.
pub type Combination = IndexMap<String, String>;

/// `strategy.matrix`: axes plus `include` / `exclude` lists.
///
/// Values are kept as strings, which is how expressions and environment
/// variables observe them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "IndexMap<String, serde_yaml::Value>",
    into = "IndexMap<String, serde_yaml::Value>"
)]
pub struct Matrix {
    /// Axes in declaration order
    pub axes: IndexMap<String, Vec<String>>,
    /// Extra combinations or extra keys for matching combinations
    pub include: Vec<Combination>,
    /// Combinations to drop
    pub exclude: Vec<Combination>,
}

impl Matrix {
    /// A matrix with a single axis.
    #[must_use]
    pub fn axis(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut axes = IndexMap::new();
        axes.insert(name.into(), values.into_iter().map(Into::into).collect());
        Self {
            axes,
            ..Self::default()
        }
    }

    /// Add an axis.
    #[must_use]
    pub fn with_axis(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.axes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the matrix defines nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty() && self.include.is_empty()
    }

    /// Expand into combinations.
    ///
    /// Axes form a cartesian product in declaration order, `exclude` entries
    /// remove every combination they match, then each `include` entry is merged
    /// into the original combinations whose axis values it does not contradict,
    /// or appended as a new combination when it matches none. An empty matrix
    /// yields one empty combination.
    #[must_use]
    pub fn combinations(&self) -> Vec<Combination> {
        let mut combos: Vec<Combination> = if self.axes.is_empty() {
            Vec::new()
        } else {
            let mut product = vec![Combination::new()];
            for (axis, values) in &self.axes {
                product = product
                    .into_iter()
                    .flat_map(|combo| {
                        values.iter().map(move |value| {
                            let mut next = combo.clone();
                            next.insert(axis.clone(), value.clone());
                            next
                        })
                    })
                    .collect();
            }
            product
        };

        combos.retain(|combo| {
            !self
                .exclude
                .iter()
                .any(|exclude| exclude.iter().all(|(k, v)| combo.get(k) == Some(v)))
        });

        let original = combos.len();
        for include in &self.include {
            let mut merged = false;
            for combo in combos.iter_mut().take(original) {
                let compatible = include
                    .iter()
                    .all(|(k, v)| !self.axes.contains_key(k) || combo.get(k) == Some(v));
                if compatible {
                    combo.extend(include.iter().map(|(k, v)| (k.clone(), v.clone())));
                    merged = true;
                }
            }
            if !merged {
                combos.push(include.clone());
            }
        }

        if combos.is_empty() {
            combos.push(Combination::new());
        }
        combos
    }
}

impl TryFrom<IndexMap<String, serde_yaml::Value>> for Matrix {
    type Error = String;

    fn try_from(raw: IndexMap<String, serde_yaml::Value>) -> Result<Self, Self::Error> {
        let mut matrix = Self::default();
        for (key, value) in raw {
            match key.as_str() {
                "include" => matrix.include = combination_list(&key, value)?,
                "exclude" => matrix.exclude = combination_list(&key, value)?,
                _ => {
                    let serde_yaml::Value::Sequence(items) = value else {
                        return Err(format!("matrix axis `{key}` must be a list"));
                    };
                    let values = items
                        .iter()
                        .map(|item| {
                            scalar_to_string(item)
                                .ok_or_else(|| format!("matrix axis `{key}` must contain scalars"))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    matrix.axes.insert(key, values);
                }
            }
        }
        Ok(matrix)
    }
}

fn combination_list(key: &str, value: serde_yaml::Value) -> Result<Vec<Combination>, String> {
    let serde_yaml::Value::Sequence(items) = value else {
        return Err(format!("matrix `{key}` must be a list"));
    };
    items
        .into_iter()
        .map(|item| {
            let serde_yaml::Value::Mapping(map) = item else {
                return Err(format!("matrix `{key}` entries must be maps"));
            };
            map.into_iter()
                .map(|(k, v)| match (scalar_to_string(&k), scalar_to_string(&v)) {
                    (Some(k), Some(v)) => Ok((k, v)),
                    _ => Err(format!("matrix `{key}` entries must contain scalars")),
                })
                .collect()
        })
        .collect()
}

impl From<Matrix> for IndexMap<String, serde_yaml::Value> {
    fn from(matrix: Matrix) -> Self {
        fn combos(list: Vec<Combination>) -> serde_yaml::Value {
            serde_yaml::Value::Sequence(
                list.into_iter()
                    .map(|combo| {
                        serde_yaml::Value::Mapping(
                            combo
                                .into_iter()
                                .map(|(k, v)| (k.into(), v.into()))
                                .collect(),
                        )
                    })
                    .collect(),
            )
        }

        let mut out = Self::new();
        for (axis, values) in matrix.axes {
            out.insert(
                axis,
                serde_yaml::Value::Sequence(values.into_iter().map(Into::into).collect()),
            );
        }
        if !matrix.include.is_empty() {
            out.insert("include".to_string(), combos(matrix.include));
        }
        if !matrix.exclude.is_empty() {
            out.insert("exclude".to_string(), combos(matrix.exclude));
        }
        out
    }
}
