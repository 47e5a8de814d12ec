//! In-memory wide-format panel dataset.
//!
//! One row per subject; one column per measured variable per wave (plus
//! time-invariant columns such as `waves`, `male` and the controls). Cells
//! are `Option<f64>` so missingness survives filtering and projection.

use std::collections::HashMap;

use crate::domain::{Gender, Imputation, MALE_COLUMN, WAVES_COLUMN, WaveCount};
use crate::error::{AppError, SpecError};

#[derive(Debug, Clone, PartialEq)]
pub struct PanelData {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Option<f64>>>,
}

impl PanelData {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<f64>>>) -> Result<Self, AppError> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                return Err(AppError::new(2, format!("Duplicate column `{name}`.")));
            }
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(AppError::new(
                2,
                format!(
                    "Row {} has {} cells but the dataset has {} columns.",
                    i + 1,
                    row.len(),
                    columns.len()
                ),
            ));
        }
        Ok(Self {
            columns,
            index,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Values of one column in row order.
    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = Option<f64>> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |r| r[idx]))
    }

    /// Keep rows for which `keep` returns true.
    pub fn filter<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&[Option<f64>]) -> bool,
    {
        Self {
            columns: self.columns.clone(),
            index: self.index.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// Gender subset plus listwise exclusion of subjects with fewer than
    /// `waves` completed waves.
    pub fn subset(&self, gender: Gender, waves: WaveCount) -> Result<Self, SpecError> {
        let waves_idx = self.column_index(WAVES_COLUMN).ok_or_else(|| {
            SpecError::Configuration(format!("dataset has no `{WAVES_COLUMN}` column"))
        })?;
        let male_idx = self.column_index(MALE_COLUMN);
        if gender != Gender::All && male_idx.is_none() {
            return Err(SpecError::Configuration(format!(
                "dataset has no `{MALE_COLUMN}` column"
            )));
        }

        let min_waves = waves.get() as f64;
        Ok(self.filter(|row| {
            let completed = matches!(row[waves_idx], Some(w) if w > min_waves - 1.0);
            let admitted = gender.admits(male_idx.and_then(|i| row[i]));
            completed && admitted
        }))
    }

    /// Keep only the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Self, SpecError> {
        let idx: Vec<usize> = names
            .iter()
            .map(|n| {
                self.column_index(n).ok_or_else(|| {
                    SpecError::Configuration(format!("dataset has no `{n}` column"))
                })
            })
            .collect::<Result<_, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|r| idx.iter().map(|&i| r[i]).collect())
            .collect();
        Ok(Self {
            columns: names.to_vec(),
            index: names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect(),
            rows,
        })
    }

    /// Rows with every column observed, as dense vectors.
    pub fn complete_rows(&self) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .filter_map(|r| r.iter().copied().collect::<Option<Vec<f64>>>())
            .collect()
    }
}

/// The two source datasets a batch draws slices from.
#[derive(Debug, Clone)]
pub struct Datasets {
    pub original: PanelData,
    pub imputed: PanelData,
}

impl Datasets {
    pub fn get(&self, imputation: Imputation) -> &PanelData {
        match imputation {
            Imputation::Original => &self.original,
            Imputation::Imputed => &self.imputed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> PanelData {
        let columns = ["id", "waves", "male", "a_sm"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![
            vec![Some(1.0), Some(5.0), Some(1.0), Some(2.0)],
            vec![Some(2.0), Some(3.0), Some(0.0), None],
            vec![Some(3.0), Some(2.0), Some(0.0), Some(4.0)],
            vec![Some(4.0), Some(4.0), None, Some(1.0)],
            vec![Some(5.0), None, Some(1.0), Some(3.0)],
        ];
        PanelData::new(columns, rows).unwrap()
    }

    fn ids(data: &PanelData) -> Vec<f64> {
        data.column_values("id").unwrap().flatten().collect()
    }

    #[test]
    fn wave_filter_is_listwise_by_subject() {
        let data = panel();
        let three = data.subset(Gender::All, WaveCount::new(3).unwrap()).unwrap();
        assert_eq!(ids(&three), vec![1.0, 2.0, 4.0]);
        let five = data.subset(Gender::All, WaveCount::new(5).unwrap()).unwrap();
        assert_eq!(ids(&five), vec![1.0]);
    }

    #[test]
    fn gender_subsets_drop_missing_flags() {
        let data = panel();
        let w = WaveCount::new(3).unwrap();
        assert_eq!(ids(&data.subset(Gender::Female, w).unwrap()), vec![2.0]);
        assert_eq!(ids(&data.subset(Gender::Male, w).unwrap()), vec![1.0]);
    }

    #[test]
    fn select_projects_and_reports_missing_columns() {
        let data = panel();
        let sel = data.select(&["a_sm".to_string(), "id".to_string()]).unwrap();
        assert_eq!(sel.columns(), &["a_sm".to_string(), "id".to_string()]);
        assert_eq!(sel.complete_rows().len(), 4);
        assert!(matches!(
            data.select(&["b_sm".to_string()]),
            Err(SpecError::Configuration(_))
        ));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = PanelData::new(vec!["a".into(), "b".into()], vec![vec![Some(1.0)]]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
