//! Label-signed training matrix
//!
//! Every row is a sample's feature vector multiplied by its label sign
//! (±1), so that `⟨w, z_j⟩ > 0` means sample `j` is classified correctly.
//!
//! # File format
//!
//! A header line followed by one sample per line:
//!
//! ```text
//! y,x1,x2,x3
//! 1,0,1,1
//! 0,1,1,0
//! ```
//!
//! The label is `0`/`-1` (negative) or `1` (positive); features are real.
//! The header's column count fixes the feature dimension.

use std::fs;
use std::path::Path;

use crate::error::{HeError, Result};

/// Immutable label-signed samples × features matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedMatrix {
    rows: Vec<Vec<f64>>,
    factor_dim: usize,
}

impl SignedMatrix {
    /// Wrap rows that are already label-signed.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let factor_dim = rows.first().map(Vec::len).unwrap_or(0);
        if factor_dim == 0 {
            return Err(HeError::Data("matrix has no samples or no features".into()));
        }
        if let Some(j) = rows.iter().position(|r| r.len() != factor_dim) {
            return Err(HeError::Data(format!(
                "row {} has {} features, expected {}",
                j,
                rows[j].len(),
                factor_dim
            )));
        }
        Ok(Self { rows, factor_dim })
    }

    /// Multiply each feature row by its label sign (`true` = +1).
    pub fn from_labeled(features: &[Vec<f64>], labels: &[bool]) -> Result<Self> {
        if features.len() != labels.len() {
            return Err(HeError::Data(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        let rows = features
            .iter()
            .zip(labels)
            .map(|(x, &positive)| {
                let sign = if positive { 1.0 } else { -1.0 };
                x.iter().map(|v| sign * v).collect()
            })
            .collect();
        Self::from_rows(rows)
    }

    /// Load a header-plus-rows file (see module docs).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| HeError::Data(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| HeError::Data("empty input".into()))?;
        let factor_dim = header.split(',').count().saturating_sub(1);
        if factor_dim == 0 {
            return Err(HeError::Data("header declares no feature columns".into()));
        }

        let mut rows = Vec::new();
        for (lineno, line) in lines {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != factor_dim + 1 {
                return Err(HeError::Data(format!(
                    "line {}: {} columns, expected {}",
                    lineno + 1,
                    fields.len(),
                    factor_dim + 1
                )));
            }
            let sign = match fields[0] {
                "1" | "+1" => 1.0,
                "0" | "-1" => -1.0,
                other => {
                    return Err(HeError::Data(format!(
                        "line {}: bad label '{}'",
                        lineno + 1,
                        other
                    )))
                }
            };
            let row = fields[1..]
                .iter()
                .map(|f| {
                    f.parse::<f64>()
                        .map(|v| sign * v)
                        .map_err(|_| HeError::Data(format!("line {}: bad value '{}'", lineno + 1, f)))
                })
                .collect::<Result<Vec<f64>>>()?;
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(HeError::Data("no samples after header".into()));
        }
        Ok(Self { rows, factor_dim })
    }

    pub fn sample_count(&self) -> usize {
        self.rows.len()
    }

    pub fn factor_dim(&self) -> usize {
        self.factor_dim
    }

    pub fn row(&self, j: usize) -> &[f64] {
        &self.rows[j]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Entry (sample, feature); zero outside the matrix, which is how padding reads.
    #[inline]
    pub fn get(&self, sample: usize, feature: usize) -> f64 {
        self.rows
            .get(sample)
            .and_then(|r| r.get(feature))
            .copied()
            .unwrap_or(0.0)
    }

    /// ⟨w, z_j⟩
    pub fn margin(&self, w: &[f64], j: usize) -> f64 {
        self.rows[j].iter().zip(w).map(|(z, w)| z * w).sum()
    }
}
