// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! Read-only access to the tabular input shared by every pipeline stage.

use crate::error::{DataError, Result};
use polars::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;

/// Immutable wrapper around a polars `DataFrame`.
///
/// Cloning is cheap: polars columns are reference counted.
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    /// Rejects frames with no rows or no columns.
    pub fn new(frame: DataFrame) -> Result<Self> {
        if frame.height() == 0 || frame.width() == 0 {
            return Err(DataError::EmptyDataset.into());
        }
        Ok(Self { frame })
    }

    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)?;
        let frame = CsvReader::new(file)
            .finish()
            .map_err(|source| DataError::DataFileError {
                path: path_ref.display().to_string(),
                source,
            })?;
        Self::new(frame)
    }

    pub fn from_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)?;
        let frame = ParquetReader::new(file)
            .finish()
            .map_err(|source| DataError::DataFileError {
                path: path_ref.display().to_string(),
                source,
            })?;
        Self::new(frame)
    }

    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn width(&self) -> usize {
        self.frame.width()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.frame.column(name).is_ok()
    }

    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.frame.column(name).map_err(|_| {
            DataError::ColumnNotFound {
                column: name.to_string(),
            }
            .into()
        })
    }

    pub fn dtype(&self, name: &str) -> Result<DataType> {
        Ok(self.require_column(name)?.dtype().clone())
    }

    pub fn is_numeric(&self, name: &str) -> bool {
        self.frame
            .column(name)
            .is_ok_and(|c| is_numeric_dtype(c.dtype()))
    }

    pub fn is_temporal(&self, name: &str) -> bool {
        self.frame
            .column(name)
            .is_ok_and(|c| is_temporal_dtype(c.dtype()))
    }

    /// Values cast to `f64`; nulls and values that fail the cast are dropped.
    pub fn numeric_values(&self, name: &str) -> Result<Vec<f64>> {
        let series = self.require_column(name)?.as_materialized_series();
        let as_float = series.cast(&DataType::Float64)?;
        Ok(as_float
            .f64()?
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect())
    }

    /// Row-aligned `f64` values, `None` where the cell is null or not numeric.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let series = self.require_column(name)?.as_materialized_series();
        let as_float = series.cast(&DataType::Float64)?;
        Ok(as_float
            .f64()?
            .into_iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect())
    }

    /// Row-aligned string rendering of a column.
    pub fn string_values(&self, name: &str) -> Result<Vec<Option<String>>> {
        let series = self.require_column(name)?.as_materialized_series();
        let as_str = series.cast(&DataType::String)?;
        Ok(as_str
            .str()?
            .into_iter()
            .map(|v| v.map(String::from))
            .collect())
    }

    pub fn null_count(&self, name: &str) -> Result<usize> {
        Ok(self.require_column(name)?.null_count())
    }

    pub fn n_unique(&self, name: &str) -> Result<usize> {
        Ok(self
            .require_column(name)?
            .as_materialized_series()
            .n_unique()?)
    }

    /// SHA-256 over column names, dtypes and every cell rendered as text.
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.height().to_le_bytes());
        for column in self.frame.get_columns() {
            hasher.update(column.name().as_bytes());
            hasher.update(column.dtype().to_string().as_bytes());
            for value in self.string_values(column.name())? {
                match value {
                    Some(v) => {
                        hasher.update([1u8]);
                        hasher.update(v.as_bytes());
                    }
                    None => hasher.update([0u8]),
                }
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

impl TryFrom<DataFrame> for Dataset {
    type Error = crate::error::VistaError;

    fn try_from(frame: DataFrame) -> Result<Self> {
        Self::new(frame)
    }
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::UInt64
            | DataType::UInt32
    )
}

pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Date | DataType::Datetime(_, _))
}
