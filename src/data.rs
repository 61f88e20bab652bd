//! Data
//!
//! The column-major [`Matrix`] view handed to learners and the
//! [`DoubleMLData`] container that assigns roles (outcome, treatments,
//! covariates, instruments, clusters) to the columns of a dataset.
use crate::errors::DoubleMLError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Contiguous Column Major Matrix data container.
///
/// This structure borrows a dense matrix of values stored in a single contiguous memory block,
/// in column-major order (Fortran-style), which allows for efficient column slicing.
///
/// # Type Parameters
/// * `T` - The numeric type of the data (e.g., `f32`, `f64`).
#[derive(Debug, Clone)]
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
    stride1: usize,
    stride2: usize,
}

impl<'a, T> Matrix<'a, T> {
    // Defaults to column major
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix {
            data,
            rows,
            cols,
            stride1: rows,
            stride2: 1,
        }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[self.item_index(i, j)]
    }

    fn item_index(&self, i: usize, j: usize) -> usize {
        let mut idx = self.stride2 * i;
        idx += j * self.stride1;
        idx
    }

    /// Get access to a row of the data, as an iterator.
    pub fn get_row_iter(&self, row: usize) -> std::iter::StepBy<std::iter::Skip<std::slice::Iter<'a, T>>> {
        self.data.iter().skip(row).step_by(self.rows)
    }

    /// Get a slice of a column in the matrix.
    ///
    /// * `col` - The index of the column to select.
    /// * `start_row` - The index of the start of the slice.
    /// * `end_row` - The index of the end of the slice of the column to select.
    pub fn get_col_slice(&self, col: usize, start_row: usize, end_row: usize) -> &[T] {
        let i = self.item_index(start_row, col);
        let j = self.item_index(end_row, col);
        &self.data[i..j]
    }

    /// Get an entire column in the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &[T] {
        self.get_col_slice(col, 0, self.rows)
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Get a row of the data as a vector.
    pub fn get_row(&self, row: usize) -> Vec<T> {
        self.get_row_iter(row).copied().collect()
    }

    /// Copy the given rows, in order, into a new column-major buffer
    /// with `rows.len()` rows and `self.cols` columns.
    pub fn select_rows(&self, rows: &[usize]) -> Vec<T> {
        let mut out = Vec::with_capacity(rows.len() * self.cols);
        for j in 0..self.cols {
            let col = self.get_col(j);
            out.extend(rows.iter().map(|i| col[*i]));
        }
        out
    }
}

/// A dataset with designated variable roles.
///
/// All columns share the same number of rows and no column name is used
/// by more than one role. Covariates are stored column-major so a
/// [`Matrix`] view can be handed to learners without copying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoubleMLData {
    n_obs: usize,
    y: Vec<f64>,
    d: Vec<Vec<f64>>,
    x: Vec<f64>,
    n_x: usize,
    z: Vec<Vec<f64>>,
    cluster: Option<Vec<i64>>,
    y_col: String,
    d_cols: Vec<String>,
    x_cols: Vec<String>,
    z_cols: Vec<String>,
}

fn check_column(name: &str, values: &[f64], n_obs: usize, finite: bool) -> Result<(), DoubleMLError> {
    if values.len() != n_obs {
        return Err(DoubleMLError::IncompatibleData(format!(
            "column {} has {} rows, expected {}",
            name,
            values.len(),
            n_obs
        )));
    }
    if finite && values.iter().any(|v| !v.is_finite()) {
        return Err(DoubleMLError::IncompatibleData(format!(
            "column {} contains non-finite values",
            name
        )));
    }
    Ok(())
}

impl DoubleMLData {
    /// Build a dataset from column vectors.
    ///
    /// * `y` - Outcome.
    /// * `d` - One or more treatment columns.
    /// * `x` - Covariate columns.
    pub fn from_arrays(y: Vec<f64>, d: Vec<Vec<f64>>, x: Vec<Vec<f64>>) -> Result<Self, DoubleMLError> {
        let n_obs = y.len();
        if n_obs == 0 {
            return Err(DoubleMLError::IncompatibleData("the outcome has no observations".to_string()));
        }
        if d.is_empty() {
            return Err(DoubleMLError::IncompatibleData(
                "at least one treatment column is required".to_string(),
            ));
        }
        check_column("y", &y, n_obs, true)?;
        for (j, col) in d.iter().enumerate() {
            check_column(&format!("d{}", j + 1), col, n_obs, true)?;
        }
        for (j, col) in x.iter().enumerate() {
            check_column(&format!("X{}", j + 1), col, n_obs, false)?;
        }

        let n_x = x.len();
        let d_cols = if d.len() == 1 {
            vec!["d".to_string()]
        } else {
            (1..=d.len()).map(|j| format!("d{}", j)).collect()
        };
        Ok(DoubleMLData {
            n_obs,
            y,
            d,
            x: x.into_iter().flatten().collect(),
            n_x,
            z: Vec::new(),
            cluster: None,
            y_col: "y".to_string(),
            d_cols,
            x_cols: (1..=n_x).map(|j| format!("X{}", j)).collect(),
            z_cols: Vec::new(),
        })
    }

    /// Attach instrument columns.
    pub fn with_instruments(mut self, z: Vec<Vec<f64>>) -> Result<Self, DoubleMLError> {
        for (j, col) in z.iter().enumerate() {
            check_column(&format!("Z{}", j + 1), col, self.n_obs, true)?;
        }
        self.z_cols = if z.len() == 1 {
            vec!["z".to_string()]
        } else {
            (1..=z.len()).map(|j| format!("z{}", j)).collect()
        };
        self.z = z;
        Ok(self)
    }

    /// Attach a cluster identifier per observation.
    pub fn with_clusters(mut self, cluster: Vec<i64>) -> Result<Self, DoubleMLError> {
        if cluster.len() != self.n_obs {
            return Err(DoubleMLError::IncompatibleData(format!(
                "cluster column has {} rows, expected {}",
                cluster.len(),
                self.n_obs
            )));
        }
        self.cluster = Some(cluster);
        Ok(self)
    }

    /// Rename the columns. Names must be unique across all roles.
    pub fn with_names(
        mut self,
        y_col: &str,
        d_cols: &[&str],
        x_cols: &[&str],
        z_cols: &[&str],
    ) -> Result<Self, DoubleMLError> {
        if d_cols.len() != self.d.len() {
            return Err(DoubleMLError::invalid("d_cols", format!("{} names", self.d.len()), d_cols.len()));
        }
        if x_cols.len() != self.n_x {
            return Err(DoubleMLError::invalid("x_cols", format!("{} names", self.n_x), x_cols.len()));
        }
        if z_cols.len() != self.z.len() {
            return Err(DoubleMLError::invalid("z_cols", format!("{} names", self.z.len()), z_cols.len()));
        }
        let mut seen = HashSet::new();
        for name in std::iter::once(&y_col).chain(d_cols).chain(x_cols).chain(z_cols) {
            if !seen.insert(*name) {
                return Err(DoubleMLError::invalid(
                    "column names",
                    "each column to be assigned to exactly one role",
                    format!("{} more than once", name),
                ));
            }
        }
        self.y_col = y_col.to_string();
        self.d_cols = d_cols.iter().map(|s| s.to_string()).collect();
        self.x_cols = x_cols.iter().map(|s| s.to_string()).collect();
        self.z_cols = z_cols.iter().map(|s| s.to_string()).collect();
        Ok(self)
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    pub fn n_treat(&self) -> usize {
        self.d.len()
    }

    pub fn n_instr(&self) -> usize {
        self.z.len()
    }

    pub fn n_x(&self) -> usize {
        self.n_x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Treatment column `j`.
    pub fn d(&self, j: usize) -> &[f64] {
        &self.d[j]
    }

    /// Instrument column `j`.
    pub fn z(&self, j: usize) -> &[f64] {
        &self.z[j]
    }

    /// Covariates as a column-major matrix view.
    pub fn x(&self) -> Matrix<'_, f64> {
        Matrix::new(&self.x, self.n_obs, self.n_x)
    }

    pub fn clusters(&self) -> Option<&[i64]> {
        self.cluster.as_deref()
    }

    pub fn is_cluster_data(&self) -> bool {
        self.cluster.is_some()
    }

    pub fn y_col(&self) -> &str {
        &self.y_col
    }

    pub fn d_cols(&self) -> &[String] {
        &self.d_cols
    }

    pub fn x_cols(&self) -> &[String] {
        &self.x_cols
    }

    pub fn z_cols(&self) -> &[String] {
        &self.z_cols
    }

    /// Column-major feature buffer used when estimating treatment `j`:
    /// the covariates, followed by the other treatment columns if requested.
    ///
    /// Returns the buffer and its number of columns.
    pub fn features(&self, j: usize, use_other_treat_as_covariate: bool) -> (Vec<f64>, usize) {
        let mut data = self.x.clone();
        let mut cols = self.n_x;
        if use_other_treat_as_covariate {
            for (k, col) in self.d.iter().enumerate() {
                if k != j {
                    data.extend_from_slice(col);
                    cols += 1;
                }
            }
        }
        (data, cols)
    }
}

/// Everything a model sees while estimating a single treatment column.
pub struct TreatmentView<'a> {
    /// Name of the treatment column being estimated.
    pub treatment: &'a str,
    /// Features (covariates plus, optionally, the other treatments).
    pub x: Matrix<'a, f64>,
    pub y: &'a [f64],
    pub d: &'a [f64],
    /// First instrument column, if any.
    pub z: Option<&'a [f64]>,
    pub n_obs: usize,
}
