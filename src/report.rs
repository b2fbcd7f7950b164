use std::fmt::Display;
use std::io::Write;
use std::path::Path;

use nalgebra::DMatrix;
use nalgebra_sparse::CsrMatrix;
use tracing::info;

use crate::error::FegridError;

/// Relative tolerance for the symmetry check
pub const SYMMETRY_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixStructure {
    Empty,
    Diagonal,
    Tridiagonal,
    Banded,
    Full,
}

impl Display for MatrixStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatrixStructure::Empty => "Empty",
            MatrixStructure::Diagonal => "Diagonal",
            MatrixStructure::Tridiagonal => "Tridiagonal",
            MatrixStructure::Banded => "Banded",
            MatrixStructure::Full => "Full",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixReport {
    pub dimension: usize,
    pub nonzeros: usize,
    pub lower_bandwidth: usize,
    pub upper_bandwidth: usize,
    pub symmetric: bool,
    pub structure: MatrixStructure,
}

/// Checks `a[i, j] == a[j, i]` up to a tolerance relative to the largest entry
pub fn is_symmetric(matrix: &DMatrix<f64>) -> bool {
    if !matrix.is_square() {
        return false;
    }
    let scale = matrix.amax().max(f64::MIN_POSITIVE);
    for i in 0..matrix.nrows() {
        for j in (i + 1)..matrix.ncols() {
            if (matrix[(i, j)] - matrix[(j, i)]).abs() > SYMMETRY_TOLERANCE * scale {
                return false;
            }
        }
    }
    true
}

fn classify(dimension: usize, lower: usize, upper: usize) -> MatrixStructure {
    if dimension == 0 {
        MatrixStructure::Empty
    } else if lower == 0 && upper == 0 {
        MatrixStructure::Diagonal
    } else if lower <= 1 && upper <= 1 {
        MatrixStructure::Tridiagonal
    } else if lower == dimension - 1 && upper == dimension - 1 {
        MatrixStructure::Full
    } else {
        MatrixStructure::Banded
    }
}

/// Analyzes the nonzero pattern of a square matrix
///
/// # Arguments
/// * `matrix` - The assembled global matrix
///
/// # Returns
/// Bandwidths, nonzero count, symmetry and a structure label
pub fn analyze(matrix: &DMatrix<f64>) -> MatrixReport {
    // the conversion keeps only the nonzero entries
    let pattern = CsrMatrix::from(matrix);

    let mut lower_bandwidth = 0;
    let mut upper_bandwidth = 0;
    for (row, col, _) in pattern.triplet_iter() {
        if row > col {
            lower_bandwidth = lower_bandwidth.max(row - col);
        } else {
            upper_bandwidth = upper_bandwidth.max(col - row);
        }
    }

    let dimension = matrix.nrows();
    MatrixReport {
        dimension,
        nonzeros: pattern.nnz(),
        lower_bandwidth,
        upper_bandwidth,
        symmetric: is_symmetric(matrix),
        structure: classify(dimension, lower_bandwidth, upper_bandwidth),
    }
}

/// Prints a matrix report to stdout
pub fn print_report(report: &MatrixReport) {
    println!("{}", report.structure);
    println!("Lower Bandwidth: {}", report.lower_bandwidth);
    println!("Upper Bandwidth: {}", report.upper_bandwidth);
    println!(
        "Dimension: {n}x{n}, nonzeros: {nnz}, symmetric: {sym}",
        n = report.dimension,
        nnz = report.nonzeros,
        sym = report.symmetric
    );
}

/// Writes a matrix as text, one row per line with space-separated entries
///
/// # Arguments
/// * `matrix` - The matrix to write
/// * `output` - The output file path
pub fn write_matrix_text(matrix: &DMatrix<f64>, output: &Path) -> Result<(), FegridError> {
    let mut text = String::new();
    for row in matrix.row_iter() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&line.join(" "));
        text.push('\n');
    }

    let mut file = match std::fs::File::create(output) {
        Ok(f) => f,
        Err(err) => {
            return Err(FegridError::Report(format!(
                "Failed to create {}: {err}",
                output.display()
            )))
        }
    };
    if let Err(err) = file.write_all(text.as_bytes()) {
        return Err(FegridError::Report(format!(
            "Failed to write {}: {err}",
            output.display()
        )));
    }

    info!("wrote {}x{} matrix to {}", matrix.nrows(), matrix.ncols(), output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dmatrix;

    #[test]
    fn test_empty_matrix() {
        let report = analyze(&DMatrix::zeros(0, 0));
        assert_eq!(report.structure, MatrixStructure::Empty);
        assert_eq!(report.nonzeros, 0);
        assert!(report.symmetric);
    }

    #[test]
    fn test_diagonal_and_tridiagonal() {
        let diagonal = dmatrix![2.0, 0.0; 0.0, 3.0];
        assert_eq!(analyze(&diagonal).structure, MatrixStructure::Diagonal);

        let tridiagonal = dmatrix![
            2.0, -1.0, 0.0, 0.0;
            -1.0, 2.0, -1.0, 0.0;
            0.0, -1.0, 2.0, -1.0;
            0.0, 0.0, -1.0, 2.0;
        ];
        let report = analyze(&tridiagonal);
        assert_eq!(report.structure, MatrixStructure::Tridiagonal);
        assert_eq!((report.lower_bandwidth, report.upper_bandwidth), (1, 1));
        assert_eq!(report.nonzeros, 10);
    }

    #[test]
    fn test_banded_and_full() {
        let banded = dmatrix![
            4.0, -1.0, 0.0, -1.0;
            -1.0, 4.0, -1.0, 0.0;
            0.0, -1.0, 4.0, -1.0;
            0.0, 0.0, -1.0, 4.0;
        ];
        let report = analyze(&banded);
        assert_eq!(report.lower_bandwidth, 1);
        assert_eq!(report.upper_bandwidth, 3);
        assert_eq!(report.structure, MatrixStructure::Banded);
        assert!(!report.symmetric);

        let full = dmatrix![1.0, 2.0, 3.0; 2.0, 1.0, 2.0; 3.0, 2.0, 1.0];
        let report = analyze(&full);
        assert_eq!(report.structure, MatrixStructure::Full);
        assert!(report.symmetric);
    }

    #[test]
    fn test_symmetry_tolerance_scales_with_entries() {
        let nearly = dmatrix![1.0e6, 2.0e6 + 1e-7; 2.0e6, 1.0e6];
        assert!(is_symmetric(&nearly));
        let skewed = dmatrix![1.0, 2.0; 2.1, 1.0];
        assert!(!is_symmetric(&skewed));
    }

    #[test]
    fn test_write_matrix_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GlobalKMatrixFile.txt");
        write_matrix_text(&dmatrix![240.0, -30.5; -30.5, 0.0], &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "240 -30.5\n-30.5 0\n");
    }

    #[test]
    fn test_write_matrix_text_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("out.txt");
        assert!(matches!(
            write_matrix_text(&DMatrix::zeros(1, 1), &path),
            Err(FegridError::Report(_))
        ));
    }
}
