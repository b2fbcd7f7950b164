use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::FegridError;

/// Coordinates of an `m` by `n` rectangular lattice anchored at the origin
#[derive(Debug, Clone, PartialEq)]
pub struct RectDomain {
    dx: f64,
    dy: f64,
    x_coords: Vec<f64>,
    y_coords: Vec<f64>,
}

impl RectDomain {
    pub fn new(m: usize, n: usize, dx: f64, dy: f64) -> RectDomain {
        RectDomain {
            dx,
            dy,
            x_coords: (0..m).map(|i| i as f64 * dx).collect(),
            y_coords: (0..n).map(|j| j as f64 * dy).collect(),
        }
    }

    pub fn x_coords(&self) -> &[f64] {
        &self.x_coords
    }

    pub fn y_coords(&self) -> &[f64] {
        &self.y_coords
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn dy(&self) -> f64 {
        self.dy
    }

    /// Writes all x coordinates, then all y coordinates, as raw native-endian f64
    ///
    /// # Arguments
    /// * `output` - The output file path
    pub fn write_binary(&self, output: &Path) -> Result<(), FegridError> {
        let mut bytes: Vec<u8> =
            Vec::with_capacity(8 * (self.x_coords.len() + self.y_coords.len()));
        for value in self.x_coords.iter().chain(self.y_coords.iter()) {
            bytes.extend_from_slice(&value.to_ne_bytes());
        }

        let mut file = match std::fs::File::create(output) {
            Ok(f) => f,
            Err(err) => {
                return Err(FegridError::Report(format!(
                    "Could not open file {}: {err}",
                    output.display()
                )))
            }
        };
        if let Err(err) = file.write_all(&bytes) {
            return Err(FegridError::Report(format!(
                "Could not write file {}: {err}",
                output.display()
            )));
        }

        info!(
            "wrote {} x and {} y coordinates to {}",
            self.x_coords.len(),
            self.y_coords.len(),
            output.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_coordinates() {
        let domain = RectDomain::new(4, 2, 0.5, 0.25);
        assert_eq!(domain.x_coords(), &[0.0, 0.5, 1.0, 1.5]);
        assert_eq!(domain.y_coords(), &[0.0, 0.25]);
        assert_eq!(domain.dx(), 0.5);
        assert_eq!(domain.dy(), 0.25);
    }

    #[test]
    fn test_binary_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.bin");
        RectDomain::new(3, 2, 1.0, 2.0).write_binary(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let values: Vec<f64> = bytes
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 0.0, 2.0]);
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("grid.bin");
        assert!(matches!(
            RectDomain::new(1, 1, 1.0, 1.0).write_binary(&path),
            Err(FegridError::Report(_))
        ));
    }
}
