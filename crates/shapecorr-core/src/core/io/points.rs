use super::traits::PointSetFile;
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PointFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Line {line}: expected 3 numbers, found {found}")]
    WrongArity { line: usize, found: usize },
    #[error("Line {line}: invalid number '{token}'")]
    InvalidNumber { line: usize, token: String },
    #[error("Line {line}: blank lines are not allowed")]
    BlankLine { line: usize },
}

/// Whitespace-separated `x y z` per line, no header.
pub struct ParticlesFile;

impl ParticlesFile {
    fn parse_line(line_number: usize, line: &str) -> Result<Point3<f64>, PointFileError> {
        if line.trim().is_empty() {
            return Err(PointFileError::BlankLine { line: line_number });
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 3 {
            return Err(PointFileError::WrongArity {
                line: line_number,
                found: tokens.len(),
            });
        }
        let mut coords = [0.0f64; 3];
        for (slot, token) in coords.iter_mut().zip(&tokens) {
            *slot = token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| PointFileError::InvalidNumber {
                    line: line_number,
                    token: token.to_string(),
                })?;
        }
        Ok(Point3::new(coords[0], coords[1], coords[2]))
    }
}

impl PointSetFile for ParticlesFile {
    type Error = PointFileError;

    fn read_from(reader: &mut impl BufRead) -> Result<Vec<Point3<f64>>, Self::Error> {
        let mut points = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            points.push(Self::parse_line(index + 1, &line)?);
        }
        Ok(points)
    }

    fn write_to(points: &[Point3<f64>], writer: &mut impl Write) -> Result<(), Self::Error> {
        for p in points {
            writeln!(writer, "{} {} {}", p.x, p.y, p.z)?;
        }
        Ok(())
    }
}
