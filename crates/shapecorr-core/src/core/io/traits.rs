use nalgebra::Point3;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing ordered point-set files.
///
/// Point order is significant: the `i`-th point of every file in a population
/// is the same correspondence point.
pub trait PointSetFile {
    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Reads an ordered point set from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if any line is malformed or the reader fails.
    fn read_from(reader: &mut impl BufRead) -> Result<Vec<Point3<f64>>, Self::Error>;

    /// Writes an ordered point set to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(points: &[Point3<f64>], writer: &mut impl Write) -> Result<(), Self::Error>;

    /// Reads an ordered point set from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Point3<f64>>, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes an ordered point set to a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or writing fails.
    fn write_to_path<P: AsRef<Path>>(points: &[Point3<f64>], path: P) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(points, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
