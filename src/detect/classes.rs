//! Class-name table and class→color table.

use std::path::Path;

use anyhow::{Context, Result};
use image::Rgb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Number of slots in the color table. Class ids wrap around it.
pub const COLOR_TABLE_SIZE: usize = 100;

const COLOR_SEED: u64 = 0x5EED_C010_2B0C_0001;

/// Names written by `write_default` when no class list exists yet.
pub const DEFAULT_CLASS_NAMES: &[&str] = &[
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
];

/// Class names ordered by class index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Parse one name per line; line number is the class index.
    ///
    /// Trailing blank lines are dropped, interior ones are kept so indices
    /// stay aligned with the file.
    pub fn parse(text: &str) -> Self {
        let mut names: Vec<String> = text.lines().map(|line| line.trim().to_string()).collect();
        while names.last().is_some_and(|name| name.is_empty()) {
            names.pop();
        }
        Self { names }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read class list {}", path.display()))?;
        Ok(Self::parse(&text))
    }

    /// Write the default class list to `path`.
    pub fn write_default(path: &Path) -> Result<Self> {
        let mut body = DEFAULT_CLASS_NAMES.join("\n");
        body.push('\n');
        std::fs::write(path, body)
            .with_context(|| format!("failed to write class list {}", path.display()))?;
        Ok(Self::new(
            DEFAULT_CLASS_NAMES.iter().map(|name| name.to_string()).collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    /// Name for `class_id`, or `Class_<id>` when the id is outside the table.
    pub fn label(&self, class_id: usize) -> String {
        match self.get(class_id) {
            Some(name) => name.to_string(),
            None => format!("Class_{}", class_id),
        }
    }
}

/// Deterministic per-class colors, fixed for the lifetime of the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorTable {
    colors: Vec<Rgb<u8>>,
}

impl ColorTable {
    pub fn generate() -> Self {
        let mut rng = StdRng::seed_from_u64(COLOR_SEED);
        let colors = (0..COLOR_TABLE_SIZE)
            .map(|_| Rgb([rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>()]))
            .collect();
        Self { colors }
    }

    pub fn color(&self, class_id: usize) -> Rgb<u8> {
        self.colors[class_id % self.colors.len()]
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn parse_keeps_line_indices() {
        let names = ClassNames::parse("person\nbicycle\n\ncar\n\n\n");
        assert_eq!(names.len(), 4);
        assert_eq!(names.get(0), Some("person"));
        assert_eq!(names.get(2), Some(""));
        assert_eq!(names.get(3), Some("car"));
    }

    #[test]
    fn unknown_class_gets_synthetic_label() {
        let names = ClassNames::parse("person\ncar\n");
        assert_eq!(names.label(1), "car");
        assert_eq!(names.label(7), "Class_7");
    }

    #[test]
    fn default_list_round_trips_through_file() -> Result<()> {
        let file = NamedTempFile::new()?;
        let written = ClassNames::write_default(file.path())?;
        let read = ClassNames::from_file(file.path())?;
        assert_eq!(written, read);
        assert_eq!(read.len(), DEFAULT_CLASS_NAMES.len());
        Ok(())
    }

    #[test]
    fn missing_class_file_is_an_error() {
        let err = ClassNames::from_file(Path::new("/nonexistent/classes.txt")).unwrap_err();
        assert!(err.to_string().contains("failed to read class list"));
    }

    #[test]
    fn color_table_is_deterministic() {
        assert_eq!(ColorTable::generate(), ColorTable::generate());
    }

    #[test]
    fn color_lookup_wraps_around() {
        let table = ColorTable::generate();
        assert_eq!(table.len(), COLOR_TABLE_SIZE);
        assert_eq!(table.color(3), table.color(3 + COLOR_TABLE_SIZE));
    }
}
