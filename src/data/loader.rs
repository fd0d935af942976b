use crate::data::{DatasetPaths, FeatureRow, GeneLink, GeneTables};
use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    ///
    /// The cohort tables ship without an extension and are comma-delimited,
    /// so a bare file name is treated as CSV.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    Ok(FileFormat::GzippedCsv)
                }
            }
            (None, _) | (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            (Some(other), _) => Err(anyhow::anyhow!("Unsupported file format: .{}", other)),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Loader for the headerless cohort tables
#[derive(Debug, Clone, Copy, Default)]
pub struct TableLoader;

impl TableLoader {
    /// Create new loader
    pub fn new() -> Self {
        Self
    }

    /// Load all four tables of a cohort
    pub fn load_tables(&self, paths: &DatasetPaths) -> Result<GeneTables> {
        let missing = paths.missing();
        if !missing.is_empty() {
            bail!("Missing input files: {:?}", missing);
        }

        let tables = GeneTables {
            drivers: self.load_gene_list(&paths.drivers)?,
            features: self.load_features(&paths.gene_features)?,
            links: self.load_links(&paths.links)?,
            passengers: self.load_gene_list(&paths.passengers)?,
        };

        info!(
            "Loaded {} feature rows, {} links, {} drivers, {} passengers",
            tables.features.len(),
            tables.links.len(),
            tables.drivers.len(),
            tables.passengers.len()
        );
        Ok(tables)
    }

    /// Load a gene list (first column of every row)
    pub fn load_gene_list<P: AsRef<Path>>(&self, path: P) -> Result<Vec<String>> {
        let path = path.as_ref();
        let rows = self.read_rows(path)?;

        rows.into_iter()
            .map(|(line, record)| {
                first_field(&record)
                    .with_context(|| format!("Empty gene identifier at {:?} line {}", path, line))
            })
            .collect()
    }

    /// Load the gene feature table
    pub fn load_features<P: AsRef<Path>>(&self, path: P) -> Result<Vec<FeatureRow>> {
        let path = path.as_ref();
        let rows = self.read_rows(path)?;

        let mut features = Vec::with_capacity(rows.len());
        let mut width: Option<usize> = None;

        for (line, record) in rows {
            let gene_id = first_field(&record)
                .with_context(|| format!("Empty gene identifier at {:?} line {}", path, line))?;

            let values = record.iter()
                .skip(1)
                .enumerate()
                .map(|(col, cell)| {
                    cell.parse::<f32>().with_context(|| {
                        format!(
                            "Non-numeric feature {:?} in column {} at {:?} line {}",
                            cell, col + 1, path, line
                        )
                    })
                })
                .collect::<Result<Vec<f32>>>()?;

            match width {
                None => width = Some(values.len()),
                Some(expected) if expected != values.len() => {
                    bail!(
                        "Ragged feature row at {:?} line {}: expected {} features, found {}",
                        path, line, expected, values.len()
                    );
                }
                Some(_) => {}
            }

            features.push(FeatureRow { gene_id, features: values, line });
        }

        debug!("Feature width: {:?}", width);
        Ok(features)
    }

    /// Load the gene-gene link table (first two columns)
    pub fn load_links<P: AsRef<Path>>(&self, path: P) -> Result<Vec<GeneLink>> {
        let path = path.as_ref();
        let rows = self.read_rows(path)?;

        rows.into_iter()
            .map(|(line, record)| {
                match (record.get(0), record.get(1)) {
                    (Some(source), Some(target)) if !source.is_empty() && !target.is_empty() => {
                        Ok(GeneLink {
                            source: source.to_string(),
                            target: target.to_string(),
                            line,
                        })
                    }
                    _ => bail!("Link row at {:?} line {} needs two gene identifiers", path, line),
                }
            })
            .collect()
    }

    /// Read raw records with their 1-based line numbers
    fn read_rows(&self, path: &Path) -> Result<Vec<(usize, StringRecord)>> {
        let format = FileFormat::from_path(path)?;
        debug!("Reading {:?} as {:?}", path, format);

        let file = File::open(path)
            .with_context(|| format!("Failed to open {:?}", path))?;

        let reader: Box<dyn Read> = if format.is_gzipped() {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };

        self.parse_rows(BufReader::new(reader), format)
            .with_context(|| format!("Failed to parse {:?}", path))
    }

    /// Parse records from reader
    fn parse_rows<R: Read>(&self, mut reader: R, format: FileFormat) -> Result<Vec<(usize, StringRecord)>> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw).context("Failed to read table")?;

        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(raw.as_slice());

        let mut lines = LineCounter::new(&raw);
        let mut rows = Vec::new();

        for result in csv_reader.records() {
            let record = result.context("Failed to parse CSV record")?;

            // Blank lines come through as a single empty field
            if record.iter().all(str::is_empty) {
                continue;
            }

            let offset = record.position().map(|p| p.byte() as usize).unwrap_or(raw.len());
            rows.push((lines.line_at(offset), record));
        }

        Ok(rows)
    }
}

/// Maps byte offsets to 1-based physical line numbers
///
/// The csv reader drops empty lines without counting them, so its own
/// line numbers drift after the first blank line. A record position
/// points at the end of the previous record, which may be followed by
/// any number of line terminators before the record itself starts.
struct LineCounter<'a> {
    data: &'a [u8],
    scanned: usize,
    newlines: usize,
}

impl<'a> LineCounter<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, scanned: 0, newlines: 0 }
    }

    /// Line of the first non-terminator byte at or after `offset`; offsets must not decrease
    fn line_at(&mut self, offset: usize) -> usize {
        let mut start = offset.min(self.data.len()).max(self.scanned);
        while start < self.data.len() && matches!(self.data[start], b'\n' | b'\r') {
            start += 1;
        }
        self.newlines += self.data[self.scanned..start].iter().filter(|&&b| b == b'\n').count();
        self.scanned = start;
        self.newlines + 1
    }
}

fn first_field(record: &StringRecord) -> Option<String> {
    record.get(0)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    #[test]
    fn test_file_format_detection() {
        assert_eq!(FileFormat::from_path("drivers").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_path("data.csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_path("data.tsv").unwrap(), FileFormat::Tsv);
        assert_eq!(FileFormat::from_path("links.gz").unwrap(), FileFormat::GzippedCsv);
        assert_eq!(FileFormat::from_path("data.tsv.gz").unwrap(), FileFormat::GzippedTsv);
        assert!(FileFormat::from_path("data.parquet").is_err());
    }

    #[test]
    fn test_parse_rows_skips_blank_lines() {
        let loader = TableLoader::new();
        let rows = loader.parse_rows(Cursor::new("g1,1.0\n\ng2,2.0\n"), FileFormat::Csv).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 1);
        assert_eq!(rows[1].0, 3);
        assert_eq!(&rows[1].1[0], "g2");
    }

    #[test]
    fn test_line_numbers_after_blank_lines() {
        let loader = TableLoader::new();
        let rows = loader
            .parse_rows(Cursor::new("g1\r\n\r\n\n\ng2\ng3\n\ng4"), FileFormat::Csv)
            .unwrap();

        let lines: Vec<usize> = rows.iter().map(|(line, _)| *line).collect();
        assert_eq!(lines, vec![1, 5, 6, 8]);
    }

    #[test]
    fn test_error_names_physical_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gene_features");
        std::fs::write(&path, "g1,0.5\n\n\ng2,oops\n").unwrap();

        let err = TableLoader::new().load_features(&path).unwrap_err();
        assert!(err.to_string().contains("line 4"), "{}", err);
    }

    #[test]
    fn test_load_features() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gene_features");
        std::fs::write(&path, "g1,0.5,1\ng2, 1.5 ,2\n").unwrap();

        let rows = TableLoader::new().load_features(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].gene_id, "g1");
        assert_eq!(rows[1].features, vec![1.5, 2.0]);
        assert_eq!(rows[1].line, 2);
    }

    #[test]
    fn test_load_features_rejects_bad_rows() {
        let dir = TempDir::new().unwrap();

        let ragged = dir.path().join("ragged");
        std::fs::write(&ragged, "g1,0.5,1\ng2,1.5\n").unwrap();
        let err = TableLoader::new().load_features(&ragged).unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let text = dir.path().join("text");
        std::fs::write(&text, "g1,abc\n").unwrap();
        assert!(TableLoader::new().load_features(&text).is_err());
    }

    #[test]
    fn test_load_links_and_lists() {
        let dir = TempDir::new().unwrap();
        let links = dir.path().join("links");
        std::fs::write(&links, "g1,g2,0.9\ng2,g3\n").unwrap();
        let drivers = dir.path().join("drivers");
        std::fs::write(&drivers, "g2\ng3\n").unwrap();

        let loader = TableLoader::new();
        let links = loader.load_links(&links).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].source, "g1");
        assert_eq!(links[0].target, "g2");

        let drivers = loader.load_gene_list(&drivers).unwrap();
        assert_eq!(drivers, vec!["g2".to_string(), "g3".to_string()]);
    }

    #[test]
    fn test_load_gzipped_table() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("passengers.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"g7\ng8\n").unwrap();
        encoder.finish().unwrap();

        let genes = TableLoader::new().load_gene_list(&path).unwrap();
        assert_eq!(genes, vec!["g7".to_string(), "g8".to_string()]);
    }

    #[test]
    fn test_missing_files() {
        let dir = TempDir::new().unwrap();
        let paths = DatasetPaths::in_dir(dir.path());

        let err = TableLoader::new().load_tables(&paths).unwrap_err();
        assert!(err.to_string().contains("Missing input files"));
    }
}
