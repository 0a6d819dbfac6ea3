//! CSV catalog ingestion.
//!
//! A catalog is a headed CSV table with one row per star. Columns are looked
//! up by name through a [`CatalogLayout`]; every measured quantity is a
//! (value, error) column pair. Empty cells and `nan` (any case) mark an
//! undefined measurement.

use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context};
use tracing::info;

use crate::star::{KinematicColumn, Kinematics, Measurement, Star};

/// Names of the value and uncertainty columns of one quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPair {
    pub value: String,
    pub error: String,
}

impl ColumnPair {
    pub fn new(value: &str, error: &str) -> Self {
        Self {
            value: value.to_string(),
            error: error.to_string(),
        }
    }
}

/// Column names of a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLayout {
    /// Star identifier; the row number is used when `None`.
    pub id: Option<String>,
    pub x: String,
    pub y: String,
    pub mags: Vec<ColumnPair>,
    pub colors: Vec<ColumnPair>,
    /// Kinematic columns, indexed like [`KinematicColumn::ALL`].
    pub kinematics: [Option<ColumnPair>; 4],
}

impl Default for CatalogLayout {
    fn default() -> Self {
        Self {
            id: Some("id".to_string()),
            x: "x".to_string(),
            y: "y".to_string(),
            mags: vec![ColumnPair::new("mag", "e_mag")],
            colors: vec![ColumnPair::new("color", "e_color")],
            kinematics: Default::default(),
        }
    }
}

impl CatalogLayout {
    /// Replace the color columns.
    pub fn with_colors(mut self, colors: &[(&str, &str)]) -> Self {
        self.colors = colors.iter().map(|(v, e)| ColumnPair::new(v, e)).collect();
        self
    }

    /// Add (or replace) a kinematic column pair.
    pub fn with_kinematic(mut self, col: KinematicColumn, value: &str, error: &str) -> Self {
        self.kinematics[kinematic_slot(col)] = Some(ColumnPair::new(value, error));
        self
    }
}

fn kinematic_slot(col: KinematicColumn) -> usize {
    match col {
        KinematicColumn::Parallax => 0,
        KinematicColumn::PmX => 1,
        KinematicColumn::PmY => 2,
        KinematicColumn::RadialVelocity => 3,
    }
}

/// Column indices resolved against a header row.
struct ResolvedLayout {
    id: Option<usize>,
    x: usize,
    y: usize,
    mags: Vec<(usize, usize)>,
    colors: Vec<(usize, usize)>,
    kinematics: [Option<(usize, usize)>; 4],
}

impl ResolvedLayout {
    fn new(headers: &csv::StringRecord, layout: &CatalogLayout) -> anyhow::Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| anyhow!("column '{}' not found in catalog header", name))
        };
        let pair = |p: &ColumnPair| -> anyhow::Result<(usize, usize)> {
            Ok((find(p.value.as_str())?, find(p.error.as_str())?))
        };

        let mut kinematics = [None; 4];
        for (slot, p) in layout.kinematics.iter().enumerate() {
            if let Some(p) = p {
                kinematics[slot] = Some(pair(p)?);
            }
        }

        Ok(Self {
            id: layout.id.as_deref().map(find).transpose()?,
            x: find(layout.x.as_str())?,
            y: find(layout.y.as_str())?,
            mags: layout
                .mags
                .iter()
                .map(pair)
                .collect::<anyhow::Result<_>>()?,
            colors: layout
                .colors
                .iter()
                .map(pair)
                .collect::<anyhow::Result<_>>()?,
            kinematics,
        })
    }
}

/// Parse a cell; `None` for empty, `nan`, or non-finite cells.
fn parse_cell(cell: Option<&str>) -> anyhow::Result<Option<f64>> {
    let s = cell.unwrap_or("").trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let v: f64 = s
        .parse()
        .with_context(|| format!("invalid number '{}'", s))?;
    Ok(v.is_finite().then_some(v))
}

fn measurement(
    record: &csv::StringRecord,
    (v, e): (usize, usize),
) -> anyhow::Result<Option<Measurement>> {
    let value = parse_cell(record.get(v))?;
    let error = parse_cell(record.get(e))?;
    Ok(value.zip(error).map(|(v, e)| Measurement::new(v, e)))
}

/// Read stars from any CSV source.
pub fn read_stars<R: Read>(reader: R, layout: &CatalogLayout) -> anyhow::Result<Vec<Star>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let cols = ResolvedLayout::new(rdr.headers()?, layout)?;

    rdr.records()
        .enumerate()
        .map(|(row, result)| -> anyhow::Result<Star> {
            let record = result?;
            let row_ctx = || format!("catalog row {}", row + 1);

            let id = match cols.id {
                Some(c) => record
                    .get(c)
                    .unwrap_or("")
                    .parse::<u64>()
                    .with_context(|| format!("{}: invalid id", row_ctx()))?,
                None => row as u64,
            };
            let x = parse_cell(record.get(cols.x))
                .with_context(row_ctx)?
                .ok_or_else(|| anyhow!("{}: missing x coordinate", row_ctx()))?;
            let y = parse_cell(record.get(cols.y))
                .with_context(row_ctx)?
                .ok_or_else(|| anyhow!("{}: missing y coordinate", row_ctx()))?;

            let mags = cols
                .mags
                .iter()
                .map(|&p| measurement(&record, p))
                .collect::<anyhow::Result<Vec<_>>>()
                .with_context(row_ctx)?;
            let colors = cols
                .colors
                .iter()
                .map(|&p| measurement(&record, p))
                .collect::<anyhow::Result<Vec<_>>>()
                .with_context(row_ctx)?;

            let mut kin = [None; 4];
            for (slot, p) in cols.kinematics.iter().enumerate() {
                if let Some(p) = p {
                    kin[slot] = measurement(&record, *p).with_context(row_ctx)?;
                }
            }

            Ok(Star {
                id,
                x,
                y,
                mags,
                colors,
                kinematics: Kinematics {
                    parallax: kin[0],
                    pm_x: kin[1],
                    pm_y: kin[2],
                    radial_velocity: kin[3],
                },
            })
        })
        .collect()
}

/// Read one region's stars from a CSV file.
pub fn read_region_csv<P: AsRef<Path>>(
    file: P,
    layout: &CatalogLayout,
) -> anyhow::Result<Vec<Star>> {
    let path = file.as_ref();
    let f = std::fs::File::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let stars = read_stars(f, layout)?;
    info!("Read {} stars from {}", stars.len(), path.display());
    Ok(stars)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = "\
id,x,y,mag,e_mag,color,e_color,plx,e_plx
1,10.0,20.0,14.2,0.01,0.55,0.02,1.2,0.1
2,11.5,19.0,15.0,0.02,nan,0.03,,
3, 9.0,21.5,16.1,0.05,0.80,,NaN,0.2
";

    fn layout() -> CatalogLayout {
        CatalogLayout::default().with_kinematic(KinematicColumn::Parallax, "plx", "e_plx")
    }

    #[test]
    fn parses_rows_and_undefined_cells() {
        let stars = read_stars(CATALOG.as_bytes(), &layout()).unwrap();
        assert_eq!(stars.len(), 3);

        let s = &stars[0];
        assert_eq!(s.id, 1);
        assert_eq!((s.x, s.y), (10.0, 20.0));
        assert_eq!(s.mag(), Some(Measurement::new(14.2, 0.01)));
        assert_eq!(s.colors[0], Some(Measurement::new(0.55, 0.02)));
        assert_eq!(s.kinematics.parallax, Some(Measurement::new(1.2, 0.1)));
        assert!(s.kinematics.pm_x.is_none());

        // "nan" value, empty kinematic cells
        assert_eq!(stars[1].colors[0], None);
        assert_eq!(stars[1].kinematics.parallax, None);

        // Value without an error is undefined too
        assert_eq!(stars[2].colors[0], None);
        assert_eq!(stars[2].kinematics.parallax, None);
        assert_eq!(stars[2].x, 9.0);
    }

    #[test]
    fn row_numbers_as_ids() {
        let layout = CatalogLayout {
            id: None,
            ..layout()
        };
        let stars = read_stars(CATALOG.as_bytes(), &layout).unwrap();
        let ids: Vec<u64> = stars.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn missing_column_is_an_error() {
        let layout = CatalogLayout::default().with_colors(&[("b_v", "e_b_v")]);
        let err = read_stars(CATALOG.as_bytes(), &layout).unwrap_err();
        assert!(err.to_string().contains("b_v"));
    }

    #[test]
    fn bad_number_is_an_error() {
        let csv = "id,x,y,mag,e_mag,color,e_color\n1,abc,0,1,0.1,1,0.1\n";
        assert!(read_stars(csv.as_bytes(), &CatalogLayout::default()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_region_csv("does/not/exist.csv", &CatalogLayout::default()).is_err());
    }
}
