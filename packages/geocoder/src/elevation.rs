//! Elevation sampling from a gridded raster.
//!
//! The grid is read from an ESRI ASCII raster (`.asc`): a six-line header
//! followed by `nrows` rows of `ncols` whitespace-separated values, north
//! row first.
//!
//! ```text
//! ncols        4
//! nrows        3
//! xllcorner    -90.0
//! yllcorner    38.0
//! cellsize     0.5
//! NODATA_value -9999
//! 12 14 15 18
//! ...
//! ```
//!
//! `xllcenter`/`yllcenter` headers are accepted and converted to corner
//! coordinates. Sampling picks the nearest cell; points outside the grid
//! clamp to the edge.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

/// Errors from loading an elevation grid.
#[derive(Debug, Error)]
pub enum ElevationError {
    /// The grid file does not exist.
    #[error("elevation grid {} not found", path.display())]
    NotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// I/O error while reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid ASCII grid.
    #[error("invalid elevation grid: {0}")]
    Parse(String),
}

/// A regular latitude/longitude grid of elevation values.
#[derive(Debug, Clone)]
pub struct ElevationGrid {
    ncols: usize,
    nrows: usize,
    /// West edge (longitude of the lower-left corner).
    x_min: f64,
    /// South edge (latitude of the lower-left corner).
    y_min: f64,
    cellsize: f64,
    nodata: Option<f64>,
    /// Row-major, north row first.
    values: Vec<f64>,
}

impl ElevationGrid {
    /// Loads a grid from an ESRI ASCII raster file.
    ///
    /// # Errors
    ///
    /// Returns [`ElevationError::NotFound`] if the file is absent, or a parse
    /// error if the header or data are malformed.
    pub fn load(path: &Path) -> Result<Self, ElevationError> {
        if !path.exists() {
            return Err(ElevationError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let grid: Self = text.parse()?;
        log::info!(
            "Loaded elevation grid {} ({}x{} cells, cellsize {})",
            path.display(),
            grid.ncols,
            grid.nrows,
            grid.cellsize
        );
        Ok(grid)
    }

    /// Grid dimensions as `(ncols, nrows)`.
    #[must_use]
    pub const fn dimensions(&self) -> (usize, usize) {
        (self.ncols, self.nrows)
    }

    /// Value of the cell nearest to the given point, or `None` when that
    /// cell holds the no-data marker.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn sample(&self, latitude: f64, longitude: f64) -> Option<f64> {
        let col = ((longitude - self.x_min) / self.cellsize).floor();
        let row_from_south = ((latitude - self.y_min) / self.cellsize).floor();

        let col = col.clamp(0.0, (self.ncols - 1) as f64) as usize;
        let row_from_south = row_from_south.clamp(0.0, (self.nrows - 1) as f64) as usize;
        let row = self.nrows - 1 - row_from_south;

        let value = self.values[row * self.ncols + col];
        if self.is_nodata(value) {
            None
        } else {
            Some(value)
        }
    }

    fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|n| (value - n).abs() < f64::EPSILON)
    }
}

impl FromStr for ElevationGrid {
    type Err = ElevationError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut ncols = None;
        let mut nrows = None;
        let mut x = None;
        let mut y = None;
        let mut x_is_center = false;
        let mut y_is_center = false;
        let mut cellsize = None;
        let mut nodata = None;

        let mut lines = text.lines().filter(|l| !l.trim().is_empty()).peekable();

        while let Some(line) = lines.peek() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                break;
            };
            if key.parse::<f64>().is_ok() {
                break;
            }

            let number = value.parse::<f64>().map_err(|_| {
                ElevationError::Parse(format!("bad header value for {key}: {value}"))
            })?;

            match key.to_ascii_lowercase().as_str() {
                "ncols" => ncols = Some(parse_count(key, value)?),
                "nrows" => nrows = Some(parse_count(key, value)?),
                "xllcorner" => x = Some(number),
                "yllcorner" => y = Some(number),
                "xllcenter" => {
                    x = Some(number);
                    x_is_center = true;
                }
                "yllcenter" => {
                    y = Some(number);
                    y_is_center = true;
                }
                "cellsize" => cellsize = Some(number),
                "nodata_value" => nodata = Some(number),
                _ => {
                    return Err(ElevationError::Parse(format!("unknown header {key}")));
                }
            }
            lines.next();
        }

        let missing = |name: &str| ElevationError::Parse(format!("missing {name} header"));
        let ncols = ncols.ok_or_else(|| missing("ncols"))?;
        let nrows = nrows.ok_or_else(|| missing("nrows"))?;
        let cellsize = cellsize.ok_or_else(|| missing("cellsize"))?;
        let mut x_min = x.ok_or_else(|| missing("xllcorner"))?;
        let mut y_min = y.ok_or_else(|| missing("yllcorner"))?;

        if ncols == 0 || nrows == 0 {
            return Err(ElevationError::Parse("grid has no cells".to_string()));
        }
        if cellsize <= 0.0 || !cellsize.is_finite() {
            return Err(ElevationError::Parse(format!("invalid cellsize {cellsize}")));
        }
        if x_is_center {
            x_min -= cellsize / 2.0;
        }
        if y_is_center {
            y_min -= cellsize / 2.0;
        }

        let values = lines
            .flat_map(str::split_whitespace)
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|_| ElevationError::Parse(format!("bad cell value {v}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if values.len() != ncols * nrows {
            return Err(ElevationError::Parse(format!(
                "expected {} cells, found {}",
                ncols * nrows,
                values.len()
            )));
        }

        Ok(Self {
            ncols,
            nrows,
            x_min,
            y_min,
            cellsize,
            nodata,
            values,
        })
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ElevationError> {
    value
        .parse::<usize>()
        .map_err(|_| ElevationError::Parse(format!("{key} must be a whole number, got {value}")))
}
