//! Grid template and ESRI ASCII grid reading/writing.
//!
//! No-data cells are held as `NaN` in memory and written back using the
//! raster's `nodata_value`.

use std::fs;
use std::path::Path;

use thiserror::Error;

pub const DEFAULT_NODATA: f64 = -9999.0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to read raster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("raster {path}: missing header field '{field}'")]
    MissingHeader { path: String, field: &'static str },
    #[error("raster {path}: cannot parse '{token}' as a number")]
    BadNumber { path: String, token: String },
    #[error("raster {path}: expected {expected} cell values, found {found}")]
    CellCount {
        path: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    rows: usize,
    cols: usize,
    cellsize: f64,
    xll: f64,
    yll: f64,
    nodata_value: f64,
    values: Vec<f64>,
    label: String,
}

impl Raster {
    /// A raster filled with `fill`.
    pub fn filled(rows: usize, cols: usize, cellsize: f64, xll: f64, yll: f64, fill: f64) -> Self {
        Self {
            rows,
            cols,
            cellsize,
            xll,
            yll,
            nodata_value: DEFAULT_NODATA,
            values: vec![fill; rows * cols],
            label: "<memory>".to_string(),
        }
    }

    /// Builds a raster from row-major rows; every row must have the same length.
    pub fn from_rows(rows: &[Vec<f64>], cellsize: f64, xll: f64, yll: f64) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        let mut raster = Self::filled(rows.len(), cols, cellsize, xll, yll, 0.0);
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate().take(cols) {
                raster.values[i * cols + j] = *value;
            }
        }
        raster
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cellsize(&self) -> f64 {
        self.cellsize
    }

    pub fn xll(&self) -> f64 {
        self.xll
    }

    pub fn yll(&self) -> f64 {
        self.yll
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    pub fn set_value(&mut self, row: usize, col: usize, value: f64) {
        self.values[row * self.cols + col] = value;
    }

    pub fn is_no_data(&self, row: usize, col: usize) -> bool {
        self.value(row, col).is_nan()
    }

    pub fn read_ascii(path: impl AsRef<Path>) -> Result<Self, RasterError> {
        let path = path.as_ref();
        let label = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|source| RasterError::Io {
            path: label.clone(),
            source,
        })?;
        Self::parse_ascii(&text, &label)
    }

    pub fn parse_ascii(text: &str, label: &str) -> Result<Self, RasterError> {
        let mut tokens = text.split_whitespace().peekable();
        let mut ncols = None;
        let mut nrows = None;
        let mut xll = None;
        let mut yll = None;
        let mut center = (false, false);
        let mut cellsize = None;
        let mut nodata = DEFAULT_NODATA;

        while let Some(key) = tokens.peek().copied() {
            if key.parse::<f64>().is_ok() {
                break;
            }
            tokens.next();
            let raw = tokens.next().ok_or(RasterError::MissingHeader {
                path: label.to_string(),
                field: "value",
            })?;
            let value = parse_number(raw, label)?;
            match key.to_ascii_lowercase().as_str() {
                "ncols" => ncols = Some(value as usize),
                "nrows" => nrows = Some(value as usize),
                "xllcorner" => xll = Some(value),
                "xllcenter" => {
                    xll = Some(value);
                    center.0 = true;
                }
                "yllcorner" => yll = Some(value),
                "yllcenter" => {
                    yll = Some(value);
                    center.1 = true;
                }
                "cellsize" => cellsize = Some(value),
                "nodata_value" => nodata = value,
                _ => {
                    return Err(RasterError::BadNumber {
                        path: label.to_string(),
                        token: key.to_string(),
                    })
                }
            }
        }

        let missing = |field| RasterError::MissingHeader {
            path: label.to_string(),
            field,
        };
        let cols = ncols.ok_or_else(|| missing("ncols"))?;
        let rows = nrows.ok_or_else(|| missing("nrows"))?;
        let cellsize = cellsize.ok_or_else(|| missing("cellsize"))?;
        let mut xll = xll.ok_or_else(|| missing("xllcorner"))?;
        let mut yll = yll.ok_or_else(|| missing("yllcorner"))?;
        if center.0 {
            xll -= cellsize / 2.0;
        }
        if center.1 {
            yll -= cellsize / 2.0;
        }

        let mut values = Vec::with_capacity(rows * cols);
        for token in tokens {
            let value = parse_number(token, label)?;
            values.push(if value == nodata { f64::NAN } else { value });
        }
        if values.len() != rows * cols {
            return Err(RasterError::CellCount {
                path: label.to_string(),
                expected: rows * cols,
                found: values.len(),
            });
        }

        Ok(Self {
            rows,
            cols,
            cellsize,
            xll,
            yll,
            nodata_value: nodata,
            values,
            label: label.to_string(),
        })
    }

    pub fn to_ascii(&self) -> String {
        let mut out = format!(
            "ncols         {}\nnrows         {}\nxllcorner     {}\nyllcorner     {}\ncellsize      {}\nNODATA_value  {}\n",
            self.cols, self.rows, self.xll, self.yll, self.cellsize, self.nodata_value
        );
        for row in 0..self.rows {
            let line: Vec<String> = (0..self.cols)
                .map(|col| {
                    let v = self.value(row, col);
                    if v.is_nan() {
                        format!("{}", self.nodata_value)
                    } else {
                        format!("{v}")
                    }
                })
                .collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out
    }

    pub fn write_ascii(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        fs::write(path, self.to_ascii())
    }
}

fn parse_number(token: &str, label: &str) -> Result<f64, RasterError> {
    token.parse::<f64>().map_err(|_| RasterError::BadNumber {
        path: label.to_string(),
        token: token.to_string(),
    })
}
