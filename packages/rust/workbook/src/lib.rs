//! Workbook container: the spreadsheet capability the graders run against.
//!
//! A workbook is a set of named sheets, each holding A1-addressed cells with
//! a stored value and optional formula text, plus chart references and
//! anchored images. The on-disk form is JSON (`.wbk` files); nothing outside
//! this crate depends on the encoding.

pub mod addr;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use sheetgrader_shared::{Result, SheetGraderError};

/// File extension for workbook containers.
pub const WORKBOOK_EXT: &str = "wbk";

/// Current workbook container schema version.
pub const WORKBOOK_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Cell values
// ---------------------------------------------------------------------------

/// A stored cell value. JSON-native; dates travel as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Stable string coercion used before any normalization or comparison:
    /// booleans become `TRUE`/`FALSE`, integral numbers drop the decimal
    /// point (`123`, not `123.0`), text passes through unchanged.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
        }
    }

    /// Numeric view of the value, parsing numeric-looking text.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// One cell: a value, formula text, or both (a computed formula keeps its
/// last value alongside the formula string).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CellValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

// ---------------------------------------------------------------------------
// Sheets
// ---------------------------------------------------------------------------

/// A chart object embedded in a sheet. `image` names a pre-rendered picture
/// file stored next to the workbook, when one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A named worksheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    /// Cells keyed by canonical A1 address.
    #[serde(default)]
    pub cells: BTreeMap<String, Cell>,
    /// Chart objects on this sheet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartRef>,
}

impl Sheet {
    /// Create an empty sheet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            charts: Vec::new(),
        }
    }

    fn cell(&self, a1: &str) -> Option<&Cell> {
        let key = addr::normalize(a1)?;
        self.cells.get(&key)
    }

    /// The stored value at `a1`, if any.
    pub fn value(&self, a1: &str) -> Option<&CellValue> {
        self.cell(a1).and_then(|c| c.value.as_ref())
    }

    /// The formula text at `a1`, if any.
    pub fn formula(&self, a1: &str) -> Option<&str> {
        self.cell(a1).and_then(|c| c.formula.as_deref())
    }

    /// Coerced display text of the value at `a1`; empty string for an empty
    /// or missing cell.
    pub fn text(&self, a1: &str) -> String {
        self.value(a1)
            .map(CellValue::to_display_string)
            .unwrap_or_default()
    }

    /// What the student "typed" into `a1`: the formula text when present,
    /// otherwise the coerced value text. Graders compare against this.
    pub fn entry_text(&self, a1: &str) -> String {
        match self.formula(a1) {
            Some(f) => f.to_string(),
            None => self.text(a1),
        }
    }

    /// Numeric view of the cell at `a1`.
    pub fn number(&self, a1: &str) -> Option<f64> {
        self.value(a1).and_then(CellValue::as_number)
    }

    /// Set the stored value at `a1` (invalid addresses are ignored with a
    /// debug log — writer callers validate addresses via the rubric).
    pub fn set_value(&mut self, a1: &str, value: CellValue) {
        match addr::normalize(a1) {
            Some(key) => {
                self.cells.entry(key).or_default().value = Some(value);
            }
            None => debug!(addr = a1, sheet = %self.name, "ignoring invalid cell address"),
        }
    }

    /// Set text at `a1`.
    pub fn set_text(&mut self, a1: &str, text: impl Into<String>) {
        self.set_value(a1, CellValue::Text(text.into()));
    }

    /// Set a number at `a1`.
    pub fn set_number(&mut self, a1: &str, n: f64) {
        self.set_value(a1, CellValue::Number(n));
    }

    /// Set formula text at `a1`.
    pub fn set_formula(&mut self, a1: &str, formula: impl Into<String>) {
        if let Some(key) = addr::normalize(a1) {
            self.cells.entry(key).or_default().formula = Some(formula.into());
        }
    }
}

// ---------------------------------------------------------------------------
// Workbook
// ---------------------------------------------------------------------------

/// An image anchored into the workbook at a cell address, by file path
/// relative to the workbook location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchoredImage {
    pub anchor: String,
    pub path: String,
}

/// A workbook container: ordered named sheets plus anchored images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workbook {
    pub schema_version: u32,
    pub sheets: Vec<Sheet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<AnchoredImage>,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    /// Create an empty workbook.
    pub fn new() -> Self {
        Self {
            schema_version: WORKBOOK_SCHEMA_VERSION,
            sheets: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Load a workbook from a `.wbk` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SheetGraderError::io(path, e))?;
        let wb: Workbook = serde_json::from_str(&content)
            .map_err(|e| SheetGraderError::workbook(path, e.to_string()))?;
        debug!(path = %path.display(), sheets = wb.sheets.len(), "loaded workbook");
        Ok(wb)
    }

    /// Save the workbook to a `.wbk` file (pretty JSON).
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SheetGraderError::workbook(path, e.to_string()))?;
        std::fs::write(path, json).map_err(|e| SheetGraderError::io(path, e))?;
        debug!(path = %path.display(), "saved workbook");
        Ok(())
    }

    /// All sheet names, in order.
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Look up a sheet by name, case-insensitively and ignoring surrounding
    /// whitespace.
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        let wanted = name.trim().to_lowercase();
        self.sheets
            .iter()
            .find(|s| s.name.trim().to_lowercase() == wanted)
    }

    /// Mutable case-insensitive sheet lookup.
    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        let wanted = name.trim().to_lowercase();
        self.sheets
            .iter_mut()
            .find(|s| s.name.trim().to_lowercase() == wanted)
    }

    /// Append a new empty sheet and return it.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> &mut Sheet {
        self.sheets.push(Sheet::new(name));
        self.sheets.last_mut().expect("just pushed")
    }

    /// Anchor an image into the workbook.
    pub fn anchor_image(&mut self, anchor: impl Into<String>, path: impl Into<String>) {
        self.images.push(AnchoredImage {
            anchor: anchor.into(),
            path: path.into(),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
