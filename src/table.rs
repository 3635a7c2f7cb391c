use std::collections::HashMap;

use serde::Serialize;

use crate::record::{MaterialSummary, PropertyData, PropertySeries};

/// Identity columns present in every table, in order, ahead of any
/// property column.
pub const IDENTITY_COLUMNS: [&str; 4] = ["idMaterial", "formula", "organic", "inorganic"];

/// Cell value emitted for file-only (atomic structure) properties.
pub const FILE_CELL: &str = "file";

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Option<String>>,
}

/// Incrementally merges [`MaterialSummary`] values into one wide table.
///
/// Property columns are discovered as materials arrive; a column introduced
/// on row k is back-filled with `None` for rows 1..k. Every column holds
/// exactly one cell per added material at all times. Single-writer: the
/// builder is mutated in place and is not meant to be shared across threads.
///
/// Known limitation: a property whose generated column name collides with an
/// identity column name is not detected; no escaping is applied.
#[derive(Debug)]
pub struct TableBuilder {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl TableBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            columns: Vec::new(),
            index: HashMap::new(),
            rows: 0,
        };
        for name in IDENTITY_COLUMNS {
            builder.index.insert(name.to_string(), builder.columns.len());
            builder.columns.push(Column {
                name: name.to_string(),
                cells: Vec::new(),
            });
        }
        builder
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Appends one row for `summary`, growing every existing column by
    /// exactly one cell and creating back-filled columns for properties not
    /// seen before. Repeated property columns within one material are kept
    /// on first occurrence only.
    pub fn add_material(&mut self, summary: &MaterialSummary) {
        let mut staged: Vec<(String, String)> = vec![
            ("idMaterial".to_string(), summary.id.to_string()),
            ("formula".to_string(), summary.formula.clone()),
            ("organic".to_string(), summary.organic.clone()),
            ("inorganic".to_string(), summary.inorganic.clone()),
        ];

        for property in &summary.properties {
            let name = column_name(&property.primary);
            if staged.iter().any(|(staged_name, _)| *staged_name == name) {
                continue;
            }
            staged.push((name, cell_value(&property.primary)));
        }

        let mut incoming: Vec<Option<String>> = vec![None; self.columns.len()];
        let mut fresh = Vec::new();
        for (name, value) in staged {
            match self.index.get(&name) {
                Some(&slot) => incoming[slot] = Some(value),
                None => fresh.push((name, value)),
            }
        }

        for (column, cell) in self.columns.iter_mut().zip(incoming) {
            column.cells.push(cell);
        }
        for (name, value) in fresh {
            let mut cells = vec![None; self.rows];
            cells.push(Some(value));
            self.index.insert(name.clone(), self.columns.len());
            self.columns.push(Column { name, cells });
        }

        self.rows += 1;
    }

    /// Freezes the builder into an immutable snapshot for consumers.
    pub fn finish(self) -> PropertyTable {
        PropertyTable {
            row_count: self.rows,
            columns: self.columns,
            index: self.index,
        }
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire format for property columns: `{name}({id})`. The id keeps
/// same-named properties with different ids apart.
fn column_name(primary: &PropertySeries) -> String {
    format!("{}({})", primary.name, primary.id)
}

fn cell_value(primary: &PropertySeries) -> String {
    match &primary.data {
        PropertyData::File => FILE_CELL.to_string(),
        // The upstream format renders an absent unit as the literal `None`.
        PropertyData::Points(_) => {
            format!("Unit: {}", primary.unit.as_deref().unwrap_or("None"))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyTable {
    pub row_count: usize,
    pub columns: Vec<Column>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl PropertyTable {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[Option<String>]> {
        self.index
            .get(name)
            .map(|&slot| self.columns[slot].cells.as_slice())
    }

    /// Materializes the column mapping into row-major form.
    pub fn rows(&self) -> Vec<Vec<Option<String>>> {
        (0..self.row_count)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|column| column.cells[row].clone())
                    .collect()
            })
            .collect()
    }
}
