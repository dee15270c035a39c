//! Boundary hierarchy expansion
//!
//! Converts between parent-pointer boundary nodes and the "column-per-level"
//! spreadsheet layout (one column per hierarchy level, one row per leaf), and
//! counts nodes in the nested trees the boundary service returns.

use rust_xlsxwriter::Workbook as XlsxWorkbook;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::core::cell::Cell;
use crate::core::workbook::{write_cell, Sheet, Workbook, WorkbookError};

/// Header labels of the standard (one row per node) layout
pub const STANDARD_HEADERS: [&str; 4] = ["code", "name", "boundaryType", "parentCode"];

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("Hierarchy has no root node")]
    NoRoot,

    #[error("Hierarchy has more than one root: {}", .0.join(", "))]
    MultipleRoots(Vec<String>),

    #[error("Boundary '{code}' references unknown parent '{parent}'")]
    UnresolvedParent { code: String, parent: String },

    #[error("Boundary '{0}' is part of a cycle")]
    Cycle(String),

    #[error("Boundary '{code}' appears under two parents: '{first}' and '{second}'")]
    ConflictingParents {
        code: String,
        first: String,
        second: String,
    },

    #[error("Boundary code '{0}' is defined more than once")]
    DuplicateCode(String),

    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

/// One boundary with a pointer to its parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub boundary_type: String,
    pub parent_code: Option<String>,
}

impl HierarchyNode {
    pub fn new(code: &str, boundary_type: &str, parent_code: Option<&str>) -> Self {
        Self {
            code: code.to_string(),
            name: None,
            boundary_type: boundary_type.to_string(),
            parent_code: parent_code.map(str::to_string),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// Spreadsheet layout of a boundary template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateLayout {
    /// Explicit `code` / `boundaryType` / `parentCode` columns
    Standard,
    /// One column per hierarchy level name
    ColumnPerLevel,
    /// Neither; a standard sheet gets written instead
    Unknown,
}

/// Decide a template's layout from its header row
///
/// Standard columns win when both are present.
pub fn detect_layout(headers: &[String], levels: &[String]) -> TemplateLayout {
    let has = |name: &str| headers.iter().any(|h| h == name);
    if has("code") && has("boundaryType") {
        TemplateLayout::Standard
    } else if headers.iter().any(|h| !h.is_empty() && levels.contains(h)) {
        TemplateLayout::ColumnPerLevel
    } else {
        TemplateLayout::Unknown
    }
}

/// One flattened row: the code at each level, aligned with the level list
pub type LevelRow = Vec<Option<String>>;

/// An indexed set of hierarchy nodes
#[derive(Debug, Clone)]
pub struct Hierarchy {
    nodes: Vec<HierarchyNode>,
    by_code: HashMap<String, usize>,
}

impl Hierarchy {
    /// Index nodes by code; the first definition of a code wins
    pub fn new(nodes: Vec<HierarchyNode>) -> Self {
        let mut by_code = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            by_code.entry(node.code.clone()).or_insert(i);
        }
        Self { nodes, by_code }
    }

    pub fn nodes(&self) -> &[HierarchyNode] {
        &self.nodes
    }

    pub fn get(&self, code: &str) -> Option<&HierarchyNode> {
        self.by_code.get(code).map(|&i| &self.nodes[i])
    }

    /// `(boundaryType, code)` pairs from the root down to `code`
    ///
    /// The walk stops at a missing parent or a code already visited, so
    /// partial data and cycles both terminate.
    pub fn ancestor_chain(&self, code: &str) -> Vec<(String, String)> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.get(code);

        while let Some(node) = current {
            if !visited.insert(node.code.as_str()) {
                tracing::warn!(code = %node.code, "cycle in boundary parents, stopping walk");
                break;
            }
            chain.push((node.boundary_type.clone(), node.code.clone()));
            current = node.parent_code.as_deref().and_then(|p| self.get(p));
        }

        chain.reverse();
        chain
    }

    /// One row per node of the last level, holding every ancestor's code
    pub fn flatten(&self, levels: &[String]) -> Vec<LevelRow> {
        let Some(leaf_type) = levels.last() else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|n| &n.boundary_type == leaf_type)
            .map(|leaf| {
                let chain = self.ancestor_chain(&leaf.code);
                levels
                    .iter()
                    .map(|level| {
                        chain
                            .iter()
                            .find(|(t, _)| t == level)
                            .map(|(_, c)| c.clone())
                    })
                    .collect()
            })
            .collect()
    }

    /// Check the tree invariants: one root, resolvable parents, no cycles,
    /// unique codes
    pub fn validate(&self) -> Result<(), HierarchyError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.code.as_str()) {
                return Err(HierarchyError::DuplicateCode(node.code.clone()));
            }
        }

        let roots: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.parent_code.is_none())
            .map(|n| n.code.clone())
            .collect();
        match roots.len() {
            0 => return Err(HierarchyError::NoRoot),
            1 => {}
            _ => return Err(HierarchyError::MultipleRoots(roots)),
        }

        for node in &self.nodes {
            if let Some(parent) = &node.parent_code {
                if self.get(parent).is_none() {
                    return Err(HierarchyError::UnresolvedParent {
                        code: node.code.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }

        for node in &self.nodes {
            let mut visited = HashSet::new();
            let mut current = Some(node);
            while let Some(n) = current {
                if !visited.insert(n.code.as_str()) {
                    return Err(HierarchyError::Cycle(node.code.clone()));
                }
                current = n.parent_code.as_deref().and_then(|p| self.get(p));
            }
        }

        Ok(())
    }
}

/// Rebuild parent-pointer nodes from column-per-level rows
///
/// Each row lists codes in level order; a value's parent is the nearest
/// non-blank value to its left. Nodes come out in order of first appearance.
pub fn unflatten(levels: &[String], rows: &[LevelRow]) -> Result<Vec<HierarchyNode>, HierarchyError> {
    let mut nodes: Vec<HierarchyNode> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let mut parent: Option<String> = None;
        for (level, value) in levels.iter().zip(row.iter()) {
            let Some(code) = value.as_deref().map(str::trim).filter(|c| !c.is_empty()) else {
                continue;
            };

            match index.get(code) {
                Some(&i) => {
                    let existing = &nodes[i];
                    if existing.parent_code != parent {
                        return Err(HierarchyError::ConflictingParents {
                            code: code.to_string(),
                            first: existing.parent_code.clone().unwrap_or_default(),
                            second: parent.unwrap_or_default(),
                        });
                    }
                }
                None => {
                    index.insert(code.to_string(), nodes.len());
                    nodes.push(HierarchyNode::new(code, level, parent.as_deref()));
                }
            }
            parent = Some(code.to_string());
        }
    }

    Ok(nodes)
}

/// Read the level columns of a column-per-level sheet
pub fn level_rows(sheet: &Sheet, levels: &[String]) -> Vec<LevelRow> {
    sheet
        .rows()
        .map(|row| levels.iter().map(|l| row.text(l)).collect::<LevelRow>())
        .filter(|r| r.iter().any(Option::is_some))
        .collect()
}

/// Nodes from a standard-layout sheet; rows without a code are skipped
pub fn read_nodes(sheet: &Sheet) -> Result<Vec<HierarchyNode>, HierarchyError> {
    sheet.require_columns(&["code", "boundaryType"])?;
    Ok(sheet
        .rows()
        .filter_map(|row| {
            let code = row.text("code")?;
            let boundary_type = row.text("boundaryType").unwrap_or_default();
            let parent = row.text("parentCode");
            let node = HierarchyNode::new(&code, &boundary_type, parent.as_deref());
            Some(match row.text("name") {
                Some(name) => node.with_name(&name),
                None => node,
            })
        })
        .collect())
}

/// Total nodes in a nested `children` tree
pub fn count_tree_nodes(boundaries: &[Value]) -> usize {
    boundaries
        .iter()
        .map(|b| {
            let children = b
                .get("children")
                .and_then(Value::as_array)
                .map(|c| count_tree_nodes(c))
                .unwrap_or(0);
            1 + children
        })
        .sum()
}

/// Write `nodes` into a copy of a boundary template, in whatever layout the
/// template's first sheet uses
pub fn fill_template(
    template: &Path,
    output: &Path,
    nodes: &[HierarchyNode],
    levels: &[String],
) -> Result<TemplateLayout, HierarchyError> {
    let mut source = Workbook::open(template)?;
    let names = source.sheet_names();
    let first = names.first().cloned().unwrap_or_else(|| "Boundary".to_string());
    let sheet = source.sheet(&first)?;
    let layout = detect_layout(sheet.headers(), levels);
    tracing::debug!(?layout, headers = ?sheet.headers(), "detected boundary template layout");

    let mut book = XlsxWorkbook::new();
    let ws = book.add_worksheet();
    ws.set_name(&first).map_err(|e| WorkbookError::write(output, e))?;

    let (headers, rows): (Vec<String>, Vec<Vec<Cell>>) = match layout {
        TemplateLayout::Standard => {
            let headers = sheet.headers().to_vec();
            let rows = nodes
                .iter()
                .map(|n| headers.iter().map(|h| standard_value(n, h)).collect())
                .collect();
            (headers, rows)
        }
        TemplateLayout::ColumnPerLevel => {
            let headers = sheet.headers().to_vec();
            let flat = Hierarchy::new(nodes.to_vec()).flatten(levels);
            let rows = flat
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .map(|h| {
                            levels
                                .iter()
                                .position(|l| l == h)
                                .and_then(|i| row[i].as_deref())
                                .map(Cell::from_text)
                                .unwrap_or(Cell::Absent)
                        })
                        .collect()
                })
                .collect();
            (headers, rows)
        }
        TemplateLayout::Unknown => {
            tracing::warn!(template = %template.display(), "unknown template format, writing standard layout");
            let headers: Vec<String> = STANDARD_HEADERS.iter().map(|h| h.to_string()).collect();
            let rows = nodes
                .iter()
                .map(|n| headers.iter().map(|h| standard_value(n, h)).collect())
                .collect();
            (headers, rows)
        }
    };

    let write = |ws: &mut rust_xlsxwriter::Worksheet| -> Result<(), rust_xlsxwriter::XlsxError> {
        for (c, h) in headers.iter().enumerate() {
            if !h.is_empty() {
                ws.write_string(0, c as u16, h)?;
            }
        }
        for (r, cells) in rows.iter().enumerate() {
            for (c, cell) in cells.iter().enumerate() {
                write_cell(ws, r as u32 + 1, c as u16, cell, None)?;
            }
        }
        Ok(())
    };
    write(ws).map_err(|e| WorkbookError::write(output, e))?;

    // Keep the template's other sheets
    for name in names.iter().skip(1) {
        let other = source.sheet(name)?;
        let ws = book.add_worksheet();
        crate::core::workbook::write_sheet(ws, &other).map_err(|e| WorkbookError::write(output, e))?;
    }

    book.save(output).map_err(|e| WorkbookError::write(output, e))?;
    Ok(layout)
}

fn standard_value(node: &HierarchyNode, header: &str) -> Cell {
    match header {
        "code" => Cell::from_text(&node.code),
        "name" => node.name.as_deref().map(Cell::from_text).unwrap_or(Cell::Absent),
        "boundaryType" => Cell::from_text(&node.boundary_type),
        "parentCode" => node
            .parent_code
            .as_deref()
            .map(Cell::from_text)
            .unwrap_or(Cell::Absent),
        _ => Cell::Absent,
    }
}
