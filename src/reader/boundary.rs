//! Boundary sheets: hierarchy definition, entities, relationships

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::core::record::{MasterRecord, RecordKind};
use crate::core::workbook::{Sheet, WorkbookError};
use crate::hierarchy::{self, HierarchyError, HierarchyNode};
use crate::reader::ParsedSheet;

pub const HIERARCHY_SHEET: &str = "Hierarchy_Definition";
pub const ENTITY_SHEET: &str = "Boundary_Entities";
pub const RELATIONSHIP_SHEET: &str = "Boundary_Relationships";

const COL_TENANT: &str = "Tenant ID";
const COL_CODE: &str = "Boundary Code";
const COL_POLYGON: &str = "Polygon Coordinates (JSON)";

/// One level of a boundary hierarchy definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyLevel {
    pub boundary_type: String,
    pub parent_boundary_type: Option<String>,
    pub active: bool,
}

/// A boundary hierarchy: an ordered list of level types
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyDefinition {
    pub tenant_id: String,
    pub hierarchy_type: String,
    pub boundary_hierarchy: Vec<HierarchyLevel>,
}

impl HierarchyDefinition {
    /// Chain levels so each one's parent is the level before it
    pub fn from_levels(tenant_id: &str, hierarchy_type: &str, levels: &[String]) -> Self {
        let mut previous: Option<String> = None;
        let boundary_hierarchy = levels
            .iter()
            .map(|level| HierarchyLevel {
                boundary_type: level.clone(),
                parent_boundary_type: previous.replace(level.clone()),
                active: true,
            })
            .collect();
        Self {
            tenant_id: tenant_id.to_string(),
            hierarchy_type: hierarchy_type.to_string(),
            boundary_hierarchy,
        }
    }

    pub fn levels(&self) -> Vec<String> {
        self.boundary_hierarchy
            .iter()
            .map(|l| l.boundary_type.clone())
            .collect()
    }
}

/// Read the first row of the hierarchy definition sheet
///
/// Every column whose header starts with `Level` contributes one level, in
/// column order. Returns `None` for an empty sheet.
pub fn read_hierarchy_definition(sheet: &Sheet) -> Result<Option<HierarchyDefinition>, WorkbookError> {
    sheet.require_columns(&["City Code", "Hierarchy Type"])?;
    let Some(row) = sheet.row(0) else {
        return Ok(None);
    };
    let (Some(tenant), Some(hierarchy_type)) = (row.text("City Code"), row.text("Hierarchy Type")) else {
        return Ok(None);
    };

    let levels: Vec<String> = sheet
        .headers()
        .iter()
        .filter(|h| h.starts_with("Level"))
        .filter_map(|h| row.text(h))
        .collect();

    Ok(Some(HierarchyDefinition::from_levels(&tenant, &hierarchy_type, &levels)))
}

/// Read boundary entities; bad or missing polygon JSON becomes an empty ring
pub fn read_entities(sheet: &Sheet) -> Result<ParsedSheet, WorkbookError> {
    sheet.require_columns(&[COL_TENANT, COL_CODE])?;

    let mut parsed = ParsedSheet::new();
    for row in sheet.rows() {
        let (Some(tenant), Some(code)) = (row.text(COL_TENANT), row.text(COL_CODE)) else {
            parsed.skipped += 1;
            continue;
        };

        let coordinates = row
            .text(COL_POLYGON)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .map(|ring| json!([ring]))
            .unwrap_or_else(empty_polygon);

        let mut data = entity_payload(&tenant, &code, coordinates);
        if let Some(desc) = row.text("Description") {
            data.insert("description".into(), json!(desc));
        }
        parsed.records.push(
            MasterRecord::new(RecordKind::BoundaryEntity, &tenant, data).with_source_row(row.index()),
        );
    }
    Ok(parsed)
}

/// Read parent links; a blank parent marks the root
pub fn read_relationships(sheet: &Sheet) -> Result<ParsedSheet, WorkbookError> {
    sheet.require_columns(&[COL_TENANT, COL_CODE, "Hierarchy Type", "Boundary Type"])?;

    let mut parsed = ParsedSheet::new();
    for row in sheet.rows() {
        let (Some(tenant), Some(code)) = (row.text(COL_TENANT), row.text(COL_CODE)) else {
            parsed.skipped += 1;
            continue;
        };
        let data = relationship_payload(
            &tenant,
            &row.text("Hierarchy Type").unwrap_or_default(),
            &code,
            &row.text("Boundary Type").unwrap_or_default(),
            row.text("Parent").as_deref(),
        );
        parsed.records.push(
            MasterRecord::new(RecordKind::BoundaryRelationship, &tenant, data)
                .with_source_row(row.index()),
        );
    }
    Ok(parsed)
}

/// Entities and relationships from a column-per-level sheet
pub fn read_level_sheet(
    sheet: &Sheet,
    tenant_id: &str,
    hierarchy_type: &str,
    levels: &[String],
) -> Result<(ParsedSheet, ParsedSheet), HierarchyError> {
    let rows = hierarchy::level_rows(sheet, levels);
    let nodes = hierarchy::unflatten(levels, &rows)?;
    Ok(records_from_nodes(tenant_id, hierarchy_type, &nodes))
}

/// One entity and one relationship record per node, parents first
pub fn records_from_nodes(
    tenant_id: &str,
    hierarchy_type: &str,
    nodes: &[HierarchyNode],
) -> (ParsedSheet, ParsedSheet) {
    let mut entities = ParsedSheet::new();
    let mut relationships = ParsedSheet::new();
    for node in nodes {
        entities.records.push(MasterRecord::new(
            RecordKind::BoundaryEntity,
            tenant_id,
            entity_payload(tenant_id, &node.code, empty_polygon()),
        ));
        relationships.records.push(MasterRecord::new(
            RecordKind::BoundaryRelationship,
            tenant_id,
            relationship_payload(
                tenant_id,
                hierarchy_type,
                &node.code,
                &node.boundary_type,
                node.parent_code.as_deref(),
            ),
        ));
    }
    (entities, relationships)
}

fn empty_polygon() -> Value {
    json!([[[]]])
}

fn entity_payload(tenant: &str, code: &str, coordinates: Value) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("tenantId".into(), json!(tenant));
    data.insert("code".into(), json!(code));
    data.insert(
        "geometry".into(),
        json!({"type": "Polygon", "coordinates": coordinates}),
    );
    data
}

fn relationship_payload(
    tenant: &str,
    hierarchy_type: &str,
    code: &str,
    boundary_type: &str,
    parent: Option<&str>,
) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("tenantId".into(), json!(tenant));
    data.insert("code".into(), json!(code));
    data.insert("hierarchyType".into(), json!(hierarchy_type));
    data.insert("boundaryType".into(), json!(boundary_type));
    data.insert("parent".into(), json!(parent.unwrap_or("")));
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_definition_chains_levels() {
        let sheet = Sheet::from_strings(
            HIERARCHY_SHEET,
            &["City Code", "Hierarchy Type", "Level 1", "Level 2", "Level 3", "Notes"],
            &[vec!["pg", "ADMIN", "State", "District", "", "x"]],
        );
        let def = read_hierarchy_definition(&sheet).unwrap().unwrap();
        assert_eq!(def.levels(), vec!["State", "District"]);
        assert_eq!(def.boundary_hierarchy[0].parent_boundary_type, None);
        assert_eq!(
            def.boundary_hierarchy[1].parent_boundary_type.as_deref(),
            Some("State")
        );

        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["boundaryHierarchy"][1]["parentBoundaryType"], "State");
        assert_eq!(json["hierarchyType"], "ADMIN");
    }

    #[test]
    fn test_empty_hierarchy_sheet() {
        let sheet = Sheet::from_strings(HIERARCHY_SHEET, &["City Code", "Hierarchy Type"], &[]);
        assert!(read_hierarchy_definition(&sheet).unwrap().is_none());
    }

    #[test]
    fn test_entities_polygon_fallback() {
        let sheet = Sheet::from_strings(
            ENTITY_SHEET,
            &[COL_TENANT, COL_CODE, COL_POLYGON, "Description"],
            &[
                vec!["pg", "B1", "[[1,2],[3,4]]", "first"],
                vec!["pg", "B2", "not json", ""],
            ],
        );
        let parsed = read_entities(&sheet).unwrap();
        assert_eq!(
            parsed.records[0].data["geometry"]["coordinates"],
            json!([[[1, 2], [3, 4]]])
        );
        assert_eq!(parsed.records[0].data["description"], "first");
        assert_eq!(parsed.records[1].data["geometry"]["coordinates"], json!([[[]]]));
    }

    #[test]
    fn test_relationships_blank_parent() {
        let sheet = Sheet::from_strings(
            RELATIONSHIP_SHEET,
            &[COL_TENANT, COL_CODE, "Hierarchy Type", "Boundary Type", "Parent"],
            &[vec!["pg", "TS", "ADMIN", "State", ""], vec!["pg", "TS_D1", "ADMIN", "District", "TS"]],
        );
        let parsed = read_relationships(&sheet).unwrap();
        assert_eq!(parsed.records[0].data["parent"], "");
        assert_eq!(parsed.records[1].data["parent"], "TS");
    }

    #[test]
    fn test_level_sheet_to_records() {
        let levels: Vec<String> = vec!["State".into(), "District".into(), "Block".into()];
        let sheet = Sheet::from_strings(
            "Boundary",
            &["State", "District", "Block"],
            &[
                vec!["TS", "TS_D1", "TS_D1_B1"],
                vec!["TS", "TS_D1", "TS_D1_B2"],
                vec!["TS", "TS_D2", "TS_D2_B1"],
            ],
        );
        let (entities, relationships) = read_level_sheet(&sheet, "pg", "BNDTEST", &levels).unwrap();
        assert_eq!(entities.records.len(), 6);
        assert_eq!(relationships.records[0].data["parent"], "");
        assert_eq!(relationships.records[1].data["parent"], "TS");
        assert_eq!(relationships.records[1].data["boundaryType"], "District");
    }
}
