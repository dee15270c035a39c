//! Tenant Info and Tenant Branding sheets

use serde_json::{json, Map, Value};

use crate::core::codes::{localization_key, CodeAllocator, LocalizationSet};
use crate::core::record::{LocalizationMessage, MasterRecord, RecordKind};
use crate::core::workbook::{Row, Sheet, WorkbookError};
use crate::reader::{ParsedSheet, COMMON_MODULE, DERIVED_LOCALE};

pub const TENANT_SHEET: &str = "Tenant Info";

/// The template ships with the misspelled name; both are accepted
pub const BRANDING_SHEETS: [&str; 2] = ["Tenant Branding Deatils", "Tenant Branding Details"];

pub const COL_TENANT_CODE: &str = "Tenant Code*\n(To be filled by ADMIN)";
pub const COL_DISPLAY_NAME: &str = "Tenant Display Name*";
pub const COL_TENANT_TYPE: &str = "Tenant Type*";
pub const COL_ADMIN0: &str = "ADMIN0 Name";
pub const COL_ADMIN1: &str = "ADMIN1 Name";
pub const COL_ADMIN2: &str = "ADMIN2 Name";
pub const COL_REGION: &str =
    "Administrative Region Name (Geographical entity to which the tenant belongs)";
pub const COL_LATITUDE: &str = "Latitude";
pub const COL_LONGITUDE: &str = "Longitude";
pub const COL_ADDRESS: &str = "Address";
pub const COL_WEBSITE: &str = "Tenant Website";
pub const COL_LOGO: &str = "Logo File Path*";

const DEFAULT_DOMAIN_URL: &str = "https://example.com";
const DEFAULT_IMAGE: &str = "default-logo.png";

/// Read tenants, allocating district and region codes per distinct name
pub fn read_tenants(sheet: &Sheet, tenant_id: &str) -> Result<ParsedSheet, WorkbookError> {
    sheet.require_columns(&[COL_TENANT_CODE, COL_DISPLAY_NAME])?;

    let mut parsed = ParsedSheet::new();
    let mut districts = CodeAllocator::with_width("ADMIN2", 3);
    let mut regions = CodeAllocator::with_width("REGION", 3);
    let mut labels = LocalizationSet::new();

    for row in sheet.rows() {
        let (Some(code), Some(name)) = (row.text(COL_TENANT_CODE), row.text(COL_DISPLAY_NAME)) else {
            parsed.skipped += 1;
            continue;
        };
        let code = code.to_lowercase();

        let tenant_type = row.text(COL_TENANT_TYPE).unwrap_or_else(|| {
            if code.contains('.') {
                "CITY".to_string()
            } else {
                "State".to_string()
            }
        });

        let admin2 = row.text(COL_ADMIN2).unwrap_or_default();
        let region = row.text(COL_REGION).unwrap_or_default();
        let district_code = if admin2.is_empty() {
            String::new()
        } else {
            districts.code_for(&admin2).0
        };
        let region_code = if region.is_empty() {
            String::new()
        } else {
            regions.code_for(&region).0
        };

        let city = json!({
            "code": city_code(&code),
            "name": name,
            "ulbGrade": tenant_type,
            "districtCode": district_code,
            "districtName": admin2,
            "districtTenantCode": code,
            "ddrName": region,
            "latitude": row.f64(COL_LATITUDE).unwrap_or(0.0),
            "longitude": row.f64(COL_LONGITUDE).unwrap_or(0.0),
            "regionName": region,
            "regionCode": region_code,
            "localName": name,
            "shapeFileLocation": "",
            "captcha": "true",
        });

        let logo = row.text(COL_LOGO);
        let mut data = Map::new();
        data.insert("code".into(), json!(code));
        data.insert("name".into(), json!(name));
        data.insert("type".into(), json!(tenant_type));
        data.insert("emailId".into(), json!(""));
        data.insert("contactNumber".into(), json!(""));
        data.insert("address".into(), json!(row.text(COL_ADDRESS).unwrap_or_default()));
        data.insert(
            "domainUrl".into(),
            json!(row.text(COL_WEBSITE).unwrap_or_else(|| DEFAULT_DOMAIN_URL.to_string())),
        );
        data.insert("logoId".into(), json!(logo.clone().unwrap_or_default()));
        data.insert(
            "imageId".into(),
            json!(logo.unwrap_or_else(|| DEFAULT_IMAGE.to_string())),
        );
        data.insert("description".into(), json!(format!("{} - {}", name, tenant_type)));
        data.insert("twitterUrl".into(), json!(""));
        data.insert("facebookUrl".into(), json!(""));
        data.insert(
            "OfficeTimings".into(),
            json!({"Mon - Fri": "10:00 AM - 5:00 PM"}),
        );
        data.insert("city".into(), city);
        admin_names(&row, &mut data);

        labels.push(LocalizationMessage::new(
            &format!("TENANT_TENANTS_{}", localization_key(&code)),
            &name,
            COMMON_MODULE,
            DERIVED_LOCALE,
        ));
        parsed
            .records
            .push(MasterRecord::new(RecordKind::Tenant, tenant_id, data).with_source_row(row.index()));
    }

    parsed.localizations = labels.into_vec();
    Ok(parsed)
}

/// Read branding rows keyed by tenant code
pub fn read_branding(sheet: &Sheet, tenant_id: &str) -> Result<ParsedSheet, WorkbookError> {
    sheet.require_columns(&["Tenant Code"])?;

    let mut parsed = ParsedSheet::new();
    for row in sheet.rows() {
        let Some(code) = row.text("Tenant Code") else {
            parsed.skipped += 1;
            continue;
        };
        let text = |col: &str| Value::String(row.text(col).unwrap_or_default());

        let mut data = Map::new();
        data.insert("code".into(), json!(code.to_lowercase()));
        data.insert("bannerUrl".into(), text("Banner URL"));
        data.insert("logoUrl".into(), text("Logo URL"));
        data.insert("logoUrlWhite".into(), text("Logo URL (White)"));
        data.insert("stateLogo".into(), text("State Logo"));

        parsed
            .records
            .push(MasterRecord::new(RecordKind::Branding, tenant_id, data).with_source_row(row.index()));
    }
    Ok(parsed)
}

/// `pg.citya` → `CITYA`, `pg` → `PG`
fn city_code(tenant_code: &str) -> String {
    tenant_code
        .rsplit('.')
        .next()
        .unwrap_or(tenant_code)
        .to_uppercase()
}

// ADMIN0/ADMIN1 are not part of the city block but round-trip through the
// error workbook, so they ride along when present.
fn admin_names(row: &Row<'_>, data: &mut Map<String, Value>) {
    for (col, key) in [(COL_ADMIN0, "admin0Name"), (COL_ADMIN1, "admin1Name")] {
        if let Some(v) = row.text(col) {
            data.insert(key.into(), json!(v));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant_sheet(rows: &[Vec<&str>]) -> Sheet {
        Sheet::from_strings(
            TENANT_SHEET,
            &[
                COL_TENANT_CODE,
                COL_DISPLAY_NAME,
                COL_TENANT_TYPE,
                COL_ADMIN2,
                COL_REGION,
                COL_LOGO,
            ],
            rows,
        )
    }

    #[test]
    fn test_read_tenants_builds_city_and_localization() {
        let sheet = tenant_sheet(&[
            vec!["PG.CityA", "City A", "ULB", "North", "Coast", ""],
            vec!["pg.cityb", "City B", "", "North", "", "logo.png"],
            vec!["", "Orphan", "", "", "", ""],
        ]);
        let parsed = read_tenants(&sheet, "pg").unwrap();

        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.skipped, 1);

        let a = &parsed.records[0].data;
        assert_eq!(a["code"], "pg.citya");
        assert_eq!(a["city"]["code"], "CITYA");
        assert_eq!(a["city"]["districtCode"], "ADMIN2_001");
        assert_eq!(a["city"]["regionCode"], "REGION_001");
        assert_eq!(a["domainUrl"], "https://example.com");
        assert_eq!(a["imageId"], "default-logo.png");
        assert_eq!(a["description"], "City A - ULB");

        let b = &parsed.records[1].data;
        // Same ADMIN2 name reuses the district code
        assert_eq!(b["city"]["districtCode"], "ADMIN2_001");
        assert_eq!(b["type"], "CITY");
        assert_eq!(b["imageId"], "logo.png");

        assert_eq!(parsed.localizations[0].code, "TENANT_TENANTS_PG_CITYA");
        assert_eq!(parsed.localizations[0].module, "rainmaker-common");
    }

    #[test]
    fn test_read_tenants_requires_code_column() {
        let sheet = Sheet::from_strings(TENANT_SHEET, &[COL_DISPLAY_NAME], &[]);
        assert!(matches!(
            read_tenants(&sheet, "pg"),
            Err(WorkbookError::MissingColumns { .. })
        ));
    }

    #[test]
    fn test_read_branding() {
        let sheet = Sheet::from_strings(
            BRANDING_SHEETS[0],
            &["Tenant Code", "Banner URL", "Logo URL"],
            &[vec!["PG", "https://b", ""], vec!["nan", "", ""]],
        );
        let parsed = read_branding(&sheet, "pg").unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].data["code"], "pg");
        assert_eq!(parsed.records[0].data["logoUrl"], "");
        assert_eq!(parsed.records[0].data["stateLogo"], "");
    }
}
