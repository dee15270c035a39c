//! Request envelopes
//!
//! Every DIGIT endpoint takes a `RequestInfo` caller block next to a payload
//! keyed by the entity name.

use serde_json::{json, Value};

use crate::core::record::LocalizationMessage;

/// Caller identity block
pub fn request_info(auth_token: &str, user_info: &Value) -> Value {
    json!({
        "apiId": "Rainmaker",
        "authToken": auth_token,
        "userInfo": user_info,
        "msgId": format!("{}|en_IN", chrono::Utc::now().timestamp_millis()),
        "plainAccessRequest": {},
    })
}

/// MDMS v2 create/update body for one record
pub fn mdms_record(
    info: Value,
    tenant_id: &str,
    schema_code: &str,
    unique_identifier: &str,
    data: &Value,
    is_active: bool,
) -> Value {
    json!({
        "RequestInfo": info,
        "Mdms": {
            "tenantId": tenant_id,
            "schemaCode": schema_code,
            "uniqueIdentifier": unique_identifier,
            "data": data,
            "isActive": is_active,
        }
    })
}

/// MDMS v2 search body for one page of active records
pub fn mdms_search(info: Value, tenant_id: &str, schema_code: &str, limit: usize, offset: usize) -> Value {
    json!({
        "RequestInfo": info,
        "MdmsCriteria": {
            "tenantId": tenant_id,
            "schemaCode": schema_code,
            "isActive": true,
            "limit": limit,
            "offset": offset,
        }
    })
}

/// MDMS v2 search body for specific records
pub fn mdms_lookup(info: Value, tenant_id: &str, schema_code: &str, unique_identifiers: &[&str]) -> Value {
    json!({
        "RequestInfo": info,
        "MdmsCriteria": {
            "tenantId": tenant_id,
            "schemaCode": schema_code,
            "uniqueIdentifiers": unique_identifiers,
        }
    })
}

/// Localization upsert body for one locale batch
pub fn localization_batch(
    info: Value,
    tenant_id: &str,
    locale: &str,
    messages: &[LocalizationMessage],
) -> Value {
    json!({
        "RequestInfo": info,
        "tenantId": tenant_id,
        "locale": locale,
        "messages": messages,
    })
}

/// Body wrapping `payload` under `key`, e.g. `Employees: [..]`
pub fn keyed(info: Value, key: &str, payload: Value) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("RequestInfo".into(), info);
    body.insert(key.into(), payload);
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mdms_record_shape() {
        let info = request_info("tok", &json!({"userName": "ADMIN"}));
        let body = mdms_record(info, "pg", "common-masters.Department", "DEPT_1", &json!({"code": "DEPT_1"}), true);
        assert_eq!(body["RequestInfo"]["authToken"], "tok");
        assert_eq!(body["RequestInfo"]["apiId"], "Rainmaker");
        assert_eq!(body["Mdms"]["schemaCode"], "common-masters.Department");
        assert_eq!(body["Mdms"]["uniqueIdentifier"], "DEPT_1");
        assert_eq!(body["Mdms"]["isActive"], true);
    }

    #[test]
    fn test_mdms_search_pages() {
        let body = mdms_search(json!({}), "pg", "tenant.tenants", 100, 200);
        assert_eq!(body["MdmsCriteria"]["limit"], 100);
        assert_eq!(body["MdmsCriteria"]["offset"], 200);

        let body = mdms_lookup(json!({}), "pg", "tenant.tenants", &["pg.citya"]);
        assert_eq!(body["MdmsCriteria"]["uniqueIdentifiers"][0], "pg.citya");
    }

    #[test]
    fn test_localization_batch_serializes_messages() {
        let msgs = vec![LocalizationMessage::new("A", "a", "rainmaker-common", "en_IN")];
        let body = localization_batch(json!({}), "pg", "en_IN", &msgs);
        assert_eq!(body["messages"][0]["module"], "rainmaker-common");
        assert_eq!(body["locale"], "en_IN");
    }

    #[test]
    fn test_keyed() {
        let body = keyed(json!({}), "Employees", json!([{"code": "E1"}]));
        assert_eq!(body["Employees"][0]["code"], "E1");
        assert!(body.get("RequestInfo").is_some());
    }
}
