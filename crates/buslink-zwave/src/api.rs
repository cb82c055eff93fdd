/*!
 * JSON views over node values.
 *
 * Management frontends want per-command-class slices of a node keyed by
 * value index. These functions only build the payloads; serving them is the
 * caller's problem.
 */
use serde_json::{json, Map, Value as Json};

use buslink_core::types::Value;

use crate::value::{CommandClass, ValueType, ZwaveNode, ZwaveValue};

fn data_as_json(data: &Value) -> Json {
    serde_json::to_value(data).unwrap_or(Json::Null)
}

fn values_of_class(node: &ZwaveNode, command_class: CommandClass) -> Vec<std::sync::Arc<ZwaveValue>> {
    let mut values: Vec<_> = node
        .values()
        .into_iter()
        .filter(|value| value.command_class == command_class)
        .collect();
    values.sort_by_key(|value| value.index);
    values
}

fn keyed_by_index(values: Vec<std::sync::Arc<ZwaveValue>>, detail: impl Fn(&ZwaveValue) -> Json) -> Json {
    let mut object = Map::new();
    for value in values {
        object.insert(value.index.to_string(), detail(&value));
    }
    Json::Object(object)
}

/// Association groups of a node, keyed by group index
pub fn group_associations(node: &ZwaveNode) -> Json {
    keyed_by_index(values_of_class(node, CommandClass::Association), |value| {
        json!({
            "label": value.label,
            "data": data_as_json(&value.data()),
        })
    })
}

/// Configuration parameters of a node, keyed by parameter index
pub fn config_parameters(node: &ZwaveNode) -> Json {
    keyed_by_index(values_of_class(node, CommandClass::Configuration), |value| {
        let mut detail = Map::new();
        detail.insert("label".to_string(), json!(value.label));
        detail.insert("type".to_string(), json!(format!("{:?}", value.value_type)));
        detail.insert("data".to_string(), data_as_json(&value.data()));
        if !value.units.is_empty() {
            detail.insert("units".to_string(), json!(value.units));
        }
        if let Some(items) = &value.data_items {
            detail.insert("data_items".to_string(), json!(items));
        }
        Json::Object(detail)
    })
}

/// User code slots of a node, keyed by slot index.
///
/// Only string and raw typed values are code slots; other UserCode values
/// (slot count etc.) are left out.
pub fn user_codes(node: &ZwaveNode) -> Json {
    let slots = values_of_class(node, CommandClass::UserCode)
        .into_iter()
        .filter(|value| matches!(value.value_type, ValueType::String | ValueType::Raw))
        .collect();
    keyed_by_index(slots, |value| {
        json!({
            "label": value.label,
            "code": data_as_json(&value.data()),
        })
    })
}
