//! Tool/function-calling schema conversion.
//!
//! Client tool definitions are flattened into the backend's fixed
//! `{type: "object", required, properties}` parameter shape, and tool calls
//! reported by the backend are turned back into `tool_use` content blocks.

use std::collections::BTreeMap;

use serde_json::Value;

use super::anthropic_types::{InputSchema, PropertySchema, ResponseContentBlock, Tool};
use super::new_id;
use super::ollama_types::{ChatTool, ToolCall, ToolFunction, ToolParameters, ToolProperty};

const DEFAULT_PROPERTY_TYPE: &str = "string";

/// Convert client tool definitions into backend tools.
///
/// Returns `None` when there is nothing to advertise. Definitions lacking a
/// name, description or input schema are dropped.
pub fn convert_tools(tools: Option<&[Tool]>) -> Option<Vec<ChatTool>> {
    let tools = tools.filter(|t| !t.is_empty())?;

    let converted = tools
        .iter()
        .filter_map(|tool| {
            let converted = convert_tool(tool);
            if converted.is_none() {
                tracing::debug!(
                    name = tool.name.as_deref().unwrap_or("<unnamed>"),
                    "Dropping incomplete tool definition"
                );
            }
            converted
        })
        .collect();

    Some(converted)
}

fn convert_tool(tool: &Tool) -> Option<ChatTool> {
    let (Some(name), Some(description), Some(schema)) =
        (&tool.name, &tool.description, &tool.input_schema)
    else {
        return None;
    };

    Some(ChatTool {
        tool_type: "function".to_string(),
        function: ToolFunction {
            name: name.clone(),
            description: description.clone(),
            parameters: convert_schema(schema),
        },
    })
}

fn convert_schema(schema: &InputSchema) -> ToolParameters {
    let required = schema
        .required
        .iter()
        .flatten()
        .flatten()
        .cloned()
        .collect();

    let properties: BTreeMap<String, ToolProperty> = schema
        .properties
        .iter()
        .flatten()
        .filter_map(|(name, prop)| Some((name.clone(), convert_property(prop.as_ref()?))))
        .collect();

    ToolParameters {
        parameters_type: "object".to_string(),
        required,
        properties,
    }
}

fn convert_property(prop: &PropertySchema) -> ToolProperty {
    let enum_values: Vec<String> = prop
        .enum_values
        .iter()
        .flatten()
        .flatten()
        .cloned()
        .collect();

    ToolProperty {
        property_type: prop
            .property_type
            .clone()
            .unwrap_or_else(|| DEFAULT_PROPERTY_TYPE.to_string()),
        description: prop.description.clone().unwrap_or_default(),
        enum_values: (!enum_values.is_empty()).then_some(enum_values),
    }
}

/// Turn backend tool calls into `tool_use` content blocks, one per call.
pub fn tool_calls_to_content(calls: &[ToolCall]) -> Vec<ResponseContentBlock> {
    calls
        .iter()
        .map(|call| ResponseContentBlock::ToolUse {
            id: new_id("toolu_"),
            name: call.function.name.clone(),
            input: decode_arguments(&call.function.arguments),
        })
        .collect()
}

/// Tool-call arguments as a JSON value: a string payload that holds JSON is
/// decoded, anything else is kept as-is.
pub fn decode_arguments(arguments: &Value) -> Value {
    match arguments {
        Value::String(raw) if raw.trim().is_empty() => Value::Object(serde_json::Map::new()),
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| arguments.clone()),
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weather_tool() -> Tool {
        serde_json::from_value(json!({
            "name": "get_weather",
            "description": "Get current weather for a city",
            "input_schema": {
                "type": "object",
                "properties": {
                    "city": {"type": "string", "description": "City name"},
                    "unit": {"enum": ["celsius", null, "fahrenheit"]},
                    "days": {"type": "integer", "enum": []}
                },
                "required": ["city", null]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_none_and_empty_produce_none() {
        let empty: Vec<Tool> = Vec::new();
        assert!(convert_tools(None).is_none());
        assert!(convert_tools(Some(empty.as_slice())).is_none());
    }

    #[test]
    fn test_tool_shape() {
        let tools = convert_tools(Some(vec![weather_tool()].as_slice())).unwrap();
        assert_eq!(tools.len(), 1);

        let tool = &tools[0];
        assert_eq!(tool.tool_type, "function");
        assert_eq!(tool.function.name, "get_weather");
        assert_eq!(tool.function.description, "Get current weather for a city");

        let params = &tool.function.parameters;
        assert_eq!(params.parameters_type, "object");
        assert_eq!(params.required, vec!["city".to_string()]);
        assert_eq!(params.properties["city"].property_type, "string");
        assert_eq!(params.properties["city"].description, "City name");
    }

    #[test]
    fn test_property_defaults_and_enum_filtering() {
        let tools = convert_tools(Some(vec![weather_tool()].as_slice())).unwrap();
        let props = &tools[0].function.parameters.properties;

        let unit = &props["unit"];
        assert_eq!(unit.property_type, "string");
        assert_eq!(unit.description, "");
        assert_eq!(
            unit.enum_values,
            Some(vec!["celsius".to_string(), "fahrenheit".to_string()])
        );

        assert_eq!(props["days"].enum_values, None);
        let encoded = serde_json::to_value(&props["days"]).unwrap();
        assert!(encoded.get("enum").is_none());
    }

    #[test]
    fn test_required_field_without_type_defaults_to_string() {
        let tool: Tool = serde_json::from_value(json!({
            "name": "echo",
            "description": "Echo a value",
            "input_schema": {"type": "object", "properties": {"a": {}}, "required": ["a"]}
        }))
        .unwrap();

        let tools = convert_tools(Some(vec![tool].as_slice())).unwrap();
        assert_eq!(tools[0].function.parameters.required, vec!["a".to_string()]);
        assert_eq!(tools[0].function.parameters.properties["a"].property_type, "string");
    }

    #[test]
    fn test_incomplete_definitions_are_dropped() {
        let mut unnamed = weather_tool();
        unnamed.name = None;
        let mut undescribed = weather_tool();
        undescribed.description = None;
        let mut schemaless = weather_tool();
        schemaless.input_schema = None;

        let input = vec![weather_tool(), unnamed, undescribed, schemaless, weather_tool()];
        let tools = convert_tools(Some(input.as_slice())).unwrap();
        assert_eq!(tools.len(), 2);
        assert!(tools.iter().all(|t| t.function.name == "get_weather"));
    }

    #[test]
    fn test_all_dropped_still_advertises_empty_list() {
        let mut unnamed = weather_tool();
        unnamed.name = None;
        assert_eq!(convert_tools(Some(vec![unnamed].as_slice())), Some(vec![]));
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let input = vec![weather_tool()];
        let first = convert_tools(Some(input.as_slice()));
        let second = convert_tools(Some(input.as_slice()));
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_tool_calls_become_tool_use_blocks() {
        let calls = vec![
            ToolCall::new("get_weather", json!({"city": "London"})),
            ToolCall::new("search", json!("{\"q\":\"rust\"}")),
        ];
        let blocks = tool_calls_to_content(&calls);
        assert_eq!(blocks.len(), 2);

        match (&blocks[0], &blocks[1]) {
            (
                ResponseContentBlock::ToolUse { id: first_id, name, input },
                ResponseContentBlock::ToolUse { id: second_id, input: second_input, .. },
            ) => {
                assert!(first_id.starts_with("toolu_"));
                assert_ne!(first_id, second_id);
                assert_eq!(name, "get_weather");
                assert_eq!(input["city"], "London");
                assert_eq!(second_input["q"], "rust");
            }
            other => panic!("Expected two tool_use blocks, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_arguments_keeps_raw_partial_json() {
        assert_eq!(decode_arguments(&json!("{\"q\":")), json!("{\"q\":"));
        assert_eq!(decode_arguments(&Value::Null), json!({}));
        assert_eq!(decode_arguments(&json!({"a": 1})), json!({"a": 1}));
    }
}
