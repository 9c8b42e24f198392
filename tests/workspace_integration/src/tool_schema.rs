//! Tool schema validity tests.
//!
//! Every tool parameter type must produce an object schema whose required
//! list matches the fields a caller has to supply.

use serde_json::Value;

/// Validates that a JSON schema has the required structure.
fn validate_json_schema(schema: &Value) -> Result<(), String> {
    let obj = schema
        .as_object()
        .ok_or_else(|| "Schema must be an object".to_string())?;

    if let Some(type_val) = obj.get("type") {
        if type_val != "object" {
            return Err(format!("Expected type 'object', got {:?}", type_val));
        }
    }

    match obj.get("properties") {
        Some(properties) if properties.is_object() => Ok(()),
        Some(_) => Err("Properties must be an object".to_string()),
        None => Err("Schema must declare properties".to_string()),
    }
}

/// Sorted `required` entries of a schema.
fn required_fields(schema: &Value) -> Vec<String> {
    let mut fields: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    fields.sort();
    fields
}

fn property_names(schema: &Value) -> Vec<String> {
    let mut names: Vec<String> = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use replicate_mcp_image::server::{
        ImageGenerateToolParams, ListSavedImagesToolParams, SaveImageToolParams,
    };
    use schemars::schema_for;

    #[test]
    fn test_json_schema_validation() {
        let valid_schema = serde_json::json!({
            "type": "object",
            "properties": { "prompt": { "type": "string" } },
            "required": ["prompt"]
        });
        assert!(validate_json_schema(&valid_schema).is_ok());

        let invalid_schema = serde_json::json!({ "type": "string" });
        assert!(validate_json_schema(&invalid_schema).is_err());
    }

    #[test]
    fn test_generate_image_schema() {
        let schema = serde_json::to_value(schema_for!(ImageGenerateToolParams)).unwrap();
        assert!(validate_json_schema(&schema).is_ok());
        assert_eq!(required_fields(&schema), vec!["prompt"]);
        assert_eq!(
            property_names(&schema),
            vec![
                "guidance_scale",
                "height",
                "negative_prompt",
                "num_inference_steps",
                "prompt",
                "width"
            ]
        );
    }

    #[test]
    fn test_save_image_schema() {
        let schema = serde_json::to_value(schema_for!(SaveImageToolParams)).unwrap();
        assert!(validate_json_schema(&schema).is_ok());
        assert_eq!(required_fields(&schema), vec!["image_url", "prompt"]);
        assert!(property_names(&schema).contains(&"custom_filename".to_string()));
    }

    #[test]
    fn test_list_saved_images_schema() {
        let schema = serde_json::to_value(schema_for!(ListSavedImagesToolParams)).unwrap();
        assert!(validate_json_schema(&schema).is_ok());
        assert!(required_fields(&schema).is_empty());
        assert_eq!(property_names(&schema), vec!["include_thumbnails"]);
    }

    #[test]
    fn test_handler_params_schema_validity() {
        use replicate_mcp_image::{ImageGenerateParams, SaveImageParams};

        for schema in [
            serde_json::to_value(schema_for!(ImageGenerateParams)).unwrap(),
            serde_json::to_value(schema_for!(SaveImageParams)).unwrap(),
        ] {
            assert!(validate_json_schema(&schema).is_ok());
            assert!(property_names(&schema).contains(&"prompt".to_string()));
        }
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use replicate_mcp_image::server::ImageGenerateToolParams;

    proptest! {
        /// Any object carrying a string prompt deserializes; the schema's
        /// optional fields really are optional.
        #[test]
        fn prompt_only_arguments_deserialize(prompt in "[A-Za-z0-9 ,.]{1,80}") {
            let args = serde_json::json!({ "prompt": prompt });
            let parsed: Result<ImageGenerateToolParams, _> = serde_json::from_value(args);
            prop_assert!(parsed.is_ok());
        }

        /// Arguments with a non-string prompt never deserialize.
        #[test]
        fn non_string_prompt_is_rejected(n in any::<i64>()) {
            let args = serde_json::json!({ "prompt": n });
            let parsed: Result<ImageGenerateToolParams, _> = serde_json::from_value(args);
            prop_assert!(parsed.is_err());
        }
    }
}
