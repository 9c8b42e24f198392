//! Output format tests.
//!
//! Successful tool calls return text and `image/png` content, saved images
//! show up as `image://` resources, and reading one returns the exact bytes
//! that were saved.

use rmcp::model::{CallToolResult, Content, RawContent};

/// Validates that a CallToolResult has valid content format.
fn validate_tool_result(result: &CallToolResult) -> Result<(), String> {
    if result.content.is_empty() && !result.is_error.unwrap_or(false) {
        return Err("Successful result should have content".to_string());
    }
    for content in &result.content {
        validate_content(content)?;
    }
    Ok(())
}

/// Validates that a Content item has valid structure.
fn validate_content(content: &Content) -> Result<(), String> {
    match &content.raw {
        RawContent::Text(text_content) => {
            if text_content.text.is_empty() {
                return Err("Text content should not be empty".to_string());
            }
            Ok(())
        }
        RawContent::Image(image_content) => {
            if image_content.data.is_empty() {
                return Err("Image content should have data".to_string());
            }
            if image_content.mime_type != "image/png" {
                return Err(format!(
                    "Image content should be image/png, got: {}",
                    image_content.mime_type
                ));
            }
            Ok(())
        }
        other => Err(format!("Unexpected content kind: {:?}", other)),
    }
}

/// Text blocks of a result, in order.
fn texts(result: &CallToolResult) -> Vec<String> {
    result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{StaticInference, png_bytes, server_with};
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use replicate_mcp_image::server::{
        ImageGenerateToolParams, ListSavedImagesToolParams, SaveImageToolParams,
    };
    use rmcp::model::{JsonObject, ResourceContents};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn image_host(bytes: Vec<u8>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fox.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .mount(&server)
            .await;
        server
    }

    fn save_params(url: &str) -> SaveImageToolParams {
        SaveImageToolParams {
            image_url: url.to_string(),
            prompt: "a red fox".to_string(),
            custom_filename: None,
        }
    }

    /// Id printed in a save-image result.
    fn saved_id(result: &CallToolResult) -> String {
        texts(result)[0]
            .lines()
            .find_map(|line| line.strip_prefix("ID: "))
            .expect("ID line")
            .to_string()
    }

    #[test]
    fn test_content_validation_helpers() {
        assert!(validate_content(&Content::text("ok")).is_ok());
        assert!(validate_content(&Content::text("")).is_err());
        assert!(validate_content(&Content::image("abc", "image/png")).is_ok());
        assert!(validate_content(&Content::image("abc", "text/plain")).is_err());
    }

    #[tokio::test]
    async fn test_generate_image_output() {
        let tmp = TempDir::new().unwrap();
        let inference = StaticInference::new("https://replicate.delivery/out.png");
        let server = server_with(&tmp, inference.clone()).await;

        let result = server
            .generate_image(ImageGenerateToolParams {
                prompt: "a red fox".to_string(),
                negative_prompt: None,
                width: None,
                height: None,
                num_inference_steps: None,
                guidance_scale: None,
            })
            .await
            .unwrap();

        assert!(validate_tool_result(&result).is_ok());
        assert_ne!(result.is_error, Some(true));
        assert!(texts(&result).iter().any(|t| t.contains("https://replicate.delivery/out.png")));
        assert_eq!(inference.calls(), 1);
    }

    #[tokio::test]
    async fn test_save_list_and_read_roundtrip() {
        let bytes = png_bytes(640, 480);
        let host = image_host(bytes.clone()).await;
        let tmp = TempDir::new().unwrap();
        let server = server_with(&tmp, StaticInference::new("unused")).await;

        let saved = server
            .save_image(save_params(&format!("{}/fox.png", host.uri())))
            .await
            .unwrap();
        assert!(validate_tool_result(&saved).is_ok());
        let id = saved_id(&saved);
        assert!(texts(&saved)[0].contains(&format!("image://{}", id)));

        let listed = server
            .list_saved_images(ListSavedImagesToolParams::default())
            .await
            .unwrap();
        assert!(validate_tool_result(&listed).is_ok());
        // header, entry text, thumbnail
        assert_eq!(listed.content.len(), 3);
        assert!(texts(&listed)[1].contains("Prompt: a red fox"));
        match &listed.content[2].raw {
            RawContent::Image(img) => {
                let thumb = BASE64.decode(&img.data).unwrap();
                let decoded = image::load_from_memory(&thumb).unwrap();
                assert!(decoded.width() <= 256 && decoded.height() <= 256);
            }
            other => panic!("expected thumbnail, got {:?}", other),
        }

        let resources = server.resource_entries().await.unwrap();
        let uri = format!("image://{}", id);
        let entry = resources
            .iter()
            .find(|r| r.raw.uri == uri)
            .expect("saved image listed as resource");
        assert_eq!(entry.raw.name, "Image: a red fox");
        assert_eq!(entry.raw.mime_type.as_deref(), Some("image/png"));

        for read_uri in [uri.clone(), format!("image://internal/{}", id)] {
            let read = server.read_uri(&read_uri).await.unwrap();
            match &read.contents[0] {
                ResourceContents::BlobResourceContents { blob, mime_type, .. } => {
                    assert_eq!(mime_type.as_deref(), Some("image/png"));
                    assert_eq!(BASE64.decode(blob).unwrap(), bytes);
                }
                other => panic!("expected blob contents, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_listing_without_thumbnails() {
        let host = image_host(png_bytes(64, 64)).await;
        let tmp = TempDir::new().unwrap();
        let server = server_with(&tmp, StaticInference::new("unused")).await;
        server
            .save_image(save_params(&format!("{}/fox.png", host.uri())))
            .await
            .unwrap();

        let listed = server
            .list_saved_images(ListSavedImagesToolParams {
                include_thumbnails: Some(false),
            })
            .await
            .unwrap();
        assert_eq!(listed.content.len(), 2);
        assert!(listed.content.iter().all(|c| matches!(c.raw, RawContent::Text(_))));
    }

    #[tokio::test]
    async fn test_empty_library_listing() {
        let tmp = TempDir::new().unwrap();
        let server = server_with(&tmp, StaticInference::new("unused")).await;

        let listed = server
            .list_saved_images(ListSavedImagesToolParams::default())
            .await
            .unwrap();
        assert_eq!(texts(&listed), vec!["No saved images."]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_tool_error() {
        let host = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&host)
            .await;
        let tmp = TempDir::new().unwrap();
        let server = server_with(&tmp, StaticInference::new("unused")).await;

        let result = server
            .save_image(save_params(&format!("{}/fox.png", host.uri())))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(texts(&result)[0].starts_with("fetch_error: "));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_model_resource_is_json() {
        let tmp = TempDir::new().unwrap();
        let server = server_with(&tmp, StaticInference::new("unused")).await;

        let read = server.read_uri("replicate://model").await.unwrap();
        match &read.contents[0] {
            ResourceContents::TextResourceContents { text, .. } => {
                let json: serde_json::Value = serde_json::from_str(text).unwrap();
                assert_eq!(json["defaults"]["num_inference_steps"], 50);
            }
            other => panic!("expected text contents, got {:?}", other),
        }
    }

    #[test]
    fn test_prompt_messages_per_style() {
        let tmp = TempDir::new().unwrap();
        let server = replicate_mcp_image::ImageServer::new(crate::fixtures::test_config(&tmp));

        let expectations = [
            ("realistic", "photorealistic"),
            ("artistic", "painting"),
            ("abstract", "geometric shapes"),
        ];
        for (style, needle) in expectations {
            let mut args = JsonObject::new();
            args.insert("style".to_string(), serde_json::json!(style));
            let result = server.prompt("generate-image", Some(&args)).unwrap();
            let text = serde_json::to_value(&result.messages[0]).unwrap().to_string();
            assert!(text.contains("Describe the image you want to generate."), "{}", text);
            assert!(text.contains(needle), "{} should mention {}", style, needle);
        }
    }
}
