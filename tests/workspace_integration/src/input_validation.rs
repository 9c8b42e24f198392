//! Input parameter validation tests.
//!
//! Invalid tool arguments come back as MCP `invalid_params` errors and
//! never reach the inference backend or the image library.

#[cfg(test)]
mod tests {
    use crate::fixtures::{StaticInference, server_with};
    use replicate_mcp_image::server::{ImageGenerateToolParams, SaveImageToolParams};
    use rmcp::model::ErrorCode;
    use tempfile::TempDir;

    fn generate(prompt: &str) -> ImageGenerateToolParams {
        ImageGenerateToolParams {
            prompt: prompt.to_string(),
            negative_prompt: None,
            width: None,
            height: None,
            num_inference_steps: None,
            guidance_scale: None,
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_out_of_range_parameters() {
        let tmp = TempDir::new().unwrap();
        let inference = StaticInference::new("https://replicate.delivery/x.png");
        let server = server_with(&tmp, inference.clone()).await;

        let cases = vec![
            generate(""),
            ImageGenerateToolParams { width: Some(100), ..generate("a cat") },
            ImageGenerateToolParams { height: Some(2048), ..generate("a cat") },
            ImageGenerateToolParams { width: Some(777), ..generate("a cat") },
            ImageGenerateToolParams { num_inference_steps: Some(0), ..generate("a cat") },
            ImageGenerateToolParams { guidance_scale: Some(0.5), ..generate("a cat") },
        ];

        for params in cases {
            let description = format!("{:?}", params);
            let err = server.generate_image(params).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::INVALID_PARAMS, "{}", description);
        }
        assert_eq!(inference.calls(), 0, "no prediction may be created");
    }

    #[tokio::test]
    async fn test_error_names_every_invalid_field() {
        let tmp = TempDir::new().unwrap();
        let server = server_with(&tmp, StaticInference::new("unused")).await;

        let params = ImageGenerateToolParams {
            width: Some(64),
            num_inference_steps: Some(1000),
            ..generate("a cat")
        };
        let err = server.generate_image(params).await.unwrap_err();
        assert!(err.message.contains("width"), "{}", err.message);
        assert!(err.message.contains("num_inference_steps"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_save_rejects_bad_input_without_writing() {
        let tmp = TempDir::new().unwrap();
        let server = server_with(&tmp, StaticInference::new("unused")).await;

        let cases = vec![
            ("not a url", "a cat", None),
            ("file:///etc/passwd", "a cat", None),
            ("https://replicate.delivery/x.png", "", None),
            ("https://replicate.delivery/x.png", "a cat", Some("../../outside")),
            ("https://replicate.delivery/x.png", "a cat", Some("bad name")),
        ];

        for (url, prompt, custom) in cases {
            let params = SaveImageToolParams {
                image_url: url.to_string(),
                prompt: prompt.to_string(),
                custom_filename: custom.map(str::to_string),
            };
            let err = server.save_image(params).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::INVALID_PARAMS, "{} / {:?}", url, custom);
        }

        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_image_resource_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let server = server_with(&tmp, StaticInference::new("unused")).await;

        for uri in [
            "image://00000000-0000-4000-8000-000000000000",
            "image://internal/missing",
            "image://../../etc/passwd",
            "image://",
        ] {
            let err = server.read_uri(uri).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::RESOURCE_NOT_FOUND, "{}", uri);
        }
    }
}
