//! Server startup integration tests.
//!
//! The server can be instantiated from configuration alone and advertises
//! the tool, prompt and resource capabilities.

#[cfg(test)]
mod tests {
    use crate::fixtures::test_config;
    use replicate_mcp_common::auth::API_TOKEN_ENV;
    use replicate_mcp_common::error::ConfigError;
    use replicate_mcp_common::Config;
    use replicate_mcp_image::ImageServer;
    use rmcp::ServerHandler;
    use tempfile::TempDir;

    #[test]
    fn test_image_server_startup() {
        let tmp = TempDir::new().unwrap();
        let server = ImageServer::new(test_config(&tmp));
        let info = server.get_info();

        let instructions = info.instructions.as_ref().unwrap().to_lowercase();
        assert!(instructions.contains("generate-image"));
        assert!(instructions.contains("save-image"));
        assert!(instructions.contains("list-saved-images"));
    }

    #[test]
    fn test_capabilities_advertised() {
        let tmp = TempDir::new().unwrap();
        let info = ImageServer::new(test_config(&tmp)).get_info();

        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.prompts.is_some());
        let resources = info.capabilities.resources.expect("resources capability");
        assert_eq!(resources.list_changed, Some(true));
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = Config::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref name) if name == API_TOKEN_ENV));
    }

    #[tokio::test]
    async fn test_lazy_handler_creates_images_directory() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.images_dir = tmp.path().join("library");
        let server = ImageServer::new(config);

        let resources = server.resource_entries().await.unwrap();
        assert_eq!(resources.len(), 1, "only the model resource before any save");
        assert!(tmp.path().join("library").is_dir());
    }
}
