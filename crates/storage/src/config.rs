//! Filter configuration shared between the background store and content scripts

use serde::{Deserialize, Serialize};

/// Which image classifier the backend should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFilterMethod {
    /// Let the backend pick whichever provider is available
    #[default]
    Auto,
    /// Google Vertex AI
    Vertex,
    /// DeepAI
    #[serde(rename = "deepai")]
    DeepAi,
}

impl ImageFilterMethod {
    /// Wire value for the `method` form field
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFilterMethod::Auto => "auto",
            ImageFilterMethod::Vertex => "vertex",
            ImageFilterMethod::DeepAi => "deepai",
        }
    }
}

/// Filter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// Master switch
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Set once the setup flow has validated the backend
    #[serde(default)]
    pub is_configured: bool,
    /// Filter text nodes
    #[serde(default = "default_true")]
    pub filter_text: bool,
    /// Filter images
    #[serde(default = "default_true")]
    pub filter_images: bool,
    /// Backend base URL; `None` disables remote classification
    #[serde(default, deserialize_with = "empty_as_none")]
    pub api_url: Option<String>,
    /// Image classifier selection
    #[serde(default)]
    pub image_filter_method: ImageFilterMethod,
}

fn default_true() -> bool {
    true
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|url| !url.trim().is_empty()))
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            is_configured: false,
            filter_text: true,
            filter_images: true,
            api_url: None,
            image_filter_method: ImageFilterMethod::Auto,
        }
    }
}

impl FilterConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend URL and mark the config as set up
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        let url = api_url.into();
        self.api_url = if url.trim().is_empty() { None } else { Some(url) };
        self.is_configured = true;
        self
    }

    /// Set the image classifier
    pub fn with_image_filter_method(mut self, method: ImageFilterMethod) -> Self {
        self.image_filter_method = method;
        self
    }

    /// Check if content scripts should start filtering on page load
    pub fn should_start(&self) -> bool {
        self.is_configured && self.enabled
    }

    /// Merge a partial update, field by field
    pub fn apply(&mut self, patch: &FilterConfigPatch) {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(is_configured) = patch.is_configured {
            self.is_configured = is_configured;
        }
        if let Some(filter_text) = patch.filter_text {
            self.filter_text = filter_text;
        }
        if let Some(filter_images) = patch.filter_images {
            self.filter_images = filter_images;
        }
        if let Some(api_url) = &patch.api_url {
            self.api_url = if api_url.trim().is_empty() {
                None
            } else {
                Some(api_url.clone())
            };
        }
        if let Some(method) = patch.image_filter_method {
            self.image_filter_method = method;
        }
    }
}

/// Partial configuration update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfigPatch {
    /// Master switch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Setup flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_configured: Option<bool>,
    /// Text filtering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_text: Option<bool>,
    /// Image filtering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_images: Option<bool>,
    /// Backend URL; an empty string clears it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Image classifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_filter_method: Option<ImageFilterMethod>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FilterConfig::new();
        assert!(config.enabled);
        assert!(!config.is_configured);
        assert!(config.filter_text);
        assert!(config.filter_images);
        assert_eq!(config.api_url, None);
        assert!(!config.should_start());
    }

    #[test]
    fn test_with_api_url() {
        let config = FilterConfig::new().with_api_url("http://localhost:3000");
        assert_eq!(config.api_url.as_deref(), Some("http://localhost:3000"));
        assert!(config.should_start());

        let blank = FilterConfig::new().with_api_url("");
        assert_eq!(blank.api_url, None);
    }

    #[test]
    fn test_deserialize_extension_shape() {
        let json = r#"{
            "apiUrl": "",
            "isConfigured": true,
            "enabled": true,
            "filterText": false,
            "imageFilterMethod": "deepai"
        }"#;

        let config: FilterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.api_url, None);
        assert!(config.is_configured);
        assert!(!config.filter_text);
        assert!(config.filter_images);
        assert_eq!(config.image_filter_method, ImageFilterMethod::DeepAi);
    }

    #[test]
    fn test_apply_patch() {
        let mut config = FilterConfig::new().with_api_url("http://a");
        let patch = FilterConfigPatch {
            filter_images: Some(false),
            api_url: Some(String::new()),
            ..Default::default()
        };

        config.apply(&patch);
        assert!(!config.filter_images);
        assert!(config.filter_text);
        assert_eq!(config.api_url, None);
    }

    #[test]
    fn test_method_wire_values() {
        assert_eq!(ImageFilterMethod::Auto.as_str(), "auto");
        assert_eq!(ImageFilterMethod::Vertex.as_str(), "vertex");
        assert_eq!(ImageFilterMethod::DeepAi.as_str(), "deepai");
        assert_eq!(serde_json::to_string(&ImageFilterMethod::DeepAi).unwrap(), "\"deepai\"");
    }
}
