//! Redaction engine
//!
//! Text redaction rewrites a text node in place. Image redaction moves the
//! image into a wrapper that keeps its box, blurs it and lays a disclaimer
//! overlay on top. Both are reversible from the state returned here.

use crate::classification::ClassificationResult;
use crate::config::ScanSettings;
use document::{Document, Marker, NodeId, Result};

/// Class on the wrapper inserted around a filtered image
pub const WRAPPER_CLASS: &str = "socio-io-image-wrapper";
/// Class on a filtered image
pub const FILTERED_CLASS: &str = "socio-io-filtered";
/// Class on the overlay covering a filtered image
pub const OVERLAY_CLASS: &str = "socio-io-overlay";
/// Class on the disclaimer inside the overlay
pub const DISCLAIMER_CLASS: &str = "socio-io-disclaimer";
/// Class on the confidence/method block
pub const FILTER_INFO_CLASS: &str = "socio-io-filter-info";
/// Class on the confidence line
pub const CONFIDENCE_CLASS: &str = "socio-io-confidence";
/// Class on the method line
pub const METHOD_CLASS: &str = "socio-io-method";
/// Class on the "View Image" button
pub const VIEW_BUTTON_CLASS: &str = "socio-io-view-btn";
/// Class on the in-flight indicator
pub const LOADING_CLASS: &str = "socio-io-loading";
/// Class on the spinner inside the indicator
pub const SPINNER_CLASS: &str = "socio-io-spinner";
/// Attribute set on images the user chose to view
pub const VIEWED_ATTRIBUTE: &str = "data-socioio-viewed";

/// Disclaimer shown over filtered images
pub const DISCLAIMER_TEXT: &str = "This image is blurred by Socio.io Content Filter";
/// Label of the reveal button
pub const VIEW_BUTTON_TEXT: &str = "View Image";

const SYNTHETIC_CLASSES: &[&str] = &[WRAPPER_CLASS, OVERLAY_CLASS, LOADING_CLASS];

/// Check if an element was created by the redaction engine
pub fn is_synthetic(doc: &Document, id: NodeId) -> bool {
    SYNTHETIC_CLASSES.iter().any(|class| doc.has_class(id, class))
}

/// Check if a node is, or sits inside, an engine-created element
pub fn within_synthetic(doc: &Document, id: NodeId) -> bool {
    let mut current = Some(id);
    while let Some(node) = current {
        if is_synthetic(doc, node) {
            return true;
        }
        current = doc.parent(node);
    }
    false
}

/// Ownership record of one image redaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRedaction {
    /// The original image element
    pub image: NodeId,
    /// Wrapper inserted at the image's old position
    pub wrapper: NodeId,
    /// Overlay inside the wrapper
    pub overlay: NodeId,
    /// The overlay's "View Image" button
    pub view_button: NodeId,
    /// The image's `style` attribute before redaction
    pub original_style: Option<String>,
}

/// Applies and reverses redactions
#[derive(Debug, Clone)]
pub struct RedactionEngine {
    blur_radius: u32,
    desaturate: bool,
}

impl Default for RedactionEngine {
    fn default() -> Self {
        Self::from_settings(&ScanSettings::default())
    }
}

impl RedactionEngine {
    /// Create an engine from scan settings
    pub fn from_settings(settings: &ScanSettings) -> Self {
        Self {
            blur_radius: settings.blur_radius,
            desaturate: settings.desaturate,
        }
    }

    /// CSS filter applied to redacted images
    pub fn filter_css(&self) -> String {
        if self.desaturate {
            format!("blur({}px) grayscale(100%)", self.blur_radius)
        } else {
            format!("blur({}px)", self.blur_radius)
        }
    }

    // =========================================================================
    // Text
    // =========================================================================

    /// Replace a text node's value. Returns the original value, or `None`
    /// when the node is already filtered.
    pub fn redact_text(&self, doc: &mut Document, node: NodeId, replacement: &str) -> Result<Option<String>> {
        if doc.has_marker(node, Marker::Filtered) {
            return Ok(None);
        }
        let Some(original) = doc.text(node).map(str::to_string) else {
            return Err(document::DocumentError::NotAText(node));
        };

        doc.set_text(node, replacement)?;
        doc.set_marker(node, Marker::Filtered)?;
        Ok(Some(original))
    }

    /// Put a text node's original value back. Returns `false` and leaves
    /// the node alone when its value is no longer `applied`.
    pub fn restore_text(&self, doc: &mut Document, node: NodeId, applied: &str, original: &str) -> Result<bool> {
        if doc.text(node) != Some(applied) {
            return Ok(false);
        }
        doc.set_text(node, original)?;
        doc.clear_marker(node, Marker::Filtered)?;
        Ok(true)
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Check if an image already carries a redaction
    pub fn is_image_redacted(&self, doc: &Document, image: NodeId) -> bool {
        doc.has_marker(image, Marker::Filtered)
            || doc.has_class(image, FILTERED_CLASS)
            || doc.parent(image).is_some_and(|p| doc.has_class(p, WRAPPER_CLASS))
    }

    /// Wrap, blur and cover an image. Returns `None` when the image is
    /// already redacted or has no parent.
    pub fn redact_image(
        &self,
        doc: &mut Document,
        image: NodeId,
        result: &ClassificationResult,
    ) -> Result<Option<ImageRedaction>> {
        if self.is_image_redacted(doc, image) {
            return Ok(None);
        }
        let Some(parent) = doc.parent(image) else {
            return Ok(None);
        };

        let original_style = doc.attribute(image, "style").map(str::to_string);
        let (width, height) = doc.dimensions(image);
        let margin = doc.style_property(image, "margin");

        let wrapper = doc.create_element("div");
        doc.add_class(wrapper, WRAPPER_CLASS)?;
        doc.set_style_property(wrapper, "position", "relative")?;
        doc.set_style_property(wrapper, "display", "inline-block")?;
        doc.set_style_property(wrapper, "width", &format!("{}px", width))?;
        doc.set_style_property(wrapper, "height", &format!("{}px", height))?;
        if let Some(margin) = margin {
            doc.set_style_property(wrapper, "margin", &margin)?;
        }

        doc.insert_before(parent, wrapper, image)?;
        doc.append_child(wrapper, image)?;

        doc.add_class(image, FILTERED_CLASS)?;
        doc.set_style_property(image, "filter", &self.filter_css())?;

        let (overlay, view_button) = self.build_overlay(doc, result)?;
        doc.append_child(wrapper, overlay)?;
        doc.set_marker(image, Marker::Filtered)?;

        Ok(Some(ImageRedaction {
            image,
            wrapper,
            overlay,
            view_button,
            original_style,
        }))
    }

    fn build_overlay(&self, doc: &mut Document, result: &ClassificationResult) -> Result<(NodeId, NodeId)> {
        let overlay = doc.create_element("div");
        doc.add_class(overlay, OVERLAY_CLASS)?;
        for (name, value) in [
            ("position", "absolute"),
            ("top", "0"),
            ("left", "0"),
            ("width", "100%"),
            ("height", "100%"),
            ("display", "flex"),
            ("align-items", "center"),
            ("justify-content", "center"),
        ] {
            doc.set_style_property(overlay, name, value)?;
        }

        let disclaimer = doc.create_element("div");
        doc.add_class(disclaimer, DISCLAIMER_CLASS)?;
        let message = doc.create_element("p");
        let message_text = doc.create_text(DISCLAIMER_TEXT);
        doc.append_child(message, message_text)?;
        doc.append_child(disclaimer, message)?;

        let info = doc.create_element("div");
        doc.add_class(info, FILTER_INFO_CLASS)?;
        let confidence = text_element(doc, CONFIDENCE_CLASS, &format!("Confidence: {}%", result.confidence_percent()))?;
        let method = text_element(doc, METHOD_CLASS, &format!("Method: {}", result.method.display_name()))?;
        doc.append_child(info, confidence)?;
        doc.append_child(info, method)?;
        doc.append_child(disclaimer, info)?;

        let button = doc.create_element("button");
        doc.add_class(button, VIEW_BUTTON_CLASS)?;
        let label = doc.create_text(VIEW_BUTTON_TEXT);
        doc.append_child(button, label)?;
        doc.append_child(disclaimer, button)?;

        doc.append_child(overlay, disclaimer)?;
        Ok((overlay, button))
    }

    /// The "View Image" action: lift the blur and hide the overlay. Returns
    /// `false` if the image was already revealed.
    pub fn reveal_image(&self, doc: &mut Document, redaction: &ImageRedaction) -> Result<bool> {
        if doc.attribute(redaction.image, VIEWED_ATTRIBUTE).is_some() {
            return Ok(false);
        }

        doc.set_style_property(redaction.image, "filter", "")?;
        doc.set_style_property(redaction.overlay, "display", "none")?;
        doc.set_attribute(redaction.image, VIEWED_ATTRIBUTE, "true")?;
        Ok(true)
    }

    /// Undo an image redaction: unwrap the image back to the wrapper's
    /// position, drop the wrapper and overlay, restore the original style
    pub fn restore_image(&self, doc: &mut Document, redaction: &ImageRedaction) -> Result<()> {
        let image = redaction.image;

        if doc.parent(image) == Some(redaction.wrapper) {
            match doc.parent(redaction.wrapper) {
                Some(container) => doc.insert_before(container, image, redaction.wrapper)?,
                None => doc.detach(image),
            }
        }
        doc.detach(redaction.wrapper);

        match &redaction.original_style {
            Some(style) => doc.set_attribute(image, "style", style)?,
            None => doc.remove_attribute(image, "style")?,
        }
        doc.remove_class(image, FILTERED_CLASS)?;
        doc.remove_attribute(image, VIEWED_ATTRIBUTE)?;
        doc.clear_marker(image, Marker::Filtered)
    }

    // =========================================================================
    // Loading indicator
    // =========================================================================

    /// Attach a loading indicator sized to the image
    pub fn show_loading(&self, doc: &mut Document, image: NodeId) -> Result<NodeId> {
        let (width, height) = doc.dimensions(image);

        let indicator = doc.create_element("div");
        doc.add_class(indicator, LOADING_CLASS)?;
        doc.set_style_property(indicator, "position", "absolute")?;
        doc.set_style_property(indicator, "width", &format!("{}px", width))?;
        doc.set_style_property(indicator, "height", &format!("{}px", height))?;
        doc.set_style_property(indicator, "background-color", "rgba(0, 0, 0, 0.2)")?;
        doc.set_style_property(indicator, "z-index", "9999")?;

        let spinner = doc.create_element("div");
        doc.add_class(spinner, SPINNER_CLASS)?;
        doc.append_child(indicator, spinner)?;

        let body = doc.body();
        doc.append_child(body, indicator)?;
        Ok(indicator)
    }

    /// Remove a loading indicator
    pub fn hide_loading(&self, doc: &mut Document, indicator: NodeId) {
        doc.detach(indicator);
    }
}

fn text_element(doc: &mut Document, class: &str, value: &str) -> Result<NodeId> {
    let element = doc.create_element("div");
    doc.add_class(element, class)?;
    let text = doc.create_text(value);
    doc.append_child(element, text)?;
    Ok(element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::ClassificationMethod;

    fn page_with_image(style: Option<&str>) -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let container = doc.create_element("div");
        let before = doc.create_element("span");
        let image = doc.create_element("img");
        doc.set_attribute(image, "src", "https://example.com/a.png").unwrap();
        doc.set_attribute(image, "width", "300").unwrap();
        doc.set_attribute(image, "height", "200").unwrap();
        if let Some(style) = style {
            doc.set_attribute(image, "style", style).unwrap();
        }
        doc.append_child(body, container).unwrap();
        doc.append_child(container, before).unwrap();
        doc.append_child(container, image).unwrap();
        (doc, container, before, image)
    }

    fn explicit() -> ClassificationResult {
        ClassificationResult::explicit(0.876, vec!["adult".to_string()], ClassificationMethod::RemotePrimary)
    }

    #[test]
    fn test_redact_and_restore_text() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let node = doc.create_text("so vulgar");
        doc.append_child(body, node).unwrap();

        let engine = RedactionEngine::default();
        let original = engine.redact_text(&mut doc, node, "so ******").unwrap();
        assert_eq!(original.as_deref(), Some("so vulgar"));
        assert_eq!(doc.text(node), Some("so ******"));

        // Second application is a no-op
        assert_eq!(engine.redact_text(&mut doc, node, "xx").unwrap(), None);
        assert_eq!(doc.text(node), Some("so ******"));

        assert!(engine.restore_text(&mut doc, node, "so ******", "so vulgar").unwrap());
        assert_eq!(doc.text(node), Some("so vulgar"));
        assert!(!doc.has_marker(node, Marker::Filtered));
    }

    #[test]
    fn test_restore_skips_replaced_text() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let node = doc.create_text("so vulgar");
        doc.append_child(body, node).unwrap();

        let engine = RedactionEngine::default();
        engine.redact_text(&mut doc, node, "so ******").unwrap();
        doc.set_text(node, "edited by the page").unwrap();

        assert!(!engine.restore_text(&mut doc, node, "so ******", "so vulgar").unwrap());
        assert_eq!(doc.text(node), Some("edited by the page"));
    }

    #[test]
    fn test_redact_image_structure() {
        let (mut doc, container, _, image) = page_with_image(Some("margin: 4px"));
        let engine = RedactionEngine::default();

        let redaction = engine.redact_image(&mut doc, image, &explicit()).unwrap().unwrap();

        assert_eq!(doc.parent(redaction.wrapper), Some(container));
        assert_eq!(doc.parent(image), Some(redaction.wrapper));
        assert_eq!(doc.children(redaction.wrapper), &[image, redaction.overlay]);
        assert!(doc.has_class(redaction.wrapper, WRAPPER_CLASS));
        assert_eq!(doc.style_property(redaction.wrapper, "width").as_deref(), Some("300px"));
        assert_eq!(doc.style_property(redaction.wrapper, "height").as_deref(), Some("200px"));
        assert_eq!(doc.style_property(redaction.wrapper, "margin").as_deref(), Some("4px"));

        assert!(doc.has_class(image, FILTERED_CLASS));
        assert_eq!(doc.style_property(image, "filter").as_deref(), Some("blur(25px)"));

        let overlay_text = doc.text_content(redaction.overlay);
        assert!(overlay_text.contains(DISCLAIMER_TEXT));
        assert!(overlay_text.contains("Confidence: 88%"));
        assert!(overlay_text.contains("Method: Vertex AI"));
        assert_eq!(doc.text_content(redaction.view_button), VIEW_BUTTON_TEXT);
        assert!(within_synthetic(&doc, redaction.view_button));
    }

    #[test]
    fn test_redact_image_idempotent() {
        let (mut doc, _, _, image) = page_with_image(None);
        let engine = RedactionEngine::default();

        let first = engine.redact_image(&mut doc, image, &explicit()).unwrap().unwrap();
        assert!(engine.redact_image(&mut doc, image, &explicit()).unwrap().is_none());

        let wrappers = doc
            .descendants_by_tag(doc.body(), "div")
            .into_iter()
            .filter(|d| doc.has_class(*d, WRAPPER_CLASS))
            .count();
        assert_eq!(wrappers, 1);
        assert_eq!(doc.parent(image), Some(first.wrapper));
    }

    #[test]
    fn test_restore_image_round_trip() {
        let (mut doc, container, before, image) = page_with_image(Some("border: 1px solid red"));
        let engine = RedactionEngine::default();

        let redaction = engine.redact_image(&mut doc, image, &explicit()).unwrap().unwrap();
        engine.restore_image(&mut doc, &redaction).unwrap();

        assert_eq!(doc.children(container), &[before, image]);
        assert_eq!(doc.attribute(image, "style"), Some("border: 1px solid red"));
        assert_eq!(doc.attribute(image, "src"), Some("https://example.com/a.png"));
        assert!(!doc.has_class(image, FILTERED_CLASS));
        assert!(!doc.is_connected(redaction.wrapper));
        assert!(!doc.has_marker(image, Marker::Filtered));
    }

    #[test]
    fn test_restore_image_without_style() {
        let (mut doc, _, _, image) = page_with_image(None);
        let engine = RedactionEngine::default();

        let redaction = engine.redact_image(&mut doc, image, &explicit()).unwrap().unwrap();
        engine.restore_image(&mut doc, &redaction).unwrap();
        assert_eq!(doc.attribute(image, "style"), None);
    }

    #[test]
    fn test_reveal_image() {
        let (mut doc, _, _, image) = page_with_image(None);
        let engine = RedactionEngine::default();
        let redaction = engine.redact_image(&mut doc, image, &explicit()).unwrap().unwrap();

        assert!(engine.reveal_image(&mut doc, &redaction).unwrap());
        assert_eq!(doc.style_property(image, "filter"), None);
        assert_eq!(doc.style_property(redaction.overlay, "display").as_deref(), Some("none"));
        assert_eq!(doc.attribute(image, VIEWED_ATTRIBUTE), Some("true"));
        // Still redacted as far as the engine is concerned
        assert!(engine.is_image_redacted(&doc, image));

        assert!(!engine.reveal_image(&mut doc, &redaction).unwrap());
    }

    #[test]
    fn test_desaturate_filter() {
        let settings = ScanSettings::default().with_blur_radius(10).with_desaturate(true);
        let engine = RedactionEngine::from_settings(&settings);
        assert_eq!(engine.filter_css(), "blur(10px) grayscale(100%)");
    }

    #[test]
    fn test_loading_indicator() {
        let (mut doc, _, _, image) = page_with_image(None);
        let engine = RedactionEngine::default();

        let indicator = engine.show_loading(&mut doc, image).unwrap();
        assert_eq!(doc.parent(indicator), Some(doc.body()));
        assert!(is_synthetic(&doc, indicator));
        assert_eq!(doc.children(indicator).len(), 1);

        engine.hide_loading(&mut doc, indicator);
        assert!(!doc.is_connected(indicator));
    }
}
