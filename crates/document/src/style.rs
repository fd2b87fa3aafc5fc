//! Inline `style` attribute parsing
//!
//! Declarations keep their source order so that rewriting one property does
//! not shuffle the others.

/// Parsed inline style declarations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    /// Parse a `style` attribute value
    pub fn parse(source: &str) -> Self {
        let declarations = source
            .split(';')
            .filter_map(|decl| {
                let (name, value) = decl.split_once(':')?;
                let name = name.trim().to_ascii_lowercase();
                let value = value.trim();
                if name.is_empty() || value.is_empty() {
                    return None;
                }
                Some((name, value.to_string()))
            })
            .collect();

        Self { declarations }
    }

    /// Get a property value
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.declarations
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set a property, replacing an existing declaration in place.
    /// An empty value removes the property.
    pub fn set(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let value = value.trim();

        if value.is_empty() {
            self.remove(&name);
            return;
        }

        match self.declarations.iter_mut().find(|(n, _)| *n == name) {
            Some(existing) => existing.1 = value.to_string(),
            None => self.declarations.push((name, value.to_string())),
        }
    }

    /// Remove a property
    pub fn remove(&mut self, name: &str) {
        let name = name.to_ascii_lowercase();
        self.declarations.retain(|(n, _)| *n != name);
    }

    /// Check if there are no declarations
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Serialize back into attribute form
    pub fn to_attribute(&self) -> String {
        self.declarations
            .iter()
            .map(|(n, v)| format!("{}: {}", n, v))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Parse a CSS pixel length such as `300`, `300px` or `300.5px`
pub fn parse_pixels(value: &str) -> Option<u32> {
    let value = value.trim();
    let number = value.strip_suffix("px").unwrap_or(value).trim();
    let parsed: f64 = number.parse().ok()?;
    if parsed.is_finite() && parsed >= 0.0 {
        Some(parsed.round() as u32)
    } else {
        None
    }
}
