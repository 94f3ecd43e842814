//! Layer types

use serde::{Deserialize, Serialize};

/// Entry of the engine's layer enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerUiConfig {
    pub number: usize,
    pub text: String,
    pub on: bool,
    #[serde(default)]
    pub locked: bool,
}

/// Layer with its reconstructed hierarchy
///
/// `xref` and `parent_xref` are 0 when the layer could not be located
/// structurally or sits at the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub number: usize,
    pub text: String,
    pub on: bool,
    pub locked: bool,
    pub xref: u32,
    pub parent_xref: u32,
    pub depth: usize,
    pub display_order: usize,
}

impl From<LayerUiConfig> for Layer {
    fn from(ui: LayerUiConfig) -> Self {
        Self {
            number: ui.number,
            text: ui.text,
            on: ui.on,
            locked: ui.locked,
            xref: 0,
            parent_xref: 0,
            depth: 0,
            display_order: 0,
        }
    }
}

impl Layer {
    /// Whether the layer was matched to an OCG object
    pub fn is_located(&self) -> bool {
        self.xref != 0
    }
}

/// Options for creating a layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerOptions {
    /// Index into `/Configs`, or -1 for the default configuration
    pub config: i32,
    /// Initially visible
    pub on: bool,
    pub intent: String,
    pub usage: String,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            config: -1,
            on: true,
            intent: "View".to_string(),
            usage: "Artwork".to_string(),
        }
    }
}

impl LayerOptions {
    pub fn hidden() -> Self {
        Self {
            on: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_serializes_camel_case() {
        let layer = Layer {
            number: 1,
            text: "Notes".into(),
            on: true,
            locked: false,
            xref: 12,
            parent_xref: 10,
            depth: 1,
            display_order: 3,
        };
        let json = serde_json::to_value(&layer).unwrap();
        assert_eq!(json["parentXref"], 10);
        assert_eq!(json["displayOrder"], 3);
    }

    #[test]
    fn test_unlocated_layer_defaults() {
        let layer = Layer::from(LayerUiConfig {
            number: 0,
            text: "A".into(),
            on: false,
            locked: true,
        });
        assert!(!layer.is_located());
        assert_eq!((layer.depth, layer.parent_xref), (0, 0));
        assert!(layer.locked);
    }
}
