//! Server-sourced data shapes shared across the runtime.
//!
//! All of these deserialize from the public API's camelCase JSON and are
//! read-only from the runtime's perspective: a new descriptor triggers a
//! new mount, never a mutation of a live one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single product as served by `GET /api/public/products/{slug}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub title: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<f64>,
    pub image: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub stock_status: StockStatus,
}

impl Product {
    /// Effective display price: the sale price when one is set.
    pub fn display_price(&self) -> f64 {
        self.sale_price.unwrap_or(self.price)
    }

    pub fn on_sale(&self) -> bool {
        matches!(self.sale_price, Some(sale) if sale < self.price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    InStock,
    OutOfStock,
    Preorder,
}

/// Customer theme as served by `GET /api/public/theme/{slug}`.
///
/// Unknown keys are preserved in `extra` so admin-authored custom templates
/// can reference theme values the runtime itself does not interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    #[serde(default = "Theme::default_primary")]
    pub primary_color: String,
    #[serde(default = "Theme::default_secondary")]
    pub secondary_color: String,
    #[serde(default = "Theme::default_font")]
    pub font_family: String,
    #[serde(default = "Theme::default_radius")]
    pub border_radius: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Theme {
    fn default_primary() -> String {
        "#3b82f6".into()
    }
    fn default_secondary() -> String {
        "#1e293b".into()
    }
    fn default_font() -> String {
        "inherit".into()
    }
    fn default_radius() -> String {
        "8px".into()
    }

    /// CSS custom properties applied to every widget container.
    pub fn css_vars(&self) -> Vec<(String, String)> {
        vec![
            ("--pwx-primary".into(), self.primary_color.clone()),
            ("--pwx-secondary".into(), self.secondary_color.clone()),
            ("--pwx-font".into(), self.font_family.clone()),
            ("--pwx-radius".into(), self.border_radius.clone()),
        ]
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_color: Self::default_primary(),
            secondary_color: Self::default_secondary(),
            font_family: Self::default_font(),
            border_radius: Self::default_radius(),
            extra: BTreeMap::new(),
        }
    }
}

/// Where a server-configured widget's container should be created in the
/// host page. A bare selector string appends to the matched element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Placement {
    Selector(String),
    Positioned {
        selector: String,
        #[serde(default)]
        position: InsertPosition,
    },
}

impl Placement {
    pub fn selector(&self) -> &str {
        match self {
            Placement::Selector(s) => s,
            Placement::Positioned { selector, .. } => selector,
        }
    }

    pub fn position(&self) -> InsertPosition {
        match self {
            Placement::Selector(_) => InsertPosition::Append,
            Placement::Positioned { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    #[default]
    Append,
    Prepend,
}

/// Server-supplied (or DOM-declared) description of a widget to mount.
/// Immutable per mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub widget_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<WidgetTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
}

/// Admin-authored template for the Custom widget. Externally authored,
/// never mutated by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetTemplate {
    pub html_template: String,
    pub css_styles: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_data: Option<Value>,
}

/// Aggregated payload a widget renders from: products plus theme plus the
/// matching server-side descriptor, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetData {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<WidgetDescriptor>,
}

/// Widget container lifecycle.
///
/// `Pending -> Loading -> {Mounted | Error}`, with `Destroyed` reachable
/// from `Mounted`/`Error` via explicit destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Pending,
    Loading,
    Mounted,
    Error,
    Destroyed,
}

impl WidgetState {
    /// CSS marker class for the container.
    pub fn css_class(self) -> &'static str {
        match self {
            WidgetState::Pending => "pwx-pending",
            WidgetState::Loading => "pwx-loading",
            WidgetState::Mounted => "pwx-mounted",
            WidgetState::Error => "pwx-error",
            WidgetState::Destroyed => "pwx-destroyed",
        }
    }
}
