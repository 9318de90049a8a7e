//! Read-only product projection returned by product discovery.
//!
//! Products are fetched per request and never cached. Nested collections
//! use `Option<Vec<_>>`: an empty collection from the catalog is normalized
//! to `None` so consumers see one representation for "nothing here".

use serde::{Deserialize, Serialize};

use super::id::{ProductId, VariantId};

/// A product as exposed to agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slogan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptions: Option<Vec<ProductDescription>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<ProductOption>>,
    pub variants: Vec<ProductVariant>,
}

/// A titled block of rich product copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDescription {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
}

/// A selectable product dimension (e.g. size) and its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOption {
    pub name: String,
    pub types: Vec<String>,
}

/// Variant photo in the sizes the catalog renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVariantPhoto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
}

/// A purchasable variant with its own price, stock signal and photos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_usable_bonus: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_availability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_image: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_urls: Option<Vec<ProductVariantPhoto>>,
}

impl Product {
    /// Whether any variant reports stock on hand.
    ///
    /// Variants without a quantity are treated as unknown, not out of stock.
    #[must_use]
    pub fn has_stock(&self) -> bool {
        self.variants
            .iter()
            .any(|v| v.quantity.is_none_or(|q| q > 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(quantity: Option<i64>) -> ProductVariant {
        ProductVariant {
            id: VariantId::new(1),
            title: "Default".to_string(),
            name: None,
            options: None,
            price: 100.0,
            compare_at_price: None,
            max_usable_bonus: None,
            inventory_availability: None,
            weight: None,
            quantity,
            featured_image: None,
            photo_urls: None,
        }
    }

    fn product(variants: Vec<ProductVariant>) -> Product {
        Product {
            id: ProductId::new(10),
            title: "Oolong Tea".to_string(),
            handle: None,
            price: Some(100.0),
            photo_urls: None,
            brief: None,
            slogan: None,
            vendor: None,
            channel: None,
            temperature_types: None,
            product_type: None,
            store_type: None,
            genre: None,
            product_url: None,
            descriptions: None,
            options: None,
            variants,
        }
    }

    #[test]
    fn test_absent_fields_are_not_serialized() {
        let json = serde_json::to_value(product(vec![variant(Some(3))])).expect("serialize");
        let obj = json.as_object().expect("object");
        assert!(!obj.contains_key("descriptions"));
        assert!(!obj.contains_key("options"));
        assert!(!obj.contains_key("handle"));
        assert_eq!(obj["variants"][0]["quantity"], 3);
    }

    #[test]
    fn test_description_type_rename() {
        let desc = ProductDescription {
            kind: Some("spec".to_string()),
            body_html: Some("<p>hi</p>".to_string()),
        };
        let json = serde_json::to_value(&desc).expect("serialize");
        assert_eq!(json["type"], "spec");
    }

    #[test]
    fn test_has_stock() {
        assert!(product(vec![variant(Some(0)), variant(Some(2))]).has_stock());
        assert!(!product(vec![variant(Some(0))]).has_stock());
        assert!(product(vec![variant(None)]).has_stock());
    }
}
