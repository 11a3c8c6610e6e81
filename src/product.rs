use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

/// Canonical product page prefix; the product alias is appended to it.
pub const PRODUCT_URL_BASE: &str = "https://shop.amul.com/en/product/";

/// One product as reported by the shop's product API at scrape time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductObservation {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub alias: String,
    #[serde(default, deserialize_with = "truthy")]
    pub available: bool,
    #[serde(default, deserialize_with = "lenient_price")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub inventory_quantity: u32,
}

impl ProductObservation {
    pub fn new(name: impl Into<String>, alias: impl Into<String>, available: bool) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            available,
            price: 0.0,
            inventory_quantity: 0,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn with_inventory(mut self, quantity: u32) -> Self {
        self.inventory_quantity = quantity;
        self
    }

    /// Case-folded name, the key used against targets and persisted state.
    pub fn identity(&self) -> String {
        normalize(&self.name)
    }

    pub fn url(&self) -> String {
        format!("{}{}", PRODUCT_URL_BASE, self.alias)
    }
}

impl fmt::Display for ProductObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.available { "Available" } else { "Unavailable" };
        write!(f, "{} ({})", self.name, status)?;
        if self.inventory_quantity > 0 {
            write!(f, " (Stock: {})", self.inventory_quantity)?;
        }
        write!(f, " - ₹{}", format_price(self.price))
    }
}

/// Prices always keep a decimal point, so whole amounts read as `2199.0`.
pub fn format_price(price: f64) -> String {
    format!("{:?}", price)
}

pub fn normalize(name: &str) -> String {
    name.to_lowercase()
}

/// Decode the `data` array of a product listing response.
///
/// Entries that do not look like a product are skipped rather than failing the
/// whole listing.
pub fn parse_listing(body: &str) -> Result<Vec<ProductObservation>, serde_json::Error> {
    #[derive(Deserialize)]
    struct Listing {
        #[serde(default)]
        data: Vec<Value>,
    }

    let listing: Listing = serde_json::from_str(body)?;
    let mut products = Vec::with_capacity(listing.data.len());
    for (index, entry) in listing.data.into_iter().enumerate() {
        match serde_json::from_value::<ProductObservation>(entry) {
            Ok(product) => products.push(product),
            Err(e) => tracing::warn!(index, error = %e, "Skipping malformed product entry"),
        }
    }
    Ok(products)
}

fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

fn lenient_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let quantity = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|v| v.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(quantity.unwrap_or(0).min(u32::MAX as u64) as u32)
}
