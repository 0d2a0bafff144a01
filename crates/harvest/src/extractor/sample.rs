//! Deterministic canned records, for demos and tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};

use super::{ExtractionError, Extractor};
use crate::job::ExtractedRecord;

/// Returns five phone listings for queries mentioning "iphone" and two
/// generic results for anything else.
#[derive(Debug, Clone, Default)]
pub struct SampleExtractor {
    delay: Option<Duration>,
}

impl SampleExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay_ms` before answering so progress can be watched.
    pub fn with_delay_ms(delay_ms: u64) -> Self {
        Self {
            delay: (delay_ms > 0).then(|| Duration::from_millis(delay_ms)),
        }
    }
}

#[async_trait]
impl Extractor for SampleExtractor {
    async fn extract(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ExtractedRecord>, ExtractionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut records = if query.to_lowercase().contains("iphone") {
            phone_listings()
        } else {
            generic_results(query)
        };
        records.truncate(max_results as usize);
        Ok(records)
    }

    fn name(&self) -> &str {
        "sample"
    }
}

fn record(
    title: &str,
    description: &str,
    url: &str,
    price: &str,
    rating: &str,
    additional: Value,
) -> ExtractedRecord {
    let additional_data = match additional {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    ExtractedRecord {
        title: Some(title.to_string()),
        description: Some(description.to_string()),
        url: Some(url.to_string()),
        price: Some(price.to_string()),
        rating: Some(rating.to_string()),
        date: Some(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()),
        additional_data,
    }
}

fn phone_listings() -> Vec<ExtractedRecord> {
    vec![
        record(
            "iPhone 15 128GB - Midnight",
            "Latest iPhone 15 with 48MP camera, USB-C, and Dynamic Island.",
            "https://www.apple.com/iphone-15/",
            "₹79,900",
            "4.5/5",
            json!({"color": "Midnight", "storage": "128GB", "availability": "In Stock"}),
        ),
        record(
            "iPhone 15 Plus 256GB - Blue",
            "iPhone 15 Plus with a 6.7-inch display and longer battery life.",
            "https://www.apple.com/iphone-15-plus/",
            "₹89,900",
            "4.4/5",
            json!({"color": "Blue", "storage": "256GB", "availability": "In Stock"}),
        ),
        record(
            "iPhone 15 Pro 128GB - Natural Titanium",
            "Titanium design, pro camera system and the A17 Pro chip.",
            "https://www.apple.com/iphone-15-pro/",
            "₹1,34,900",
            "4.6/5",
            json!({"color": "Natural Titanium", "storage": "128GB", "availability": "Limited Stock"}),
        ),
        record(
            "iPhone 15 Pro Max 256GB - Black Titanium",
            "The largest Pro model with a titanium build.",
            "https://www.apple.com/iphone-15-pro-max/",
            "₹1,59,900",
            "4.7/5",
            json!({"color": "Black Titanium", "storage": "256GB", "availability": "Pre-order"}),
        ),
        record(
            "iPhone 15 512GB - Yellow (Amazon)",
            "iPhone 15 with maximum storage and marketplace offers.",
            "https://amazon.in/iphone-15-yellow",
            "₹99,900",
            "4.3/5",
            json!({"color": "Yellow", "storage": "512GB", "platform": "Amazon", "discount": "5% off"}),
        ),
    ]
}

fn generic_results(query: &str) -> Vec<ExtractedRecord> {
    let mut hasher = DefaultHasher::new();
    query.hash(&mut hasher);
    let seed = hasher.finish();
    let slug = query.trim().replace(' ', "-");

    (1..=2u64)
        .map(|n| {
            let price = 1_000 + (seed.rotate_left(n as u32 * 16) % 49_000);
            let rating = 35 + (seed.rotate_left(n as u32 * 8) % 16);
            record(
                &format!("Search Result {} for {}", n, query),
                &format!("Details about {} from source {}.", query, n),
                &format!("https://example{}.com/{}", n, slug),
                &format!("₹{}", price),
                &format!("{}.{}/5", rating / 10, rating % 10),
                json!({"source": format!("Example Site {}", n), "category": "General"}),
            )
        })
        .collect()
}
