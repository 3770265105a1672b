//! Product view journey: a recency-ordered, capped history with
//! upsert-on-view semantics.

use crate::EXPIRY_DAYS;
use pwx_core::time::now_ms;
use pwx_core::types::Product;
use pwx_storage::LocalStore;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

const JOURNEY_KEY: &str = "journey";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyEntry {
    pub product_id: String,
    pub title: String,
    pub price: f64,
    pub image: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub first_visit: u64,
    pub last_visit: u64,
    pub visit_count: u32,
}

pub struct ProductTracker {
    store: Rc<LocalStore>,
    limit: usize,
}

impl ProductTracker {
    pub fn new(store: Rc<LocalStore>, journey_limit: usize) -> Self {
        Self {
            store,
            limit: journey_limit.max(1),
        }
    }

    /// Upsert by product id: a repeat view moves the entry to the front
    /// and bumps its visit count; entries beyond the limit fall off the
    /// least-recently-viewed end.
    pub fn track_view(&self, product: &Product) {
        let now = now_ms();
        let mut journey = self.load();

        let entry = match journey.iter().position(|e| e.product_id == product.id) {
            Some(at) => {
                let mut entry = journey.remove(at);
                entry.last_visit = now;
                entry.visit_count += 1;
                // Refresh display fields; the feed may have changed.
                entry.title = product.title.clone();
                entry.price = product.display_price();
                entry.image = product.image.clone();
                entry.url = product.url.clone();
                entry
            }
            None => JourneyEntry {
                product_id: product.id.clone(),
                title: product.title.clone(),
                price: product.display_price(),
                image: product.image.clone(),
                url: product.url.clone(),
                brand: product.brand.clone(),
                category: product.category.clone(),
                first_visit: now,
                last_visit: now,
                visit_count: 1,
            },
        };

        journey.insert(0, entry);
        journey.truncate(self.limit);
        self.store
            .set_serialize(JOURNEY_KEY, &journey, Some(EXPIRY_DAYS));
    }

    /// Most recent first.
    pub fn recently_viewed(&self, limit: usize) -> Vec<JourneyEntry> {
        let mut journey = self.load();
        journey.truncate(limit);
        journey
    }

    /// Recent views excluding one product (typically the current page's).
    pub fn recently_viewed_except(&self, product_id: &str, limit: usize) -> Vec<JourneyEntry> {
        let mut journey = self.load();
        journey.retain(|e| e.product_id != product_id);
        journey.truncate(limit);
        journey
    }

    pub fn by_category(&self, category: &str, limit: usize) -> Vec<JourneyEntry> {
        let mut journey = self.load();
        journey.retain(|e| {
            e.category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(category))
        });
        journey.truncate(limit);
        journey
    }

    /// Highest visit count first; ties keep recency order.
    pub fn most_viewed(&self, limit: usize) -> Vec<JourneyEntry> {
        let mut journey = self.load();
        journey.sort_by(|a, b| b.visit_count.cmp(&a.visit_count));
        journey.truncate(limit);
        journey
    }

    pub fn clear(&self) {
        self.store.remove(JOURNEY_KEY);
    }

    fn load(&self) -> Vec<JourneyEntry> {
        self.store.get_as(JOURNEY_KEY).unwrap_or_default()
    }
}
