use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;

use crate::error::MarketError;
use crate::geo::GeoPoint;
use crate::risk::{self, RiskInput};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// What the pipeline needs to know about a listing.
pub trait Candidate {
    fn crop_name(&self) -> &str;
    fn crop_category(&self) -> &str;
    fn price_per_unit(&self) -> f64;
    fn quantity(&self) -> f64;
    fn listed_at(&self) -> OffsetDateTime;
    fn farmer_location(&self) -> Option<GeoPoint>;
    fn risk_input(&self) -> RiskInput;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    DateNewest,
    DateOldest,
    PriceAsc,
    PriceDesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Near {
    pub center: GeoPoint,
    pub radius_km: f64,
}

/// Conjunctive filter. `None` fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingFilter {
    /// Matched case-insensitively.
    pub crop_category: Option<String>,
    /// Case-insensitive substring of the crop name.
    pub crop_name: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_quantity: Option<f64>,
    pub near: Option<Near>,
    pub max_risk: Option<u8>,
    pub sort: SortKey,
}

impl ListingFilter {
    pub fn validate(&self) -> Result<(), MarketError> {
        let invalid = |msg: &str| Err(MarketError::InvalidFilter(msg.to_string()));

        for (name, bound) in [
            ("min_price", self.min_price),
            ("max_price", self.max_price),
            ("min_quantity", self.min_quantity),
        ] {
            if let Some(v) = bound {
                if !v.is_finite() || v < 0.0 {
                    return Err(MarketError::InvalidFilter(format!(
                        "{name} must be a non-negative number"
                    )));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return invalid("min_price must not exceed max_price");
            }
        }
        if let Some(level) = self.max_risk {
            if risk::RiskLevel::new(level).is_none() {
                return invalid("max_risk must be between 1 and 5");
            }
        }
        if let Some(near) = &self.near {
            if !near.center.is_valid() {
                return invalid("location is out of range");
            }
            if !near.radius_km.is_finite() || near.radius_km <= 0.0 {
                return invalid("radius must be positive");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: DEFAULT_LIMIT }
    }
}

impl Page {
    pub fn new(page: i64, limit: i64) -> Result<Self, MarketError> {
        if page < 1 || page > i64::from(u32::MAX) {
            return Err(MarketError::InvalidFilter("page must be at least 1".into()));
        }
        if !(1..=i64::from(MAX_LIMIT)).contains(&limit) {
            return Err(MarketError::InvalidFilter(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(Self { page: page as u32, limit: limit as u32 })
    }

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

/// A candidate that survived filtering, with what was computed for it.
#[derive(Debug, Clone, Serialize)]
pub struct Scored<T> {
    #[serde(flatten)]
    pub item: T,
    pub spoilage_risk_level: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    /// Matches across all pages.
    pub total: usize,
    pub pages: usize,
}

/// Filters, scores, sorts and pages the candidates. Pure over its inputs.
pub fn apply<T: Candidate>(
    candidates: Vec<T>,
    filter: &ListingFilter,
    page: Page,
    now: OffsetDateTime,
) -> Result<Paged<Scored<T>>, MarketError> {
    filter.validate()?;

    let category = filter.crop_category.as_deref().map(str::to_lowercase);
    let name = filter.crop_name.as_deref().map(str::to_lowercase);

    let mut matched: Vec<Scored<T>> = Vec::new();
    for item in candidates {
        if let Some(category) = &category {
            if item.crop_category().to_lowercase() != *category {
                continue;
            }
        }
        if let Some(name) = &name {
            if !item.crop_name().to_lowercase().contains(name.as_str()) {
                continue;
            }
        }
        let price = item.price_per_unit();
        if filter.min_price.is_some_and(|min| price < min)
            || filter.max_price.is_some_and(|max| price > max)
        {
            continue;
        }
        if filter.min_quantity.is_some_and(|min| item.quantity() < min) {
            continue;
        }

        let distance_km = match &filter.near {
            None => None,
            Some(near) => match item.farmer_location() {
                Some(at) => {
                    let d = near.center.distance_km(&at);
                    if d > near.radius_km {
                        continue;
                    }
                    Some(d)
                }
                None => continue,
            },
        };

        let level = match risk::estimate(&item.risk_input(), now) {
            Ok(level) => level.get(),
            Err(e) => {
                warn!(crop = item.crop_name(), error = %e, "listing skipped; risk not computable");
                continue;
            }
        };
        if filter.max_risk.is_some_and(|max| level > max) {
            continue;
        }

        matched.push(Scored { item, spoilage_risk_level: level, distance_km });
    }

    // stable: equal keys keep insertion order
    matched.sort_by(|a, b| compare(&a.item, &b.item, filter.sort));

    let total = matched.len();
    let pages = total.div_ceil(page.limit as usize);
    let items = matched
        .into_iter()
        .skip(page.offset())
        .take(page.limit as usize)
        .collect();

    Ok(Paged { items, page: page.page, limit: page.limit, total, pages })
}

fn compare<T: Candidate>(a: &T, b: &T, sort: SortKey) -> Ordering {
    match sort {
        SortKey::DateNewest => b.listed_at().cmp(&a.listed_at()),
        SortKey::DateOldest => a.listed_at().cmp(&b.listed_at()),
        SortKey::PriceAsc => a.price_per_unit().total_cmp(&b.price_per_unit()),
        SortKey::PriceDesc => b.price_per_unit().total_cmp(&a.price_per_unit()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::StorageConditions;
    use time::{macros::datetime, Duration};

    const NOW: OffsetDateTime = datetime!(2026-10-16 12:00 UTC);
    const NAIROBI: GeoPoint = GeoPoint { lat: -1.2921, lng: 36.8219 };
    const KIAMBU: GeoPoint = GeoPoint { lat: -1.1714, lng: 36.8356 };
    const KISUMU: GeoPoint = GeoPoint { lat: -0.0917, lng: 34.7680 };

    #[derive(Debug, Clone)]
    struct Item {
        id: u32,
        crop: &'static str,
        category: &'static str,
        price: f64,
        quantity: f64,
        listed_hours_ago: i64,
        harvested_days_ago: i64,
        shelf_life_days: i32,
        sensitivity: i32,
        location: Option<GeoPoint>,
    }

    impl Candidate for Item {
        fn crop_name(&self) -> &str {
            self.crop
        }
        fn crop_category(&self) -> &str {
            self.category
        }
        fn price_per_unit(&self) -> f64 {
            self.price
        }
        fn quantity(&self) -> f64 {
            self.quantity
        }
        fn listed_at(&self) -> OffsetDateTime {
            NOW - Duration::hours(self.listed_hours_ago)
        }
        fn farmer_location(&self) -> Option<GeoPoint> {
            self.location
        }
        fn risk_input(&self) -> RiskInput {
            RiskInput {
                harvest_date: NOW - Duration::days(self.harvested_days_ago),
                shelf_life_days: self.shelf_life_days,
                spoilage_sensitivity: self.sensitivity,
                storage: StorageConditions { temperature_controlled: true, humidity_controlled: true },
            }
        }
    }

    fn item(id: u32, crop: &'static str, category: &'static str, price: f64, listed_hours_ago: i64) -> Item {
        Item {
            id,
            crop,
            category,
            price,
            quantity: 100.0,
            listed_hours_ago,
            harvested_days_ago: 0,
            shelf_life_days: 30,
            sensitivity: 5,
            location: Some(NAIROBI),
        }
    }

    fn market() -> Vec<Item> {
        vec![
            item(1, "Tomatoes", "Vegetables", 80.0, 5),
            item(2, "Cherry Tomatoes", "Vegetables", 150.0, 1),
            item(3, "Mangoes", "Fruits", 100.0, 3),
            item(4, "Maize", "Grains", 40.0, 10),
            item(5, "Beans", "Legumes", 120.0, 2),
        ]
    }

    fn ids(page: &Paged<Scored<Item>>) -> Vec<u32> {
        page.items.iter().map(|s| s.item.id).collect()
    }

    fn run(filter: &ListingFilter) -> Paged<Scored<Item>> {
        apply(market(), filter, Page::default(), NOW).unwrap()
    }

    #[test]
    fn no_filters_returns_everything_newest_first() {
        let page = run(&ListingFilter::default());
        assert_eq!(ids(&page), vec![2, 5, 3, 1, 4]);
        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 1);
    }

    #[test]
    fn max_price_is_inclusive() {
        let filter = ListingFilter { max_price: Some(100.0), ..Default::default() };
        let page = run(&filter);
        assert_eq!(ids(&page), vec![3, 1, 4]);
        assert!(page.items.iter().all(|s| s.item.price <= 100.0));
    }

    #[test]
    fn price_range_and_quantity_combine() {
        let mut listings = market();
        listings[2].quantity = 10.0;
        let filter = ListingFilter {
            min_price: Some(50.0),
            max_price: Some(120.0),
            min_quantity: Some(50.0),
            ..Default::default()
        };
        let page = apply(listings, &filter, Page::default(), NOW).unwrap();
        assert_eq!(ids(&page), vec![5, 1]);
    }

    #[test]
    fn crop_name_and_category_ignore_case() {
        let filter = ListingFilter {
            crop_name: Some("TOMATO".into()),
            crop_category: Some("vegetables".into()),
            ..Default::default()
        };
        assert_eq!(ids(&run(&filter)), vec![2, 1]);

        let filter = ListingFilter { crop_category: Some("veg".into()), ..Default::default() };
        assert!(run(&filter).items.is_empty());
    }

    #[test]
    fn risk_ceiling_uses_current_time() {
        let mut listings = market();
        // spinach-like: 5 day shelf life, sensitivity 9, harvested 4 days ago
        listings[0].shelf_life_days = 5;
        listings[0].sensitivity = 9;
        listings[0].harvested_days_ago = 4;
        let filter = ListingFilter { max_risk: Some(3), ..Default::default() };
        let page = apply(listings, &filter, Page::default(), NOW).unwrap();
        assert!(!ids(&page).contains(&1));
        assert!(page.items.iter().all(|s| s.spoilage_risk_level <= 3));
    }

    #[test]
    fn invalid_crop_profiles_are_skipped() {
        let mut listings = market();
        listings[3].sensitivity = 0;
        let page = apply(listings, &ListingFilter::default(), Page::default(), NOW).unwrap();
        assert_eq!(page.total, 4);
        assert!(!ids(&page).contains(&4));
    }

    #[test]
    fn geographic_filter_uses_farmer_location() {
        let mut listings = market();
        listings[0].location = Some(KIAMBU);
        listings[1].location = Some(KISUMU);
        listings[2].location = None;
        let filter = ListingFilter {
            near: Some(Near { center: NAIROBI, radius_km: 50.0 }),
            ..Default::default()
        };
        let page = apply(listings, &filter, Page::default(), NOW).unwrap();
        assert_eq!(ids(&page), vec![5, 1, 4]);
        let kiambu = page.items.iter().find(|s| s.item.id == 1).unwrap();
        assert!(kiambu.distance_km.unwrap() < 20.0);
    }

    #[test]
    fn sorts_by_price_with_stable_ties() {
        let mut listings = market();
        listings[4].price = 80.0;
        let filter = ListingFilter { sort: SortKey::PriceAsc, ..Default::default() };
        let page = apply(listings.clone(), &filter, Page::default(), NOW).unwrap();
        assert_eq!(ids(&page), vec![4, 1, 5, 3, 2]);

        let filter = ListingFilter { sort: SortKey::PriceDesc, ..Default::default() };
        let page = apply(listings, &filter, Page::default(), NOW).unwrap();
        assert_eq!(ids(&page), vec![2, 3, 1, 5, 4]);
    }

    #[test]
    fn oldest_first() {
        let filter = ListingFilter { sort: SortKey::DateOldest, ..Default::default() };
        assert_eq!(ids(&run(&filter)), vec![4, 1, 3, 5, 2]);
    }

    #[test]
    fn paginates_after_filtering() {
        let filter = ListingFilter { max_price: Some(120.0), ..Default::default() };
        let page = apply(market(), &filter, Page::new(2, 2).unwrap(), NOW).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.pages, 2);
        assert_eq!(ids(&page), vec![1, 4]);

        let past_end = apply(market(), &filter, Page::new(3, 2).unwrap(), NOW).unwrap();
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 4);
    }

    #[test]
    fn empty_input_is_a_valid_result() {
        let page = apply(Vec::<Item>::new(), &ListingFilter::default(), Page::default(), NOW).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.pages, 0);
    }

    #[test]
    fn rejects_contradictory_filters() {
        let cases = [
            ListingFilter { min_price: Some(200.0), max_price: Some(100.0), ..Default::default() },
            ListingFilter { max_price: Some(-1.0), ..Default::default() },
            ListingFilter { min_quantity: Some(f64::NAN), ..Default::default() },
            ListingFilter { max_risk: Some(0), ..Default::default() },
            ListingFilter { max_risk: Some(6), ..Default::default() },
            ListingFilter {
                near: Some(Near { center: NAIROBI, radius_km: 0.0 }),
                ..Default::default()
            },
            ListingFilter {
                near: Some(Near { center: GeoPoint::new(95.0, 0.0), radius_km: 5.0 }),
                ..Default::default()
            },
        ];
        for filter in cases {
            let res = apply(market(), &filter, Page::default(), NOW);
            assert!(matches!(res, Err(MarketError::InvalidFilter(_))), "{filter:?}");
        }
    }

    #[test]
    fn rejects_bad_pages() {
        assert!(matches!(Page::new(0, 20), Err(MarketError::InvalidFilter(_))));
        assert!(matches!(Page::new(1, 0), Err(MarketError::InvalidFilter(_))));
        assert!(matches!(Page::new(1, 101), Err(MarketError::InvalidFilter(_))));
        assert_eq!(Page::new(3, 100).unwrap(), Page { page: 3, limit: 100 });
    }

    #[test]
    fn sort_key_parses_snake_case() {
        let key: SortKey = serde_json::from_str("\"price_desc\"").unwrap();
        assert_eq!(key, SortKey::PriceDesc);
    }
}
