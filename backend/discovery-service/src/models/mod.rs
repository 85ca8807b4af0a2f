use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

mod embedding;

pub use embedding::{EmbeddingVector, StoredEmbedding, EMBEDDING_DIMENSION};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Listing category, persisted as its integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCategory {
    WomenClothing,
    MenClothing,
    Shoes,
    BagsWallets,
    Watches,
    Jewelry,
    FashionAccessories,
    ElectronicsSmartDevices,
    LargeAppliances,
    SmallAppliances,
    SportsLeisure,
    VehiclesMotorcycles,
    StarGoods,
    Kidult,
    ArtRareCollectibles,
    MusicInstruments,
    BooksTicketsStationery,
    Beauty,
    FurnitureInterior,
    LifeKitchen,
    ToolsIndustrial,
    Food,
    Baby,
    PetProducts,
    Other,
    Skill,
}

impl ItemCategory {
    pub const ALL: [ItemCategory; 26] = [
        Self::WomenClothing,
        Self::MenClothing,
        Self::Shoes,
        Self::BagsWallets,
        Self::Watches,
        Self::Jewelry,
        Self::FashionAccessories,
        Self::ElectronicsSmartDevices,
        Self::LargeAppliances,
        Self::SmallAppliances,
        Self::SportsLeisure,
        Self::VehiclesMotorcycles,
        Self::StarGoods,
        Self::Kidult,
        Self::ArtRareCollectibles,
        Self::MusicInstruments,
        Self::BooksTicketsStationery,
        Self::Beauty,
        Self::FurnitureInterior,
        Self::LifeKitchen,
        Self::ToolsIndustrial,
        Self::Food,
        Self::Baby,
        Self::PetProducts,
        Self::Other,
        Self::Skill,
    ];

    /// Stable code stored in `item.item_category` (1-based, never reordered)
    pub fn code(&self) -> i32 {
        match self {
            Self::WomenClothing => 1,
            Self::MenClothing => 2,
            Self::Shoes => 3,
            Self::BagsWallets => 4,
            Self::Watches => 5,
            Self::Jewelry => 6,
            Self::FashionAccessories => 7,
            Self::ElectronicsSmartDevices => 8,
            Self::LargeAppliances => 9,
            Self::SmallAppliances => 10,
            Self::SportsLeisure => 11,
            Self::VehiclesMotorcycles => 12,
            Self::StarGoods => 13,
            Self::Kidult => 14,
            Self::ArtRareCollectibles => 15,
            Self::MusicInstruments => 16,
            Self::BooksTicketsStationery => 17,
            Self::Beauty => 18,
            Self::FurnitureInterior => 19,
            Self::LifeKitchen => 20,
            Self::ToolsIndustrial => 21,
            Self::Food => 22,
            Self::Baby => 23,
            Self::PetProducts => 24,
            Self::Other => 25,
            Self::Skill => 26,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Physical condition of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemCondition {
    Sealed,
    SlightlyUsed,
    ModeratelyUsed,
    HeavilyUsed,
}

impl ItemCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sealed => "SEALED",
            Self::SlightlyUsed => "SLIGHTLY_USED",
            Self::ModeratelyUsed => "MODERATELY_USED",
            Self::HeavilyUsed => "HEAVILY_USED",
        }
    }
}

impl FromStr for ItemCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SEALED" => Ok(Self::Sealed),
            "SLIGHTLY_USED" => Ok(Self::SlightlyUsed),
            "MODERATELY_USED" => Ok(Self::ModeratelyUsed),
            "HEAVILY_USED" => Ok(Self::HeavilyUsed),
            other => Err(format!("unknown item condition: {}", other)),
        }
    }
}

/// Trade status of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Available,
    Reserved,
    Exchanged,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Reserved => "RESERVED",
            Self::Exchanged => "EXCHANGED",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "RESERVED" => Ok(Self::Reserved),
            "EXCHANGED" => Ok(Self::Exchanged),
            other => Err(format!("unknown item status: {}", other)),
        }
    }
}

/// Owner kind of a stored embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OriginalType {
    /// Content vector of a listing, keyed by item id
    Item,
    /// Synthesized preference vector of a member, keyed by member id
    CategoryPreference,
}

impl OriginalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Item => "ITEM",
            Self::CategoryPreference => "CATEGORY_PREFERENCE",
        }
    }
}

impl fmt::Display for OriginalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implicit feedback event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    View,
    Like,
    Unlike,
}

impl InteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Like => "like",
            Self::Unlike => "unlike",
        }
    }
}

impl fmt::Display for InteractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WGS84 point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }
}

/// Discovery sort mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortMode {
    Distance,
    PreferredCategory,
    CreatedDate,
    Recommended,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Distance => "distance",
            Self::PreferredCategory => "preferred_category",
            Self::CreatedDate => "created_date",
            Self::Recommended => "recommended",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One discovery request as received from a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRequest {
    pub requester_id: Uuid,
    pub origin: Option<GeoPoint>,
    pub radius_meters: Option<f64>,
    pub sort_mode: SortMode,
    #[serde(default)]
    pub sort_direction: SortDirection,
    /// Zero-based
    pub page_number: u32,
    pub page_size: u32,
    /// Caller deadline; capped at the configured query timeout
    pub timeout_ms: Option<u64>,
}

/// A tradeable listing as seen by discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub item_id: Uuid,
    pub owner_id: Uuid,
    pub item_name: String,
    pub item_category: ItemCategory,
    pub item_condition: ItemCondition,
    pub item_status: ItemStatus,
    pub price: i32,
    pub location: GeoPoint,
    pub like_count: i32,
    #[serde(skip_serializing)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Listing plus the sort key that placed it on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedListing {
    #[serde(flatten)]
    pub listing: Listing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cosine_distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl RankedListing {
    pub fn unranked(listing: Listing) -> Self {
        Self {
            listing,
            distance_meters: None,
            cosine_distance: None,
            score: None,
        }
    }
}

/// Raw `item` row; the enum columns are decoded in `TryFrom`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListingRow {
    pub item_id: Uuid,
    pub member_id: Uuid,
    pub item_name: String,
    pub item_category: i32,
    pub item_condition: String,
    pub item_status: String,
    pub price: i32,
    pub longitude: f64,
    pub latitude: f64,
    pub like_count: i32,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub distance_meters: Option<f64>,
    pub cosine_distance: Option<f64>,
    pub score: Option<f64>,
}

impl TryFrom<ListingRow> for RankedListing {
    type Error = String;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let item_category = ItemCategory::from_code(row.item_category).ok_or_else(|| {
            format!(
                "item {} has unknown category code {}",
                row.item_id, row.item_category
            )
        })?;

        Ok(RankedListing {
            listing: Listing {
                item_id: row.item_id,
                owner_id: row.member_id,
                item_name: row.item_name,
                item_category,
                item_condition: row.item_condition.parse()?,
                item_status: row.item_status.parse()?,
                price: row.price,
                location: GeoPoint::new(row.longitude, row.latitude),
                like_count: row.like_count,
                is_deleted: row.is_deleted,
                created_at: row.created_at,
            },
            distance_meters: row.distance_meters,
            cosine_distance: row.cosine_distance,
            score: row.score,
        })
    }
}

/// Per (member, category) implicit affinity accumulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionScore {
    pub member_id: Uuid,
    pub item_category: ItemCategory,
    /// Score as of `updated_at`; read through `decayed_at`
    pub score: f64,
    pub view_count: i32,
    pub like_count: i32,
    pub updated_at: DateTime<Utc>,
}

/// Implicit feedback signal emitted by a user action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub member_id: Uuid,
    pub item_category: ItemCategory,
    pub interaction_type: InteractionType,
    /// Present for item views; enables once-per-day deduplication
    #[serde(default)]
    pub item_id: Option<Uuid>,
}

/// Change applied to one interaction score row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionDelta {
    pub score: f64,
    pub views: i32,
    pub likes: i32,
}

impl InteractionScore {
    /// Score decayed from `updated_at` to `now`
    pub fn decayed_at(&self, now: DateTime<Utc>, lambda_per_day: f64) -> f64 {
        decay_score(self.score, self.updated_at, now, lambda_per_day)
    }
}

/// `score * exp(-λ * Δdays)`, with Δ clamped at zero so clock skew never inflates a score
pub fn decay_score(
    score: f64,
    last_update: DateTime<Utc>,
    now: DateTime<Utc>,
    lambda_per_day: f64,
) -> f64 {
    let elapsed_days = elapsed_days(last_update, now);
    (score * (-lambda_per_day * elapsed_days).exp()).max(0.0)
}

/// Fractional days between two instants, never negative
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let millis = (to - from).num_milliseconds().max(0) as f64;
    millis / 1000.0 / SECONDS_PER_DAY
}

/// One page of results with the exact total across all pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page_number: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_category_codes_roundtrip_and_are_unique() {
        let mut codes: Vec<i32> = ItemCategory::ALL.iter().map(|c| c.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 26);
        assert_eq!(codes.first(), Some(&1));
        assert_eq!(codes.last(), Some(&26));

        for category in ItemCategory::ALL {
            assert_eq!(ItemCategory::from_code(category.code()), Some(category));
        }
        assert_eq!(ItemCategory::from_code(0), None);
        assert_eq!(ItemCategory::from_code(27), None);
    }

    #[test]
    fn test_category_serializes_by_name() {
        let json = serde_json::to_string(&ItemCategory::ElectronicsSmartDevices).unwrap();
        assert_eq!(json, "\"ELECTRONICS_SMART_DEVICES\"");
        let parsed: ItemCategory = serde_json::from_str("\"WOMEN_CLOTHING\"").unwrap();
        assert_eq!(parsed, ItemCategory::WomenClothing);
    }

    #[test]
    fn test_decay_matches_exponential_formula() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::days(10);
        let decayed = decay_score(5.0, t0, t1, 0.1);
        assert!((decayed - 5.0 * (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn test_decay_ignores_negative_elapsed_time() {
        let t0 = Utc::now();
        let earlier = t0 - Duration::hours(3);
        assert_eq!(decay_score(2.5, t0, earlier, 0.1), 2.5);
    }

    #[test]
    fn test_geo_point_bounds() {
        assert!(GeoPoint::new(126.97, 37.56).is_valid());
        assert!(!GeoPoint::new(181.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, -90.5).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_listing_row_with_unknown_category_is_rejected() {
        let row = ListingRow {
            item_id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            item_name: "lamp".to_string(),
            item_category: 99,
            item_condition: "SEALED".to_string(),
            item_status: "AVAILABLE".to_string(),
            price: 1000,
            longitude: 127.0,
            latitude: 37.5,
            like_count: 0,
            is_deleted: false,
            created_at: Utc::now(),
            distance_meters: None,
            cosine_distance: None,
            score: None,
        };

        assert!(RankedListing::try_from(row).is_err());
    }
}
