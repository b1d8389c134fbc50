use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{AnalyticsError, Result};

// ============================================================================
// Record vocabulary
// ============================================================================

/// Rider category recorded on each trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Casual,
    Member,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Casual => "casual",
            UserType::Member => "member",
        }
    }

    pub fn all() -> [UserType; 2] {
        [UserType::Casual, UserType::Member]
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trip outcome. Anything other than completed/cancelled is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Completed,
    Cancelled,
    Other(String),
}

impl TripStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "completed" => TripStatus::Completed,
            "cancelled" => TripStatus::Cancelled,
            other => TripStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
            TripStatus::Other(s) => s.as_str(),
        }
    }
}

/// Bike category used by the maintenance cost breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BikeType {
    Classic,
    Electric,
}

impl BikeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BikeType::Classic => "classic",
            BikeType::Electric => "electric",
        }
    }
}

// ============================================================================
// Ranked and grouped values
// ============================================================================

/// A label with its occurrence count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedCount {
    pub label: String,
    pub count: usize,
}

/// Trip volume for one hour of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourCount {
    pub hour: u32,
    pub count: usize,
}

/// Number of trips between an origin and a destination station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCount {
    pub start_station_id: String,
    pub end_station_id: String,
    pub count: usize,
}

/// One group of a grouped numeric aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupValue {
    pub group: String,
    pub value: f64,
}

/// Look up a group in a grouped aggregate, failing when it is absent.
pub fn group_value(groups: &[GroupValue], column: &str, group: &str) -> Result<f64> {
    groups
        .iter()
        .find(|g| g.group == group)
        .map(|g| g.value)
        .ok_or_else(|| AnalyticsError::MissingGroup {
            column: column.to_string(),
            group: group.to_string(),
        })
}

/// A trip whose duration falls outside the IQR fences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierTrip {
    pub trip_id: String,
    pub duration_minutes: f64,
}

/// A trip whose distance is flagged by the z-score detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceOutlier {
    pub trip_id: String,
    pub distance_km: f64,
}

/// Summary statistics of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Two stations and the distance between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationPair {
    pub from_station_id: String,
    pub to_station_id: String,
    pub distance: f64,
}

// ============================================================================
// Analyzer results
// ============================================================================

/// Everything the trip analyzer computes in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripAnalysis {
    pub total_trips: usize,
    pub total_distance: f64,
    pub average_duration: f64,
    pub top_start_stations: Vec<RankedCount>,
    pub top_end_stations: Vec<RankedCount>,
    pub peak_usage_hours: Vec<HourCount>,
    pub average_distance_by_user_type: Vec<GroupValue>,
    pub bike_utilization_rate: f64,
    pub active_users: Vec<RankedCount>,
    pub top_routes: Vec<RouteCount>,
    pub trips_completed_rate: f64,
    pub trips_cancelled_rate: f64,
    pub avg_trips_casual: f64,
    pub avg_trips_member: f64,
    pub duration_outliers: Vec<OutlierTrip>,
    pub distance_outliers: Vec<DistanceOutlier>,
    pub duration_stats: DurationStats,
    pub trips_by_weekday: Vec<RankedCount>,
    pub busiest_weekday: String,
    pub monthly_trend: Vec<RankedCount>,
    pub estimated_revenue: f64,
}

/// Maintenance cost and frequency aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceAnalysis {
    pub cost_by_bike_type: Vec<GroupValue>,
    pub frequency_by_type: Vec<RankedCount>,
    pub most_frequent_type: String,
    pub most_serviced_bikes: Vec<RankedCount>,
}

impl MaintenanceAnalysis {
    /// Total maintenance cost of classic bikes.
    pub fn classic_cost(&self) -> Result<f64> {
        group_value(&self.cost_by_bike_type, "bike_type", BikeType::Classic.as_str())
    }

    /// Total maintenance cost of electric bikes.
    pub fn electric_cost(&self) -> Result<f64> {
        group_value(&self.cost_by_bike_type, "bike_type", BikeType::Electric.as_str())
    }
}

/// Closest and farthest station pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDistanceSummary {
    pub station_count: usize,
    pub closest: StationPair,
    pub farthest: StationPair,
}

// ============================================================================
// Aggregate results
// ============================================================================

/// Metric names shared by the analyzers and the report builder.
pub mod keys {
    pub const TOTAL_TRIPS: &str = "total_trips";
    pub const TOTAL_DISTANCE: &str = "total_distance";
    pub const AVERAGE_DURATION: &str = "average_duration";
    pub const TOP_START_STATIONS: &str = "top_start_stations";
    pub const TOP_END_STATIONS: &str = "top_end_stations";
    pub const PEAK_USAGE_HOURS: &str = "peak_usage_hours";
    pub const AVERAGE_DISTANCE_BY_USER_TYPE: &str = "average_distance_by_user_type";
    pub const BIKE_UTILIZATION_RATE: &str = "bike_utilization_rate";
    pub const ACTIVE_USERS: &str = "active_users_top_15";
    pub const TOP_ROUTES: &str = "station_to_station_top10";
    pub const TRIPS_COMPLETED_RATE: &str = "trips_completed_rate";
    pub const TRIPS_CANCELLED_RATE: &str = "trips_cancelled_rate";
    pub const AVG_TRIPS_CASUAL: &str = "avg_trips_casual";
    pub const AVG_TRIPS_MEMBER: &str = "avg_trips_member";
    pub const OUTLIERS_DURATION: &str = "outliers_duration";
    pub const OUTLIERS_DISTANCE: &str = "outliers_distance";
    pub const DURATION_STATISTICS: &str = "duration_statistics";
    pub const TRIPS_BY_WEEKDAY: &str = "trips_by_weekday";
    pub const BUSIEST_WEEKDAY: &str = "busiest_weekday";
    pub const MONTHLY_TRIP_TREND: &str = "monthly_trip_trend";
    pub const ESTIMATED_REVENUE: &str = "estimated_revenue";
    pub const MAINTENANCE_COST_BY_BIKE_TYPE: &str = "maintenance_cost_by_bike_type";
    pub const MAINTENANCE_FREQUENCY: &str = "maintenance_frequency_by_type";
    pub const MOST_FREQUENT_MAINTENANCE: &str = "most_frequent_maintenance_type";
    pub const MOST_SERVICED_BIKES: &str = "most_serviced_bikes";
    pub const CLOSEST_STATIONS: &str = "closest_stations";
    pub const FARTHEST_STATIONS: &str = "farthest_stations";
}

/// A single computed metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Count(usize),
    Number(f64),
    Label(String),
    Ranking(Vec<RankedCount>),
    Hours(Vec<HourCount>),
    Groups(Vec<GroupValue>),
    Routes(Vec<RouteCount>),
    Outliers(Vec<OutlierTrip>),
    DistanceOutliers(Vec<DistanceOutlier>),
    Summary(DurationStats),
    Pair(StationPair),
}

impl MetricValue {
    fn kind(&self) -> &'static str {
        match self {
            MetricValue::Count(_) => "count",
            MetricValue::Number(_) => "number",
            MetricValue::Label(_) => "label",
            MetricValue::Ranking(_) => "ranking",
            MetricValue::Hours(_) => "hours",
            MetricValue::Groups(_) => "groups",
            MetricValue::Routes(_) => "routes",
            MetricValue::Outliers(_) => "outliers",
            MetricValue::DistanceOutliers(_) => "distance_outliers",
            MetricValue::Summary(_) => "summary",
            MetricValue::Pair(_) => "pair",
        }
    }
}

/// Implemented by analyzer results that contribute to the report.
pub trait IntoMetrics {
    fn into_metrics(self) -> Vec<(String, MetricValue)>;
}

/// Merged view over every analyzer's metrics, keyed by metric name.
///
/// Built explicitly with [`AggregateResults::merge`]; merging adds keys
/// and replaces same-named ones, it never clears earlier content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResults {
    metrics: BTreeMap<String, MetricValue>,
}

macro_rules! typed_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self, key: &str) -> Result<&$ty> {
            match self.get(key)? {
                MetricValue::$variant(value) => Ok(value),
                other => Err(AnalyticsError::InvalidInput(format!(
                    "metric '{}' is a {}, expected {}",
                    key,
                    other.kind(),
                    stringify!($name)
                ))),
            }
        }
    };
}

impl AggregateResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an analyzer's metrics into this view.
    pub fn merge(mut self, source: impl IntoMetrics) -> Self {
        self.metrics.extend(source.into_metrics());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetricValue) {
        self.metrics.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.metrics.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(|k| k.as_str())
    }

    /// Fetch a metric, failing with [`AnalyticsError::MissingMetric`].
    pub fn get(&self, key: &str) -> Result<&MetricValue> {
        self.metrics
            .get(key)
            .ok_or_else(|| AnalyticsError::MissingMetric(key.to_string()))
    }

    typed_accessor!(count, Count, usize);
    typed_accessor!(number, Number, f64);
    typed_accessor!(label, Label, String);
    typed_accessor!(ranking, Ranking, Vec<RankedCount>);
    typed_accessor!(hours, Hours, Vec<HourCount>);
    typed_accessor!(groups, Groups, Vec<GroupValue>);
    typed_accessor!(routes, Routes, Vec<RouteCount>);
    typed_accessor!(outliers, Outliers, Vec<OutlierTrip>);
    typed_accessor!(distance_outliers, DistanceOutliers, Vec<DistanceOutlier>);
    typed_accessor!(summary, Summary, DurationStats);
    typed_accessor!(pair, Pair, StationPair);
}

impl IntoMetrics for TripAnalysis {
    fn into_metrics(self) -> Vec<(String, MetricValue)> {
        use keys::*;
        vec![
            (TOTAL_TRIPS.into(), MetricValue::Count(self.total_trips)),
            (TOTAL_DISTANCE.into(), MetricValue::Number(self.total_distance)),
            (AVERAGE_DURATION.into(), MetricValue::Number(self.average_duration)),
            (TOP_START_STATIONS.into(), MetricValue::Ranking(self.top_start_stations)),
            (TOP_END_STATIONS.into(), MetricValue::Ranking(self.top_end_stations)),
            (PEAK_USAGE_HOURS.into(), MetricValue::Hours(self.peak_usage_hours)),
            (
                AVERAGE_DISTANCE_BY_USER_TYPE.into(),
                MetricValue::Groups(self.average_distance_by_user_type),
            ),
            (
                BIKE_UTILIZATION_RATE.into(),
                MetricValue::Number(self.bike_utilization_rate),
            ),
            (ACTIVE_USERS.into(), MetricValue::Ranking(self.active_users)),
            (TOP_ROUTES.into(), MetricValue::Routes(self.top_routes)),
            (
                TRIPS_COMPLETED_RATE.into(),
                MetricValue::Number(self.trips_completed_rate),
            ),
            (
                TRIPS_CANCELLED_RATE.into(),
                MetricValue::Number(self.trips_cancelled_rate),
            ),
            (AVG_TRIPS_CASUAL.into(), MetricValue::Number(self.avg_trips_casual)),
            (AVG_TRIPS_MEMBER.into(), MetricValue::Number(self.avg_trips_member)),
            (OUTLIERS_DURATION.into(), MetricValue::Outliers(self.duration_outliers)),
            (
                OUTLIERS_DISTANCE.into(),
                MetricValue::DistanceOutliers(self.distance_outliers),
            ),
            (DURATION_STATISTICS.into(), MetricValue::Summary(self.duration_stats)),
            (TRIPS_BY_WEEKDAY.into(), MetricValue::Ranking(self.trips_by_weekday)),
            (BUSIEST_WEEKDAY.into(), MetricValue::Label(self.busiest_weekday)),
            (MONTHLY_TRIP_TREND.into(), MetricValue::Ranking(self.monthly_trend)),
            (ESTIMATED_REVENUE.into(), MetricValue::Number(self.estimated_revenue)),
        ]
    }
}

impl IntoMetrics for MaintenanceAnalysis {
    fn into_metrics(self) -> Vec<(String, MetricValue)> {
        use keys::*;
        vec![
            (
                MAINTENANCE_COST_BY_BIKE_TYPE.into(),
                MetricValue::Groups(self.cost_by_bike_type),
            ),
            (
                MAINTENANCE_FREQUENCY.into(),
                MetricValue::Ranking(self.frequency_by_type),
            ),
            (
                MOST_FREQUENT_MAINTENANCE.into(),
                MetricValue::Label(self.most_frequent_type),
            ),
            (
                MOST_SERVICED_BIKES.into(),
                MetricValue::Ranking(self.most_serviced_bikes),
            ),
        ]
    }
}

impl IntoMetrics for StationDistanceSummary {
    fn into_metrics(self) -> Vec<(String, MetricValue)> {
        vec![
            (keys::CLOSEST_STATIONS.into(), MetricValue::Pair(self.closest)),
            (keys::FARTHEST_STATIONS.into(), MetricValue::Pair(self.farthest)),
        ]
    }
}

// ============================================================================
// Pipeline result
// ============================================================================

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Whether the cleaned tables came from the on-disk cache.
    pub cache_hit: bool,
    pub cleaning_actions: Vec<String>,
    pub results: AggregateResults,
    pub report: String,
    pub written_files: Vec<PathBuf>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_maintenance() -> MaintenanceAnalysis {
        MaintenanceAnalysis {
            cost_by_bike_type: vec![GroupValue {
                group: "classic".into(),
                value: 120.5,
            }],
            frequency_by_type: vec![RankedCount {
                label: "brake".into(),
                count: 3,
            }],
            most_frequent_type: "brake".into(),
            most_serviced_bikes: vec![],
        }
    }

    #[test]
    fn test_trip_status_parse() {
        assert_eq!(TripStatus::parse("completed"), TripStatus::Completed);
        assert_eq!(TripStatus::parse("cancelled"), TripStatus::Cancelled);
        assert_eq!(
            TripStatus::parse("pending"),
            TripStatus::Other("pending".to_string())
        );
        assert_eq!(TripStatus::parse("pending").as_str(), "pending");
    }

    #[test]
    fn test_maintenance_accessors() {
        let analysis = sample_maintenance();
        assert_eq!(analysis.classic_cost().unwrap(), 120.5);
        let err = analysis.electric_cost().unwrap_err();
        assert!(err.is_input_error());
        assert!(err.to_string().contains("electric"));
    }

    #[test]
    fn test_merge_keeps_earlier_metrics() {
        let mut results = AggregateResults::new();
        results.insert("total_trips", MetricValue::Count(4));
        let results = results.merge(sample_maintenance());

        assert_eq!(*results.count("total_trips").unwrap(), 4);
        assert_eq!(results.label(keys::MOST_FREQUENT_MAINTENANCE).unwrap(), "brake");
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_missing_metric() {
        let results = AggregateResults::new();
        let err = results.number(keys::BIKE_UTILIZATION_RATE).unwrap_err();
        assert!(err.is_missing_metric());
        assert!(err.to_string().contains("bike_utilization_rate"));
    }

    #[test]
    fn test_wrong_metric_kind() {
        let mut results = AggregateResults::new();
        results.insert("total_trips", MetricValue::Count(4));
        let err = results.number("total_trips").unwrap_err();
        assert!(err.to_string().contains("count"));
    }

    #[test]
    fn test_metric_value_json_shape() {
        let json = serde_json::to_value(MetricValue::Count(3)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "count", "value": 3}));
    }
}
