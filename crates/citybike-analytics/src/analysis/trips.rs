//! Trip metrics.
//!
//! Most metrics read the cleaned trips table (completed, complete,
//! de-duplicated trips). Completion rates and trips-per-user read the raw
//! table, since cancelled trips only exist there.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use polars::prelude::*;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::config::AnalyticsConfig;
use crate::error::{AnalyticsError, Result, ResultExt};
use crate::stats::outliers::{iqr_outlier_rows, zscore_outlier_mask};
use crate::stats::{calculate_fares, duration_stats};
use crate::types::{
    DistanceOutlier, GroupValue, HourCount, OutlierTrip, RankedCount, RouteCount, TripAnalysis, TripStatus,
    UserType, group_value,
};
use crate::utils::{
    f64_values, millis_to_datetime, non_null_f64, rank_by_count, round2, string_values,
    timestamp_values, top_n,
};

const HOURS_PER_DAY: f64 = 24.0;
const MINUTES_PER_HOUR: f64 = 60.0;

fn labels(values: Vec<Option<String>>) -> impl Iterator<Item = String> {
    values.into_iter().flatten()
}

fn ranked(counts: Vec<(String, usize)>) -> Vec<RankedCount> {
    counts
        .into_iter()
        .map(|(label, count)| RankedCount { label, count })
        .collect()
}

fn datetimes(df: &DataFrame, column: &str) -> Result<Vec<NaiveDateTime>> {
    Ok(timestamp_values(df, column)?
        .into_iter()
        .flatten()
        .filter_map(millis_to_datetime)
        .collect())
}

// =============================================================================
// Totals
// =============================================================================

pub fn total_trips(trips: &DataFrame) -> usize {
    trips.height()
}

pub fn total_distance(trips: &DataFrame) -> Result<f64> {
    Ok(non_null_f64(trips, "distance_km")?.iter().sum())
}

/// Mean of `end_time - start_time` in minutes.
pub fn average_duration(trips: &DataFrame) -> Result<f64> {
    let starts = timestamp_values(trips, "start_time")?;
    let ends = timestamp_values(trips, "end_time")?;

    let minutes: Vec<f64> = starts
        .iter()
        .zip(&ends)
        .filter_map(|(start, end)| Some((((*end)? - (*start)?) as f64) / 60_000.0))
        .collect();

    if minutes.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "average_duration needs at least one timed trip".to_string(),
        ));
    }
    Ok(round2(minutes.iter().sum::<f64>() / minutes.len() as f64))
}

// =============================================================================
// Rankings
// =============================================================================

/// Most frequent values of a station column.
pub fn top_stations(trips: &DataFrame, column: &str, n: usize) -> Result<Vec<RankedCount>> {
    let ids = string_values(trips, column)?;
    Ok(ranked(top_n(rank_by_count(labels(ids)), n)))
}

/// Busiest hours of the day by trip start.
pub fn peak_usage_hours(trips: &DataFrame, n: usize) -> Result<Vec<HourCount>> {
    let hours = datetimes(trips, "start_time")?.into_iter().map(|dt| dt.hour());
    Ok(top_n(rank_by_count(hours), n)
        .into_iter()
        .map(|(hour, count)| HourCount { hour, count })
        .collect())
}

/// Users with the most trips.
pub fn most_active_users(trips: &DataFrame, n: usize) -> Result<Vec<RankedCount>> {
    let users = string_values(trips, "user_id")?;
    Ok(ranked(top_n(rank_by_count(labels(users)), n)))
}

/// Most frequent origin/destination pairs.
pub fn top_routes(trips: &DataFrame, n: usize) -> Result<Vec<RouteCount>> {
    let starts = string_values(trips, "start_station_id")?;
    let ends = string_values(trips, "end_station_id")?;

    let pairs = starts
        .into_iter()
        .zip(ends)
        .filter_map(|(start, end)| Some((start?, end?)));

    Ok(top_n(rank_by_count(pairs), n)
        .into_iter()
        .map(|((start_station_id, end_station_id), count)| RouteCount {
            start_station_id,
            end_station_id,
            count,
        })
        .collect())
}

// =============================================================================
// Grouped and rate metrics
// =============================================================================

/// Mean distance per user type, in first-seen group order.
///
/// Both `casual` and `member` must be present.
pub fn average_distance_by_user_type(trips: &DataFrame) -> Result<Vec<GroupValue>> {
    let types = string_values(trips, "user_type")?;
    let distances = f64_values(trips, "distance_km")?;

    let mut order: Vec<String> = Vec::new();
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for (user_type, distance) in types.into_iter().zip(distances) {
        let (Some(user_type), Some(distance)) = (user_type, distance) else {
            continue;
        };
        let entry = sums.entry(user_type.clone()).or_insert_with(|| {
            order.push(user_type);
            (0.0, 0)
        });
        entry.0 += distance;
        entry.1 += 1;
    }

    let groups: Vec<GroupValue> = order
        .into_iter()
        .filter_map(|group| {
            let (sum, count) = sums.get(&group).copied()?;
            Some(GroupValue {
                value: round2(sum / count as f64),
                group,
            })
        })
        .collect();

    for user_type in UserType::all() {
        group_value(&groups, "user_type", user_type.as_str())?;
    }
    Ok(groups)
}

/// Share of a day each bike spends riding, in percent.
///
/// `(total minutes / 60 / distinct bikes) / 24 * 100`
pub fn bike_utilization_rate(trips: &DataFrame) -> Result<f64> {
    let bikes: HashSet<String> = labels(string_values(trips, "bike_id")?).collect();
    if bikes.is_empty() {
        return Err(AnalyticsError::EmptyInput(
            "bike_utilization_rate needs at least one bike".to_string(),
        ));
    }

    let total_hours = non_null_f64(trips, "duration_minutes")?.iter().sum::<f64>() / MINUTES_PER_HOUR;
    let hours_per_bike = total_hours / bikes.len() as f64;
    Ok(round2(hours_per_bike / HOURS_PER_DAY * 100.0))
}

/// Percent of raw trips completed and cancelled.
pub fn completion_rates(raw_trips: &DataFrame) -> Result<(f64, f64)> {
    let total = raw_trips.height();
    if total == 0 {
        return Err(AnalyticsError::EmptyInput(
            "completion rates need at least one raw trip".to_string(),
        ));
    }

    let statuses: Vec<TripStatus> = labels(string_values(raw_trips, "status")?)
        .map(|s| TripStatus::parse(&s))
        .collect();
    let share = |status: TripStatus| {
        let count = statuses.iter().filter(|s| **s == status).count();
        round2(count as f64 / total as f64 * 100.0)
    };

    Ok((share(TripStatus::Completed), share(TripStatus::Cancelled)))
}

/// Raw trips of a user type divided by that type's distinct users.
pub fn avg_trips_per_user(raw_trips: &DataFrame, user_type: UserType) -> Result<f64> {
    let types = string_values(raw_trips, "user_type")?;
    let users = string_values(raw_trips, "user_id")?;

    let mut trips = 0usize;
    let mut distinct: HashSet<String> = HashSet::new();
    for (t, user) in types.into_iter().zip(users) {
        if t.as_deref() == Some(user_type.as_str()) {
            trips += 1;
            if let Some(user) = user {
                distinct.insert(user);
            }
        }
    }

    if distinct.is_empty() {
        return Err(AnalyticsError::MissingGroup {
            column: "user_type".to_string(),
            group: user_type.as_str().to_string(),
        });
    }
    Ok(round2(trips as f64 / distinct.len() as f64))
}

// =============================================================================
// Duration distribution
// =============================================================================

/// Trips whose duration lies outside the IQR fences.
pub fn duration_outliers(trips: &DataFrame, multiplier: f64) -> Result<Vec<OutlierTrip>> {
    let rows = iqr_outlier_rows(trips, "duration_minutes", multiplier)?;
    let ids = string_values(&rows, "trip_id")?;
    let durations = f64_values(&rows, "duration_minutes")?;

    Ok(ids
        .into_iter()
        .zip(durations)
        .filter_map(|(trip_id, duration)| {
            Some(OutlierTrip {
                trip_id: trip_id?,
                duration_minutes: duration?,
            })
        })
        .collect())
}

// =============================================================================
// Calendar volume
// =============================================================================

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Trip counts for every day of the week, Monday first.
pub fn trips_by_weekday(trips: &DataFrame) -> Result<Vec<RankedCount>> {
    let mut counts = [0usize; 7];
    for dt in datetimes(trips, "start_time")? {
        counts[dt.weekday().num_days_from_monday() as usize] += 1;
    }

    Ok(WEEKDAYS
        .iter()
        .zip(counts)
        .map(|(day, count)| RankedCount {
            label: weekday_name(*day).to_string(),
            count,
        })
        .collect())
}

/// Day with the most trips; the earliest day in the week wins ties.
pub fn busiest_weekday(by_weekday: &[RankedCount]) -> Result<String> {
    by_weekday
        .iter()
        .fold(None::<&RankedCount>, |best, day| match best {
            Some(b) if b.count >= day.count => Some(b),
            _ => Some(day),
        })
        .filter(|day| day.count > 0)
        .map(|day| day.label.clone())
        .ok_or_else(|| AnalyticsError::EmptyInput("no trips to bucket by weekday".to_string()))
}

/// Trip counts per `YYYY-MM`, oldest month first.
pub fn monthly_trend(trips: &DataFrame) -> Result<Vec<RankedCount>> {
    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    for dt in datetimes(trips, "start_time")? {
        *months.entry(dt.format("%Y-%m").to_string()).or_default() += 1;
    }
    Ok(months
        .into_iter()
        .map(|(label, count)| RankedCount { label, count })
        .collect())
}

// =============================================================================
// Analyzer
// =============================================================================

/// Computes every trip metric for a run.
pub struct TripAnalyzer<'a> {
    config: &'a AnalyticsConfig,
}

impl<'a> TripAnalyzer<'a> {
    pub fn new(config: &'a AnalyticsConfig) -> Self {
        Self { config }
    }

    /// Sum of fares under the configured schedule.
    pub fn estimated_revenue(&self, trips: &DataFrame) -> Result<f64> {
        let durations = f64_values(trips, "duration_minutes")?;
        let distances = f64_values(trips, "distance_km")?;
        let (durations, distances): (Vec<f64>, Vec<f64>) = durations
            .into_iter()
            .zip(distances)
            .filter_map(|(dur, dist)| Some((dur?, dist?)))
            .unzip();

        let fares = &self.config.fares;
        let total: f64 = calculate_fares(
            &durations,
            &distances,
            fares.per_minute,
            fares.per_km,
            fares.unlock_fee,
        )?
        .iter()
        .sum();
        Ok(round2(total))
    }

    /// Z-score mask over a numeric column under the configured threshold.
    ///
    /// Null cells are never flagged and do not enter the mean.
    pub fn zscore_outliers(&self, trips: &DataFrame, column: &str) -> Result<Vec<bool>> {
        let values = f64_values(trips, column)?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let mut flags = zscore_outlier_mask(&present, self.config.outliers.zscore_threshold).into_iter();

        Ok(values
            .iter()
            .map(|v| v.is_some() && flags.next().unwrap_or(false))
            .collect())
    }

    /// Trips whose distance the configured z-score threshold flags.
    pub fn distance_outliers(&self, trips: &DataFrame) -> Result<Vec<DistanceOutlier>> {
        let flags = self.zscore_outliers(trips, "distance_km")?;
        let ids = string_values(trips, "trip_id")?;
        let distances = f64_values(trips, "distance_km")?;

        Ok(flags
            .into_iter()
            .zip(ids.into_iter().zip(distances))
            .filter(|(flagged, _)| *flagged)
            .filter_map(|(_, (trip_id, distance))| {
                Some(DistanceOutlier {
                    trip_id: trip_id?,
                    distance_km: distance?,
                })
            })
            .collect())
    }

    /// Analyze the cleaned trips table, with the raw table for rates.
    pub fn analyze(&self, cleaned: &DataFrame, raw: &DataFrame) -> Result<TripAnalysis> {
        info!(
            "Analyzing {} cleaned trips ({} raw)...",
            cleaned.height(),
            raw.height()
        );
        let rankings = &self.config.rankings;

        let (trips_completed_rate, trips_cancelled_rate) = completion_rates(raw)?;
        let weekday_counts = trips_by_weekday(cleaned)?;
        let busiest = busiest_weekday(&weekday_counts)?;
        let durations = non_null_f64(cleaned, "duration_minutes")?;

        let analysis = TripAnalysis {
            total_trips: total_trips(cleaned),
            total_distance: total_distance(cleaned)?,
            average_duration: average_duration(cleaned)?,
            top_start_stations: top_stations(cleaned, "start_station_id", rankings.top_stations)?,
            top_end_stations: top_stations(cleaned, "end_station_id", rankings.top_stations)?,
            peak_usage_hours: peak_usage_hours(cleaned, rankings.peak_hours)?,
            average_distance_by_user_type: average_distance_by_user_type(cleaned)?,
            bike_utilization_rate: bike_utilization_rate(cleaned)
                .context("Computing bike utilization")?,
            active_users: most_active_users(cleaned, rankings.active_users)?,
            top_routes: top_routes(cleaned, rankings.routes)?,
            trips_completed_rate,
            trips_cancelled_rate,
            avg_trips_casual: avg_trips_per_user(raw, UserType::Casual)?,
            avg_trips_member: avg_trips_per_user(raw, UserType::Member)?,
            duration_outliers: duration_outliers(cleaned, self.config.outliers.iqr_multiplier)?,
            distance_outliers: self.distance_outliers(cleaned)?,
            duration_stats: duration_stats(&durations)?,
            trips_by_weekday: weekday_counts,
            busiest_weekday: busiest,
            monthly_trend: monthly_trend(cleaned)?,
            estimated_revenue: self.estimated_revenue(cleaned)?,
        };

        debug!(
            "Trip analysis: {} duration outliers, {} distance outliers, utilization {}%",
            analysis.duration_outliers.len(),
            analysis.distance_outliers.len(),
            analysis.bike_utilization_rate
        );
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn datetime_series(name: &str, values: &[&str]) -> Series {
        let millis: Vec<Option<i64>> = values
            .iter()
            .map(|v| {
                NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc().timestamp_millis())
            })
            .collect();
        Series::new(name.into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap()
    }

    /// 2024-01-01 is a Monday.
    fn cleaned_trips() -> DataFrame {
        let mut df = df![
            "trip_id" => ["T1", "T2", "T3", "T4", "T5"],
            "user_id" => ["U1", "U2", "U1", "U3", "U1"],
            "bike_id" => ["B1", "B2", "B1", "B2", "B1"],
            "start_station_id" => ["S1", "S2", "S1", "S3", "S2"],
            "end_station_id" => ["S2", "S1", "S2", "S1", "S3"],
            "distance_km" => [2.0, 4.0, 3.0, 1.0, 5.0],
            "duration_minutes" => [30.0, 60.0, 30.0, 60.0, 60.0],
            "user_type" => ["casual", "member", "casual", "member", "casual"],
            "status" => ["completed"; 5],
        ]
        .unwrap();
        df.with_column(datetime_series(
            "start_time",
            &[
                "2024-01-01 08:00:00",
                "2024-01-01 17:00:00",
                "2024-01-02 08:15:00",
                "2024-02-03 17:30:00",
                "2024-02-05 08:45:00",
            ],
        ))
        .unwrap();
        df.with_column(datetime_series(
            "end_time",
            &[
                "2024-01-01 08:30:00",
                "2024-01-01 18:00:00",
                "2024-01-02 08:45:00",
                "2024-02-03 18:30:00",
                "2024-02-05 09:45:00",
            ],
        ))
        .unwrap();
        df
    }

    fn raw_trips(statuses: &[&str]) -> DataFrame {
        let n = statuses.len();
        let users: Vec<String> = (0..n).map(|i| format!("U{}", i % 3)).collect();
        let types: Vec<&str> = (0..n)
            .map(|i| if i % 3 == 0 { "member" } else { "casual" })
            .collect();
        df![
            "user_id" => users,
            "user_type" => types,
            "status" => statuses.to_vec(),
        ]
        .unwrap()
    }

    #[test]
    fn test_totals() {
        let trips = cleaned_trips();
        assert_eq!(total_trips(&trips), 5);
        assert_eq!(total_distance(&trips).unwrap(), 15.0);
        assert_eq!(average_duration(&trips).unwrap(), 48.0);
    }

    #[test]
    fn test_top_stations_stable_ties() {
        let top = top_stations(&cleaned_trips(), "start_station_id", 10).unwrap();
        let labels: Vec<_> = top.iter().map(|r| (r.label.as_str(), r.count)).collect();
        assert_eq!(labels, vec![("S1", 2), ("S2", 2), ("S3", 1)]);

        let top1 = top_stations(&cleaned_trips(), "end_station_id", 1).unwrap();
        assert_eq!(top1.len(), 1);
        assert_eq!(top1[0].label, "S2");
    }

    #[test]
    fn test_peak_usage_hours() {
        let hours = peak_usage_hours(&cleaned_trips(), 10).unwrap();
        assert_eq!(
            hours,
            vec![HourCount { hour: 8, count: 3 }, HourCount { hour: 17, count: 2 }]
        );
    }

    #[test]
    fn test_average_distance_by_user_type() {
        let groups = average_distance_by_user_type(&cleaned_trips()).unwrap();
        assert_eq!(group_value(&groups, "user_type", "casual").unwrap(), 3.33);
        assert_eq!(group_value(&groups, "user_type", "member").unwrap(), 2.5);
    }

    #[test]
    fn test_average_distance_missing_group() {
        let trips = cleaned_trips().filter(&BooleanChunked::from_slice(
            "mask".into(),
            &[true, false, true, false, true],
        ))
        .unwrap();
        let err = average_distance_by_user_type(&trips).unwrap_err();
        assert!(matches!(err, AnalyticsError::MissingGroup { ref group, .. } if group == "member"));
    }

    #[test]
    fn test_bike_utilization_rate() {
        // 240 minutes over 2 bikes = 2 hours per bike
        assert_eq!(bike_utilization_rate(&cleaned_trips()).unwrap(), 8.33);
    }

    #[test]
    fn test_bike_utilization_empty() {
        let empty = cleaned_trips().clear();
        let err = bike_utilization_rate(&empty).unwrap_err();
        assert!(err.is_input_error());
        assert_eq!(err.error_code(), "EMPTY_INPUT");
    }

    #[test]
    fn test_active_users_and_routes() {
        let trips = cleaned_trips();
        let users = most_active_users(&trips, 15).unwrap();
        assert_eq!(users[0], RankedCount { label: "U1".into(), count: 3 });

        let routes = top_routes(&trips, 10).unwrap();
        assert_eq!(
            routes[0],
            RouteCount {
                start_station_id: "S1".into(),
                end_station_id: "S2".into(),
                count: 2,
            }
        );
        assert_eq!(routes.len(), 4);
    }

    #[test]
    fn test_completion_rates() {
        let mut statuses = vec!["completed"; 7];
        statuses.extend(["cancelled", "cancelled", "pending"]);
        let (completed, cancelled) = completion_rates(&raw_trips(&statuses)).unwrap();
        assert_eq!(completed, 70.0);
        assert_eq!(cancelled, 20.0);
    }

    #[test]
    fn test_avg_trips_per_user() {
        // rows 0,3,6 are member U0; the other six are casual U1/U2
        let raw = raw_trips(&["completed"; 9]);
        assert_eq!(avg_trips_per_user(&raw, UserType::Member).unwrap(), 3.0);
        assert_eq!(avg_trips_per_user(&raw, UserType::Casual).unwrap(), 3.0);

        let only_members = raw_trips(&["completed"]);
        assert!(avg_trips_per_user(&only_members, UserType::Casual).is_err());
    }

    #[test]
    fn test_weekday_and_month() {
        let trips = cleaned_trips();
        let by_day = trips_by_weekday(&trips).unwrap();
        assert_eq!(by_day.len(), 7);
        assert_eq!(by_day[0], RankedCount { label: "Monday".into(), count: 3 });
        assert_eq!(by_day[5], RankedCount { label: "Saturday".into(), count: 1 });
        assert_eq!(busiest_weekday(&by_day).unwrap(), "Monday");

        let months = monthly_trend(&trips).unwrap();
        assert_eq!(
            months,
            vec![
                RankedCount { label: "2024-01".into(), count: 3 },
                RankedCount { label: "2024-02".into(), count: 2 },
            ]
        );
    }

    #[test]
    fn test_busiest_weekday_empty() {
        let by_day = trips_by_weekday(&cleaned_trips().clear()).unwrap();
        assert!(busiest_weekday(&by_day).is_err());
    }

    #[test]
    fn test_zscore_outliers_skip_nulls() {
        let config = AnalyticsConfig::builder().zscore_threshold(2.5).build().unwrap();
        let mut distances: Vec<Option<f64>> = vec![Some(1.0); 7];
        distances.insert(3, None);
        distances.push(Some(100.0));
        let df = df!["distance_km" => distances].unwrap();

        let mask = TripAnalyzer::new(&config)
            .zscore_outliers(&df, "distance_km")
            .unwrap();
        assert_eq!(mask.len(), 9);
        assert_eq!(mask.iter().filter(|m| **m).count(), 1);
        assert!(mask[8]);
        assert!(!mask[3]);
    }

    #[test]
    fn test_distance_outliers() {
        // mean 3, std sqrt(2): the 1.0 and 5.0 trips sit at |z| ~ 1.41
        let config = AnalyticsConfig::builder().zscore_threshold(1.2).build().unwrap();
        let outliers = TripAnalyzer::new(&config)
            .distance_outliers(&cleaned_trips())
            .unwrap();
        assert_eq!(
            outliers,
            vec![
                DistanceOutlier { trip_id: "T4".into(), distance_km: 1.0 },
                DistanceOutlier { trip_id: "T5".into(), distance_km: 5.0 },
            ]
        );
    }

    #[test]
    fn test_analyze() {
        let config = AnalyticsConfig::default();
        let mut statuses = vec!["completed"; 8];
        statuses.push("cancelled");
        let raw = raw_trips(&statuses);

        let analysis = TripAnalyzer::new(&config)
            .analyze(&cleaned_trips(), &raw)
            .unwrap();

        assert_eq!(analysis.total_trips, 5);
        assert_eq!(analysis.trips_completed_rate, 88.89);
        assert_eq!(analysis.trips_cancelled_rate, 11.11);
        assert!(analysis.duration_outliers.is_empty());
        // five values cap |z| at 2
        assert!(analysis.distance_outliers.is_empty());
        assert_eq!(analysis.duration_stats.median, 60.0);
        // 5 * 1.0 + 0.15 * 240 + 0.10 * 15
        assert_eq!(analysis.estimated_revenue, 42.5);
    }
}
