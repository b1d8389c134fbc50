use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, ResultExt};
use crate::types::{AggregateResults, BikeType, RankedCount, group_value, keys};

pub const TEXT_REPORT_FILE: &str = "summary_report.txt";
pub const TOP_STATIONS_FILE: &str = "top_stations.csv";
pub const TOP_USERS_FILE: &str = "top_users.csv";
pub const JSON_REPORT_FILE: &str = "analysis_report.json";

const RULE_WIDTH: usize = 60;

// ============================================================================
// JSON companion
// ============================================================================

/// Machine-readable companion of the text report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    /// Whether cleaned tables came from the cache
    pub cache_hit: bool,
    /// Cleaning actions performed in this run
    pub cleaning_actions: Vec<String>,
    pub metrics: AggregateResults,
}

// ============================================================================
// Text rendering
// ============================================================================

struct TextReport {
    lines: Vec<String>,
}

impl TextReport {
    fn new(title: &str) -> Self {
        Self {
            lines: vec![title.to_string(), "=".repeat(RULE_WIDTH)],
        }
    }

    fn section(&mut self, heading: &str) {
        self.lines.push(String::new());
        self.lines.push(heading.to_string());
        self.lines.push("-".repeat(heading.len()));
    }

    fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    fn ranking(&mut self, entries: &[RankedCount], unit: &str) {
        if entries.is_empty() {
            self.line("  (none)");
        }
        for (idx, entry) in entries.iter().enumerate() {
            self.line(format!("  {:>2}. {:<16} {} {}", idx + 1, entry.label, entry.count, unit));
        }
    }

    fn finish(mut self) -> String {
        self.lines.push(String::new());
        self.lines.join("\n")
    }
}

/// Renders and writes reports into an output directory.
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render the full text report. Every section is required.
    pub fn render_text(&self, results: &AggregateResults) -> Result<String> {
        let mut report = TextReport::new("CityBike Analytics Report");

        report.section("Totals");
        report.line(format!("Total trips: {}", results.count(keys::TOTAL_TRIPS)?));
        report.line(format!(
            "Total distance: {:.2} km",
            results.number(keys::TOTAL_DISTANCE)?
        ));
        report.line(format!(
            "Average duration: {:.2} min",
            results.number(keys::AVERAGE_DURATION)?
        ));

        report.section("Top Start Stations");
        report.ranking(results.ranking(keys::TOP_START_STATIONS)?, "trips");
        report.section("Top End Stations");
        report.ranking(results.ranking(keys::TOP_END_STATIONS)?, "trips");

        report.section("Peak Usage Hours");
        for hour in results.hours(keys::PEAK_USAGE_HOURS)? {
            report.line(format!("  {:02}:00  {} trips", hour.hour, hour.count));
        }

        report.section("Average Distance by User Type");
        for group in results.groups(keys::AVERAGE_DISTANCE_BY_USER_TYPE)? {
            report.line(format!("  {:<8} {:.2} km", group.group, group.value));
        }

        report.section("Bike Utilization");
        report.line(format!(
            "Utilization rate: {:.2}%",
            results.number(keys::BIKE_UTILIZATION_RATE)?
        ));

        report.section("Most Active Users");
        report.ranking(results.ranking(keys::ACTIVE_USERS)?, "trips");

        report.section("Top Routes");
        for (idx, route) in results.routes(keys::TOP_ROUTES)?.iter().enumerate() {
            report.line(format!(
                "  {:>2}. {} -> {}  {} trips",
                idx + 1,
                route.start_station_id,
                route.end_station_id,
                route.count
            ));
        }

        report.section("Completion Rates");
        report.line(format!(
            "Completed: {:.2}%",
            results.number(keys::TRIPS_COMPLETED_RATE)?
        ));
        report.line(format!(
            "Cancelled: {:.2}%",
            results.number(keys::TRIPS_CANCELLED_RATE)?
        ));

        report.section("Trips per User");
        report.line(format!(
            "Casual: {:.2}",
            results.number(keys::AVG_TRIPS_CASUAL)?
        ));
        report.line(format!(
            "Member: {:.2}",
            results.number(keys::AVG_TRIPS_MEMBER)?
        ));

        report.section("Duration Outliers (IQR)");
        let outliers = results.outliers(keys::OUTLIERS_DURATION)?;
        report.line(format!("{} outlier trip(s)", outliers.len()));
        for trip in outliers {
            report.line(format!("  {:<10} {:.2} min", trip.trip_id, trip.duration_minutes));
        }

        report.section("Distance Outliers (z-score)");
        let distance_outliers = results.distance_outliers(keys::OUTLIERS_DISTANCE)?;
        report.line(format!("{} outlier trip(s)", distance_outliers.len()));
        for trip in distance_outliers {
            report.line(format!("  {:<10} {:.2} km", trip.trip_id, trip.distance_km));
        }

        report.section("Duration Statistics");
        let stats = results.summary(keys::DURATION_STATISTICS)?;
        report.line(format!("Mean: {:.2}  Median: {:.2}  Std: {:.2}", stats.mean, stats.median, stats.std));
        report.line(format!("P25: {:.2}  P75: {:.2}  P90: {:.2}", stats.p25, stats.p75, stats.p90));

        report.section("Trips by Weekday");
        report.ranking(results.ranking(keys::TRIPS_BY_WEEKDAY)?, "trips");
        report.line(format!(
            "Busiest weekday: {}",
            results.label(keys::BUSIEST_WEEKDAY)?
        ));

        report.section("Monthly Trip Trend");
        report.ranking(results.ranking(keys::MONTHLY_TRIP_TREND)?, "trips");

        report.section("Revenue");
        report.line(format!(
            "Estimated revenue: {:.2}",
            results.number(keys::ESTIMATED_REVENUE)?
        ));

        report.section("Maintenance");
        let costs = results.groups(keys::MAINTENANCE_COST_BY_BIKE_TYPE)?;
        for bike_type in [BikeType::Classic, BikeType::Electric] {
            let cost = group_value(costs, "bike_type", bike_type.as_str())?;
            report.line(format!("  {:<8} cost {:.2}", bike_type.as_str(), cost));
        }
        report.line("Frequency by type:");
        report.ranking(results.ranking(keys::MAINTENANCE_FREQUENCY)?, "records");
        report.line(format!(
            "Most frequent type: {}",
            results.label(keys::MOST_FREQUENT_MAINTENANCE)?
        ));
        report.line("Most serviced bikes:");
        report.ranking(results.ranking(keys::MOST_SERVICED_BIKES)?, "records");

        report.section("Station Distances");
        for (name, key) in [
            ("Closest", keys::CLOSEST_STATIONS),
            ("Farthest", keys::FARTHEST_STATIONS),
        ] {
            let pair = results.pair(key)?;
            report.line(format!(
                "{}: {} <-> {} ({:.4})",
                name, pair.from_station_id, pair.to_station_id, pair.distance
            ));
        }

        Ok(report.finish())
    }

    /// Top start and end stations side by side, padded to equal length.
    pub fn top_stations_frame(&self, results: &AggregateResults) -> Result<DataFrame> {
        let starts = results.ranking(keys::TOP_START_STATIONS)?;
        let ends = results.ranking(keys::TOP_END_STATIONS)?;
        let rows = starts.len().max(ends.len());

        let column = |entries: &[RankedCount]| -> (Vec<Option<String>>, Vec<Option<u64>>) {
            (0..rows)
                .map(|idx| match entries.get(idx) {
                    Some(e) => (Some(e.label.clone()), Some(e.count as u64)),
                    None => (None, None),
                })
                .unzip()
        };
        let (start_ids, start_counts) = column(starts);
        let (end_ids, end_counts) = column(ends);
        let ranks: Vec<u32> = (1..=rows as u32).collect();

        Ok(df![
            "rank" => ranks,
            "start_station_id" => start_ids,
            "start_trips" => start_counts,
            "end_station_id" => end_ids,
            "end_trips" => end_counts,
        ]?)
    }

    pub fn top_users_frame(&self, results: &AggregateResults) -> Result<DataFrame> {
        let users = results.ranking(keys::ACTIVE_USERS)?;
        let ranks: Vec<u32> = (1..=users.len() as u32).collect();
        let ids: Vec<String> = users.iter().map(|u| u.label.clone()).collect();
        let counts: Vec<u64> = users.iter().map(|u| u.count as u64).collect();

        Ok(df![
            "rank" => ranks,
            "user_id" => ids,
            "trip_count" => counts,
        ]?)
    }

    /// Write an already rendered text report, both CSV exports and the
    /// JSON companion. Exports are built before any file is written.
    /// Returns the written paths.
    pub fn write_all(
        &self,
        text: &str,
        results: &AggregateResults,
        cache_hit: bool,
        cleaning_actions: &[String],
    ) -> Result<Vec<PathBuf>> {
        let mut stations = self.top_stations_frame(results)?;
        let mut users = self.top_users_frame(results)?;
        let companion = AnalysisReport {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            cache_hit,
            cleaning_actions: cleaning_actions.to_vec(),
            metrics: results.clone(),
        };

        fs::create_dir_all(&self.output_dir)
            .context(format!("Failed to create {}", self.output_dir.display()))?;

        let text_path = self.output_dir.join(TEXT_REPORT_FILE);
        File::create(&text_path)?.write_all(text.as_bytes())?;
        info!("Report saved: {}", text_path.display());

        let stations_path = self.output_dir.join(TOP_STATIONS_FILE);
        self.write_csv(&mut stations, &stations_path)?;
        let users_path = self.output_dir.join(TOP_USERS_FILE);
        self.write_csv(&mut users, &users_path)?;

        let json_path = self.output_dir.join(JSON_REPORT_FILE);
        File::create(&json_path)?.write_all(serde_json::to_string_pretty(&companion)?.as_bytes())?;
        info!("Report saved: {}", json_path.display());

        Ok(vec![text_path, stations_path, users_path, json_path])
    }

    fn write_csv(&self, df: &mut DataFrame, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .finish(df)
            .context(format!("Failed to write {}", path.display()))?;
        info!("Export saved: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        DistanceOutlier, DurationStats, GroupValue, HourCount, MaintenanceAnalysis, OutlierTrip, RouteCount,
        StationDistanceSummary, StationPair, TripAnalysis,
    };
    use pretty_assertions::assert_eq;

    fn ranked(items: &[(&str, usize)]) -> Vec<RankedCount> {
        items
            .iter()
            .map(|(label, count)| RankedCount {
                label: label.to_string(),
                count: *count,
            })
            .collect()
    }

    fn full_results() -> AggregateResults {
        let trips = TripAnalysis {
            total_trips: 4,
            total_distance: 12.5,
            average_duration: 22.5,
            top_start_stations: ranked(&[("S1", 3), ("S2", 1)]),
            top_end_stations: ranked(&[("S2", 4)]),
            peak_usage_hours: vec![HourCount { hour: 8, count: 3 }],
            average_distance_by_user_type: vec![
                GroupValue { group: "casual".into(), value: 2.0 },
                GroupValue { group: "member".into(), value: 3.5 },
            ],
            bike_utilization_rate: 12.5,
            active_users: ranked(&[("U1", 3), ("U2", 1)]),
            top_routes: vec![RouteCount {
                start_station_id: "S1".into(),
                end_station_id: "S2".into(),
                count: 3,
            }],
            trips_completed_rate: 70.0,
            trips_cancelled_rate: 20.0,
            avg_trips_casual: 1.5,
            avg_trips_member: 2.0,
            duration_outliers: vec![OutlierTrip {
                trip_id: "T9".into(),
                duration_minutes: 300.0,
            }],
            distance_outliers: vec![DistanceOutlier {
                trip_id: "T7".into(),
                distance_km: 42.0,
            }],
            duration_stats: DurationStats {
                mean: 22.5,
                median: 20.0,
                std: 5.0,
                p25: 18.0,
                p75: 25.0,
                p90: 30.0,
            },
            trips_by_weekday: ranked(&[("Monday", 4)]),
            busiest_weekday: "Monday".into(),
            monthly_trend: ranked(&[("2024-01", 4)]),
            estimated_revenue: 19.75,
        };
        let maintenance = MaintenanceAnalysis {
            cost_by_bike_type: vec![
                GroupValue { group: "classic".into(), value: 50.0 },
                GroupValue { group: "electric".into(), value: 80.0 },
            ],
            frequency_by_type: ranked(&[("brake", 2)]),
            most_frequent_type: "brake".into(),
            most_serviced_bikes: ranked(&[("B1", 2)]),
        };
        let stations = StationDistanceSummary {
            station_count: 2,
            closest: StationPair {
                from_station_id: "S1".into(),
                to_station_id: "S2".into(),
                distance: 0.1414,
            },
            farthest: StationPair {
                from_station_id: "S1".into(),
                to_station_id: "S2".into(),
                distance: 0.1414,
            },
        };

        AggregateResults::new()
            .merge(trips)
            .merge(maintenance)
            .merge(stations)
    }

    #[test]
    fn test_render_text_sections_in_order() {
        let text = ReportGenerator::new("unused").render_text(&full_results()).unwrap();

        let headings = [
            "Totals",
            "Top Start Stations",
            "Peak Usage Hours",
            "Average Distance by User Type",
            "Bike Utilization",
            "Most Active Users",
            "Top Routes",
            "Completion Rates",
            "Trips per User",
            "Duration Outliers (IQR)",
            "Distance Outliers (z-score)",
            "Duration Statistics",
            "Maintenance",
            "Station Distances",
        ];
        let positions: Vec<usize> = headings
            .iter()
            .map(|h| text.find(&format!("\n{}\n", h)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        assert!(text.contains("Completed: 70.00%"));
        assert!(text.contains("Utilization rate: 12.50%"));
        assert!(text.contains("S1 -> S2  3 trips"));
        assert!(text.contains("T9"));
        assert!(text.contains("T7         42.00 km"));
        assert!(text.contains("classic  cost 50.00"));
        assert!(text.contains("electric cost 80.00"));
    }

    #[test]
    fn test_render_requires_both_bike_types() {
        let mut results = full_results();
        results.insert(
            keys::MAINTENANCE_COST_BY_BIKE_TYPE,
            crate::types::MetricValue::Groups(vec![GroupValue {
                group: "classic".into(),
                value: 50.0,
            }]),
        );
        let err = ReportGenerator::new("unused").render_text(&results).unwrap_err();
        assert_eq!(err.error_code(), "MISSING_GROUP");
        assert!(err.to_string().contains("electric"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let generator = ReportGenerator::new("unused");
        let results = full_results();
        assert_eq!(
            generator.render_text(&results).unwrap(),
            generator.render_text(&results).unwrap()
        );
    }

    #[test]
    fn test_missing_metric_names_key() {
        let mut partial = AggregateResults::new();
        partial.insert(keys::TOTAL_TRIPS, crate::types::MetricValue::Count(1));
        let err = ReportGenerator::new("unused").render_text(&partial).unwrap_err();
        assert!(err.is_missing_metric());
        assert!(err.to_string().contains(keys::TOTAL_DISTANCE));
    }

    #[test]
    fn test_top_stations_frame_padded() {
        let df = ReportGenerator::new("unused")
            .top_stations_frame(&full_results())
            .unwrap();
        assert_eq!(df.shape(), (2, 5));
        assert_eq!(df.column("end_station_id").unwrap().null_count(), 1);
    }

    #[test]
    fn test_write_all() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(dir.path().join("output"));
        let text = generator.render_text(&full_results()).unwrap();

        let written = generator
            .write_all(
                &text,
                &full_results(),
                false,
                &["trips: drop duplicate rows removed 1 rows (10.0%)".into()],
            )
            .unwrap();
        assert_eq!(written.len(), 4);
        assert!(written.iter().all(|p| p.is_file()));

        let users = std::fs::read_to_string(dir.path().join("output").join(TOP_USERS_FILE)).unwrap();
        assert_eq!(users.lines().next(), Some("rank,user_id,trip_count"));
        assert_eq!(users.lines().nth(1), Some("1,U1,3"));

        let saved = std::fs::read_to_string(dir.path().join("output").join(TEXT_REPORT_FILE)).unwrap();
        assert_eq!(saved, text);

        let json = std::fs::read_to_string(dir.path().join("output").join(JSON_REPORT_FILE)).unwrap();
        let parsed: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.metrics, full_results());
        assert!(!parsed.cache_hit);
    }

    #[test]
    fn test_write_all_writes_nothing_on_missing_metric() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        let generator = ReportGenerator::new(&output);

        assert!(generator.write_all("", &AggregateResults::new(), true, &[]).is_err());
        assert!(!output.exists());
    }
}
