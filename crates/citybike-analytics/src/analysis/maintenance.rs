//! Maintenance cost and frequency metrics.

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{AnalyticsError, Result};
use crate::types::{GroupValue, MaintenanceAnalysis, RankedCount};
use crate::utils::{f64_values, rank_by_count, round2, string_values, top_n};

/// Total cost per bike type, in first-seen group order.
pub fn cost_by_bike_type(maintenance: &DataFrame) -> Result<Vec<GroupValue>> {
    let types = string_values(maintenance, "bike_type")?;
    let costs = f64_values(maintenance, "cost")?;

    let mut groups: Vec<GroupValue> = Vec::new();
    for (bike_type, cost) in types.into_iter().zip(costs) {
        let (Some(bike_type), Some(cost)) = (bike_type, cost) else {
            continue;
        };
        match groups.iter_mut().find(|g| g.group == bike_type) {
            Some(group) => group.value += cost,
            None => groups.push(GroupValue {
                group: bike_type,
                value: cost,
            }),
        }
    }

    for group in &mut groups {
        group.value = round2(group.value);
    }
    Ok(groups)
}

/// Record count per maintenance type, most frequent first.
pub fn frequency_by_type(maintenance: &DataFrame) -> Result<Vec<RankedCount>> {
    let types = string_values(maintenance, "maintenance_type")?;
    Ok(rank_by_count(types.into_iter().flatten())
        .into_iter()
        .map(|(label, count)| RankedCount { label, count })
        .collect())
}

/// Bikes with the most maintenance records.
pub fn most_serviced_bikes(maintenance: &DataFrame, n: usize) -> Result<Vec<RankedCount>> {
    let bikes = string_values(maintenance, "bike_id")?;
    Ok(top_n(rank_by_count(bikes.into_iter().flatten()), n)
        .into_iter()
        .map(|(label, count)| RankedCount { label, count })
        .collect())
}

/// Computes maintenance aggregates.
pub struct MaintenanceAnalyzer {
    serviced_bikes: usize,
}

impl MaintenanceAnalyzer {
    pub fn new(serviced_bikes: usize) -> Self {
        Self { serviced_bikes }
    }

    pub fn analyze(&self, maintenance: &DataFrame) -> Result<MaintenanceAnalysis> {
        info!("Analyzing {} maintenance records...", maintenance.height());

        let frequency = frequency_by_type(maintenance)?;
        let most_frequent_type = frequency
            .first()
            .map(|r| r.label.clone())
            .ok_or_else(|| {
                AnalyticsError::EmptyInput("no maintenance records to rank".to_string())
            })?;

        let analysis = MaintenanceAnalysis {
            cost_by_bike_type: cost_by_bike_type(maintenance)?,
            frequency_by_type: frequency,
            most_frequent_type,
            most_serviced_bikes: most_serviced_bikes(maintenance, self.serviced_bikes)?,
        };

        // both bike types are reported
        let classic = analysis.classic_cost()?;
        let electric = analysis.electric_cost()?;
        debug!("Maintenance cost: classic {}, electric {}", classic, electric);

        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn records() -> DataFrame {
        df![
            "record_id" => ["M1", "M2", "M3", "M4", "M5"],
            "bike_id" => ["B1", "B2", "B1", "B3", "B1"],
            "maintenance_type" => ["tire", "brake", "brake", "tire", "brake"],
            "cost" => [10.004, 40.0, 35.5, 12.0, 20.0],
            "bike_type" => ["classic", "electric", "classic", "classic", "classic"],
        ]
        .unwrap()
    }

    #[test]
    fn test_cost_by_bike_type() {
        let groups = cost_by_bike_type(&records()).unwrap();
        assert_eq!(
            groups,
            vec![
                GroupValue { group: "classic".into(), value: 77.5 },
                GroupValue { group: "electric".into(), value: 40.0 },
            ]
        );
    }

    #[test]
    fn test_cost_requires_bike_type_column() {
        let df = records().drop("bike_type").unwrap();
        let err = cost_by_bike_type(&df).unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_frequency_and_most_frequent() {
        let analysis = MaintenanceAnalyzer::new(2).analyze(&records()).unwrap();
        assert_eq!(
            analysis.frequency_by_type,
            vec![
                RankedCount { label: "brake".into(), count: 3 },
                RankedCount { label: "tire".into(), count: 2 },
            ]
        );
        assert_eq!(analysis.most_frequent_type, "brake");
        assert_eq!(analysis.most_serviced_bikes[0], RankedCount { label: "B1".into(), count: 3 });
        assert_eq!(analysis.most_serviced_bikes.len(), 2);
        assert_eq!(analysis.classic_cost().unwrap(), 77.5);
    }

    #[test]
    fn test_missing_electric_group() {
        let df = records()
            .filter(&BooleanChunked::from_slice(
                "mask".into(),
                &[true, false, true, true, true],
            ))
            .unwrap();
        let err = MaintenanceAnalyzer::new(10).analyze(&df).unwrap_err();
        assert!(err.is_input_error());
        assert!(matches!(
            err,
            AnalyticsError::MissingGroup { ref group, .. } if group == "electric"
        ));
    }

    #[test]
    fn test_empty_maintenance() {
        let err = MaintenanceAnalyzer::new(10)
            .analyze(&records().clear())
            .unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_INPUT");
    }
}
