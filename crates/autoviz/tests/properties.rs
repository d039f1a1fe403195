// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use autoviz::chart_selector::ChartSelector;
use autoviz::cleaner::Cleaner;
use autoviz::config::PipelineConfig;
use autoviz::profiler::{correlate, ColumnType, Profiler};
use autoviz::table::RawTable;
use proptest::prelude::*;
use std::collections::HashSet;

fn cell() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        2 => Just(None),
        4 => (0i32..200).prop_map(|n| Some(n.to_string())),
        2 => prop::sample::select(vec!["red", "green", "blue"]).prop_map(|s| Some(s.to_string())),
        1 => (0u32..1000).prop_map(|n| Some(format!("{}.{}", n / 10, n % 10))),
    ]
}

fn raw_table() -> impl Strategy<Value = RawTable> {
    (1usize..5, 0usize..40, 0usize..6).prop_flat_map(|(columns, rows, repeats)| {
        (
            prop::collection::vec(prop::collection::vec(cell(), columns), rows),
            prop::collection::vec(cell(), columns),
        )
            .prop_map(move |(mut rows, repeated)| {
                rows.extend(std::iter::repeat(repeated).take(repeats));
                RawTable::new((0..columns).map(|i| format!("col{i}")).collect(), rows)
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_profile_after_clean_is_deterministic(table in raw_table()) {
        let config = PipelineConfig::default();
        let profiler = Profiler::new(&config).unwrap();
        let cleaner = Cleaner::new(&config);

        let run = || {
            let profiles = profiler.profile(&table);
            let (clean, log) = cleaner.clean(&table, &profiles).unwrap();
            (profiler.profile_pinned(&clean, &profiles), log)
        };
        let (first_profiles, first_log) = run();
        let (second_profiles, second_log) = run();
        prop_assert_eq!(first_profiles, second_profiles);
        prop_assert_eq!(first_log, second_log);
    }

    #[test]
    fn test_no_nulls_left_in_numeric_or_categorical_columns(table in raw_table()) {
        let config = PipelineConfig::default();
        let profiler = Profiler::new(&config).unwrap();
        let profiles = profiler.profile(&table);
        let (clean, _) = Cleaner::new(&config).clean(&table, &profiles).unwrap();

        for profile in profiler
            .profile_pinned(&clean, &profiles)
            .iter()
            .filter(|p| matches!(p.inferred_type, ColumnType::Numeric | ColumnType::Categorical))
        {
            prop_assert_eq!(profile.null_count, 0, "nulls left in {}", profile.name);
            prop_assert_eq!(profile.unparseable_count, 0, "bad tokens left in {}", profile.name);
        }
    }

    #[test]
    fn test_chart_selection_is_bounded_and_unique(table in raw_table(), max_charts in 1usize..8) {
        let config = PipelineConfig { max_charts, ..Default::default() };
        let profiles = Profiler::new(&config).unwrap().profile(&table);
        let correlations = correlate(&table, &profiles);
        let charts = ChartSelector::new(&config).select(&profiles, &correlations);

        prop_assert!(charts.len() <= max_charts);
        let mut seen = HashSet::new();
        for chart in &charts {
            prop_assert!(seen.insert((chart.kind, chart.columns.clone())));
        }
        for pair in charts.windows(2) {
            prop_assert!(pair[0].priority >= pair[1].priority);
        }
    }
}
