mod common;

use booking_features::prelude::*;
use polars::prelude::*;

use crate::common::{CORRUPT_FIXTURE, GOOD_FIXTURE, config_dir, floats, raw_fixture, setup_config};

#[test]
fn repository_configuration_loads() {
    let loader = ConfigLoader::new(config_dir());
    let cfg = loader.bundle().expect("Failed to load configuration");

    assert_eq!(cfg.rename_map.len(), 30);
    // 30 base columns + 8 competitor slots with 3 columns each.
    assert_eq!(cfg.schema.len(), 54);
    assert_eq!(cfg.table_styles.style_rules.len(), 4);
    assert!(cfg.pipeline.filter_outliers);
    assert!(loader.cached_documents() > 0);

    // Second load is served from the cache.
    let again = loader.bundle().expect("Failed to reload configuration");
    assert_eq!(again, cfg);
}

#[test]
fn standardization_isolates_corrupt_files() {
    let cfg = setup_config();
    let out = tempfile::tempdir().expect("Failed to create tempdir");
    let inputs = vec![raw_fixture(GOOD_FIXTURE), raw_fixture(CORRUPT_FIXTURE)];

    let report = Standardizer::from_config(&cfg)
        .standardize_files(&inputs, out.path(), false)
        .expect("Batch should not fail as a whole");

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].file.ends_with(CORRUPT_FIXTURE));
    // The raw hotel id column holds a non-numeric value.
    assert!(
        report.failed[0].error.contains("'prop_id' to int32"),
        "{}",
        report.failed[0].error
    );
    assert!(!out.path().join("searches_corrupt.parquet").exists());

    let written = &report.succeeded[0];
    assert_eq!(written.rows, 12);
    let df = read_parquet(&written.output).expect("Failed to read standardized file");

    for name in ["search_id", "hotel_id", "display_price", "was_booked", "comp8_rate"] {
        assert!(df.column(name).is_ok(), "missing canonical column {name}");
    }
    assert!(df.column("prop_id").is_err());
    assert_eq!(
        df.column("hotel_id").expect("hotel_id").dtype(),
        &DataType::Int32
    );
    assert!(matches!(
        df.column("search_timestamp").expect("timestamp").dtype(),
        DataType::Datetime(_, _)
    ));
    // Slots absent from the export are backfilled with typed zeros.
    let comp8 = df.column("comp8_rate").expect("comp8_rate");
    assert_eq!(comp8.dtype(), &DataType::Int8);
    assert_eq!(comp8.null_count(), 0);
    assert_eq!(floats(&df, "comp8_rate"), vec![Some(0.0); 12]);
}

#[test]
fn feature_pipeline_end_to_end() {
    let cfg = setup_config();
    let interim = tempfile::tempdir().expect("Failed to create tempdir");
    let processed = tempfile::tempdir().expect("Failed to create tempdir");

    let standardized = Standardizer::from_config(&cfg)
        .standardize_file(&raw_fixture(GOOD_FIXTURE), interim.path())
        .expect("Failed to standardize fixture");

    let pipeline = FeaturePipeline::new(cfg.pipeline.clone()).expect("Invalid pipeline config");
    let report = pipeline
        .process_files(&[standardized.output.clone()], processed.path())
        .expect("Batch should not fail as a whole");

    assert!(report.is_clean());
    let output = &report.succeeded[0].output;
    assert!(output.ends_with("searches_2013_features.parquet"));

    let df = read_parquet(output).expect("Failed to read feature matrix");
    assert_eq!(df.height(), 12);
    for feature in [
        FeatureCol::IsHolidaySearch,
        FeatureCol::ClickProb,
        FeatureCol::NumCompCheaper,
        FeatureCol::RollingPriceMean,
        FeatureCol::ClickEntropyPriceTier,
    ] {
        assert!(
            df.column(feature.as_str()).is_ok(),
            "missing feature {}",
            feature.as_str()
        );
    }

    // Search 3 ran on Independence Day.
    let holiday = floats(&df, FeatureCol::IsHolidaySearch.as_str());
    assert_eq!(&holiday[..8], &[Some(0.0); 8]);
    assert_eq!(&holiday[8..], &[Some(1.0); 4]);

    // The 9999 price of hotel 104 is far outside the price distribution.
    let price = floats(&df, "display_price");
    assert_eq!(price[7], None);
    let kept = price[1].expect("regular price is kept");
    assert!((kept - 170.74).abs() < 1e-4);

    // Hotel 101 was clicked once in the mid tier and once in the budget tier.
    let entropy = floats(&df, FeatureCol::ClickEntropyPriceTier.as_str());
    let hotel101 = entropy[0].expect("hotel 101 has clicks");
    assert!((hotel101 - 1.0).abs() < 1e-6);
    // Hotel 103 only clicked a budget offer.
    assert_eq!(entropy[10], Some(0.0));

    let click_prob = floats(&df, FeatureCol::ClickProb.as_str());
    let hotel101 = click_prob[0].expect("click probability");
    assert!((hotel101 - 2.0 / 3.0).abs() < 1e-4);
}

#[test]
fn artifacts_round_trip_through_the_store() {
    let cfg = setup_config();
    let work = tempfile::tempdir().expect("Failed to create tempdir");

    let standardized = Standardizer::from_config(&cfg)
        .standardize_file(&raw_fixture(GOOD_FIXTURE), work.path())
        .expect("Failed to standardize fixture");
    let pipeline = FeaturePipeline::new(cfg.pipeline.clone().with_progress(false))
        .expect("Invalid pipeline config");
    let matrix = pipeline
        .run(read_parquet(&standardized.output).expect("read").lazy())
        .expect("Failed to build features");

    let viz = work.path().join("viz");
    let report = ArtifactWriter::new(&viz)
        .with_sample_size(5)
        .write(&matrix.data)
        .expect("Failed to write artifacts");
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert!(report.summary_rows > 0);

    let store = ArtifactStore::new(&viz);
    let features = store.features().expect("Failed to list artifacts");
    assert_eq!(features.len(), report.written.len());
    assert!(features.iter().any(|f| f == "display_price"));
    assert!(features.is_sorted());

    // A continuous feature gets a histogram, a binary one a bar plot.
    assert!(store.histogram("display_price").is_some());
    assert!(store.barplot(FeatureCol::IsHolidaySearch.as_str()).is_some());

    let summary = store.summary().expect("summary table");
    assert_eq!(summary.as_df().height(), report.summary_rows);
    let json = store
        .summary_json()
        .expect("Failed to render summary")
        .expect("summary present");
    assert!(json.is_array());
}
