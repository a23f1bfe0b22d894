pub mod labels;
pub mod layout;

use std::collections::BTreeMap;

use crate::{
    config::PipelineConfig,
    data::{domain::CustomerId, record::Record, registry::FeatureRegistry},
    error::{ChurnResult, DataError, SystemError},
    pipeline::{
        labels::{LabelVector, index_labels, label_value},
        layout::FeatureLayout,
    },
    transform::{
        categorical,
        date::DateNormalizer,
        one_hot,
        timeseries::{SeriesReport, Summarized, TimeSeriesSummarizer},
        vectorize::{FeatureMatrix, Vectorizer},
    },
};

/// Data rows with derived series features, the registry describing them, and
/// the per-customer summarization outcomes.
#[derive(Debug, Clone)]
pub struct PreparedRows {
    pub rows: Vec<Record>,
    pub registry: FeatureRegistry,
    pub report: SeriesReport,
}

/// Labelled training data. Row `i` of `features`, `labels` and `ids` describe the same customer.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub ids: Vec<CustomerId>,
    pub features: FeatureMatrix,
    pub labels: LabelVector,
    pub layout: FeatureLayout,
}

/// Unlabelled data built against a training [`FeatureLayout`], rows in input order.
#[derive(Debug, Clone)]
pub struct InferenceSet {
    pub ids: Vec<CustomerId>,
    pub features: FeatureMatrix,
}

/// Sequences the transformation stages for training and inference.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalizes dates, then attaches the series summaries of `historical`.
    #[tracing::instrument(
        skip(self, data_rows, historical, registry),
        fields(rows = data_rows.len(), history = historical.len())
    )]
    pub fn prepare(
        &self,
        data_rows: &[Record],
        historical: &[Record],
        registry: &FeatureRegistry,
    ) -> ChurnResult<PreparedRows> {
        let rows = DateNormalizer::from_config(&self.config).normalize(data_rows, registry)?;
        self.attach_series(&rows, historical, registry)
    }

    /// Attaches the series summaries of `historical` without touching any other feature.
    ///
    /// # Errors
    /// [`crate::error::SchemaError::UnknownFeature`] when a returned row carries a feature
    /// the returned registry does not describe.
    pub fn attach_series(
        &self,
        data_rows: &[Record],
        historical: &[Record],
        registry: &FeatureRegistry,
    ) -> ChurnResult<PreparedRows> {
        let summarizer = TimeSeriesSummarizer::from_config(&self.config);
        let series = summarizer.extract_series(historical)?;
        let Summarized {
            rows,
            registry,
            report,
        } = summarizer.summarize(data_rows, &series, registry);
        registry.validate(&rows)?;

        Ok(PreparedRows {
            rows,
            registry,
            report,
        })
    }

    /// Builds the training matrix and its aligned label vector.
    ///
    /// Only customers present in both `data_rows` and `label_rows` are kept, ordered by
    /// id. A repeated id keeps its last row in either input. The returned layout must be
    /// passed to [`Pipeline::inference_matrix`] so both matrices share their columns.
    ///
    /// # Errors
    /// * [`DataError::NoSharedIds`] when the two inputs have no id in common.
    /// * [`DataError::MissingLabel`] for a label row without the label field.
    /// * Any schema or parse error of the transformation stages.
    #[tracing::instrument(
        skip(self, data_rows, label_rows, registry),
        fields(rows = data_rows.len(), labels = label_rows.len())
    )]
    pub fn labelled_training_matrix(
        &self,
        data_rows: &[Record],
        label_rows: &[Record],
        registry: &FeatureRegistry,
    ) -> ChurnResult<TrainingSet> {
        let labels_by_id = index_labels(label_rows, self.config.label_field())?;
        let data_by_id = index_rows(data_rows);

        let mut ids = Vec::new();
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for (id, row) in data_by_id {
            if let Some(label) = labels_by_id.get(id) {
                ids.push(id.clone());
                rows.push(row.clone());
                labels.push(label_value(label));
            }
        }
        if rows.is_empty() {
            return Err(DataError::NoSharedIds.into());
        }
        tracing::info!(shared = rows.len(), "Joined data and label rows");

        let (encoded, value_maps) = categorical::encode(&rows, registry);
        let normalized = DateNormalizer::from_config(&self.config).normalize(&encoded, registry)?;

        let (columns, matrix) = Vectorizer::from_config(&self.config).vectorize(&normalized, registry)?;
        let registry = registry.restricted_to(columns.names().iter().map(String::as_str))?;
        let (one_hot, features) = one_hot::expand(&matrix, &registry)?;

        let labels = LabelVector::from(labels);
        if labels.len() != features.nrows() {
            return Err(SystemError::InvariantViolation(format!(
                "{} labels for {} feature rows",
                labels.len(),
                features.nrows()
            ))
            .into());
        }

        tracing::info!(
            rows = features.nrows(),
            cols = features.ncols(),
            positives = labels.positives(),
            "Training matrix built"
        );
        Ok(TrainingSet {
            ids,
            features,
            labels,
            layout: FeatureLayout::new(registry, columns, one_hot, value_maps),
        })
    }

    /// Builds an inference matrix with the columns of a training `layout`.
    ///
    /// Categorical values unseen in training expand to an all-zero indicator block.
    /// Layout columns absent from a row take the empty-datum sentinel; registered
    /// features outside the layout are ignored.
    #[tracing::instrument(
        skip(self, data_rows, registry, layout),
        fields(rows = data_rows.len(), width = layout.width())
    )]
    pub fn inference_matrix(
        &self,
        data_rows: &[Record],
        registry: &FeatureRegistry,
        layout: &FeatureLayout,
    ) -> ChurnResult<InferenceSet> {
        if data_rows.is_empty() {
            return Err(DataError::EmptyPopulation("no inference rows".to_string()).into());
        }

        let encoded = categorical::encode_with(data_rows, registry, layout.value_maps());
        let normalized = DateNormalizer::from_config(&self.config).normalize(&encoded, registry)?;
        let matrix = Vectorizer::from_config(&self.config).vectorize_with(
            &normalized,
            layout.columns(),
            layout.registry(),
        )?;
        let features = layout.one_hot().transform(&matrix)?;

        tracing::info!(
            rows = features.nrows(),
            cols = features.ncols(),
            "Inference matrix built"
        );
        Ok(InferenceSet {
            ids: data_rows.iter().map(|r| r.id().clone()).collect(),
            features,
        })
    }
}

/// Indexes rows by id in id order. A repeated id keeps its last row.
fn index_rows(rows: &[Record]) -> BTreeMap<&CustomerId, &Record> {
    let mut index = BTreeMap::new();
    for row in rows {
        if index.insert(row.id(), row).is_some() {
            tracing::debug!(id = %row.id(), "Duplicate data row, keeping the last");
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::data::registry::FeatureDescriptor;

    fn registry() -> FeatureRegistry {
        FeatureRegistry::new()
            .with_feature("type", FeatureDescriptor::categorical())
            .with_feature("weight", FeatureDescriptor::continuous())
            .with_feature("date", FeatureDescriptor::date())
    }

    fn data_rows() -> Vec<Record> {
        [
            ("1", "small", "100", "2016-10-02"),
            ("2", "medium", "120", "2016-10-01"),
            ("3", "big", "150", "2015-01-02"),
            ("4", "big", "190", "2015-01-01"),
        ]
        .into_iter()
        .map(|(id, t, w, d)| {
            Record::new(id)
                .with("type", t)
                .with("weight", w)
                .with("date", d)
        })
        .collect()
    }

    fn label_rows() -> Vec<Record> {
        [("1", "1"), ("2", "0"), ("3", "1"), ("4", "0")]
            .into_iter()
            .map(|(id, l)| Record::new(id).with("churned", l))
            .collect()
    }

    #[test]
    fn training_matrix_matches_the_reference_layout() {
        let set = Pipeline::default()
            .labelled_training_matrix(&data_rows(), &label_rows(), &registry())
            .unwrap();

        assert_eq!(
            set.features.data(),
            &array![
                [1.0, 0.0, 0.0, 1_475_362_800.0, 100.0],
                [0.0, 1.0, 0.0, 1_475_276_400.0, 120.0],
                [0.0, 0.0, 1.0, 1_420_156_800.0, 150.0],
                [0.0, 0.0, 1.0, 1_420_070_400.0, 190.0],
            ]
        );
        assert_eq!(
            set.features.columns(),
            &["type=1", "type=2", "type=3", "date", "weight"]
        );
        assert_eq!(set.labels.as_array(), &array![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(
            set.ids,
            ["1", "2", "3", "4"].map(CustomerId::from).to_vec()
        );
    }

    #[test]
    fn only_shared_ids_are_kept_in_id_order() {
        let mut data = data_rows();
        data.reverse();
        let labels = vec![
            Record::new("3").with("churned", "1"),
            Record::new("1").with("churned", "0"),
            Record::new("9").with("churned", "1"),
        ];
        let set = Pipeline::default()
            .labelled_training_matrix(&data, &labels, &registry())
            .unwrap();

        assert_eq!(set.ids, vec![CustomerId::from("1"), CustomerId::from("3")]);
        assert_eq!(set.labels.as_array(), &array![0.0, 1.0]);
        assert_eq!(set.features.nrows(), set.labels.len());
        assert_eq!(set.features.column("weight").unwrap().to_vec(), vec![100.0, 150.0]);
    }

    #[test]
    fn single_shared_id_yields_one_row() {
        let labels = vec![Record::new("2").with("churned", "yes")];
        let set = Pipeline::default()
            .labelled_training_matrix(&data_rows(), &labels, &registry())
            .unwrap();
        assert_eq!(set.features.nrows(), 1);
        assert_eq!(set.labels.len(), 1);
    }

    #[test]
    fn disjoint_ids_are_an_error() {
        let labels = vec![Record::new("42").with("churned", "1")];
        let err = Pipeline::default()
            .labelled_training_matrix(&data_rows(), &labels, &registry())
            .unwrap_err();
        assert!(matches!(err, crate::error::ChurnError::Data(DataError::NoSharedIds)));
    }

    #[test]
    fn training_is_deterministic() {
        let pipeline = Pipeline::default();
        let a = pipeline
            .labelled_training_matrix(&data_rows(), &label_rows(), &registry())
            .unwrap();
        let b = pipeline
            .labelled_training_matrix(&data_rows(), &label_rows(), &registry())
            .unwrap();
        assert_eq!(a.features, b.features);
        assert_eq!(a.labels, b.labels);
        assert_eq!(
            a.layout.fingerprint().unwrap(),
            b.layout.fingerprint().unwrap()
        );
    }

    #[test]
    fn inference_reuses_training_columns_and_codes() {
        let pipeline = Pipeline::default();
        let training = pipeline
            .labelled_training_matrix(&data_rows(), &label_rows(), &registry())
            .unwrap();

        let test_rows = vec![
            Record::new("t1").with("type", "big").with("weight", "80").with("date", ""),
            Record::new("t2").with("type", "huge").with("weight", "90"),
        ];
        let set = pipeline
            .inference_matrix(&test_rows, &registry(), &training.layout)
            .unwrap();

        assert_eq!(set.features.columns(), training.features.columns());
        assert_eq!(
            set.features.data(),
            &array![[0.0, 0.0, 1.0, 0.0, 80.0], [0.0, 0.0, 0.0, 0.0, 90.0]]
        );
        assert_eq!(set.ids, vec![CustomerId::from("t1"), CustomerId::from("t2")]);
    }

    #[test]
    fn layout_decodes_training_codes() {
        let training = Pipeline::default()
            .labelled_training_matrix(&data_rows(), &label_rows(), &registry())
            .unwrap();
        let layout = &training.layout;
        assert_eq!(layout.decode("type", crate::data::domain::Code(2)), Some("medium"));
        assert_eq!(layout.width(), 5);
        assert!(layout.to_json().unwrap().is_object());
    }

    fn series_registry() -> FeatureRegistry {
        registry()
            .with_feature("price_date", FeatureDescriptor::date())
            .with_feature("price_p1_fix", FeatureDescriptor::continuous())
    }

    #[test]
    fn first_customer_without_history_still_trains() {
        let history = vec![
            Record::new("3").with("price_date", "2015-01-01").with("price_p1_fix", "10"),
            Record::new("3").with("price_date", "2015-02-01").with("price_p1_fix", "30"),
        ];
        let pipeline =
            Pipeline::new(PipelineConfig::default().with_series_features(["price_p1_fix"]));
        let prepared = pipeline
            .prepare(&data_rows(), &history, &series_registry())
            .unwrap();

        let set = pipeline
            .labelled_training_matrix(&prepared.rows, &label_rows(), &prepared.registry)
            .unwrap();

        assert_eq!(set.features.nrows(), 4);
        assert_eq!(set.labels.len(), 4);
        assert_eq!(
            set.features.column("price_p1_fix_max").unwrap().to_vec(),
            vec![0.0, 0.0, 30.0, 0.0]
        );
        assert_eq!(
            set.features.column("price_p1_fix_range").unwrap().to_vec(),
            vec![0.0, 0.0, 20.0, 0.0]
        );
    }

    #[test]
    fn absent_categorical_at_inference_is_unseen() {
        let pipeline = Pipeline::new(PipelineConfig::default().with_empty_datum(-1.0));
        let training = pipeline
            .labelled_training_matrix(&data_rows(), &label_rows(), &registry())
            .unwrap();

        let test_rows = vec![Record::new("t").with("weight", "70").with("date", "")];
        let set = pipeline
            .inference_matrix(&test_rows, &registry(), &training.layout)
            .unwrap();

        assert_eq!(set.features.data(), &array![[0.0, 0.0, 0.0, 0.0, 70.0]]);
    }

    #[test]
    fn absent_categorical_in_training_gets_no_indicator() {
        let mut data = data_rows();
        data[1] = Record::new("2").with("weight", "120").with("date", "2016-10-01");
        let training = Pipeline::default()
            .labelled_training_matrix(&data, &label_rows(), &registry())
            .unwrap();

        assert_eq!(
            training.features.columns(),
            &["type=1", "type=2", "date", "weight"]
        );
        assert_eq!(
            training.features.row(1).to_vec(),
            vec![0.0, 0.0, 1_475_276_400.0, 120.0]
        );

        let test_rows = vec![Record::new("t").with("type", "huge").with("weight", "1")];
        let set = Pipeline::default()
            .inference_matrix(&test_rows, &registry(), &training.layout)
            .unwrap();
        assert_eq!(set.features.data(), &array![[0.0, 0.0, 0.0, 1.0]]);
    }

    #[test]
    fn attached_rows_must_be_described_by_the_registry() {
        let rows = vec![Record::new("1").with("weight", "1").with("colour", "red")];
        let err = Pipeline::default()
            .attach_series(&rows, &[], &registry())
            .unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn prepare_attaches_series_summaries() {
        let registry = series_registry();
        let history = vec![
            Record::new("1").with("price_date", "2015-01-01").with("price_p1_fix", "10"),
            Record::new("1").with("price_date", "2015-02-01").with("price_p1_fix", "20"),
        ];
        let config = PipelineConfig::default().with_series_features(["price_p1_fix"]);
        let prepared = Pipeline::new(config)
            .prepare(&data_rows(), &history, &registry)
            .unwrap();

        let first = &prepared.rows[0];
        assert_eq!(
            first.get("price_p1_fix_range"),
            Some(&crate::data::record::Datum::Number(10.0))
        );
        assert_eq!(
            first.get("date"),
            Some(&crate::data::record::Datum::Number(1_475_362_800.0))
        );
        assert!(prepared.registry.contains("price_p1_fix_sum_returns"));
        assert_eq!(prepared.report.attached_count(), 1);
        assert_eq!(prepared.report.skipped_count(), 3);
    }
}
