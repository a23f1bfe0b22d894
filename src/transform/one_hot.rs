use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    data::{domain::Code, registry::FeatureRegistry},
    error::{ChurnResult, DataError, SchemaError},
    transform::vectorize::FeatureMatrix,
};

/// Indicator columns produced for one categorical source column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndicatorBlock {
    feature: String,
    source: usize,
    codes: Vec<Code>,
}

impl IndicatorBlock {
    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// Codes that own an indicator column, ascending.
    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    fn column_names(&self) -> impl Iterator<Item = String> + '_ {
        self.codes.iter().map(|code| format!("{}={}", self.feature, code))
    }
}

/// Fitted expansion of categorical code columns into indicator columns.
///
/// Output layout: all indicator blocks first, in source column order, then the
/// continuous columns in their original order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct OneHotLayout {
    sources: Vec<String>,
    blocks: Vec<IndicatorBlock>,
    continuous: Vec<usize>,
}

impl OneHotLayout {
    /// Learns one indicator column per distinct code of every categorical column.
    ///
    /// [`Code::UNSEEN`] never gets a column, so an absent value always expands to zeros.
    pub fn fit(matrix: &FeatureMatrix, registry: &FeatureRegistry) -> ChurnResult<Self> {
        let mut blocks = Vec::new();
        let mut continuous = Vec::new();

        for (j, name) in matrix.columns().iter().enumerate() {
            if !registry.is_categorical(name) {
                continuous.push(j);
                continue;
            }
            let codes = matrix
                .data()
                .column(j)
                .iter()
                .map(|v| to_code(name, *v))
                .collect::<ChurnResult<BTreeSet<_>>>()?;
            blocks.push(IndicatorBlock {
                feature: name.clone(),
                source: j,
                codes: codes.into_iter().filter(|c| !c.is_unseen()).collect(),
            });
        }

        Ok(Self {
            sources: matrix.columns().to_vec(),
            blocks,
            continuous,
        })
    }

    /// Expands `matrix`, whose columns must be the ones this layout was fitted on.
    ///
    /// A code without an indicator column (a value never seen when fitting) yields an
    /// all-zero block for that row.
    #[tracing::instrument(skip_all, fields(rows = matrix.nrows(), width = self.width()))]
    pub fn transform(&self, matrix: &FeatureMatrix) -> ChurnResult<FeatureMatrix> {
        if matrix.columns() != self.sources.as_slice() {
            return Err(SchemaError::LayoutMismatch(format!(
                "expected columns {:?}, got {:?}",
                self.sources,
                matrix.columns()
            ))
            .into());
        }

        let data = matrix.data();
        let mut out = Array2::<f64>::zeros((matrix.nrows(), self.width()));
        let mut offset = 0;
        for block in &self.blocks {
            for (i, value) in data.column(block.source).iter().enumerate() {
                let code = to_code(&block.feature, *value)?;
                if let Ok(k) = block.codes.binary_search(&code) {
                    out[[i, offset + k]] = 1.0;
                }
            }
            offset += block.codes.len();
        }
        for &j in &self.continuous {
            out.column_mut(offset).assign(&data.column(j));
            offset += 1;
        }

        FeatureMatrix::new(self.column_names(), out)
    }

    pub fn blocks(&self) -> &[IndicatorBlock] {
        &self.blocks
    }

    /// Column names of the input matrix the layout was fitted on.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Number of output columns.
    pub fn width(&self) -> usize {
        self.blocks.iter().map(|b| b.codes.len()).sum::<usize>() + self.continuous.len()
    }

    /// Output column names: `feature=code` for indicators, the plain name otherwise.
    pub fn column_names(&self) -> Vec<String> {
        self.blocks
            .iter()
            .flat_map(IndicatorBlock::column_names)
            .chain(self.continuous.iter().map(|&j| self.sources[j].clone()))
            .collect()
    }
}

/// Fits a layout on `matrix` and expands it in one go.
pub fn expand(matrix: &FeatureMatrix, registry: &FeatureRegistry) -> ChurnResult<(OneHotLayout, FeatureMatrix)> {
    let layout = OneHotLayout::fit(matrix, registry)?;
    let expanded = layout.transform(matrix)?;
    Ok((layout, expanded))
}

fn to_code(feature: &str, value: f64) -> ChurnResult<Code> {
    if value.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&value) {
        Ok(Code(value as u32))
    } else {
        Err(DataError::NonNumeric {
            feature: feature.to_string(),
            value: value.to_string(),
        }
        .into())
    }
}
