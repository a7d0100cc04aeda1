use time::UtcOffset;

use crate::analysis::flows::Flow;
use crate::labelling::CompiledRules;

use super::{ExtractionError, FeatureExtractor, FeatureRow};

/// Ground-truth label of a flow.
///
/// A label already set on the flow takes precedence. Without attack rules
/// the column carries only such manual labels and is otherwise empty.
#[derive(Debug, Clone)]
pub struct LabelExtractor {
    rules: Option<CompiledRules>,
    default_label: String,
    offset: UtcOffset,
}

impl LabelExtractor {
    pub fn new(rules: CompiledRules, default_label: impl Into<String>) -> Self {
        Self {
            rules: Some(rules),
            default_label: default_label.into(),
            offset: UtcOffset::UTC,
        }
    }

    /// Label column filled from manual flow labels only.
    pub fn manual() -> Self {
        Self {
            rules: None,
            default_label: String::new(),
            offset: UtcOffset::UTC,
        }
    }

    /// Match attack windows against wall-clock time at `offset`.
    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.offset = offset;
        self
    }
}

impl FeatureExtractor for LabelExtractor {
    fn name(&self) -> &str {
        "Label"
    }

    fn extract(&self, flow: &Flow) -> Result<FeatureRow, ExtractionError> {
        let label = match &self.rules {
            _ if !flow.label.is_empty() => flow.label.clone(),
            None => String::new(),
            Some(_) if flow.is_empty() => self.default_label.clone(),
            Some(rules) => {
                let started = flow
                    .readable_initial_timestamp(self.offset)
                    .map_err(|err| ExtractionError::failed(self.name(), flow, err))?;
                rules.resolve(flow.info(), &started, &self.default_label)
            }
        };
        let mut row = FeatureRow::new();
        row.insert("Label", label);
        Ok(row)
    }
}
