//! Named analyzers and normalizers for the embedded engine.
//!
//! Text fields reference an analyzer by name, keyword fields optionally a
//! normalizer. Both resolve to Tantivy `TextAnalyzer` chains registered on
//! every index the backend opens.

use crate::error::{Result, SearchSyncError};
use crate::model::{FieldKind, IndexSchema};
use std::collections::HashMap;
use tantivy::tokenizer::{
    Language, LowerCaser, RawTokenizer, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer,
    WhitespaceTokenizer,
};

/// Tokenizer name used for keyword fields without a normalizer.
pub const RAW_TOKENIZER: &str = "raw";

const NORMALIZER_PREFIX: &str = "normalizer:";

#[derive(Clone)]
pub struct AnalysisRegistry {
    analyzers: HashMap<String, TextAnalyzer>,
    normalizers: HashMap<String, TextAnalyzer>,
}

impl Default for AnalysisRegistry {
    /// `standard`, `simple`, `whitespace`, `english` analyzers and a
    /// `lowercase` normalizer.
    fn default() -> Self {
        let mut registry = AnalysisRegistry {
            analyzers: HashMap::new(),
            normalizers: HashMap::new(),
        };
        registry.register_analyzer(
            "standard",
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(RemoveLongFilter::limit(255))
                .filter(LowerCaser)
                .build(),
        );
        registry.register_analyzer(
            "simple",
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(LowerCaser)
                .build(),
        );
        registry.register_analyzer(
            "whitespace",
            TextAnalyzer::builder(WhitespaceTokenizer::default()).build(),
        );
        registry.register_analyzer(
            "english",
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(RemoveLongFilter::limit(255))
                .filter(LowerCaser)
                .filter(Stemmer::new(Language::English))
                .build(),
        );
        registry.register_normalizer(
            "lowercase",
            TextAnalyzer::builder(RawTokenizer::default())
                .filter(LowerCaser)
                .build(),
        );
        registry
    }
}

impl AnalysisRegistry {
    pub fn register_analyzer(&mut self, name: impl Into<String>, analyzer: TextAnalyzer) -> &mut Self {
        self.analyzers.insert(name.into(), analyzer);
        self
    }

    /// Normalizers must emit a single token per value.
    pub fn register_normalizer(
        &mut self,
        name: impl Into<String>,
        normalizer: TextAnalyzer,
    ) -> &mut Self {
        self.normalizers.insert(name.into(), normalizer);
        self
    }

    pub fn has_analyzer(&self, name: &str) -> bool {
        self.analyzers.contains_key(name)
    }

    pub fn has_normalizer(&self, name: &str) -> bool {
        self.normalizers.contains_key(name)
    }

    /// Name under which the tokenizer of `kind` is registered in Tantivy.
    pub fn tokenizer_name(kind: &FieldKind) -> Option<String> {
        match kind {
            FieldKind::Text { analyzer } => Some(analyzer.clone()),
            FieldKind::Keyword {
                normalizer: Some(normalizer),
            } => Some(format!("{}{}", NORMALIZER_PREFIX, normalizer)),
            FieldKind::Keyword { normalizer: None } => Some(RAW_TOKENIZER.to_string()),
            _ => None,
        }
    }

    /// Fail on the first analyzer or normalizer `schema` references but
    /// this registry does not know.
    pub fn check_schema(&self, schema: &IndexSchema) -> Result<()> {
        for (_, field) in schema.scalar_fields() {
            let missing = match &field.kind {
                FieldKind::Text { analyzer } if !self.has_analyzer(analyzer) => Some(analyzer),
                FieldKind::Keyword {
                    normalizer: Some(normalizer),
                } if !self.has_normalizer(normalizer) => Some(normalizer),
                _ => None,
            };
            if let Some(name) = missing {
                return Err(SearchSyncError::UnknownAnalyzer {
                    path: field.path.clone(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn register_on(&self, index: &tantivy::Index) {
        let tokenizers = index.tokenizers();
        for (name, analyzer) in &self.analyzers {
            tokenizers.register(name, analyzer.clone());
        }
        for (name, normalizer) in &self.normalizers {
            tokenizers.register(&format!("{}{}", NORMALIZER_PREFIX, name), normalizer.clone());
        }
    }
}
