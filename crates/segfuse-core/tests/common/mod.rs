//! Shared fixtures for segfuse-core integration tests.

#![allow(dead_code)]

use segfuse_core::config::Config;
use segfuse_core::store::InMemoryStore;
use segfuse_core::{CollectionManager, EmbeddingGenerator, Record};

/// Segments from a short lecture on gut health.
pub fn lecture_records() -> Vec<Record> {
    let full_text = "A lecture on gut health covering inflammatory bowel disease, \
                     its symptoms, diet and treatment.";
    [
        (1, "inflammatory bowel disease is a chronic condition", "00:00:00", "00:00:12"),
        (2, "common symptoms of IBD include abdominal pain and diarrhea", "00:00:12", "00:00:25"),
        (3, "fatigue and weight loss are also reported", "00:00:25", "00:00:33"),
        (4, "a fiber rich diet supports the microbiome", "00:00:33", "00:00:47"),
        (5, "treatment often combines medication and diet changes", "00:00:47", "00:01:02"),
        (6, "surgery is reserved for severe cases", "00:01:02", "00:01:10"),
    ]
    .into_iter()
    .map(|(id, text, start, end)| Record::new(id, text, full_text, start, end))
    .collect()
}

/// Default config with small hash dimensions so tests stay fast.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.models.full_text.dimension = 64;
    config.models.segment.dimension = 64;
    config.models.late_interaction.dimension = 32;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

pub fn generator(config: &Config) -> EmbeddingGenerator {
    EmbeddingGenerator::from_config(&config.models).expect("hash models build")
}

/// Provision the configured collection from the first record.
pub fn provision(store: &InMemoryStore, generator: &EmbeddingGenerator, config: &Config, records: &[Record]) {
    CollectionManager::new(store)
        .provision(generator, &config.collection, &records[0])
        .expect("provision collection");
}
