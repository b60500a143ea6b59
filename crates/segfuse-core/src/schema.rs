//! Collection schema: named vector spaces and their shapes.

use serde::{Deserialize, Serialize};

use crate::config::CollectionConfig;
use crate::embedding::SpaceDimensions;

/// Similarity metric of a vector space.
///
/// Serialized with the capitalised names the Qdrant API uses; lowercase
/// spellings are accepted in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Distance {
    #[default]
    #[serde(rename = "Cosine", alias = "cosine")]
    Cosine,
    #[serde(rename = "Dot", alias = "dot")]
    Dot,
    #[serde(rename = "Euclid", alias = "euclid")]
    Euclid,
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Dot => write!(f, "dot"),
            Self::Euclid => write!(f, "euclid"),
        }
    }
}

/// How a multivector point is compared with a multivector query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiVectorComparator {
    #[default]
    MaxSim,
}

/// One named vector space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSpace {
    pub name: String,
    pub dimension: usize,
    pub distance: Distance,
    /// `Some` for late-interaction spaces that hold one vector per token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multivector: Option<MultiVectorComparator>,
}

impl VectorSpace {
    pub fn dense(name: impl Into<String>, dimension: usize, distance: Distance) -> Self {
        Self {
            name: name.into(),
            dimension,
            distance,
            multivector: None,
        }
    }

    pub fn multivector(name: impl Into<String>, dimension: usize, distance: Distance) -> Self {
        Self {
            name: name.into(),
            dimension,
            distance,
            multivector: Some(MultiVectorComparator::MaxSim),
        }
    }

    pub fn is_multivector(&self) -> bool {
        self.multivector.is_some()
    }
}

/// A named collection and the spaces every point in it must fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub spaces: Vec<VectorSpace>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, spaces: Vec<VectorSpace>) -> Self {
        Self {
            name: name.into(),
            spaces,
        }
    }

    /// The three-space layout: full-text dense, segment dense, and segment
    /// late-interaction, sized from sampled model output.
    pub fn from_dimensions(config: &CollectionConfig, dims: SpaceDimensions) -> Self {
        let names = &config.spaces;
        Self::new(
            config.name.clone(),
            vec![
                VectorSpace::dense(&names.full_text, dims.full_text, config.distance),
                VectorSpace::dense(&names.segment, dims.segment, config.distance),
                VectorSpace::multivector(
                    &names.late_interaction,
                    dims.late_interaction,
                    Distance::Cosine,
                ),
            ],
        )
    }

    pub fn space_named(&self, name: &str) -> Option<&VectorSpace> {
        self.spaces.iter().find(|s| s.name == name)
    }

    /// Reject empty names, zero dimensions and duplicate space names.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("collection name is empty".to_string());
        }
        if self.spaces.is_empty() {
            return Err(format!("collection {} has no vector spaces", self.name));
        }
        for (i, space) in self.spaces.iter().enumerate() {
            if space.name.trim().is_empty() {
                return Err(format!("space #{i} of {} has no name", self.name));
            }
            if space.dimension == 0 {
                return Err(format!("space {} has dimension 0", space.name));
            }
            if self.spaces[..i].iter().any(|s| s.name == space.name) {
                return Err(format!("space {} is declared twice", space.name));
            }
        }
        Ok(())
    }
}
