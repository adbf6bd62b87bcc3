//! What a context document is being built for.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The request a context document serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Purpose {
    AnalyzeModel,
    OptimizeDesign,
    CreateVariants,
    /// Any other named request. Gets the generic sections only.
    Custom(String),
}

impl Purpose {
    /// Parse a snake_case purpose name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "analyze_model" => Self::AnalyzeModel,
            "optimize_design" => Self::OptimizeDesign,
            "create_variants" => Self::CreateVariants,
            other => Self::Custom(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::AnalyzeModel => "analyze_model",
            Self::OptimizeDesign => "optimize_design",
            Self::CreateVariants => "create_variants",
            Self::Custom(name) => name,
        }
    }

    /// The first line of the context document.
    pub fn header(&self) -> String {
        match self {
            Self::AnalyzeModel => "# CAD Model Analysis Request".to_string(),
            Self::OptimizeDesign => "# Design Optimization Request".to_string(),
            Self::CreateVariants => "# Design Variant Generation Request".to_string(),
            Self::Custom(name) => format!("# {} Request", title_case(name)),
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Purpose {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl Serialize for Purpose {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Purpose {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

/// `"export_all_drawings"` → `"Export All Drawings"`.
fn title_case(name: &str) -> String {
    name.split(['_', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
