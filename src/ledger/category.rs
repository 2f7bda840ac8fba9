use serde::{Deserialize, Serialize};

use super::transaction::new_entry_id;

/// A spending category with its display color and glyph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Hex color used by charts.
    pub color: String,
    /// Display glyph.
    pub icon: String,
}

impl Category {
    pub fn new(name: impl Into<String>, color: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            id: new_entry_id(),
            name: name.into(),
            color: color.into(),
            icon: icon.into(),
        }
    }

    fn seeded(id: &str, name: &str, color: &str, icon: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: color.into(),
            icon: icon.into(),
        }
    }
}

/// Fixed seed set installed on first use of a profile.
pub fn seed_categories() -> Vec<Category> {
    vec![
        Category::seeded("1", "Alimentación", "#FFB6C1", "🍔"),
        Category::seeded("2", "Transporte", "#B0E0E6", "🚗"),
        Category::seeded("3", "Entretenimiento", "#E6E6FA", "🎬"),
        Category::seeded("4", "Salud", "#DDA0DD", "💊"),
        Category::seeded("5", "Educación", "#FFDAB9", "📚"),
        Category::seeded("6", "Ahorro", "#B0E0E6", "💰"),
        Category::seeded("7", "Otros", "#FFFACD", "📦"),
    ]
}

/// Fallback category that dangling references resolve to.
pub fn unknown_category() -> Category {
    Category::seeded("unknown", "Desconocida", "#CCCCCC", "❓")
}

/// Resolves a category reference, falling back to [`unknown_category`] when
/// the id is absent or no longer present in the set.
pub fn find_or_unknown(categories: &[Category], id: Option<&str>) -> Category {
    id.and_then(|id| categories.iter().find(|cat| cat.id == id))
        .cloned()
        .unwrap_or_else(unknown_category)
}
