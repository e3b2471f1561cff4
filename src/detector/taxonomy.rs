use serde::Serialize;
use std::collections::HashMap;

/// Semantic group a detector class belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassCategory {
    /// A worker
    Person,
    /// A PPE item that is present (helmet, vest, ...)
    PpeItem,
    /// A missing PPE item
    Violation,
    /// A class id the taxonomy does not know. Reported as a violation.
    Unmapped,
}

impl ClassCategory {
    pub fn is_violation(&self) -> bool {
        matches!(self, ClassCategory::Violation | ClassCategory::Unmapped)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassInfo {
    pub class_id: u32,
    pub name: String,
    pub category: ClassCategory,
    /// Box colour (RGB)
    pub color: [u8; 3],
}

/// Maps model class ids to their meaning
#[derive(Debug, Clone)]
pub struct ClassTaxonomy {
    classes: HashMap<u32, ClassInfo>,
}

impl ClassTaxonomy {
    pub fn new(classes: impl IntoIterator<Item = ClassInfo>) -> Self {
        Self {
            classes: classes.into_iter().map(|c| (c.class_id, c)).collect(),
        }
    }

    /// Classes of the PPE model shipped with the dashboard
    pub fn ppe_default() -> Self {
        use ClassCategory::*;

        let table: [(u32, &str, ClassCategory, [u8; 3]); 11] = [
            (0, "Helmet", PpeItem, [0, 255, 0]),
            (1, "Gloves", PpeItem, [255, 255, 0]),
            (2, "Vest", PpeItem, [0, 165, 255]),
            (3, "Boots", PpeItem, [255, 0, 255]),
            (4, "Goggles", PpeItem, [0, 255, 128]),
            (5, "No PPE", Violation, [255, 0, 0]),
            (6, "Person", Person, [0, 128, 255]),
            (7, "No helmet", Violation, [255, 0, 0]),
            (8, "No goggles", Violation, [200, 0, 0]),
            (9, "No gloves", Violation, [180, 0, 0]),
            (10, "No boots", Violation, [160, 0, 0]),
        ];

        Self::new(table.into_iter().map(|(class_id, name, category, color)| ClassInfo {
            class_id,
            name: name.to_string(),
            category,
            color,
        }))
    }

    /// Resolve a class id. Unknown ids come back as [`ClassCategory::Unmapped`].
    pub fn lookup(&self, class_id: u32) -> ClassInfo {
        self.classes.get(&class_id).cloned().unwrap_or_else(|| ClassInfo {
            class_id,
            name: format!("Class {}", class_id),
            category: ClassCategory::Unmapped,
            color: [128, 128, 128],
        })
    }

    pub fn category(&self, class_id: u32) -> ClassCategory {
        self.classes
            .get(&class_id)
            .map(|c| c.category)
            .unwrap_or(ClassCategory::Unmapped)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassTaxonomy {
    fn default() -> Self {
        Self::ppe_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories() {
        let taxonomy = ClassTaxonomy::ppe_default();
        assert_eq!(taxonomy.len(), 11);
        assert_eq!(taxonomy.category(0), ClassCategory::PpeItem);
        assert_eq!(taxonomy.category(5), ClassCategory::Violation);
        assert_eq!(taxonomy.category(6), ClassCategory::Person);
        assert_eq!(taxonomy.category(7), ClassCategory::Violation);
        assert_eq!(taxonomy.lookup(7).name, "No helmet");
    }

    #[test]
    fn test_unknown_class_is_unmapped_violation() {
        let taxonomy = ClassTaxonomy::ppe_default();
        let info = taxonomy.lookup(42);
        assert_eq!(info.category, ClassCategory::Unmapped);
        assert_eq!(info.name, "Class 42");
        assert!(info.category.is_violation());
        assert!(!ClassCategory::PpeItem.is_violation());
    }
}
