//! COCO / TACO annotation types and category-to-class mapping.

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{DataError, DataResult},
    palette::RecyclingClass,
};

/// Top-level COCO dataset structure. Only the fields used for mask
/// rasterization are kept.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CocoDataset {
    #[serde(default)]
    pub images: Vec<CocoImage>,
    #[serde(default)]
    pub annotations: Vec<CocoAnnotation>,
    #[serde(default)]
    pub categories: Vec<CocoCategory>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CocoImage {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CocoAnnotation {
    #[serde(default)]
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// `[x_min, y_min, width, height]` in image pixels.
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    /// Polygons as flat `[x, y, x, y, ...]` lists. RLE segmentations are not
    /// produced by the datasets used here and are ignored.
    #[serde(default, deserialize_with = "deserialize_polygons")]
    pub segmentation: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CocoCategory {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: Option<String>,
}

fn deserialize_polygons<'de, D>(deserializer: D) -> Result<Vec<Vec<f64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Segmentation {
        Polygons(Vec<Vec<f64>>),
        Other(serde_json::Value),
    }
    match Segmentation::deserialize(deserializer)? {
        Segmentation::Polygons(polygons) => Ok(polygons),
        Segmentation::Other(_) => Ok(Vec::new()),
    }
}

impl CocoDataset {
    /// Load a COCO annotation file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid COCO JSON.
    pub fn load(path: impl AsRef<Path>) -> DataResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DataError::AnnotationReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| DataError::AnnotationParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Annotations grouped by image id, preserving file order within an image.
    pub fn annotations_by_image(&self) -> HashMap<u64, Vec<&CocoAnnotation>> {
        let mut grouped: HashMap<u64, Vec<&CocoAnnotation>> = HashMap::new();
        for annotation in &self.annotations {
            grouped.entry(annotation.image_id).or_default().push(annotation);
        }
        grouped
    }
}

/// TACO category name to recycling class.
pub const TACO_RECYCLING_TABLE: [(&str, RecyclingClass); 60] = [
    ("Aluminium foil", RecyclingClass::Metal),
    ("Battery", RecyclingClass::Other),
    ("Aluminium blister pack", RecyclingClass::Metal),
    ("Carded blister pack", RecyclingClass::Plastic),
    ("Other plastic bottle", RecyclingClass::Plastic),
    ("Clear plastic bottle", RecyclingClass::Plastic),
    ("Glass bottle", RecyclingClass::Other),
    ("Plastic bottle cap", RecyclingClass::Plastic),
    ("Metal bottle cap", RecyclingClass::Metal),
    ("Broken glass", RecyclingClass::Other),
    ("Food Can", RecyclingClass::Metal),
    ("Aerosol", RecyclingClass::Metal),
    ("Drink can", RecyclingClass::Metal),
    ("Toilet tube", RecyclingClass::Paper),
    ("Other carton", RecyclingClass::Paper),
    ("Egg carton", RecyclingClass::Paper),
    ("Drink carton", RecyclingClass::Paper),
    ("Corrugated carton", RecyclingClass::Paper),
    ("Meal carton", RecyclingClass::Paper),
    ("Pizza box", RecyclingClass::Paper),
    ("Paper cup", RecyclingClass::Paper),
    ("Disposable plastic cup", RecyclingClass::Plastic),
    ("Foam cup", RecyclingClass::Plastic),
    ("Glass cup", RecyclingClass::Other),
    ("Other plastic cup", RecyclingClass::Plastic),
    ("Food waste", RecyclingClass::Bio),
    ("Glass jar", RecyclingClass::Other),
    ("Plastic lid", RecyclingClass::Plastic),
    ("Metal lid", RecyclingClass::Metal),
    ("Other plastic", RecyclingClass::Plastic),
    ("Magazine paper", RecyclingClass::Paper),
    ("Tissues", RecyclingClass::Paper),
    ("Wrapping paper", RecyclingClass::Paper),
    ("Normal paper", RecyclingClass::Paper),
    ("Paper bag", RecyclingClass::Paper),
    ("Plastified paper bag", RecyclingClass::Paper),
    ("Plastic film", RecyclingClass::Plastic),
    ("Six pack rings", RecyclingClass::Plastic),
    ("Garbage bag", RecyclingClass::Plastic),
    ("Other plastic wrapper", RecyclingClass::Plastic),
    ("Single-use carrier bag", RecyclingClass::Plastic),
    ("Polypropylene bag", RecyclingClass::Plastic),
    ("Crisp packet", RecyclingClass::Plastic),
    ("Spread tub", RecyclingClass::Plastic),
    ("Tupperware", RecyclingClass::Plastic),
    ("Disposable food container", RecyclingClass::Plastic),
    ("Foam food container", RecyclingClass::Plastic),
    ("Other plastic container", RecyclingClass::Plastic),
    ("Plastic glooves", RecyclingClass::Plastic),
    ("Plastic utensils", RecyclingClass::Plastic),
    ("Pop tab", RecyclingClass::Metal),
    ("Rope & strings", RecyclingClass::Other),
    ("Scrap metal", RecyclingClass::Metal),
    ("Shoe", RecyclingClass::Other),
    ("Squeezable tube", RecyclingClass::Plastic),
    ("Plastic straw", RecyclingClass::Plastic),
    ("Paper straw", RecyclingClass::Paper),
    ("Styrofoam piece", RecyclingClass::Other),
    ("Unlabeled litter", RecyclingClass::Other),
    ("Cigarette", RecyclingClass::Other),
];

/// Fixed lookup from dataset category id to mask class index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    classes: HashMap<u64, u8>,
}

impl CategoryMap {
    pub fn new(classes: HashMap<u64, u8>) -> Self {
        Self { classes }
    }

    /// Map TACO categories onto recycling classes by name.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnknownCategoryName`] if a category is missing from
    /// [`TACO_RECYCLING_TABLE`].
    pub fn recycling(categories: &[CocoCategory]) -> DataResult<Self> {
        let mut classes = HashMap::with_capacity(categories.len());
        for category in categories {
            let class = TACO_RECYCLING_TABLE
                .iter()
                .find(|(name, _)| *name == category.name)
                .map(|(_, class)| class.index())
                .ok_or_else(|| DataError::UnknownCategoryName {
                    category_id: category.id,
                    name: category.name.clone(),
                })?;
            classes.insert(category.id, class);
        }
        Ok(Self { classes })
    }

    /// Map COCO bounding-box categories onto the `num_foreground` colours that
    /// follow the background entry: class `1 + id mod num_foreground`.
    pub fn modulo(categories: &[CocoCategory], num_foreground: u8) -> Self {
        assert!(num_foreground > 0, "At least one foreground class is required");
        let classes = categories
            .iter()
            .map(|c| (c.id, 1 + (c.id % u64::from(num_foreground)) as u8))
            .collect();
        Self { classes }
    }

    /// Class index for a category id.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::UnmappedCategory`] if the id has no mapping.
    pub fn class_of(&self, category_id: u64) -> DataResult<u8> {
        self.classes
            .get(&category_id)
            .copied()
            .ok_or(DataError::UnmappedCategory { category_id })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
