//! Rasterization of polygon and bounding-box annotations into class masks.
//!
//! Geometry is given in the coordinate space of the original image and is
//! rescaled independently along x and y to the raster size. Annotations are
//! drawn in list order, so later annotations overwrite earlier ones where they
//! overlap.

use image::{GrayImage, Luma};
use imageproc::{drawing::draw_polygon_mut, point::Point};

use crate::{
    coco::{CategoryMap, CocoAnnotation},
    error::{DataError, DataResult},
};

/// Annotation geometry in original image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Closed polygon as `(x, y)` vertices.
    Polygon(Vec<(f64, f64)>),
    /// `[x_min, y_min, width, height]`.
    BoundingBox([f64; 4]),
}

/// A single shape to rasterize.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeAnnotation {
    pub category_id: u64,
    pub geometry: Geometry,
}

impl ShapeAnnotation {
    /// One polygon shape per COCO segmentation polygon.
    pub fn polygons(annotation: &CocoAnnotation) -> Vec<Self> {
        annotation
            .segmentation
            .iter()
            .map(|flat| Self {
                category_id: annotation.category_id,
                geometry: Geometry::Polygon(flat.chunks_exact(2).map(|p| (p[0], p[1])).collect()),
            })
            .collect()
    }

    /// The COCO bounding box as a shape, if present.
    pub fn bounding_box(annotation: &CocoAnnotation) -> Option<Self> {
        annotation.bbox.map(|bbox| Self {
            category_id: annotation.category_id,
            geometry: Geometry::BoundingBox(bbox),
        })
    }
}

/// Rasterizes annotations of one image into a class mask.
#[derive(Debug, Clone, Copy)]
pub struct Rasterizer<'a> {
    categories: &'a CategoryMap,
    scale_x: f64,
    scale_y: f64,
    width: u32,
    height: u32,
}

impl<'a> Rasterizer<'a> {
    /// Create a rasterizer for an image of `source` size (width, height)
    /// rendered into a mask of `target` size.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptySourceImage`] if the source size has a zero
    /// dimension.
    pub fn new(categories: &'a CategoryMap, source: (u32, u32), target: (u32, u32)) -> DataResult<Self> {
        let (width, height) = source;
        if width == 0 || height == 0 {
            return Err(DataError::EmptySourceImage { width, height });
        }
        Ok(Self {
            categories,
            scale_x: f64::from(target.0) / f64::from(width),
            scale_y: f64::from(target.1) / f64::from(height),
            width: target.0,
            height: target.1,
        })
    }

    /// Rasterize all annotations into a fresh background mask.
    ///
    /// # Errors
    ///
    /// Returns an error if an annotation's category has no class mapping. No
    /// partial mask is returned in that case.
    pub fn rasterize(&self, annotations: &[ShapeAnnotation]) -> DataResult<GrayImage> {
        let mut mask = GrayImage::new(self.width, self.height);
        for annotation in annotations {
            let class = self.categories.class_of(annotation.category_id)?;
            match &annotation.geometry {
                Geometry::Polygon(vertices) => self.fill_polygon(&mut mask, vertices, class),
                Geometry::BoundingBox(bbox) => self.fill_box(&mut mask, *bbox, class),
            }
        }
        Ok(mask)
    }

    fn scale_point(&self, (x, y): (f64, f64)) -> Point<i32> {
        Point::new(
            (x * self.scale_x).round() as i32,
            (y * self.scale_y).round() as i32,
        )
    }

    fn fill_polygon(&self, mask: &mut GrayImage, vertices: &[(f64, f64)], class: u8) {
        let mut points: Vec<Point<i32>> = Vec::with_capacity(vertices.len());
        for &vertex in vertices {
            let point = self.scale_point(vertex);
            if points.last() != Some(&point) {
                points.push(point);
            }
        }
        // the polygon is implicitly closed
        while points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            tracing::debug!(vertices = vertices.len(), "skipping degenerate polygon");
            return;
        }
        draw_polygon_mut(mask, &points, Luma([class]));
    }

    fn fill_box(&self, mask: &mut GrayImage, [x, y, w, h]: [f64; 4], class: u8) {
        let x0 = (x * self.scale_x).round() as i64;
        let y0 = (y * self.scale_y).round() as i64;
        let w = (w * self.scale_x).round() as i64;
        let h = (h * self.scale_y).round() as i64;

        let left = x0.clamp(0, i64::from(self.width)) as u32;
        let right = (x0 + w).clamp(0, i64::from(self.width)) as u32;
        let top = y0.clamp(0, i64::from(self.height)) as u32;
        let bottom = (y0 + h).clamp(0, i64::from(self.height)) as u32;

        for py in top..bottom {
            for px in left..right {
                mask.put_pixel(px, py, Luma([class]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn categories() -> CategoryMap {
        CategoryMap::new(HashMap::from([(1, 1), (2, 3)]))
    }

    fn bbox(category_id: u64, bbox: [f64; 4]) -> ShapeAnnotation {
        ShapeAnnotation {
            category_id,
            geometry: Geometry::BoundingBox(bbox),
        }
    }

    fn filled_region(mask: &GrayImage, class: u8) -> Option<(u32, u32, u32, u32)> {
        let mut region: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in mask.enumerate_pixels() {
            if p.0[0] == class {
                region = Some(match region {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }
        region.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
    }

    #[test]
    fn bounding_box_is_rescaled_per_axis() {
        let categories = categories();
        let rasterizer = Rasterizer::new(&categories, (100, 200), (50, 50)).unwrap();

        let mask = rasterizer.rasterize(&[bbox(1, [10.0, 20.0, 30.0, 40.0])]).unwrap();

        // x scale 0.5, y scale 0.25
        assert_eq!(filled_region(&mask, 1), Some((5, 5, 15, 10)));
        let filled = mask.pixels().filter(|p| p.0[0] == 1).count();
        assert_eq!(filled, 15 * 10);
    }

    #[test]
    fn bounding_box_rounds_to_nearest_pixel() {
        let categories = categories();
        let rasterizer = Rasterizer::new(&categories, (10, 10), (25, 25)).unwrap();

        let mask = rasterizer.rasterize(&[bbox(1, [3.0, 1.0, 5.0, 2.0])]).unwrap();

        // 7.5 -> 8, 2.5 -> 3, 12.5 -> 13, 5.0 -> 5
        assert_eq!(filled_region(&mask, 1), Some((8, 3, 13, 5)));
    }

    #[test]
    fn bounding_box_is_clipped_to_raster() {
        let categories = categories();
        let rasterizer = Rasterizer::new(&categories, (10, 10), (10, 10)).unwrap();

        let mask = rasterizer.rasterize(&[bbox(1, [-2.0, 7.0, 5.0, 10.0])]).unwrap();

        assert_eq!(filled_region(&mask, 1), Some((0, 7, 3, 3)));
    }

    #[test]
    fn polygon_is_filled_in_target_space() {
        let categories = categories();
        let rasterizer = Rasterizer::new(&categories, (10, 10), (20, 20)).unwrap();
        let square = ShapeAnnotation {
            category_id: 2,
            geometry: Geometry::Polygon(vec![(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)]),
        };

        let mask = rasterizer.rasterize(&[square]).unwrap();

        assert_eq!(mask.get_pixel(10, 10).0[0], 3);
        assert_eq!(mask.get_pixel(5, 5).0[0], 3);
        assert_eq!(mask.get_pixel(0, 0).0[0], 0);
        assert_eq!(mask.get_pixel(18, 18).0[0], 0);
    }

    #[test]
    fn later_annotations_overwrite_earlier_ones() {
        let categories = categories();
        let rasterizer = Rasterizer::new(&categories, (10, 10), (10, 10)).unwrap();

        let mask = rasterizer
            .rasterize(&[bbox(1, [0.0, 0.0, 6.0, 6.0]), bbox(2, [4.0, 4.0, 6.0, 6.0])])
            .unwrap();

        assert_eq!(mask.get_pixel(1, 1).0[0], 1);
        assert_eq!(mask.get_pixel(5, 5).0[0], 3);
        assert_eq!(mask.get_pixel(9, 9).0[0], 3);
    }

    #[test]
    fn degenerate_polygons_are_skipped() {
        let categories = categories();
        let rasterizer = Rasterizer::new(&categories, (100, 100), (10, 10)).unwrap();
        let sliver = ShapeAnnotation {
            category_id: 1,
            // collapses onto one or two pixels after rescaling
            geometry: Geometry::Polygon(vec![(50.0, 50.0), (51.0, 50.0), (50.0, 51.0), (50.0, 50.0)]),
        };

        let mask = rasterizer.rasterize(&[sliver]).unwrap();

        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn empty_source_image_is_rejected() {
        let categories = categories();

        let result = Rasterizer::new(&categories, (0, 480), (256, 256));

        assert!(matches!(
            result,
            Err(DataError::EmptySourceImage { width: 0, height: 480 })
        ));
    }

    #[test]
    fn unmapped_category_fails_fast() {
        let categories = categories();
        let rasterizer = Rasterizer::new(&categories, (10, 10), (10, 10)).unwrap();

        let result = rasterizer.rasterize(&[bbox(1, [0.0, 0.0, 2.0, 2.0]), bbox(42, [0.0, 0.0, 2.0, 2.0])]);

        assert!(matches!(result, Err(DataError::UnmappedCategory { category_id: 42 })));
    }

    #[test]
    fn coco_annotation_yields_one_shape_per_polygon() {
        let annotation = CocoAnnotation {
            id: 1,
            image_id: 1,
            category_id: 2,
            bbox: Some([0.0, 0.0, 1.0, 1.0]),
            segmentation: vec![vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0], vec![2.0, 2.0, 3.0, 2.0, 3.0, 3.0]],
        };

        let shapes = ShapeAnnotation::polygons(&annotation);

        assert_eq!(shapes.len(), 2);
        assert_eq!(
            shapes[1].geometry,
            Geometry::Polygon(vec![(2.0, 2.0), (3.0, 2.0), (3.0, 3.0)])
        );
        assert!(ShapeAnnotation::bounding_box(&annotation).is_some());
    }
}
