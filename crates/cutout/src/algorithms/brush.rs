//! Rasterizing pointer interactions (lasso polygons, brush strokes) into
//! native-resolution masks.

use geo::{BoundingRect, Contains};
use geo_types::{Coord, LineString, Point, Polygon};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::{
    error::{CutoutError, Result},
    types::{Mask, ViewTransform},
};

/// Minimum number of distinct vertices for a lasso polygon
pub const MIN_LASSO_POINTS: usize = 3;

/// Fill a closed polygon given in native pixel coordinates.
///
/// A pixel is inside when its centre lies strictly inside the polygon, which
/// makes an axis-aligned square from (0,0) to (n,n) cover exactly n x n pixels.
pub fn rasterize_polygon(points: &[[f32; 2]], width: u32, height: u32) -> Mask {
    let mut mask = GrayImage::new(width, height);
    if points.len() < MIN_LASSO_POINTS || width == 0 || height == 0 {
        return mask;
    }

    let ring: Vec<Coord<f64>> = points
        .iter()
        .map(|&[x, y]| Coord { x: x as f64, y: y as f64 })
        .collect();
    let polygon = Polygon::new(LineString::new(ring), vec![]);
    let Some(bounds) = polygon.bounding_rect() else {
        return mask;
    };

    let x0 = bounds.min().x.floor().max(0.0) as u32;
    let y0 = bounds.min().y.floor().max(0.0) as u32;
    let x1 = (bounds.max().x.ceil().max(0.0) as u32).min(width);
    let y1 = (bounds.max().y.ceil().max(0.0) as u32).min(height);

    for y in y0..y1 {
        for x in x0..x1 {
            let centre = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            if polygon.contains(&centre) {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    mask
}

/// Build a lasso mask from display-space points.
///
/// Fewer than three distinct points, or a polygon that covers no pixel
/// centre, is an invalid selection.
pub fn lasso_mask(display_points: &[[f32; 2]], view: &ViewTransform) -> Result<Mask> {
    let mut native: Vec<[f32; 2]> = Vec::with_capacity(display_points.len());
    for point in display_points {
        let mapped = view.to_native(*point);
        if native.last() != Some(&mapped) {
            native.push(mapped);
        }
    }

    let mut distinct: Vec<[f32; 2]> = Vec::new();
    for point in &native {
        if !distinct.contains(point) {
            distinct.push(*point);
        }
    }
    if distinct.len() < MIN_LASSO_POINTS {
        return Err(CutoutError::invalid_selection(format!(
            "lasso needs at least {MIN_LASSO_POINTS} distinct points, got {}",
            distinct.len()
        )));
    }

    let [width, height] = view.native_size;
    let mask = rasterize_polygon(&native, width, height);
    if mask.pixels().all(|p| p[0] == 0) {
        return Err(CutoutError::invalid_selection("lasso polygon encloses no pixels"));
    }

    tracing::debug!(points = native.len(), width, height, "Rasterized lasso selection");
    Ok(mask)
}

/// Same as [`lasso_mask`] for a flat `[x0, y0, x1, y1, ...]` coordinate list
pub fn lasso_mask_from_flat(coordinates: &[f32], view: &ViewTransform) -> Result<Mask> {
    let points: Vec<[f32; 2]> = coordinates
        .chunks_exact(2)
        .map(|pair| [pair[0], pair[1]])
        .collect();
    lasso_mask(&points, view)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BrushKind {
    /// Solid continuous line
    #[default]
    Normal,
    /// Continuous line with a hardness-controlled radial falloff
    Soft,
    /// Discrete dabs placed every `spacing` along the path
    Stroke,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompositeMode {
    /// Adds coverage (source-over)
    #[default]
    Normal,
    /// Removes coverage (destination-out)
    Erase,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BrushSettings {
    /// Stroke width in display pixels
    pub size: f32,
    pub color: [u8; 3],
    /// 0.0..=1.0
    pub opacity: f32,
    /// 0.0..=1.0, fraction of the radius painted at full strength
    pub hardness: f32,
    /// Dab spacing as a fraction of the brush size (Stroke brushes only)
    pub spacing: f32,
    pub kind: BrushKind,
    pub mode: CompositeMode,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            size: 20.0,
            color: [255, 255, 255],
            opacity: 1.0,
            hardness: 0.75,
            spacing: 0.25,
            kind: BrushKind::Normal,
            mode: CompositeMode::Normal,
        }
    }
}

/// Coverage of a point at normalized distance `t` from a dab centre
fn falloff(t: f32, hardness: f32) -> f32 {
    if t >= 1.0 {
        return 0.0;
    }
    let hardness = hardness.clamp(0.0, 1.0);
    if t <= hardness {
        return 1.0;
    }
    let s = (t - hardness) / (1.0 - hardness);
    1.0 - s * s * (3.0 - 2.0 * s)
}

fn distance_to_segment(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
    let (abx, aby) = (b[0] - a[0], b[1] - a[1]);
    let (apx, apy) = (p[0] - a[0], p[1] - a[1]);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq > 0.0 {
        ((apx * abx + apy * aby) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (dx, dy) = (apx - abx * t, apy - aby * t);
    (dx * dx + dy * dy).sqrt()
}

#[derive(Debug, Clone, Copy)]
struct DirtyRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

#[derive(Debug, Clone)]
struct Stroke {
    settings: BrushSettings,
    radius: f32,
    points: Vec<[f32; 2]>,
    /// Per-pixel coverage of this stroke alone, combined by max so the
    /// stroke is painted once at its opacity however often it overlaps itself
    coverage: Vec<f32>,
    /// Distance left along the path before the next dab
    dab_carry: f32,
}

/// Accumulates brush strokes into a paint layer whose alpha is the mask.
#[derive(Debug, Clone)]
pub struct BrushMaskBuilder {
    view: ViewTransform,
    paint: RgbaImage,
    stroke_base: RgbaImage,
    current: Option<Stroke>,
}

impl BrushMaskBuilder {
    pub fn new(view: ViewTransform) -> Self {
        let [width, height] = view.native_size;
        Self {
            view,
            paint: RgbaImage::new(width, height),
            stroke_base: RgbaImage::new(width, height),
            current: None,
        }
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn is_stroking(&self) -> bool {
        self.current.is_some()
    }

    /// Points of the stroke in progress, in native coordinates
    pub fn current_points(&self) -> Option<&[[f32; 2]]> {
        self.current.as_ref().map(|stroke| stroke.points.as_slice())
    }

    /// Start a new stroke at a display-space point and return the live mask
    pub fn begin_stroke(&mut self, display_point: [f32; 2], settings: BrushSettings) -> Mask {
        if self.current.is_some() {
            self.end_stroke();
        }
        let [width, height] = self.view.native_size;
        let point = self.view.to_native(display_point);
        let radius = (settings.size.max(0.0) * self.view.scale()[0] / 2.0).max(0.5);

        self.stroke_base = self.paint.clone();
        let mut stroke = Stroke {
            settings,
            radius,
            points: vec![point],
            coverage: vec![0.0; (width * height) as usize],
            dab_carry: 0.0,
        };
        let dirty = self.render_segment(&mut stroke, point, point);
        self.current = Some(stroke);
        if let Some(dirty) = dirty {
            self.compose(dirty);
        }
        self.mask()
    }

    /// Append a drag sample to the current stroke and return the live mask
    pub fn extend_stroke(&mut self, display_point: [f32; 2]) -> Result<Mask> {
        let point = self.view.to_native(display_point);
        let Some(mut stroke) = self.current.take() else {
            return Err(CutoutError::precondition("no brush stroke in progress"));
        };
        let last = stroke.points.last().copied().unwrap_or(point);
        stroke.points.push(point);
        let dirty = self.render_segment(&mut stroke, last, point);
        self.current = Some(stroke);
        if let Some(dirty) = dirty {
            self.compose(dirty);
        }
        Ok(self.mask())
    }

    /// Finish the current stroke; its pixels are already in the paint layer
    pub fn end_stroke(&mut self) {
        if let Some(stroke) = self.current.take() {
            tracing::debug!(points = stroke.points.len(), kind = ?stroke.settings.kind, "Finished brush stroke");
        }
        self.stroke_base = self.paint.clone();
    }

    /// Coloured preview of everything painted so far
    pub fn paint_layer(&self) -> &RgbaImage {
        &self.paint
    }

    /// Mask snapshot: the paint layer's alpha channel
    pub fn mask(&self) -> Mask {
        let (width, height) = self.paint.dimensions();
        GrayImage::from_fn(width, height, |x, y| Luma([self.paint.get_pixel(x, y)[3]]))
    }

    /// Final mask for extraction; empty paint is an invalid selection
    pub fn commit(&mut self) -> Result<Mask> {
        self.end_stroke();
        let mask = self.mask();
        if mask.pixels().all(|p| p[0] == 0) {
            return Err(CutoutError::invalid_selection("brush selection is empty"));
        }
        Ok(mask)
    }

    pub fn clear(&mut self) {
        let [width, height] = self.view.native_size;
        self.paint = RgbaImage::new(width, height);
        self.stroke_base = RgbaImage::new(width, height);
        self.current = None;
    }

    fn dirty_rect(&self, min: [f32; 2], max: [f32; 2], radius: f32) -> Option<DirtyRect> {
        let [width, height] = self.view.native_size;
        let pad = radius + 1.0;
        let x0 = (min[0] - pad).floor().max(0.0);
        let y0 = (min[1] - pad).floor().max(0.0);
        let x1 = ((max[0] + pad).ceil().max(0.0) as u32).min(width);
        let y1 = ((max[1] + pad).ceil().max(0.0) as u32).min(height);
        let (x0, y0) = (x0 as u32, y0 as u32);
        (x0 < x1 && y0 < y1).then_some(DirtyRect { x0, y0, x1, y1 })
    }

    fn render_segment(&self, stroke: &mut Stroke, from: [f32; 2], to: [f32; 2]) -> Option<DirtyRect> {
        let radius = stroke.radius;
        let settings = stroke.settings;
        let min = [from[0].min(to[0]), from[1].min(to[1])];
        let max = [from[0].max(to[0]), from[1].max(to[1])];
        let dirty = self.dirty_rect(min, max, radius)?;
        let width = self.view.native_size[0];

        match settings.kind {
            BrushKind::Normal | BrushKind::Soft => {
                for y in dirty.y0..dirty.y1 {
                    for x in dirty.x0..dirty.x1 {
                        let centre = [x as f32 + 0.5, y as f32 + 0.5];
                        let t = distance_to_segment(centre, from, to) / radius;
                        let value = match settings.kind {
                            BrushKind::Soft => falloff(t, settings.hardness),
                            _ => if t <= 1.0 { 1.0 } else { 0.0 },
                        };
                        let slot = &mut stroke.coverage[(y * width + x) as usize];
                        *slot = slot.max(value);
                    }
                }
            }
            BrushKind::Stroke => {
                let spacing = (settings.spacing * settings.size * self.view.scale()[0]).max(1.0);
                let (dx, dy) = (to[0] - from[0], to[1] - from[1]);
                let length = (dx * dx + dy * dy).sqrt();
                let mut along = stroke.dab_carry;
                while along <= length {
                    let f = if length > 0.0 { along / length } else { 0.0 };
                    let centre = [from[0] + dx * f, from[1] + dy * f];
                    self.stamp_dab(stroke, centre, dirty);
                    along += spacing;
                }
                stroke.dab_carry = along - length;
            }
        }

        Some(dirty)
    }

    fn stamp_dab(&self, stroke: &mut Stroke, centre: [f32; 2], dirty: DirtyRect) {
        let width = self.view.native_size[0];
        let radius = stroke.radius;
        let x0 = ((centre[0] - radius).floor().max(0.0) as u32).max(dirty.x0);
        let y0 = ((centre[1] - radius).floor().max(0.0) as u32).max(dirty.y0);
        let x1 = ((centre[0] + radius).ceil().max(0.0) as u32 + 1).min(dirty.x1);
        let y1 = ((centre[1] + radius).ceil().max(0.0) as u32 + 1).min(dirty.y1);

        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - centre[0];
                let dy = y as f32 + 0.5 - centre[1];
                let t = (dx * dx + dy * dy).sqrt() / radius;
                let value = falloff(t, stroke.settings.hardness);
                let slot = &mut stroke.coverage[(y * width + x) as usize];
                *slot = slot.max(value);
            }
        }
    }

    /// Recompute the paint layer inside `dirty` from the pre-stroke layer
    fn compose(&mut self, dirty: DirtyRect) {
        let Some(stroke) = self.current.as_ref() else {
            return;
        };
        let width = self.view.native_size[0];
        let settings = stroke.settings;
        let opacity = settings.opacity.clamp(0.0, 1.0);

        for y in dirty.y0..dirty.y1 {
            for x in dirty.x0..dirty.x1 {
                let a = stroke.coverage[(y * width + x) as usize] * opacity;
                let base = *self.stroke_base.get_pixel(x, y);
                let base_a = base[3] as f32 / 255.0;

                let out = match settings.mode {
                    CompositeMode::Normal => {
                        let out_a = a + base_a * (1.0 - a);
                        if out_a <= 0.0 {
                            Rgba([0, 0, 0, 0])
                        } else {
                            let channel = |i: usize| {
                                let value = (settings.color[i] as f32 * a
                                    + base[i] as f32 * base_a * (1.0 - a))
                                    / out_a;
                                value.round().clamp(0.0, 255.0) as u8
                            };
                            Rgba([channel(0), channel(1), channel(2), (out_a * 255.0).round() as u8])
                        }
                    }
                    CompositeMode::Erase => {
                        let out_a = base_a * (1.0 - a);
                        Rgba([base[0], base[1], base[2], (out_a * 255.0).round() as u8])
                    }
                };
                self.paint.put_pixel(x, y, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_selected(mask: &Mask) -> usize {
        mask.pixels().filter(|p| p[0] > 0).count()
    }

    #[test]
    fn test_lasso_with_two_points_is_invalid() {
        let view = ViewTransform::identity(20, 20);
        let err = lasso_mask_from_flat(&[1.0, 1.0, 10.0, 10.0], &view).unwrap_err();
        assert!(matches!(err, CutoutError::InvalidSelection(_)));
    }

    #[test]
    fn test_lasso_with_three_points_is_non_empty() {
        let view = ViewTransform::identity(20, 20);
        let mask = lasso_mask_from_flat(&[2.0, 2.0, 18.0, 2.0, 10.0, 18.0], &view)
            .expect("Triangle should rasterize");
        assert!(count_selected(&mask) > 0);
        assert_eq!(mask.get_pixel(10, 8)[0], 255);
        assert_eq!(mask.get_pixel(1, 19)[0], 0);
    }

    #[test]
    fn test_repeated_points_do_not_count_as_distinct() {
        let view = ViewTransform::identity(20, 20);
        let points = [[1.0, 1.0], [1.0, 1.0], [9.0, 9.0], [1.0, 1.0]];
        assert!(lasso_mask(&points, &view).is_err());
    }

    #[test]
    fn test_collinear_lasso_is_invalid() {
        let view = ViewTransform::identity(20, 20);
        let points = [[1.0, 1.0], [5.0, 5.0], [9.0, 9.0]];
        assert!(matches!(lasso_mask(&points, &view), Err(CutoutError::InvalidSelection(_))));
    }

    #[test]
    fn test_lasso_square_covers_exact_pixels() {
        let view = ViewTransform::identity(100, 100);
        let points = [[0.0, 0.0], [50.0, 0.0], [50.0, 50.0], [0.0, 50.0]];
        let mask = lasso_mask(&points, &view).expect("Square should rasterize");
        for (x, y, pixel) in mask.enumerate_pixels() {
            assert_eq!(pixel[0] == 255, x < 50 && y < 50, "pixel ({x},{y})");
        }
    }

    #[test]
    fn test_lasso_maps_display_points_to_native_space() {
        // Image shown at half size, offset by (10, 10) on screen
        let view = ViewTransform {
            offset: [10.0, 10.0],
            display_size: [50.0, 50.0],
            native_size: [100, 100],
        };
        let points = [[10.0, 10.0], [20.0, 10.0], [20.0, 20.0], [10.0, 20.0]];
        let mask = lasso_mask(&points, &view).expect("Square should rasterize");
        assert_eq!(count_selected(&mask), 20 * 20);
        assert_eq!(mask.get_pixel(19, 19)[0], 255);
        assert_eq!(mask.get_pixel(20, 20)[0], 0);
    }

    #[test]
    fn test_normal_brush_paints_solid_line() {
        let mut builder = BrushMaskBuilder::new(ViewTransform::identity(40, 20));
        let settings = BrushSettings { size: 6.0, ..Default::default() };
        builder.begin_stroke([5.0, 10.0], settings);
        let live = builder.extend_stroke([35.0, 10.0]).expect("Stroke in progress");

        assert_eq!(live.get_pixel(20, 10)[0], 255);
        assert_eq!(live.get_pixel(20, 12)[0], 255);
        assert_eq!(live.get_pixel(20, 16)[0], 0);
        assert_eq!(live.get_pixel(39, 10)[0], 0);

        let committed = builder.commit().expect("Non-empty brush mask");
        assert_eq!(committed, live);
    }

    #[test]
    fn test_overlapping_segments_do_not_stack_opacity() {
        let mut builder = BrushMaskBuilder::new(ViewTransform::identity(30, 30));
        let settings = BrushSettings { size: 8.0, opacity: 0.5, ..Default::default() };
        builder.begin_stroke([5.0, 15.0], settings);
        builder.extend_stroke([25.0, 15.0]).unwrap();
        let mask = builder.extend_stroke([5.0, 15.0]).unwrap();
        assert_eq!(mask.get_pixel(15, 15)[0], 128);
    }

    #[test]
    fn test_second_stroke_composites_over_first() {
        let mut builder = BrushMaskBuilder::new(ViewTransform::identity(30, 30));
        let first = BrushSettings { size: 8.0, opacity: 0.4, ..Default::default() };
        builder.begin_stroke([5.0, 15.0], first);
        builder.extend_stroke([25.0, 15.0]).unwrap();
        builder.end_stroke();
        assert_eq!(builder.mask().get_pixel(15, 15)[0], 102);

        let second = BrushSettings { opacity: 0.6, ..first };
        builder.begin_stroke([5.0, 15.0], second);
        let mask = builder.extend_stroke([25.0, 15.0]).unwrap();
        // 0.6 * 255 + 102 * 0.4
        assert_eq!(mask.get_pixel(15, 15)[0], 194);
    }

    #[test]
    fn test_erase_reduces_existing_coverage() {
        let mut builder = BrushMaskBuilder::new(ViewTransform::identity(30, 30));
        builder.begin_stroke([2.0, 15.0], BrushSettings { size: 10.0, ..Default::default() });
        builder.extend_stroke([28.0, 15.0]).unwrap();
        builder.end_stroke();

        let eraser = BrushSettings { size: 4.0, mode: CompositeMode::Erase, ..Default::default() };
        builder.begin_stroke([15.0, 2.0], eraser);
        let mask = builder.extend_stroke([15.0, 28.0]).unwrap();

        assert_eq!(mask.get_pixel(15, 15)[0], 0);
        assert_eq!(mask.get_pixel(8, 15)[0], 255);
    }

    #[test]
    fn test_soft_brush_has_feathered_edge() {
        let mut builder = BrushMaskBuilder::new(ViewTransform::identity(40, 40));
        let settings = BrushSettings { size: 20.0, hardness: 0.2, kind: BrushKind::Soft, ..Default::default() };
        let mask = builder.begin_stroke([20.0, 20.0], settings);

        assert_eq!(mask.get_pixel(19, 19)[0], 255);
        let edge = mask.get_pixel(27, 19)[0];
        assert!(edge > 0 && edge < 255, "expected soft edge, got {edge}");
        assert_eq!(mask.get_pixel(35, 19)[0], 0);
    }

    #[test]
    fn test_stroke_brush_places_discrete_dabs() {
        let mut builder = BrushMaskBuilder::new(ViewTransform::identity(60, 10));
        let settings = BrushSettings {
            size: 4.0,
            hardness: 1.0,
            spacing: 5.0,
            kind: BrushKind::Stroke,
            ..Default::default()
        };
        builder.begin_stroke([5.0, 5.0], settings);
        let mask = builder.extend_stroke([55.0, 5.0]).unwrap();

        // Dabs every 20px: centres at x = 5, 25, 45
        assert_eq!(mask.get_pixel(4, 4)[0], 255);
        assert_eq!(mask.get_pixel(24, 4)[0], 255);
        assert_eq!(mask.get_pixel(44, 4)[0], 255);
        assert_eq!(mask.get_pixel(15, 4)[0], 0);
        assert_eq!(mask.get_pixel(35, 4)[0], 0);
    }

    #[test]
    fn test_extend_without_stroke_is_precondition_failure() {
        let mut builder = BrushMaskBuilder::new(ViewTransform::identity(10, 10));
        assert!(matches!(builder.extend_stroke([1.0, 1.0]), Err(CutoutError::Precondition(_))));
    }

    #[test]
    fn test_empty_commit_is_invalid_selection() {
        let mut builder = BrushMaskBuilder::new(ViewTransform::identity(10, 10));
        assert!(matches!(builder.commit(), Err(CutoutError::InvalidSelection(_))));
    }

    #[test]
    fn test_paint_layer_carries_brush_colour() {
        let mut builder = BrushMaskBuilder::new(ViewTransform::identity(20, 20));
        let settings = BrushSettings { size: 4.0, color: [10, 200, 30], ..Default::default() };
        builder.begin_stroke([10.0, 10.0], settings);
        builder.extend_stroke([12.0, 10.0]).unwrap();
        assert_eq!(builder.current_points().map(|p| p.len()), Some(2));
        assert_eq!(*builder.paint_layer().get_pixel(10, 10), Rgba([10, 200, 30, 255]));

        builder.end_stroke();
        assert!(builder.current_points().is_none());
    }
}
