//! Segmentation output: detected regions, image classification and the
//! keyword fallback used to match free-text prompts against region labels.

use std::{
    collections::{HashMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
    sync::Arc,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    error::Result,
    io::{decode_base64_payload, decode_mask},
    types::{Mask, NormalizedBox},
};

/// A labelled mask produced by the segmentation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedRegion {
    pub label: String,
    /// Base64 PNG, optionally as a data URL
    pub mask: String,
    pub bounds: NormalizedBox,
}

impl DetectedRegion {
    pub fn decode_mask(&self) -> Result<Mask> {
        decode_mask(&decode_base64_payload(&self.mask)?)
    }

    fn content_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.mask.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImageType {
    /// Close-up portrait, routed to face parsing
    Face,
    /// Everything else, routed to panoptic segmentation
    Landscape,
}

/// Face mode when any detected person covers more than `face_area_ratio` of the image
pub fn classify_image_type(person_boxes: &[NormalizedBox], face_area_ratio: f32) -> ImageType {
    if person_boxes.iter().any(|b| b.area() > face_area_ratio) {
        ImageType::Face
    } else {
        ImageType::Landscape
    }
}

/// Result of one segmentation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Segmentation {
    pub regions: Vec<DetectedRegion>,
    pub image_type: ImageType,
}

impl Segmentation {
    pub fn labels(&self) -> Vec<String> {
        self.regions.iter().map(|r| r.label.clone()).collect()
    }

    pub fn find(&self, label: &str) -> Option<&DetectedRegion> {
        self.regions.iter().find(|r| r.label.eq_ignore_ascii_case(label))
    }
}

/// Decoded region masks keyed by the hash of their encoded payload.
#[derive(Debug, Default)]
pub struct MaskCache {
    entries: HashMap<u64, Arc<Mask>>,
}

impl MaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_decode(&mut self, region: &DetectedRegion) -> Result<Arc<Mask>> {
        let key = region.content_key();
        if let Some(mask) = self.entries.get(&key) {
            return Ok(Arc::clone(mask));
        }
        let mask = Arc::new(region.decode_mask()?);
        self.entries.insert(key, Arc::clone(&mask));
        Ok(mask)
    }

    /// Drop everything, e.g. when a new segmentation replaces the old regions
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Labels picked out of a free-text prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PromptMatch {
    pub labels: Vec<String>,
    /// 0.0..=1.0
    pub confidence: f32,
}

impl PromptMatch {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

const SYNONYMS: &[(&str, &[&str])] = &[
    ("person", &["person", "people", "man", "woman", "human", "someone", "guy", "girl", "boy", "child", "me"]),
    ("face", &["face", "skin", "head"]),
    ("hair", &["hair", "hairstyle"]),
    ("sky", &["sky", "clouds", "cloud"]),
    ("tree", &["tree", "trees", "forest", "plant", "plants"]),
    ("grass", &["grass", "lawn", "field"]),
    ("water", &["water", "sea", "ocean", "lake", "river"]),
    ("building", &["building", "house", "wall", "walls"]),
    ("road", &["road", "street", "pavement"]),
    ("car", &["car", "cars", "vehicle", "automobile"]),
    ("dog", &["dog", "puppy"]),
    ("cat", &["cat", "kitten"]),
    ("background", &["background", "bg", "backdrop", "scenery"]),
];

const DIRECT_CONFIDENCE: f32 = 1.0;
const SYNONYM_CONFIDENCE: f32 = 0.7;

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Deterministic keyword + synonym matching of `text` against `labels`.
///
/// A label matches directly when one of its words appears in the text, or
/// through the synonym table when a text word is a synonym of a label word.
pub fn match_labels(text: &str, labels: &[String]) -> PromptMatch {
    let text_words = words(text);
    let mut matched = Vec::new();
    let mut confidence: f32 = 0.0;

    for label in labels {
        let label_words = words(label);
        let direct = label_words.iter().any(|w| text_words.contains(w));
        let via_synonym = !direct
            && SYNONYMS.iter().any(|(canonical, synonyms)| {
                let label_has = label_words
                    .iter()
                    .any(|w| w == canonical || synonyms.contains(&w.as_str()));
                label_has && text_words.iter().any(|w| synonyms.contains(&w.as_str()))
            });

        if direct || via_synonym {
            matched.push(label.clone());
            let score = if direct { DIRECT_CONFIDENCE } else { SYNONYM_CONFIDENCE };
            confidence = confidence.max(score);
        }
    }

    PromptMatch { labels: matched, confidence }
}

/// Inpainting prompt describing what should continue into the vacated area
pub fn derive_fill_prompt(labels: &[String]) -> String {
    let cleaned: Vec<String> = labels
        .iter()
        .map(|l| words(l).join(" "))
        .filter(|l| !l.is_empty())
        .collect();
    if cleaned.is_empty() {
        return "Fill the empty area so it blends seamlessly with its surroundings".to_string();
    }
    format!(
        "Fill the empty area with {} that blends seamlessly with its surroundings",
        cleaned.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::encode_base64_png;
    use image::{DynamicImage, GrayImage, Luma};

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn region(label: &str) -> DetectedRegion {
        let mask = GrayImage::from_fn(4, 4, |x, _| Luma([if x < 2 { 255 } else { 0 }]));
        DetectedRegion {
            label: label.to_string(),
            mask: encode_base64_png(&DynamicImage::ImageLuma8(mask)).unwrap(),
            bounds: NormalizedBox { xmin: 0.0, ymin: 0.0, xmax: 0.5, ymax: 1.0 },
        }
    }

    #[test]
    fn test_classify_by_person_area() {
        let big = NormalizedBox { xmin: 0.1, ymin: 0.1, xmax: 0.7, ymax: 0.9 };
        let small = NormalizedBox { xmin: 0.1, ymin: 0.1, xmax: 0.3, ymax: 0.3 };
        assert_eq!(classify_image_type(&[big], 0.2), ImageType::Face);
        assert_eq!(classify_image_type(&[small], 0.2), ImageType::Landscape);
        assert_eq!(classify_image_type(&[], 0.2), ImageType::Landscape);
        assert_eq!(ImageType::Face.to_string(), "face");
    }

    #[test]
    fn test_mask_cache_decodes_once() {
        let mut cache = MaskCache::new();
        let first = cache.get_or_decode(&region("cat")).unwrap();
        let second = cache.get_or_decode(&region("dog")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(first.get_pixel(0, 0)[0], 255);

        cache.invalidate();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_bad_mask_payload_fails_to_decode() {
        let mut bad = region("cat");
        bad.mask = "aGVsbG8=".to_string();
        assert!(bad.decode_mask().is_err());
    }

    #[test]
    fn test_match_labels_direct_and_synonym() {
        let available = labels(&["person", "sky-other-merged", "tree", "background_wall"]);

        let direct = match_labels("remove the tree please", &available);
        assert_eq!(direct.labels, vec!["tree"]);
        assert_eq!(direct.confidence, DIRECT_CONFIDENCE);

        let synonym = match_labels("cut out the woman and the clouds", &available);
        assert_eq!(synonym.labels, vec!["person", "sky-other-merged"]);
        assert_eq!(synonym.confidence, SYNONYM_CONFIDENCE);

        let none = match_labels("something else entirely", &available);
        assert!(none.is_empty());
        assert_eq!(none.confidence, 0.0);
    }

    #[test]
    fn test_derive_fill_prompt() {
        assert!(derive_fill_prompt(&labels(&["sky-other-merged", "grass"])).contains("sky other merged, grass"));
        assert!(derive_fill_prompt(&[]).starts_with("Fill the empty area"));
    }

    #[test]
    fn test_segmentation_lookup_ignores_case() {
        let segmentation = Segmentation { regions: vec![region("Person")], image_type: ImageType::Landscape };
        assert!(segmentation.find("person").is_some());
        assert_eq!(segmentation.labels(), vec!["Person"]);
    }
}
