//! Contracts of the external collaborators the session talks to.
//!
//! Network clients live outside this crate; anything that can produce a
//! [`Segmentation`], an inpainted image or a prompt match plugs in here.

use std::future::Future;

use cutout::{InpaintPreparation, PromptMatch, Segmentation, encode_png, match_labels};
use image::{DynamicImage, RgbaImage};

use crate::error::{ServiceError, ServiceErrorKind};

pub trait Segmenter: Send + Sync {
    /// Detect labelled regions in `image` and classify it as face or landscape
    fn segment(&self, image: &RgbaImage) -> impl Future<Output = Result<Segmentation, ServiceError>> + Send;
}

/// Square, opaque PNG inputs for an inpainting model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InpaintRequest {
    pub size: u32,
    pub image_png: Vec<u8>,
    pub mask_png: Vec<u8>,
    pub prompt: String,
}

impl InpaintRequest {
    pub fn new(preparation: &InpaintPreparation, prompt: impl Into<String>) -> Result<Self, ServiceError> {
        let encode = |image: DynamicImage| {
            encode_png(&image).map_err(|err| ServiceError::new(ServiceErrorKind::Unknown, err.to_string()))
        };
        Ok(Self {
            size: preparation.placement.size,
            image_png: encode(DynamicImage::ImageRgb8(preparation.image.clone()))?,
            mask_png: encode(DynamicImage::ImageRgb8(preparation.mask.clone()))?,
            prompt: prompt.into(),
        })
    }
}

pub trait Inpainter: Send + Sync {
    /// Encoded result image (any decodable format), same square size as the request
    fn inpaint(&self, request: &InpaintRequest) -> impl Future<Output = Result<Vec<u8>, ServiceError>> + Send;
}

pub trait PromptParser: Send + Sync {
    fn parse_prompt(
        &self,
        text: &str,
        labels: &[String],
    ) -> impl Future<Output = Result<PromptMatch, ServiceError>> + Send;
}

/// Offline parser: the deterministic keyword and synonym table
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordPromptParser;

impl PromptParser for KeywordPromptParser {
    fn parse_prompt(
        &self,
        text: &str,
        labels: &[String],
    ) -> impl Future<Output = Result<PromptMatch, ServiceError>> + Send {
        std::future::ready(Ok(match_labels(text, labels)))
    }
}
