use std::sync::Arc;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use reqwest::blocking::Client as HttpClient;

use crate::api::{self, CategoryError, CategorySet, Classification, FetchError, ImageDescriptor};
use crate::media::{self, Picture};

pub trait CategoryService: Send + Sync {
    fn load_categories(&self) -> std::result::Result<CategorySet, CategoryError>;
}

pub trait ImageService: Send + Sync {
    fn random_image(
        &self,
        classification: Classification,
        category: &str,
    ) -> std::result::Result<ImageDescriptor, FetchError>;

    fn load_picture(&self, image: &ImageDescriptor) -> std::result::Result<Picture, FetchError>;
}

pub struct HttpCategoryService {
    client: Arc<api::Client>,
}

impl HttpCategoryService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CategoryService for HttpCategoryService {
    fn load_categories(&self) -> std::result::Result<CategorySet, CategoryError> {
        self.client.categories()
    }
}

pub struct HttpImageService {
    client: Arc<api::Client>,
}

impl HttpImageService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }

    fn http(&self) -> &HttpClient {
        self.client.http()
    }
}

impl ImageService for HttpImageService {
    fn random_image(
        &self,
        classification: Classification,
        category: &str,
    ) -> std::result::Result<ImageDescriptor, FetchError> {
        self.client.random_image(classification, category)
    }

    fn load_picture(&self, image: &ImageDescriptor) -> std::result::Result<Picture, FetchError> {
        media::download_picture(self.http(), self.client.user_agent(), &image.url)
    }
}

/// Offline stand-ins that produce generated pictures.
#[derive(Default)]
pub struct MockCategoryService;

impl CategoryService for MockCategoryService {
    fn load_categories(&self) -> std::result::Result<CategorySet, CategoryError> {
        Ok(CategorySet {
            sfw: vec!["sunset".into(), "ocean".into(), "forest".into()],
            nsfw: vec![],
        })
    }
}

#[derive(Default)]
pub struct MockImageService;

impl ImageService for MockImageService {
    fn random_image(
        &self,
        classification: Classification,
        category: &str,
    ) -> std::result::Result<ImageDescriptor, FetchError> {
        Ok(ImageDescriptor {
            url: format!("mock://{classification}/{category}.png"),
            file: Some(format!("{category}.png")),
        })
    }

    fn load_picture(&self, image: &ImageDescriptor) -> std::result::Result<Picture, FetchError> {
        mock_picture(&image.url).map_err(|err| FetchError::Decode(err.to_string()))
    }
}

const MOCK_PALETTES: [[[u8; 3]; 2]; 3] = [
    [[250, 179, 135], [137, 180, 250]],
    [[166, 227, 161], [30, 102, 245]],
    [[243, 139, 168], [249, 226, 175]],
];

fn mock_picture(seed: &str) -> Result<Picture> {
    let mut rng = rand::thread_rng();
    let palette = MOCK_PALETTES
        .choose(&mut rng)
        .context("mock palette empty")?;
    let (width, height) = (48u32, 32u32);
    let mut pixels = Vec::with_capacity((width * height * 4) as usize);
    let tilt = seed.len() as u32 % 7;
    for y in 0..height {
        for x in 0..width {
            let t = ((x + y * tilt) % (width + height)) as f32 / (width + height) as f32;
            for channel in 0..3 {
                let from = palette[0][channel] as f32;
                let to = palette[1][channel] as f32;
                pixels.push((from + (to - from) * t).round() as u8);
            }
            pixels.push(255);
        }
    }
    Picture::from_rgba(width, height, pixels).context("mock picture dimensions")
}
