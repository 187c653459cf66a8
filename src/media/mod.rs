//! Media operations module
//!
//! This module is split into several submodules:
//! - `imaging`: local compositing and resizing with the `image` crate
//! - `removebg`: background removal through the remove.bg API
//! - `video`: short-video retrieval with yt-dlp

pub mod imaging;
pub mod removebg;
pub mod video;

use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::session::{BackgroundColor, Platform};
use crate::staging::StagedFile;

pub use removebg::RemoveBgClient;
pub use video::VideoFetcher;

/// Stateless media capabilities the state machine drives
#[async_trait]
pub trait MediaOperations: Send + Sync {
    /// Cut the subject out of `image`, returning an image with alpha
    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, ServiceError>;

    /// Place a cut-out foreground over a background picture
    async fn composite(&self, foreground: &[u8], background: &[u8]) -> Result<Vec<u8>, ServiceError>;

    /// Place a cut-out foreground over a solid color
    async fn fill_background(
        &self,
        foreground: &[u8],
        color: &BackgroundColor,
    ) -> Result<Vec<u8>, ServiceError>;

    async fn resize(&self, image: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ServiceError>;

    async fn fetch_video(&self, url: &str, platform: Platform) -> Result<StagedFile, ServiceError>;
}

/// Production media operations: remove.bg for segmentation, the `image`
/// crate on the blocking pool for pixel work, yt-dlp for videos
#[derive(Debug, Clone)]
pub struct LocalMediaOperations {
    remover: RemoveBgClient,
    fetcher: VideoFetcher,
}

impl LocalMediaOperations {
    pub fn new(remover: RemoveBgClient, fetcher: VideoFetcher) -> Self {
        Self { remover, fetcher }
    }
}

#[async_trait]
impl MediaOperations for LocalMediaOperations {
    async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, ServiceError> {
        if !imaging::is_supported_image(image) {
            return Err(ServiceError::UnsupportedImage);
        }
        self.remover.remove_background(image).await
    }

    async fn composite(&self, foreground: &[u8], background: &[u8]) -> Result<Vec<u8>, ServiceError> {
        let foreground = foreground.to_vec();
        let background = background.to_vec();
        tokio::task::spawn_blocking(move || imaging::composite_png(&foreground, &background)).await?
    }

    async fn fill_background(
        &self,
        foreground: &[u8],
        color: &BackgroundColor,
    ) -> Result<Vec<u8>, ServiceError> {
        let foreground = foreground.to_vec();
        let rgb = color.rgb();
        tokio::task::spawn_blocking(move || imaging::fill_png(&foreground, rgb)).await?
    }

    async fn resize(&self, image: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ServiceError> {
        let image = image.to_vec();
        tokio::task::spawn_blocking(move || imaging::resize_png(&image, width, height)).await?
    }

    async fn fetch_video(&self, url: &str, platform: Platform) -> Result<StagedFile, ServiceError> {
        self.fetcher.fetch(url, platform).await
    }
}
