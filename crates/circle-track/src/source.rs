//! Frame sources feeding the tracking loop.

use image::RgbImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("cannot read frame directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frame {index} is {got_width}x{got_height}, expected {width}x{height}")]
    FrameSize {
        index: usize,
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
    #[error("no frames found in {0}")]
    Empty(PathBuf),
}

/// One acquired frame with its acquisition time (ms since the Unix epoch).
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp_ms: u64,
}

impl Frame {
    pub fn new(image: RgbImage, timestamp_ms: u64) -> Self {
        Self {
            image,
            timestamp_ms,
        }
    }

    /// Stamp `image` with the current wall-clock time.
    pub fn now(image: RgbImage) -> Self {
        Self::new(image, unix_millis())
    }
}

pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Supplier of frames; `Ok(None)` marks the end of the stream.
pub trait VideoSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "pgm", "ppm", "tif", "tiff"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files of a directory, played back in file-name order.
///
/// Frames are decoded lazily. Every frame must match the configured size.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: VecDeque<PathBuf>,
    width: u32,
    height: u32,
    index: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>, width: u32, height: u32) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SourceError::Directory {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && is_image(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(SourceError::Empty(dir.to_path_buf()));
        }
        paths.sort();
        log::info!("frame sequence: {} images from {}", paths.len(), dir.display());
        Ok(Self {
            paths: paths.into(),
            width,
            height,
            index: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl VideoSource for ImageSequenceSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let index = self.index;
        self.index += 1;
        let image = image::open(&path)
            .map_err(|source| SourceError::Decode {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        check_size(index, &image, self.width, self.height)?;
        Ok(Some(Frame::now(image)))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

fn check_size(index: usize, image: &RgbImage, width: u32, height: u32) -> Result<(), SourceError> {
    let (got_width, got_height) = image.dimensions();
    if (got_width, got_height) != (width, height) {
        return Err(SourceError::FrameSize {
            index,
            width,
            height,
            got_width,
            got_height,
        });
    }
    Ok(())
}

/// Frames held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<Frame>,
    width: u32,
    height: u32,
    index: usize,
}

impl MemorySource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frames: VecDeque::new(),
            width,
            height,
            index: 0,
        }
    }

    /// Build from images, stamped with consecutive millisecond timestamps.
    pub fn from_images(width: u32, height: u32, images: impl IntoIterator<Item = RgbImage>) -> Self {
        let mut source = Self::new(width, height);
        for (i, image) in images.into_iter().enumerate() {
            source.push(Frame::new(image, i as u64));
        }
        source
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl VideoSource for MemorySource {
    fn read_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(frame) = self.frames.pop_front() else {
            return Ok(None);
        };
        check_size(self.index, &frame.image, self.width, self.height)?;
        self.index += 1;
        Ok(Some(frame))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    #[test]
    fn memory_source_plays_frames_in_order() {
        let mut src = MemorySource::from_images(
            4,
            3,
            (0..3u8).map(|v| RgbImage::from_pixel(4, 3, Rgb([v, v, v]))),
        );
        assert_eq!(src.len(), 3);
        for expected in 0..3u8 {
            let frame = src.read_frame().unwrap().unwrap();
            assert_eq!(frame.timestamp_ms, expected as u64);
            assert_eq!(frame.image.get_pixel(0, 0).0[0], expected);
        }
        assert!(src.read_frame().unwrap().is_none());
    }

    #[test]
    fn memory_source_rejects_wrong_size() {
        let mut src = MemorySource::new(4, 3);
        src.push(Frame::new(RgbImage::new(5, 3), 0));
        assert!(matches!(
            src.read_frame(),
            Err(SourceError::FrameSize { got_width: 5, .. })
        ));
    }

    #[test]
    fn image_sequence_reads_sorted_images() {
        let dir = tempdir().unwrap();
        for (name, v) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            RgbImage::from_pixel(8, 6, Rgb([v, v, v]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut src = ImageSequenceSource::open(dir.path(), 8, 6).unwrap();
        assert_eq!(src.remaining(), 3);
        let values: Vec<u8> = std::iter::from_fn(|| src.read_frame().unwrap())
            .map(|f| f.image.get_pixel(0, 0).0[0])
            .collect();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn image_sequence_checks_frame_size() {
        let dir = tempdir().unwrap();
        RgbImage::new(8, 6).save(dir.path().join("0.png")).unwrap();
        let mut src = ImageSequenceSource::open(dir.path(), 16, 12).unwrap();
        assert!(matches!(
            src.read_frame(),
            Err(SourceError::FrameSize { index: 0, .. })
        ));
    }

    #[test]
    fn empty_or_missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path(), 8, 6),
            Err(SourceError::Empty(_))
        ));
        assert!(matches!(
            ImageSequenceSource::open(dir.path().join("missing"), 8, 6),
            Err(SourceError::Directory { .. })
        ));
    }
}
