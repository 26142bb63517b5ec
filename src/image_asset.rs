//! # Image Assets
//!
//! Visual assets are fixed application resources: GIF animations and PNG stills,
//! each exactly 16×16, loaded once at startup. A missing or malformed asset is a
//! startup-fatal condition, so every loader here returns [`AssetError`] and the
//! binary refuses to start on the first failure.
//!
//! ## Animation Model
//! An [`AnimatedImage`] is a non-empty ordered list of [`RasterFrame`]s plus a
//! cyclic cursor:
//! - [`AnimatedImage::next`] advances the cursor (wrapping) and returns that frame
//! - [`AnimatedImage::frame_at`] maps a position in `0.0..=1.0` onto the frame list,
//!   which is how the volume indicator picks a level from a speaker animation
//!
//! Frame storage is shared, so a pane factory can hand out fresh copies of a
//! preloaded asset without decoding the file again.

use crate::frame::{RasterFrame, Rgba};
use crate::{MATRIX_HEIGHT, MATRIX_WIDTH};
use image::{codecs::gif::GifDecoder, AnimationDecoder, ImageFormat, RgbaImage};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Failures while loading visual assets.
#[derive(Error, Debug)]
pub enum AssetError {
    /// The asset file could not be opened
    #[error("could not open image '{path}'")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The image container was malformed
    #[error("decoding failed on image '{path}'")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Neither `.gif` nor `.png`
    #[error("unknown image format: {0}")]
    UnknownFormat(PathBuf),

    /// Decoded image is not the size of the matrix
    #[error("image '{path}' is {width}x{height}, expected 16x16")]
    Dimensions {
        path: PathBuf,
        width: u32,
        height: u32,
    },

    /// An animation must have at least one frame
    #[error("image has no frames")]
    Empty,
}

/// Decoded, cyclable frame sequence backing one visual asset.
#[derive(Clone, Debug)]
pub struct AnimatedImage {
    frames: Arc<[RasterFrame]>,
    pos: usize,
}

impl AnimatedImage {
    /// Wrap an ordered frame list. Fails on an empty list.
    pub fn from_frames(frames: Vec<RasterFrame>) -> Result<Self, AssetError> {
        if frames.is_empty() {
            return Err(AssetError::Empty);
        }
        Ok(Self {
            frames: frames.into(),
            pos: 0,
        })
    }

    /// Single-frame image.
    pub fn still(frame: RasterFrame) -> Self {
        Self {
            frames: vec![frame].into(),
            pos: 0,
        }
    }

    /// Load a `.gif` (all frames) or `.png` (one frame) asset.
    ///
    /// The format is picked from the lower-cased path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let lower = path.to_string_lossy().to_lowercase();

        let image = if lower.contains(".gif") {
            load_gif(path)?
        } else if lower.contains(".png") {
            load_png(path)?
        } else {
            return Err(AssetError::UnknownFormat(path.to_path_buf()));
        };

        debug!(
            "Loaded image {} ({} frames)",
            path.display(),
            image.frame_count()
        );
        Ok(image)
    }

    /// Advance the cursor (wrapping) and return the frame it lands on.
    pub fn next(&mut self) -> RasterFrame {
        self.pos = (self.pos + 1) % self.frames.len();
        self.frames[self.pos].clone()
    }

    /// Frame for a normalised position: `floor(position * len)` clamped to the
    /// last frame. Negative and NaN positions map to the first frame.
    pub fn frame_at(&self, position: f64) -> RasterFrame {
        self.frames[self.index_at(position)].clone()
    }

    fn index_at(&self, position: f64) -> usize {
        let last = self.frames.len() - 1;
        if position.is_nan() || position <= 0.0 {
            return 0;
        }
        let index = (position * self.frames.len() as f64).floor();
        (index as usize).min(last)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<RasterFrame> {
        self.frames.get(index).cloned()
    }

    /// Index of the frame most recently returned by [`next`](Self::next).
    pub fn cursor(&self) -> usize {
        self.pos
    }

    /// Copy sharing the frames, with the cursor back at the first frame.
    pub fn rewound(&self) -> Self {
        Self {
            frames: Arc::clone(&self.frames),
            pos: 0,
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>, AssetError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| AssetError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn load_png(path: &Path) -> Result<AnimatedImage, AssetError> {
    let decoded = image::load(open(path)?, ImageFormat::Png).map_err(|source| {
        AssetError::Decode {
            path: path.to_path_buf(),
            source,
        }
    })?;

    Ok(AnimatedImage::still(to_frame(path, &decoded.to_rgba8())?))
}

fn load_gif(path: &Path) -> Result<AnimatedImage, AssetError> {
    let decode_err = |source| AssetError::Decode {
        path: path.to_path_buf(),
        source,
    };

    // The decoder composites each frame onto the full canvas for us
    let frames = GifDecoder::new(open(path)?)
        .map_err(decode_err)?
        .into_frames()
        .collect_frames()
        .map_err(decode_err)?;

    let frames = frames
        .iter()
        .map(|frame| to_frame(path, frame.buffer()))
        .collect::<Result<Vec<_>, _>>()?;

    AnimatedImage::from_frames(frames)
}

fn to_frame(path: &Path, image: &RgbaImage) -> Result<RasterFrame, AssetError> {
    let (width, height) = image.dimensions();
    if width as usize != MATRIX_WIDTH || height as usize != MATRIX_HEIGHT {
        return Err(AssetError::Dimensions {
            path: path.to_path_buf(),
            width,
            height,
        });
    }

    let pixels = image
        .pixels()
        .map(|p| Rgba::new(p[0], p[1], p[2], p[3]))
        .collect();

    // Dimensions were checked above, so the pixel count always matches
    RasterFrame::from_pixels(pixels).ok_or(AssetError::Dimensions {
        path: path.to_path_buf(),
        width,
        height,
    })
}

/// Name-keyed icons for the pairing view, e.g. `loading.gif`.
#[derive(Clone, Debug, Default)]
pub struct IconSet {
    icons: BTreeMap<String, AnimatedImage>,
}

impl IconSet {
    /// Load every `.gif` and `.png` file in `dir`.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, AssetError> {
        let dir = dir.as_ref();
        let open_err = |source| AssetError::Open {
            path: dir.to_path_buf(),
            source,
        };

        let mut icons = BTreeMap::new();
        for entry in fs::read_dir(dir).map_err(open_err)? {
            let path = entry.map_err(open_err)?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let lower = name.to_lowercase();
            if lower.ends_with(".gif") || lower.ends_with(".png") {
                icons.insert(name.to_string(), AnimatedImage::load(&path)?);
            }
        }

        info!("Loaded {} icons from {}", icons.len(), dir.display());
        Ok(Self { icons })
    }

    pub fn insert(&mut self, name: impl Into<String>, image: AnimatedImage) {
        self.icons.insert(name.into(), image);
    }

    /// Fresh copy of the named icon, cursor rewound.
    pub fn get(&self, name: &str) -> Option<AnimatedImage> {
        self.icons.get(name).map(AnimatedImage::rewound)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.icons.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}

/// Images used by the media pane.
#[derive(Clone, Debug)]
pub struct MediaImages {
    pub volume: AnimatedImage,
    pub mute: AnimatedImage,
    pub play: AnimatedImage,
    pub pause: AnimatedImage,
    pub stop: AnimatedImage,
    pub next: AnimatedImage,
}

/// Off/on image pair for toggle panes.
#[derive(Clone, Debug)]
pub struct ToggleImages {
    pub off: AnimatedImage,
    pub on: AnimatedImage,
}

/// The fixed image set behind the standard interactive panes.
#[derive(Clone, Debug)]
pub struct PaneAssets {
    pub heater: ToggleImages,
    pub fan: ToggleImages,
    pub light: ToggleImages,
    pub media: MediaImages,
}

impl PaneAssets {
    /// Load all pane images from `dir`. Any missing file fails the whole set.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, AssetError> {
        let dir = dir.as_ref();
        let load = |name: &str| AnimatedImage::load(dir.join(name));
        let toggle = |off: &str, on: &str| -> Result<ToggleImages, AssetError> {
            Ok(ToggleImages {
                off: load(off)?,
                on: load(on)?,
            })
        };

        let assets = Self {
            heater: toggle("heater-off.png", "heater-on.gif")?,
            fan: toggle("fan-off.png", "fan-on.gif")?,
            light: toggle("light-off.png", "light-on.png")?,
            media: MediaImages {
                volume: load("media-volume-speaker.gif")?,
                mute: load("media-volume-mute.png")?,
                play: load("media-play.png")?,
                pause: load("media-pause.png")?,
                stop: load("media-stop.png")?,
                next: load("media-next.png")?,
            },
        };

        info!("Loaded pane images from {}", dir.display());
        Ok(assets)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{codecs::gif::GifEncoder, Delay, Frame};
    use tempfile::TempDir;

    /// Test helper: solid 16×16 frame whose red channel encodes `tag`
    pub(crate) fn tagged_frame(tag: u8) -> RasterFrame {
        RasterFrame::filled(Rgba::opaque(tag, 0, 0))
    }

    /// Test helper: image of `n` frames tagged 0..n
    pub(crate) fn tagged_image(n: u8) -> AnimatedImage {
        AnimatedImage::from_frames((0..n).map(tagged_frame).collect()).unwrap()
    }

    fn tag_of(frame: &RasterFrame) -> u8 {
        frame.pixel(0, 0).unwrap().r
    }

    pub(crate) fn write_png(path: &Path, color: [u8; 4]) {
        RgbaImage::from_pixel(16, 16, image::Rgba(color))
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    pub(crate) fn write_gif(path: &Path, colors: &[[u8; 4]]) {
        let file = File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames = colors.iter().map(|c| {
            Frame::from_parts(
                RgbaImage::from_pixel(16, 16, image::Rgba(*c)),
                0,
                0,
                Delay::from_numer_denom_ms(100, 1),
            )
        });
        encoder.encode_frames(frames).unwrap();
    }

    #[test]
    fn test_single_frame_image_always_returns_same_frame() {
        let mut image = AnimatedImage::still(tagged_frame(7));
        for _ in 0..5 {
            assert_eq!(tag_of(&image.next()), 7);
            assert_eq!(image.cursor(), 0);
        }
    }

    #[test]
    fn test_five_frame_cursor_sequence() {
        let mut image = tagged_image(5);
        let positions: Vec<usize> = (0..5)
            .map(|_| {
                image.next();
                image.cursor()
            })
            .collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 0]);
    }

    #[test]
    fn test_next_is_cyclic() {
        for n in 1..=6 {
            let mut image = tagged_image(n);
            let first = image.next();
            for _ in 1..n {
                image.next();
            }
            assert_eq!(image.next(), first, "{n} frames should cycle");
        }
    }

    #[test]
    fn test_frame_at_bounds_and_monotonic() {
        let image = tagged_image(4);
        assert_eq!(tag_of(&image.frame_at(0.0)), 0);
        assert_eq!(tag_of(&image.frame_at(1.0)), 3);
        assert_eq!(tag_of(&image.frame_at(0.5)), 2);
        assert_eq!(tag_of(&image.frame_at(-1.0)), 0);
        assert_eq!(tag_of(&image.frame_at(f64::NAN)), 0);
        assert_eq!(tag_of(&image.frame_at(3.0)), 3);

        let mut last = 0;
        for step in 0..=100 {
            let tag = tag_of(&image.frame_at(step as f64 / 100.0));
            assert!(tag >= last, "frame_at must not go backwards");
            last = tag;
        }
    }

    #[test]
    fn test_empty_frames_rejected() {
        assert!(matches!(
            AnimatedImage::from_frames(vec![]),
            Err(AssetError::Empty)
        ));
    }

    #[test]
    fn test_load_png_and_gif() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("still.png");
        let gif = dir.path().join("anim.gif");
        write_png(&png, [0, 255, 0, 255]);
        write_gif(&gif, &[[255, 0, 0, 255], [0, 0, 255, 255], [255, 255, 255, 255]]);

        let still = AnimatedImage::load(&png).unwrap();
        assert_eq!(still.frame_count(), 1);
        assert_eq!(still.frame(0).unwrap().pixel(4, 4), Some(Rgba::GREEN));

        let anim = AnimatedImage::load(&gif).unwrap();
        assert_eq!(anim.frame_count(), 3);
    }

    #[test]
    fn test_load_failures() {
        let dir = TempDir::new().unwrap();

        let missing = AnimatedImage::load(dir.path().join("missing.png"));
        assert!(matches!(missing, Err(AssetError::Open { .. })));
        let message = missing.unwrap_err().to_string();
        assert!(message.starts_with("could not open image"));
        assert!(!message.contains("os error"));

        let bmp = AnimatedImage::load(dir.path().join("icon.bmp"));
        assert!(matches!(bmp, Err(AssetError::UnknownFormat(_))));

        let garbage = dir.path().join("garbage.png");
        fs::write(&garbage, b"not a png").unwrap();
        assert!(matches!(
            AnimatedImage::load(&garbage),
            Err(AssetError::Decode { .. })
        ));

        let big = dir.path().join("big.png");
        RgbaImage::from_pixel(32, 8, image::Rgba([1, 2, 3, 255]))
            .save_with_format(&big, ImageFormat::Png)
            .unwrap();
        assert!(matches!(
            AnimatedImage::load(&big),
            Err(AssetError::Dimensions {
                width: 32,
                height: 8,
                ..
            })
        ));
    }

    #[test]
    fn test_icon_set_loads_directory() {
        let dir = TempDir::new().unwrap();
        write_gif(&dir.path().join("loading.gif"), &[[0, 0, 255, 255], [0, 0, 0, 255]]);
        write_png(&dir.path().join("tick.png"), [0, 255, 0, 255]);
        fs::write(dir.path().join("README.txt"), b"ignored").unwrap();

        let icons = IconSet::load_dir(dir.path()).unwrap();
        assert_eq!(icons.len(), 2);
        assert_eq!(icons.get("loading.gif").unwrap().frame_count(), 2);
        assert!(icons.get("tick.png").is_some());
        assert!(icons.get("README.txt").is_none());
    }
}
