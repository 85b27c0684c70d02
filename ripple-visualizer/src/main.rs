use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use clap::Parser;
use dashmap::DashMap;
use env_logger::Builder;
use image::{ImageBuffer, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, LevelFilter};
use minimp4::Mp4Muxer;
use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate};
use openh264::formats::YUVBuffer;
use palette::Srgb;
use rayon::prelude::*;
use ripple_common::{DriverConfig, FieldSnapshot, RippleConfig, ShadingConfig};
use std::fs::{self, File};
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input snapshot file path (.bin, written with format = "bincode")
    #[arg(short, long)]
    input: PathBuf,

    /// Output video file path (.mp4)
    #[arg(short, long, default_value = "ripple_video.mp4")]
    output: PathBuf,

    /// Also write every frame as a PNG into this directory
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Skip video encoding (useful together with --frames-dir)
    #[arg(long, default_value_t = false)]
    no_video: bool,

    /// Element whose snapshots are rendered (defaults to the first one in the file)
    #[arg(short, long)]
    element: Option<String>,

    /// Width of the output in pixels (defaults to the recorded container width)
    #[arg(long)]
    width: Option<u32>,

    /// Height of the output in pixels (defaults to the recorded container height)
    #[arg(long)]
    height: Option<u32>,

    /// Frames per second for the output video
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Optional path to the config.toml used for the run (shading and titles)
    #[arg(long)]
    config: Option<PathBuf>,

    /// TrueType font used for titles; titles are skipped without one
    #[arg(long)]
    font: Option<PathBuf>,

    /// Background colour the overlay is composited over
    #[arg(long, default_value = "black")]
    bg_color: String,

    /// Chunk size for parallel processing
    #[arg(long, default_value_t = 10)]
    chunk_size: usize,
}

// Color definitions for named colors (RGB format)
const COLOR_MAP: &[(&str, [u8; 3])] = &[
    ("black", [0, 0, 0]),
    ("white", [255, 255, 255]),
    ("navy", [10, 20, 60]),
    ("ink", [8, 12, 28]),
    ("gray", [128, 128, 128]),
];

/// Titles drawn over the overlay, with the font to draw them in.
struct Titles {
    main: String,
    sub: String,
    font: FontVec,
}

// A rendered frame with its position in the sequence
struct Frame {
    index: usize,
    image: RgbaImage,
}

/// Parse a color name to RGB values
fn parse_color(color_name: &str) -> [u8; 3] {
    for &(name, color) in COLOR_MAP {
        if name.eq_ignore_ascii_case(color_name) {
            return color;
        }
    }
    warn!("Color '{}' not recognized, using black.", color_name);
    [0, 0, 0]
}

/// Rounds a dimension down to the even size the H.264 encoder needs.
fn even_dimension(v: u32) -> u32 {
    (v & !1).max(2)
}

/// Nearest texel of a snapshot at texture coordinates (u, v), v pointing up.
fn sample_snapshot(snapshot: &FieldSnapshot, u: f32, v: f32) -> (f32, f32) {
    let w = snapshot.field_width.max(1) as usize;
    let h = snapshot.field_height.max(1) as usize;
    let x = ((u * w as f32) as usize).min(w - 1);
    let y = ((v * h as f32) as usize).min(h - 1);
    let idx = y * w + x;
    (
        snapshot.height.get(idx).copied().unwrap_or(0.0),
        snapshot.previous_height.get(idx).copied().unwrap_or(0.0),
    )
}

/// Shade one snapshot into an image the size of the output.
fn draw_frame(
    snapshot: &FieldSnapshot,
    frame_index: usize,
    width: u32,
    height: u32,
    shading: &ShadingConfig,
    background: [u8; 3],
    titles: Option<&Titles>,
) -> Frame {
    let bg = [
        background[0] as f32 / 255.0,
        background[1] as f32 / 255.0,
        background[2] as f32 / 255.0,
    ];

    let mut image = ImageBuffer::from_fn(width, height, |px, py| {
        let u = (px as f32 + 0.5) / width as f32;
        // Image rows run top-down, field rows bottom-up.
        let v = 1.0 - (py as f32 + 0.5) / height as f32;
        let (h, prev) = sample_snapshot(snapshot, u, v);
        let [r, g, b] = shading.composite(shading.shade(h, prev), bg);
        let rgb: Srgb<u8> = Srgb::new(r, g, b).into_format();
        Rgba([rgb.red, rgb.green, rgb.blue, 255])
    });

    if let Some(titles) = titles {
        // Choose text color based on background luminance
        let bg_luminance =
            0.299 * background[0] as f32 + 0.587 * background[1] as f32 + 0.114 * background[2] as f32;
        let text_color = if bg_luminance > 128.0 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        };
        draw_text_mut(&mut image, text_color, 16, 16, PxScale::from(32.0), &titles.font, &titles.main);
        draw_text_mut(&mut image, text_color, 16, 56, PxScale::from(18.0), &titles.font, &titles.sub);
    }

    Frame {
        index: frame_index,
        image,
    }
}

/// YUV 4:2:0 planes of an image with even dimensions (BT.601).
fn rgb_to_yuv420(image: &RgbaImage) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let luma_len = width * height;
    let chroma_w = width / 2;
    let chroma_len = chroma_w * (height / 2);

    let mut yuv = vec![0u8; luma_len + 2 * chroma_len];
    let (luma, chroma) = yuv.split_at_mut(luma_len);
    let (u_plane, v_plane) = chroma.split_at_mut(chroma_len);

    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b, _] = pixel.0.map(|c| c as f32);
        luma[y as usize * width + x as usize] = (0.299 * r + 0.587 * g + 0.114 * b).round() as u8;
    }

    for cy in 0..height / 2 {
        for cx in 0..chroma_w {
            let (mut sum_u, mut sum_v) = (0.0f32, 0.0f32);
            for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                let pixel = image.get_pixel((cx * 2 + dx) as u32, (cy * 2 + dy) as u32);
                let [r, g, b, _] = pixel.0.map(|c| c as f32);
                sum_u += -0.169 * r - 0.331 * g + 0.5 * b + 128.0;
                sum_v += 0.5 * r - 0.419 * g - 0.081 * b + 128.0;
            }
            u_plane[cy * chroma_w + cx] = (sum_u / 4.0).round() as u8;
            v_plane[cy * chroma_w + cx] = (sum_v / 4.0).round() as u8;
        }
    }
    yuv
}

/// Reads a count-prefixed bincode snapshot file, keeping one element's snapshots.
///
/// With no element given, the element of the first snapshot is used.
fn read_snapshots(path: &Path, element: Option<&str>) -> Result<Vec<FieldSnapshot>> {
    let input_file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let mut reader = BufReader::new(input_file);

    let snapshot_count: u32 = bincode::deserialize_from(&mut reader)
        .context("Failed to read snapshot count from header")?;
    info!("Found {} snapshots in the file", snapshot_count);

    let mut selected: Option<String> = element.map(str::to_string);
    let mut snapshots = Vec::new();
    for i in 0..snapshot_count {
        let snapshot: FieldSnapshot = match bincode::deserialize_from(&mut reader) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Error deserializing snapshot {}: {}", i, e);
                break;
            }
        };
        let wanted = selected.get_or_insert_with(|| snapshot.element_id.clone());
        if snapshot.element_id == *wanted {
            snapshots.push(snapshot);
        }
    }
    Ok(snapshots)
}

/// Title settings of an element, from the run config.
fn element_options(config_path: &Path, element_id: &str) -> Result<DriverConfig> {
    let config = RippleConfig::load(config_path)?;
    let element = config
        .element(element_id)
        .with_context(|| format!("Element '{}' is not in {}", element_id, config_path.display()))?;
    Ok(DriverConfig::from_dataset(&element.data))
}

fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read font {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow::anyhow!("Invalid font {}: {}", path.display(), e))
}

fn progress_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn encode_video(frames: &[RgbaImage], width: u32, height: u32, fps: u32, description: &str) -> Result<Vec<u8>> {
    let mut encoder = Encoder::with_api_config(
        openh264::OpenH264API::from_source(),
        EncoderConfig::new()
            .max_frame_rate(FrameRate::from_hz(fps as f32))
            .bitrate(BitRate::from_bps(5_000_000)),
    )
    .context("Failed to initialize H.264 encoder")?;

    let encode_progress = ProgressBar::new(frames.len() as u64);
    encode_progress.set_style(progress_style(
        "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} encoded ({percent}%) [{eta}]",
    ));

    let mut h264_data = Vec::new();
    for (i, image) in frames.iter().enumerate() {
        let yuv_source = YUVBuffer::from_vec(rgb_to_yuv420(image), width as usize, height as usize);
        match encoder.encode(&yuv_source) {
            Ok(bitstream) => bitstream.write_vec(&mut h264_data),
            Err(e) => error!("Error encoding frame {}: {}", i, e),
        }
        encode_progress.inc(1);
    }
    encode_progress.finish_with_message("Encoding done");

    let mut video_buffer = Cursor::new(Vec::new());
    let mut mp4muxer = Mp4Muxer::new(&mut video_buffer);
    mp4muxer.init_video(width as i32, height as i32, false, description);
    mp4muxer.write_video(&h264_data);
    mp4muxer.close();

    video_buffer.seek(SeekFrom::Start(0))?;
    let mut video_bytes = Vec::new();
    video_buffer.read_to_end(&mut video_bytes)?;
    Ok(video_bytes)
}

fn main() -> Result<()> {
    let args = Args::parse();
    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    Builder::from_default_env().filter(None, LevelFilter::Info).init();

    info!("Starting Ripple Visualizer...");
    info!("Input file: {}", args.input.display());

    let snapshots = read_snapshots(&args.input, args.element.as_deref())?;
    let Some(first) = snapshots.first() else {
        warn!("Input file contains no snapshots for the selected element. Exiting.");
        return Ok(());
    };
    let element_id = first.element_id.clone();
    info!("Rendering {} snapshots of element '{}'", snapshots.len(), element_id);

    // --- Shading and titles ---
    let (shading, options) = match &args.config {
        Some(config_path) => match RippleConfig::load(config_path) {
            Ok(config) => {
                info!("Loaded shading from {}", config_path.display());
                let options = element_options(config_path, &element_id).unwrap_or_else(|e| {
                    warn!("{}. Using default titles.", e);
                    DriverConfig::default()
                });
                (config.shading, options)
            }
            Err(e) => {
                warn!("Failed to load config file '{}': {}. Using defaults.", config_path.display(), e);
                (ShadingConfig::default(), DriverConfig::default())
            }
        },
        None => (ShadingConfig::default(), DriverConfig::default()),
    };

    let titles = match (&args.font, options.show_titles) {
        (Some(font_path), true) => match load_font(font_path) {
            Ok(font) => Some(Titles {
                main: options.main_title.clone(),
                sub: options.sub_title.clone(),
                font,
            }),
            Err(e) => {
                warn!("{}. Titles will not be drawn.", e);
                None
            }
        },
        (None, true) => {
            info!("No --font given; titles will not be drawn.");
            None
        }
        (_, false) => None,
    };

    // --- Output dimensions ---
    let width = even_dimension(args.width.unwrap_or(first.surface_width.round().max(2.0) as u32));
    let height = even_dimension(args.height.unwrap_or(first.surface_height.round().max(2.0) as u32));
    info!("Output dimensions: {}x{} px", width, height);
    let background = parse_color(&args.bg_color);

    // --- Render frames in parallel ---
    let start_time = Instant::now();
    let progress_bar = ProgressBar::new(snapshots.len() as u64);
    progress_bar.set_style(progress_style(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]",
    ));

    let frames_map: DashMap<usize, RgbaImage> = DashMap::new();
    let chunk_size = args.chunk_size.max(1);
    snapshots
        .par_chunks(chunk_size)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            for (i, snapshot) in chunk.iter().enumerate() {
                let frame = draw_frame(
                    snapshot,
                    chunk_idx * chunk_size + i,
                    width,
                    height,
                    &shading,
                    background,
                    titles.as_ref(),
                );
                frames_map.insert(frame.index, frame.image);
            }
            progress_bar.inc(chunk.len() as u64);
        });
    progress_bar.finish_with_message(format!("Rendered {} frames", frames_map.len()));

    let mut sorted_keys: Vec<usize> = frames_map.iter().map(|entry| *entry.key()).collect();
    sorted_keys.sort_unstable();
    let frames: Vec<RgbaImage> = sorted_keys
        .into_iter()
        .filter_map(|key| frames_map.remove(&key).map(|(_, image)| image))
        .collect();

    // --- PNG frames ---
    if let Some(dir) = &args.frames_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        frames.par_iter().enumerate().try_for_each(|(i, image)| {
            let path = dir.join(format!("{}_{:05}.png", element_id, i));
            image
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))
        })?;
        info!("Wrote {} PNG frames to {}", frames.len(), dir.display());
    }

    // --- Video ---
    if args.no_video {
        info!("Skipping video encoding (--no-video).");
    } else {
        let description = format!("Fluid ripple overlay - {}", element_id);
        let video_bytes = encode_video(&frames, width, height, args.fps, &description)?;
        fs::write(&args.output, &video_bytes)
            .with_context(|| format!("Failed to write video file to {}", args.output.display()))?;
        info!("Output saved to: {}", args.output.display());
    }

    let duration = start_time.elapsed();
    info!(
        "Visualization completed in {:.2?} ({:.1} frames per second)",
        duration,
        frames.len() as f64 / duration.as_secs_f64().max(1e-9)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_common::Vec2;
    use std::io::Write;

    fn snapshot(element_id: &str, frame: u64) -> FieldSnapshot {
        // 2x2 field; only the bottom-left texel is disturbed.
        FieldSnapshot {
            frame,
            element_id: element_id.to_string(),
            surface_width: 4.0,
            surface_height: 4.0,
            field_width: 2,
            field_height: 2,
            idle: true,
            influence: Vec2::zero(),
            height: vec![1.0, 0.0, 0.0, 0.0],
            previous_height: vec![0.5, 0.0, 0.0, 0.0],
            activity: vec![1.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn parses_known_and_unknown_colors() {
        assert_eq!(parse_color("White"), [255, 255, 255]);
        assert_eq!(parse_color("chartreuse"), [0, 0, 0]);
    }

    #[test]
    fn dimensions_round_down_to_even() {
        assert_eq!(even_dimension(641), 640);
        assert_eq!(even_dimension(360), 360);
        assert_eq!(even_dimension(0), 2);
    }

    #[test]
    fn field_bottom_row_lands_at_image_bottom() {
        let frame = draw_frame(&snapshot("hero", 0), 0, 4, 4, &ShadingConfig::default(), [0, 0, 0], None);
        assert_eq!(frame.image.dimensions(), (4, 4));
        let bottom_left = frame.image.get_pixel(0, 3);
        let top_right = frame.image.get_pixel(3, 0);
        assert!(bottom_left[2] > 0);
        assert_eq!(top_right.0, [0, 0, 0, 255]);
    }

    #[test]
    fn yuv_planes_have_420_layout() {
        let image = ImageBuffer::from_pixel(4, 2, Rgba([128, 128, 128, 255]));
        let yuv = rgb_to_yuv420(&image);
        assert_eq!(yuv.len(), 8 + 2 + 2);
        assert!(yuv[..8].iter().all(|&y| y == 128));
        assert!(yuv[8..].iter().all(|&c| (127..=129).contains(&c)));
    }

    #[test]
    fn reads_one_element_from_snapshot_file() {
        let path = std::env::temp_dir().join(format!("ripple_visualizer_test_{}.bin", std::process::id()));
        {
            let mut file = File::create(&path).unwrap();
            let snapshots = [snapshot("a", 0), snapshot("b", 0), snapshot("a", 5)];
            bincode::serialize_into(&mut file, &(snapshots.len() as u32)).unwrap();
            for s in &snapshots {
                bincode::serialize_into(&mut file, s).unwrap();
            }
            file.flush().unwrap();
        }

        let first = read_snapshots(&path, None).unwrap();
        assert_eq!(first.iter().map(|s| s.frame).collect::<Vec<_>>(), vec![0, 5]);
        let b = read_snapshots(&path, Some("b")).unwrap();
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].element_id, "b");
        fs::remove_file(&path).ok();
    }
}
