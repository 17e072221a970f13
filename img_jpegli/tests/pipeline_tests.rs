//! End-to-end pipeline tests with stand-in encoders and metadata copiers.

use image::codecs::jpeg::JpegEncoder;
use image::{GenericImageView, ImageFormat, Rgb, RgbImage};
use img_jpegli::{
    BatchCoordinator, BatchTally, CancelToken, CjpegliEncoder, DistanceTier, EncodeSetting,
    Encoder, ErrorKind, ExifToolCopier, FileOutcome, MetadataCopier, OptimizeConfig,
    OptimizeError, Pipeline, ReplacementDecision, DEFAULT_ENCODER_TIMEOUT,
    DEFAULT_EXIFTOOL_TIMEOUT,
};
use indicatif::ProgressBar;
use shared_utils::FileTimestamps;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// fixtures
// ---------------------------------------------------------------------------

fn lcg_noise(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut state = seed;
    RgbImage::from_fn(width, height, |_, _| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let v = (state >> 33) as u8;
        Rgb([v, v, v])
    })
}

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
    })
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(img)
        .unwrap();
    buf
}

/// Grow a JPEG to exactly `target_len` bytes with COM segments after SOI.
fn pad_jpeg(jpeg: &[u8], target_len: usize) -> Vec<u8> {
    assert!(jpeg.starts_with(&[0xFF, 0xD8]));
    assert!(target_len == jpeg.len() || target_len >= jpeg.len() + 4);

    let mut segments = Vec::new();
    let mut remaining = target_len - jpeg.len();
    while remaining > 0 {
        let payload = if remaining - 4 <= 65533 {
            remaining - 4
        } else {
            60000
        };
        let len = (payload + 2) as u16;
        segments.extend_from_slice(&[0xFF, 0xFE]);
        segments.extend_from_slice(&len.to_be_bytes());
        segments.extend(std::iter::repeat(b'x').take(payload));
        remaining -= payload + 4;
    }

    let mut out = Vec::with_capacity(target_len);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&segments);
    out.extend_from_slice(&jpeg[2..]);
    assert_eq!(out.len(), target_len);
    out
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn dir_names(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn errored_kind(outcome: &FileOutcome) -> Option<ErrorKind> {
    match outcome {
        FileOutcome::Decided(ReplacementDecision::Errored(e)) => Some(e.kind()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// stand-ins
// ---------------------------------------------------------------------------

/// Decodes the source and writes a plain JPEG at a fixed quality.
struct ReencodeEncoder {
    quality: u8,
}

impl Encoder for ReencodeEncoder {
    fn encode(&self, source: &Path, _: EncodeSetting, output: &Path) -> img_jpegli::Result<()> {
        let img = image::open(source)
            .map_err(|e| OptimizeError::EncodeFailure(e.to_string()))?
            .to_rgb8();
        fs::write(output, encode_jpeg(&img, self.quality))
            .map_err(|e| OptimizeError::EncodeFailure(e.to_string()))
    }
}

/// Writes the same bytes every time.
struct FixedEncoder(Vec<u8>);

impl Encoder for FixedEncoder {
    fn encode(&self, _: &Path, _: EncodeSetting, output: &Path) -> img_jpegli::Result<()> {
        fs::write(output, &self.0).map_err(|e| OptimizeError::EncodeFailure(e.to_string()))
    }
}

struct FailingEncoder;

impl Encoder for FailingEncoder {
    fn encode(&self, _: &Path, _: EncodeSetting, output: &Path) -> img_jpegli::Result<()> {
        fs::write(output, b"partial").ok();
        Err(OptimizeError::EncodeFailure("cjpegli exited with code 1".into()))
    }
}

/// Remembers each requested setting, then re-encodes.
#[derive(Default)]
struct RecordingEncoder {
    seen: Mutex<Vec<(PathBuf, EncodeSetting)>>,
}

impl RecordingEncoder {
    fn setting_for(&self, name: &str) -> EncodeSetting {
        let seen = self.seen.lock().unwrap();
        seen.iter()
            .find(|(p, _)| p.file_name().is_some_and(|n| n == name))
            .map(|(_, s)| *s)
            .unwrap()
    }
}

impl Encoder for RecordingEncoder {
    fn encode(&self, source: &Path, setting: EncodeSetting, output: &Path) -> img_jpegli::Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push((source.to_path_buf(), setting));
        ReencodeEncoder { quality: 75 }.encode(source, setting, output)
    }
}

/// Trips the cancel token while the encode is in flight.
struct CancellingEncoder(CancelToken);

impl Encoder for CancellingEncoder {
    fn encode(&self, source: &Path, setting: EncodeSetting, output: &Path) -> img_jpegli::Result<()> {
        self.0.cancel();
        ReencodeEncoder { quality: 75 }.encode(source, setting, output)
    }
}

struct NoopCopier;

impl MetadataCopier for NoopCopier {
    fn copy_metadata(&self, _: &Path, _: Option<FileTimestamps>, _: &Path) -> img_jpegli::Result<()> {
        Ok(())
    }
}

struct FailingCopier;

impl MetadataCopier for FailingCopier {
    fn copy_metadata(&self, _: &Path, _: Option<FileTimestamps>, _: &Path) -> img_jpegli::Result<()> {
        Err(OptimizeError::MetadataTransferFailure(
            "exiftool: exited with code 1".into(),
        ))
    }
}

/// Appends `n` bytes to the candidate, like a large embedded profile would.
struct PaddingCopier(usize);

impl MetadataCopier for PaddingCopier {
    fn copy_metadata(&self, _: &Path, _: Option<FileTimestamps>, target: &Path) -> img_jpegli::Result<()> {
        let mut f = fs::OpenOptions::new().append(true).open(target).unwrap();
        f.write_all(&vec![0u8; self.0]).unwrap();
        Ok(())
    }
}

/// Unlinks the candidate, so the final rename has nothing to move.
struct VanishingCopier;

impl MetadataCopier for VanishingCopier {
    fn copy_metadata(&self, _: &Path, _: Option<FileTimestamps>, target: &Path) -> img_jpegli::Result<()> {
        fs::remove_file(target).unwrap();
        Ok(())
    }
}

/// Another writer claims the source's `.jpg` sibling while metadata is copied.
struct SiblingRaceCopier(Vec<u8>);

impl MetadataCopier for SiblingRaceCopier {
    fn copy_metadata(&self, source: &Path, _: Option<FileTimestamps>, _: &Path) -> img_jpegli::Result<()> {
        fs::write(source.with_extension("jpg"), &self.0).unwrap();
        Ok(())
    }
}

fn pipeline(encoder: impl Encoder + 'static, copier: impl MetadataCopier + 'static) -> Pipeline {
    Pipeline::new(OptimizeConfig::default(), Arc::new(encoder), Arc::new(copier))
}

fn run_batch(pipeline: &Pipeline, files: &[PathBuf]) -> BatchTally {
    let coordinator = BatchCoordinator::new(pipeline, 3).unwrap();
    let (reports, tally) =
        coordinator.run(files, &CancelToken::new(), &ProgressBar::hidden(), |_| {});
    assert_eq!(reports.len(), files.len());
    tally
}

// ---------------------------------------------------------------------------
// replacement decisions
// ---------------------------------------------------------------------------

#[test]
fn test_smaller_candidate_replaces_original() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(64, 48), 95);
    let original = pad_jpeg(&base, 200_000);
    let path = write_file(temp.path(), "photo.jpg", &original);

    let report = pipeline(ReencodeEncoder { quality: 80 }, NoopCopier)
        .process(&path, &CancelToken::new());

    match report.outcome {
        FileOutcome::Decided(ReplacementDecision::Replaced {
            original_size,
            new_size,
        }) => {
            assert_eq!(original_size, 200_000);
            assert!(new_size < original_size);
            assert_eq!(fs::metadata(&path).unwrap().len(), new_size);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    let replaced = image::open(&path).unwrap();
    assert_eq!(replaced.dimensions(), (64, 48));
    assert_eq!(dir_names(temp.path()), names(&["photo.jpg"]));
    assert!(report.analysis.is_some());
}

#[test]
fn test_larger_candidate_is_skipped() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(32, 32), 90);
    let path = write_file(temp.path(), "a.jpg", &base);
    let bigger = pad_jpeg(&base, base.len() + 10_000);

    let report = pipeline(FixedEncoder(bigger), NoopCopier).process(&path, &CancelToken::new());

    assert!(matches!(
        report.outcome,
        FileOutcome::Decided(ReplacementDecision::SkippedLarger { .. })
    ));
    assert_eq!(fs::read(&path).unwrap(), base);
    assert_eq!(dir_names(temp.path()), names(&["a.jpg"]));
}

#[test]
fn test_equal_size_candidate_is_skipped_larger() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(32, 32), 90);
    let path = write_file(temp.path(), "a.jpg", &base);

    let report =
        pipeline(FixedEncoder(base.clone()), NoopCopier).process(&path, &CancelToken::new());

    assert!(matches!(
        report.outcome,
        FileOutcome::Decided(ReplacementDecision::SkippedLarger { .. })
    ));
    assert_eq!(fs::read(&path).unwrap(), base);
}

#[test]
fn test_negligible_saving_is_already_optimized() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(32, 32), 90);
    let original = pad_jpeg(&base, 100_000);
    let path = write_file(temp.path(), "a.jpg", &original);
    let candidate = pad_jpeg(&base, 97_000);

    let report = pipeline(FixedEncoder(candidate), NoopCopier).process(&path, &CancelToken::new());

    match report.outcome {
        FileOutcome::Decided(ReplacementDecision::SkippedAlreadyOptimized {
            original_size,
            candidate_size,
        }) => {
            assert_eq!(original_size, 100_000);
            assert_eq!(candidate_size, 97_000);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(fs::read(&path).unwrap(), original);
}

#[test]
fn test_threshold_is_configurable() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(32, 32), 90);
    let original = pad_jpeg(&base, 100_000);
    let path = write_file(temp.path(), "a.jpg", &original);
    let candidate = pad_jpeg(&base, 97_000);

    let config = OptimizeConfig::default().with_min_reduction(1.0);
    let report = Pipeline::new(config, Arc::new(FixedEncoder(candidate)), Arc::new(NoopCopier))
        .process(&path, &CancelToken::new());

    assert!(matches!(
        report.outcome,
        FileOutcome::Decided(ReplacementDecision::Replaced {
            new_size: 97_000,
            ..
        })
    ));
}

#[test]
fn test_rerun_on_optimized_file_changes_nothing() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(32, 32), 90);
    let original = pad_jpeg(&base, 50_000);
    let path = write_file(temp.path(), "a.jpg", &original);
    let pipeline = pipeline(FixedEncoder(pad_jpeg(&base, 48_500)), NoopCopier);

    for _ in 0..2 {
        let tally = run_batch(&pipeline, std::slice::from_ref(&path));
        assert_eq!(tally.skipped_already_optimized, 1);
        assert_eq!(tally.bytes_before, tally.bytes_after);
        assert_eq!(fs::read(&path).unwrap(), original);
    }
}

// ---------------------------------------------------------------------------
// original is untouched on every non-replacing path
// ---------------------------------------------------------------------------

#[test]
fn test_original_untouched_unless_replaced() {
    let base = encode_jpeg(&gradient(40, 30), 90);
    let original = pad_jpeg(&base, 80_000);
    let small = encode_jpeg(&gradient(40, 30), 60);

    type Case = (&'static str, Box<dyn Encoder>, Box<dyn MetadataCopier>, ErrorKind);
    let cases: Vec<Case> = vec![
        (
            "empty",
            Box::new(FixedEncoder(Vec::new())),
            Box::new(NoopCopier),
            ErrorKind::EncodeCorruption,
        ),
        (
            "garbage",
            Box::new(FixedEncoder(b"not a jpeg".to_vec())),
            Box::new(NoopCopier),
            ErrorKind::EncodeCorruption,
        ),
        (
            "wrong dims",
            Box::new(FixedEncoder(encode_jpeg(&gradient(20, 15), 60))),
            Box::new(NoopCopier),
            ErrorKind::EncodeCorruption,
        ),
        (
            "encoder fails",
            Box::new(FailingEncoder),
            Box::new(NoopCopier),
            ErrorKind::EncodeFailure,
        ),
        (
            "metadata fails",
            Box::new(FixedEncoder(small.clone())),
            Box::new(FailingCopier),
            ErrorKind::MetadataTransferFailure,
        ),
    ];

    for (label, encoder, copier, kind) in cases {
        let temp = TempDir::new().unwrap();
        let path = write_file(temp.path(), "keep.jpg", &original);

        let pipeline = Pipeline::new(
            OptimizeConfig::default(),
            Arc::from(encoder),
            Arc::from(copier),
        );
        let report = pipeline.process(&path, &CancelToken::new());

        assert_eq!(errored_kind(&report.outcome), Some(kind), "{}", label);
        assert_eq!(fs::read(&path).unwrap(), original, "{}", label);
        assert_eq!(dir_names(temp.path()), names(&["keep.jpg"]), "{}", label);
    }
}

#[test]
fn test_metadata_growth_rechecks_size() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(32, 32), 90);
    let original = pad_jpeg(&base, 40_000);
    let path = write_file(temp.path(), "a.jpg", &original);

    // 25% smaller before metadata, larger after
    let candidate = pad_jpeg(&base, 30_000);
    let report = pipeline(FixedEncoder(candidate.clone()), PaddingCopier(15_000))
        .process(&path, &CancelToken::new());
    assert!(matches!(
        report.outcome,
        FileOutcome::Decided(ReplacementDecision::SkippedLarger {
            candidate_size: 45_000,
            ..
        })
    ));
    assert_eq!(fs::read(&path).unwrap(), original);

    // still smaller, but within the threshold after metadata
    let report = pipeline(FixedEncoder(candidate), PaddingCopier(9_000))
        .process(&path, &CancelToken::new());
    assert!(matches!(
        report.outcome,
        FileOutcome::Decided(ReplacementDecision::SkippedAlreadyOptimized { .. })
    ));
    assert_eq!(fs::read(&path).unwrap(), original);
    assert_eq!(dir_names(temp.path()), names(&["a.jpg"]));
}

#[cfg(unix)]
#[test]
fn test_failed_rename_keeps_original() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(40, 30), 90);
    let original = pad_jpeg(&base, 80_000);
    let path = write_file(temp.path(), "keep.jpg", &original);

    let report = pipeline(ReencodeEncoder { quality: 60 }, VanishingCopier)
        .process(&path, &CancelToken::new());

    assert_eq!(errored_kind(&report.outcome), Some(ErrorKind::ReplacementIo));
    assert_eq!(fs::read(&path).unwrap(), original);
    assert_eq!(dir_names(temp.path()), names(&["keep.jpg"]));
}

#[test]
fn test_undecodable_input_is_decode_error() {
    let temp = TempDir::new().unwrap();
    let path = write_file(temp.path(), "broken.jpg", b"this is not an image");

    let report = pipeline(FailingEncoder, NoopCopier).process(&path, &CancelToken::new());

    assert_eq!(errored_kind(&report.outcome), Some(ErrorKind::Decode));
    assert_eq!(fs::read(&path).unwrap(), b"this is not an image");
}

// ---------------------------------------------------------------------------
// batches
// ---------------------------------------------------------------------------

#[test]
fn test_one_corrupt_file_does_not_stop_batch() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(48, 48), 95);
    let mut files: Vec<PathBuf> = (0..5)
        .map(|i| write_file(temp.path(), &format!("img{}.jpg", i), &pad_jpeg(&base, 60_000)))
        .collect();
    files.push(write_file(temp.path(), "corrupt.jpg", b"truncated upload"));

    let pipeline = pipeline(ReencodeEncoder { quality: 75 }, NoopCopier);
    let tally = run_batch(&pipeline, &files);

    assert_eq!(tally.errored, 1);
    assert_eq!(tally.replaced, 5);
    assert_eq!(tally.total(), 6);
    assert_eq!(tally.failures.len(), 1);
    assert!(tally.failures[0].0.ends_with("corrupt.jpg"));
    assert_eq!(tally.bytes_before, 5 * 60_000);
    assert!(tally.bytes_after < tally.bytes_before);
}

#[test]
fn test_reports_keep_input_order() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(16, 16), 90);
    let files: Vec<PathBuf> = (0..8)
        .map(|i| write_file(temp.path(), &format!("f{}.jpg", i), &base))
        .collect();

    let pipeline = pipeline(FixedEncoder(base.clone()), NoopCopier);
    let coordinator = BatchCoordinator::new(&pipeline, 4).unwrap();
    let seen = Mutex::new(0usize);
    let (reports, _) = coordinator.run(&files, &CancelToken::new(), &ProgressBar::hidden(), |_| {
        *seen.lock().unwrap() += 1;
    });

    let order: Vec<&PathBuf> = reports.iter().map(|r| &r.path).collect();
    assert_eq!(order, files.iter().collect::<Vec<_>>());
    assert_eq!(*seen.lock().unwrap(), 8);
}

#[test]
fn test_cancelled_batch_leaves_files_alone() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(32, 32), 95);
    let original = pad_jpeg(&base, 30_000);
    let files: Vec<PathBuf> = (0..3)
        .map(|i| write_file(temp.path(), &format!("c{}.jpg", i), &original))
        .collect();

    let cancel = CancelToken::new();
    cancel.cancel();
    let pipeline = pipeline(ReencodeEncoder { quality: 75 }, NoopCopier);
    let coordinator = BatchCoordinator::new(&pipeline, 2).unwrap();
    let (_, tally) = coordinator.run(&files, &cancel, &ProgressBar::hidden(), |_| {});

    assert_eq!(tally.cancelled, 3);
    assert_eq!(tally.total(), 3);
    for f in &files {
        assert_eq!(fs::read(f).unwrap(), original);
    }
}

#[test]
fn test_cancel_during_encode_stops_before_metadata() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(32, 32), 95);
    let original = pad_jpeg(&base, 30_000);
    let path = write_file(temp.path(), "a.jpg", &original);

    let cancel = CancelToken::new();
    let pipeline = Pipeline::new(
        OptimizeConfig::default(),
        Arc::new(CancellingEncoder(cancel.clone())),
        Arc::new(FailingCopier),
    );
    let report = pipeline.process(&path, &cancel);

    assert!(matches!(report.outcome, FileOutcome::Cancelled));
    assert_eq!(fs::read(&path).unwrap(), original);
    assert_eq!(dir_names(temp.path()), names(&["a.jpg"]));
}

// ---------------------------------------------------------------------------
// distance selection through the pipeline
// ---------------------------------------------------------------------------

#[test]
fn test_blank_and_noise_pick_extreme_tiers() {
    let temp = TempDir::new().unwrap();
    let blank = RgbImage::from_pixel(1000, 1000, Rgb([200, 200, 200]));
    let blank_path = write_file(temp.path(), "blank.jpg", &encode_jpeg(&blank, 95));
    let noise_path = write_file(
        temp.path(),
        "noise.jpg",
        &encode_jpeg(&lcg_noise(1000, 1000, 7), 95),
    );

    let encoder = Arc::new(RecordingEncoder::default());
    let pipeline = Pipeline::new(OptimizeConfig::default(), encoder.clone(), Arc::new(NoopCopier));
    run_batch(&pipeline, &[blank_path, noise_path]);

    assert_eq!(
        encoder.setting_for("blank.jpg"),
        EncodeSetting::Distance(DistanceTier::Fine)
    );
    assert_eq!(
        encoder.setting_for("noise.jpg"),
        EncodeSetting::Distance(DistanceTier::Aggressive)
    );
    assert_eq!(DistanceTier::Fine.distance(), 0.65);
    assert_eq!(DistanceTier::Aggressive.distance(), 1.20);
}

#[test]
fn test_same_image_same_analysis() {
    let temp = TempDir::new().unwrap();
    let bytes = encode_jpeg(&lcg_noise(300, 200, 42), 85);
    let a = write_file(temp.path(), "a.jpg", &bytes);
    let b = write_file(temp.path(), "b.jpg", &bytes);

    let pipeline = pipeline(FailingEncoder, NoopCopier);
    let first = pipeline.analyzer().analyze(&a).unwrap();
    let second = pipeline.analyzer().analyze(&b).unwrap();
    let again = pipeline.analyzer().analyze(&a).unwrap();

    assert_eq!(first.features, second.features);
    assert_eq!(first.features, again.features);
    assert_eq!(first.score, second.score);
    assert_eq!(first.tier, second.tier);
}

#[test]
fn test_quality_mode_skips_analysis() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(32, 32), 95);
    let path = write_file(temp.path(), "q.jpg", &pad_jpeg(&base, 20_000));

    let encoder = Arc::new(RecordingEncoder::default());
    let config = OptimizeConfig::default().with_quality(Some(88));
    let report = Pipeline::new(config, encoder.clone(), Arc::new(NoopCopier))
        .process(&path, &CancelToken::new());

    assert_eq!(encoder.setting_for("q.jpg"), EncodeSetting::Quality(88));
    assert!(report.analysis.is_none());
    assert_eq!(report.setting, Some(EncodeSetting::Quality(88)));
}

// ---------------------------------------------------------------------------
// PNG sources and resizing
// ---------------------------------------------------------------------------

#[test]
fn test_png_becomes_sibling_jpeg() {
    let temp = TempDir::new().unwrap();
    let png = temp.path().join("shot.png");
    lcg_noise(256, 256, 3)
        .save_with_format(&png, ImageFormat::Png)
        .unwrap();

    let report = pipeline(ReencodeEncoder { quality: 60 }, NoopCopier)
        .process(&png, &CancelToken::new());

    assert!(
        matches!(
            report.outcome,
            FileOutcome::Decided(ReplacementDecision::Replaced { .. })
        ),
        "{:?}",
        report.outcome
    );
    assert_eq!(dir_names(temp.path()), names(&["shot.jpg"]));
    let jpg = image::open(temp.path().join("shot.jpg")).unwrap();
    assert_eq!(jpg.dimensions(), (256, 256));
}

#[test]
fn test_png_named_jpg_is_replaced_in_place() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("mislabeled.jpg");
    lcg_noise(256, 256, 5)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();

    let report = pipeline(ReencodeEncoder { quality: 60 }, NoopCopier)
        .process(&path, &CancelToken::new());

    assert!(
        matches!(
            report.outcome,
            FileOutcome::Decided(ReplacementDecision::Replaced { .. })
        ),
        "{:?}",
        report.outcome
    );
    assert_eq!(dir_names(temp.path()), names(&["mislabeled.jpg"]));
    let bytes = fs::read(&path).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    assert_eq!(image::open(&path).unwrap().dimensions(), (256, 256));
}

#[test]
fn test_sibling_claimed_during_metadata_copy_is_collision() {
    let temp = TempDir::new().unwrap();
    let png = temp.path().join("shot.png");
    lcg_noise(256, 256, 9)
        .save_with_format(&png, ImageFormat::Png)
        .unwrap();
    let png_bytes = fs::read(&png).unwrap();

    let report = pipeline(
        ReencodeEncoder { quality: 60 },
        SiblingRaceCopier(b"someone else's".to_vec()),
    )
    .process(&png, &CancelToken::new());

    assert_eq!(errored_kind(&report.outcome), Some(ErrorKind::OutputCollision));
    assert_eq!(fs::read(temp.path().join("shot.jpg")).unwrap(), b"someone else's");
    assert_eq!(fs::read(&png).unwrap(), png_bytes);
    assert_eq!(dir_names(temp.path()), names(&["shot.jpg", "shot.png"]));
}

#[test]
fn test_png_not_converted_when_jpeg_larger() {
    let temp = TempDir::new().unwrap();
    let png = temp.path().join("flat.png");
    RgbImage::from_pixel(64, 64, Rgb([10, 20, 30]))
        .save_with_format(&png, ImageFormat::Png)
        .unwrap();
    let png_bytes = fs::read(&png).unwrap();
    let jpeg = encode_jpeg(&RgbImage::from_pixel(64, 64, Rgb([10, 20, 30])), 90);
    let big = pad_jpeg(&jpeg, jpeg.len().max(png_bytes.len()) + 5_000);

    let report = pipeline(FixedEncoder(big), NoopCopier).process(&png, &CancelToken::new());

    assert!(matches!(
        report.outcome,
        FileOutcome::Decided(ReplacementDecision::SkippedLarger { .. })
    ));
    assert_eq!(fs::read(&png).unwrap(), png_bytes);
    assert_eq!(dir_names(temp.path()), names(&["flat.png"]));
}

#[test]
fn test_max_size_downscales_before_encoding() {
    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&gradient(400, 200), 95);
    let path = write_file(temp.path(), "wide.jpg", &pad_jpeg(&base, 150_000));

    let config = OptimizeConfig::default().with_max_dimension(Some(100));
    let report = Pipeline::new(
        config,
        Arc::new(ReencodeEncoder { quality: 80 }),
        Arc::new(NoopCopier),
    )
    .process(&path, &CancelToken::new());

    assert!(matches!(
        report.outcome,
        FileOutcome::Decided(ReplacementDecision::Replaced { .. })
    ));
    assert_eq!(image::open(&path).unwrap().dimensions(), (100, 50));
}

// ---------------------------------------------------------------------------
// real tools
// ---------------------------------------------------------------------------

#[test]
fn test_real_cjpegli_and_exiftool() {
    let (Ok(cjpegli), Ok(exiftool)) = (
        shared_utils::resolve_tool("cjpegli", None),
        shared_utils::resolve_tool("exiftool", None),
    ) else {
        eprintln!("cjpegli or exiftool not installed, skipping");
        return;
    };

    let temp = TempDir::new().unwrap();
    let base = encode_jpeg(&lcg_noise(320, 240, 11), 98);
    let path = write_file(temp.path(), "real.jpg", &base);
    let past = filetime::FileTime::from_unix_time(1_500_000_000, 0);
    filetime::set_file_mtime(&path, past).unwrap();

    let pipeline = Pipeline::new(
        OptimizeConfig::default(),
        Arc::new(CjpegliEncoder::new(cjpegli, DEFAULT_ENCODER_TIMEOUT)),
        Arc::new(ExifToolCopier::new(exiftool, DEFAULT_EXIFTOOL_TIMEOUT)),
    );
    let report = pipeline.process(&path, &CancelToken::new());

    match report.outcome {
        FileOutcome::Decided(ReplacementDecision::Replaced { new_size, .. }) => {
            let meta = fs::metadata(&path).unwrap();
            assert_eq!(meta.len(), new_size);
            assert_eq!(filetime::FileTime::from_last_modification_time(&meta), past);
            assert_eq!(image::open(&path).unwrap().dimensions(), (320, 240));
        }
        FileOutcome::Decided(ReplacementDecision::Errored(e)) => panic!("{}", e),
        _ => assert_eq!(fs::read(&path).unwrap(), base),
    }
    assert_eq!(dir_names(temp.path()), names(&["real.jpg"]));
}
