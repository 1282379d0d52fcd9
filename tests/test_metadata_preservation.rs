//! EXIF/IPTC survival across the watermark re-encode.

use std::path::{Path, PathBuf};

use aquamark::metadata;
use aquamark::{
    BackupStore, RasterVariant, Trigger, WatermarkConfig, WatermarkEngine, WatermarkSource,
};

/// Build a raw APP-segment: FF <marker> <len:u16 BE> <payload>.
fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&(payload.len() as u16 + 2).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn exif_payload() -> Vec<u8> {
    let mut p = b"Exif\0\0".to_vec();
    p.extend_from_slice(&[0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00]);
    p
}

fn iptc_payload() -> Vec<u8> {
    let mut p = b"Photoshop 3.0\0".to_vec();
    p.extend_from_slice(b"8BIM\x04\x04\0\0\0\0\0\x06credit");
    p
}

/// Encode a real JPEG with the image crate, then splice camera-style
/// EXIF and IPTC segments right after its SOI.
fn write_jpeg_with_metadata(path: &Path, w: u32, h: u32) {
    let img = image::RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, 90])
    });
    let mut bytes = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Jpeg,
    )
    .expect("encode jpeg");
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

    let mut tagged = bytes[..2].to_vec();
    tagged.extend_from_slice(&segment(0xE1, &exif_payload()));
    tagged.extend_from_slice(&segment(0xED, &iptc_payload()));
    tagged.extend_from_slice(&bytes[2..]);
    std::fs::write(path, tagged).expect("write tagged jpeg");
}

struct Fixture {
    _dir: tempfile::TempDir,
    engine: WatermarkEngine,
    photo: PathBuf,
    logo: PathBuf,
}

fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("tempdir");
    let uploads = dir.path().join("uploads");
    let backups = dir.path().join("backups");
    std::fs::create_dir_all(&uploads).expect("mkdirs");

    let photo = uploads.join("photo.jpg");
    write_jpeg_with_metadata(&photo, 80, 60);

    let logo = dir.path().join("logo.png");
    image::RgbaImage::from_fn(12, 12, |_, _| image::Rgba([0, 0, 255, 255]))
        .save(&logo)
        .expect("save logo");

    Fixture {
        engine: WatermarkEngine::new(BackupStore::new(&uploads, &backups)),
        _dir: dir,
        photo,
        logo,
    }
}

fn config(f: &Fixture) -> WatermarkConfig {
    WatermarkConfig::new(WatermarkSource::Image {
        path: f.logo.clone(),
        width: 12,
        height: 12,
    })
}

fn jpeg_variant(f: &Fixture) -> RasterVariant {
    RasterVariant {
        file_path: f.photo.clone(),
        width: 80,
        height: 60,
        mime_type: "image/jpeg".to_string(),
    }
}

#[test]
fn test_exif_and_iptc_survive_watermarking() {
    let f = fixture();
    let before = metadata::capture(&std::fs::read(&f.photo).expect("read original"));
    assert_eq!(before.len(), 2, "fixture must carry EXIF and IPTC");

    let report = f
        .engine
        .apply_watermark(&[jpeg_variant(&f)], &config(&f), "att-1", Trigger::Automatic)
        .expect("apply");
    assert_eq!(report.applied(), 1);

    let out = std::fs::read(&f.photo).expect("read output");
    assert!(metadata::is_jpeg(&out), "output must remain a JPEG");
    let after = metadata::capture(&out);
    assert_eq!(
        after, before,
        "captured metadata must be byte-identical after watermarking"
    );

    // The output still decodes as an image of the same size.
    assert_eq!(
        image::image_dimensions(&f.photo).expect("dimensions"),
        (80, 60)
    );
}

#[test]
fn test_metadata_survives_reapply() {
    let f = fixture();
    let before = metadata::capture(&std::fs::read(&f.photo).expect("read original"));

    let v = jpeg_variant(&f);
    f.engine
        .apply_watermark(&[v.clone()], &config(&f), "att-1", Trigger::Automatic)
        .expect("first apply");
    f.engine
        .apply_watermark(&[v], &config(&f), "att-1", Trigger::Automatic)
        .expect("second apply");

    let after = metadata::capture(&std::fs::read(&f.photo).expect("read output"));
    assert_eq!(after, before);
}

#[test]
fn test_jpeg_without_metadata_is_fine() {
    let f = fixture();
    // Overwrite the photo with a plain JPEG carrying no APP1/APP13.
    let img = image::RgbImage::from_fn(40, 30, |_, _| image::Rgb([10, 20, 30]));
    img.save(&f.photo).expect("save plain jpeg");

    let report = f
        .engine
        .apply_watermark(&[jpeg_variant(&f)], &config(&f), "att-2", Trigger::Automatic)
        .expect("apply");
    assert_eq!(report.applied(), 1);
    let out = std::fs::read(&f.photo).expect("read output");
    assert!(metadata::capture(&out).is_empty());
}

#[test]
fn test_remove_restores_original_metadata_bytes() {
    let f = fixture();
    let pristine = std::fs::read(&f.photo).expect("read original");

    let v = jpeg_variant(&f);
    f.engine
        .apply_watermark(&[v.clone()], &config(&f), "att-1", Trigger::Automatic)
        .expect("apply");
    f.engine.remove_watermark(&v, "att-1").expect("remove");

    assert_eq!(
        std::fs::read(&f.photo).expect("read restored"),
        pristine,
        "restore must bring back the exact original bytes, metadata included"
    );
}
