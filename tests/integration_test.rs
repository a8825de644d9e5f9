//! End-to-end tests: channel files on disk to mosaic, masks to defect files

use std::fs;
use std::path::Path;

use obsmosaic::assembly::{DataKind, Quadrant};
use obsmosaic::commands::{build_cli, CommandFactory, ObsCommandFactory};
use obsmosaic::defects::DefectCodec;
use obsmosaic::errors::ObsError;
use obsmosaic::fits::{FitsImageStore, ImageStore};
use obsmosaic::geom::BoundingBox;
use obsmosaic::image::{Band, BandRegistry, Image, MetaValue, Metadata, PixelBuffer, PixelData, Plane, PlaneKind};
use obsmosaic::utils::logger::Logger;
use obsmosaic::{ObsConfig, ObsMosaic};

const WIDTH: u32 = 500;
const HEIGHT: u32 = 1200;

/// Float channel whose samples encode quadrant, row and column exactly
fn calib_channel(quadrant: Quadrant, width: u32, height: u32) -> Image {
    let base = 1_000_000 * (1 + 2 * u32::from(quadrant.y()) + u32::from(quadrant.x()));
    let data = (0..height)
        .flat_map(|y| (0..width).map(move |x| (base + y * width + x) as f32))
        .collect();
    Image::from_pixels(PixelBuffer::new(width, height, PixelData::F32(data)).unwrap())
}

fn raw_channel(quadrant: Quadrant, width: u32, height: u32) -> Image {
    let data = (0..height)
        .flat_map(|y| (0..width).map(move |x| (100 * u32::from(quadrant.x()) + 10 * y + x) as u16))
        .collect();
    Image::from_pixels(PixelBuffer::new(width, height, PixelData::U16(data)).unwrap())
}

fn write_channels(dir: &Path, visit: &str, make: impl Fn(Quadrant) -> Image) {
    let logger = Logger::disabled();
    let bands = BandRegistry::with_defaults();
    let store = FitsImageStore::new(&logger, &bands);
    for quadrant in Quadrant::ALL {
        let name = format!("imsim_{}_R22_S00_{}.fits", visit, quadrant.channel_tag());
        store.write_image(&dir.join(name), &make(quadrant)).unwrap();
    }
}

fn api() -> ObsMosaic {
    ObsMosaic::new(None, ObsConfig::default()).unwrap()
}

#[test]
fn assembles_full_size_detector() {
    let dir = tempfile::tempdir().unwrap();
    write_channels(dir.path(), "2", |q| calib_channel(q, WIDTH, HEIGHT));

    let mosaic = api().assemble(dir.path(), DataKind::Calibration, &Metadata::new()).unwrap();
    assert_eq!((mosaic.width(), mosaic.height()), (1000, 2000));

    // Channel (0, 1) is flipped into the upper left: output row 1005 is crop
    // row 994, which is channel row 200 + 994
    let upper_left = calib_channel(Quadrant::new(0, 1).unwrap(), WIDTH, HEIGHT);
    assert_eq!(mosaic.primary().get_f64(10, 1005), upper_left.primary().get_f64(10, 1194));

    // Channel (1, 0) is pasted unflipped to the lower right
    let lower_right = calib_channel(Quadrant::new(1, 0).unwrap(), WIDTH, HEIGHT);
    assert_eq!(mosaic.primary().get_f64(510, 3), lower_right.primary().get_f64(10, 203));

    // Top of the upper right quadrant is the top of its channel's crop, flipped down
    let upper_right = calib_channel(Quadrant::new(1, 1).unwrap(), WIDTH, HEIGHT);
    assert_eq!(mosaic.primary().get_f64(999, 1999), upper_right.primary().get_f64(499, 200));
}

#[test]
fn locator_errors_surface() {
    let dir = tempfile::tempdir().unwrap();
    write_channels(dir.path(), "2", |q| calib_channel(q, 4, 4));
    let obs = api();

    // A second match for channel (0, 0)
    fs::copy(dir.path().join("imsim_2_R22_S00_C00.fits"),
             dir.path().join("imsim_3_R22_S00_C00.fits")).unwrap();
    match obs.assemble(dir.path(), DataKind::Calibration, &Metadata::new()) {
        Err(ObsError::AmbiguousMatch { matches, .. }) => assert_eq!(matches.len(), 2),
        other => panic!("expected AmbiguousMatch, got {:?}", other.map(|_| ())),
    }

    fs::remove_file(dir.path().join("imsim_3_R22_S00_C00.fits")).unwrap();
    fs::remove_file(dir.path().join("imsim_2_R22_S00_C11.fits")).unwrap();
    let result = obs.assemble(dir.path(), DataKind::Calibration, &Metadata::new());
    assert!(matches!(result, Err(ObsError::NotFound(_))));
}

#[test]
fn raw_channels_need_raw_assembly() {
    let dir = tempfile::tempdir().unwrap();
    write_channels(dir.path(), "89010", |q| raw_channel(q, 6, 5));
    let obs = api();

    let result = obs.assemble(dir.path(), DataKind::Calibration, &Metadata::new());
    assert!(matches!(result, Err(ObsError::WrongKind { .. })));

    let out = dir.path().join("raw.fits");
    let mut config = ObsConfig::default();
    config.assembly.sub_height = 4;
    let obs = ObsMosaic::new(None, config).unwrap();
    obs.assemble_to_file(dir.path(), DataKind::Raw, &Metadata::new(), &out).unwrap();

    let mosaic = obs.read_image(&out).unwrap();
    assert_eq!((mosaic.width(), mosaic.height()), (12, 8));
    // Lower right pixel (6, 0) comes from channel (1, 0) row 1
    assert_eq!(mosaic.primary().get_u32(6, 0), Some(110));
    // Upper left top row (0, 7) is channel (0, 1) row 1 after the flip
    assert_eq!(mosaic.primary().get_u32(0, 7), Some(10));
}

#[test]
fn calibration_files_with_planes_and_header() {
    let dir = tempfile::tempdir().unwrap();
    write_channels(dir.path(), "2", |q| {
        let image = calib_channel(q, 3, 4);
        let mut mask = vec![0u32; 12];
        if q == Quadrant::new(0, 1).unwrap() {
            mask[3 * 3] = 1;
        }
        let mut image = Image::from_planes(vec![
            Plane::new(PlaneKind::Image, image.primary().clone()),
            Plane::new(PlaneKind::Mask, PixelBuffer::new(3, 4, PixelData::U32(mask)).unwrap()),
            Plane::new(PlaneKind::Variance, PixelBuffer::zeros(obsmosaic::image::SampleKind::F32, 3, 4)),
        ]).unwrap();
        image.metadata.set("OBSTYPE", "bias");
        image.metadata.set("CCDNAME", q.channel_tag());
        image.filter = Some(Band::new("r"));
        image
    });

    let mut defaults = Metadata::new();
    defaults.set("OBSTYPE", "flat");
    defaults.set("EXPTIME", 30i64);

    let out = dir.path().join("image.fits");
    let mut config = ObsConfig::default();
    config.assembly.sub_height = 2;
    let obs = ObsMosaic::new(None, config).unwrap();
    obs.assemble_to_file(dir.path(), DataKind::Calibration, &defaults, &out).unwrap();

    let mosaic = obs.read_image(&out).unwrap();
    assert_eq!((mosaic.width(), mosaic.height()), (6, 4));
    assert_eq!(mosaic.metadata.get_str("OBSTYPE"), Some("bias"));
    assert_eq!(mosaic.metadata.get_str("CCDNAME"), Some("C00"));
    assert_eq!(mosaic.metadata.get("EXPTIME"), Some(&MetaValue::Int(30)));
    assert_eq!(mosaic.filter, Some(Band::new("r")));

    // Channel (0, 1) mask bit on its top row lands on canvas row 2
    let mask = mosaic.plane(PlaneKind::Mask).unwrap();
    assert_eq!(mask.get_u32(0, 2), Some(1));
    assert_eq!(mask.get_u32(0, 3), Some(0));
    assert!(mosaic.plane(PlaneKind::Variance).unwrap().is_all_zero());
}

fn bias_with_defects(path: &Path) {
    let (width, height) = (8u32, 6u32);
    let mut mask = vec![0u32; (width * height) as usize];
    // Column 2, rows 1..4 and a single pixel at (6, 5) with BAD set
    for y in 1..4 {
        mask[(y * width + 2) as usize] = 1;
    }
    mask[(5 * width + 6) as usize] = 1 | 2;
    // Saturated only: not a defect
    mask[0] = 2;

    let mut image = Image::from_planes(vec![
        Plane::new(PlaneKind::Image, PixelBuffer::zeros(obsmosaic::image::SampleKind::F32, width, height)),
        Plane::new(PlaneKind::Mask, PixelBuffer::new(width, height, PixelData::U32(mask)).unwrap()),
    ]).unwrap();
    image.filter = Some(Band::new("g"));

    let logger = Logger::disabled();
    let bands = BandRegistry::with_defaults();
    FitsImageStore::new(&logger, &bands).write_image(path, &image).unwrap();
}

#[test]
fn defects_command_writes_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let bias = dir.path().join("bias.fits");
    bias_with_defects(&bias);

    let output = dir.path().join("defects_c0.ecsv");
    let matches = build_cli().try_get_matches_from([
        "obsmosaic",
        bias.to_str().unwrap(),
        "--defects",
        "-o",
        output.to_str().unwrap(),
    ]).unwrap();

    let log_file = dir.path().join("obsmosaic.log");
    let logger = Logger::new(log_file.to_str().unwrap()).unwrap();
    let factory = ObsCommandFactory::new();
    factory.create_command(&matches, &logger).unwrap().execute().unwrap();

    let map = DefectCodec::new(&Logger::disabled()).read(&output, "0").unwrap();
    assert_eq!(map.boxes, vec![
        BoundingBox::new(2, 1, 1, 3).unwrap(),
        BoundingBox::new(6, 5, 1, 1).unwrap(),
    ]);
    // The bias band is not carried into the defect file
    assert_eq!(map.header.filter, None);
    assert_eq!(map.header.detector_serial, "0000011");

    let log = fs::read_to_string(&log_file).unwrap();
    assert!(log.contains(&format!("Read {} (8x6", bias.display())), "{}", log);
    assert!(log.contains(&format!("Wrote defects {}", output.display())), "{}", log);

    // The output must not exist yet
    let again = factory.create_command(&matches, &logger).unwrap().execute();
    assert!(matches!(again, Err(ObsError::GenericError(_))));
}

#[test]
fn defects_in_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let bias = dir.path().join("bias.fits");
    bias_with_defects(&bias);
    let obs = api();

    let expected = obs.find_defects(&bias).unwrap();
    for name in ["defects.fits", "defects.dat", "defects.ecsv"] {
        let path = dir.path().join(name);
        let written = obs.write_defects(&bias, &path).unwrap();
        assert_eq!(written.boxes, expected.boxes, "{}", name);
        assert_eq!(obs.read_defects(&path, "0").unwrap(), written, "{}", name);

        let summary = obs.analyze(&path, true).unwrap();
        assert!(summary.contains("2 defect(s) covering 4 pixel(s)"), "{}", summary);
    }

    let summary = obs.analyze(&bias, false).unwrap();
    assert!(summary.contains("Dimensions: 8x6"));
    assert!(summary.contains("Plane MASK"));
}

#[test]
fn missing_mask_plane_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flat.fits");
    let image = Image::from_pixels(PixelBuffer::new(2, 2, PixelData::F32(vec![1.0; 4])).unwrap());
    let logger = Logger::disabled();
    let bands = BandRegistry::with_defaults();
    FitsImageStore::new(&logger, &bands).write_image(&path, &image).unwrap();

    let result = api().write_defects(&path, &dir.path().join("defects.ecsv"));
    assert!(matches!(result, Err(ObsError::NotFound(_))));
    assert!(!dir.path().join("defects.ecsv").exists());
}
